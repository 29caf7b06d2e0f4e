use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use foreman::broker::{DeadLetterMessage, DeadLetterReason, JobMessage, JobResultMessage};

#[test]
fn test_job_message_wire_format() {
    let msg = JobMessage {
        id: "42".to_string(),
        name: "resize_images".to_string(),
        payload: "bucket/a.png".to_string(),
    };

    let raw = serde_json::to_value(&msg).unwrap();
    assert_eq!(raw["id"], "42");
    assert_eq!(raw["name"], "resize_images");
    assert_eq!(raw["payload"], "bucket/a.png");

    let back: JobMessage = serde_json::from_value(raw).unwrap();
    assert_eq!(back.id, "42");
}

#[test]
fn test_result_message_minimal_fields() {
    let raw = r#"{"job_id":"7","status":"completed","worker_url":"http://w1"}"#;
    let msg: JobResultMessage = serde_json::from_str(raw).unwrap();

    assert_eq!(msg.job_id, "7");
    assert!(msg.is_completed());
    assert_eq!(msg.worker_url, "http://w1");
    assert!(msg.result.is_none());
    assert!(msg.created_at.is_none());
    assert!(msg.extra.is_empty());
}

#[test]
fn test_result_message_keeps_unknown_fields() {
    // Workers attach diagnostic fields; they must survive into the
    // dead-letter context.
    let raw = r#"{
        "job_id": "7",
        "status": "failed",
        "worker_url": "http://w1",
        "error": "Invalid job content",
        "processing_time": 1.25
    }"#;
    let msg: JobResultMessage = serde_json::from_str(raw).unwrap();

    assert!(!msg.is_completed());
    assert_eq!(msg.extra["error"], "Invalid job content");

    let round_tripped = serde_json::to_value(&msg).unwrap();
    assert_eq!(round_tripped["error"], "Invalid job content");
    assert_eq!(round_tripped["processing_time"], 1.25);
}

#[test]
fn test_any_status_other_than_completed_is_failure() {
    for status in ["failed", "error", "timeout", "COMPLETED", ""] {
        let msg = JobResultMessage {
            job_id: "1".to_string(),
            status: status.to_string(),
            worker_url: "http://w1".to_string(),
            result: None,
            created_at: None,
            extra: serde_json::Map::new(),
        };
        assert!(!msg.is_completed(), "status {:?} treated as completed", status);
    }
}

#[test]
fn test_elapsed_since_created() {
    let created = (Utc::now() - ChronoDuration::seconds(30))
        .to_rfc3339_opts(SecondsFormat::Secs, true);
    let msg = JobResultMessage {
        job_id: "1".to_string(),
        status: "completed".to_string(),
        worker_url: "http://w1".to_string(),
        result: Some("ok".to_string()),
        created_at: Some(created),
        extra: serde_json::Map::new(),
    };

    let elapsed = msg.elapsed_since_created().unwrap();
    assert!(elapsed >= 29.0 && elapsed < 40.0, "elapsed was {}", elapsed);
}

#[test]
fn test_elapsed_ignores_unparseable_timestamps() {
    let mut msg = JobResultMessage {
        job_id: "1".to_string(),
        status: "completed".to_string(),
        worker_url: "http://w1".to_string(),
        result: None,
        created_at: Some("yesterday-ish".to_string()),
        extra: serde_json::Map::new(),
    };
    assert!(msg.elapsed_since_created().is_none());

    msg.created_at = None;
    assert!(msg.elapsed_since_created().is_none());
}

#[test]
fn test_malformed_job_message_is_rejected() {
    assert!(serde_json::from_str::<JobMessage>("not json at all").is_err());
    assert!(serde_json::from_str::<JobMessage>(r#"{"id":"1"}"#).is_err());
}

#[test]
fn test_dead_letter_reason_wire_names() {
    let msg = DeadLetterMessage::new(
        "9".to_string(),
        serde_json::json!({"job_id": "9", "status": "failed"}),
        DeadLetterReason::MaxRetriesExceeded,
    );
    let raw = serde_json::to_value(&msg).unwrap();
    assert_eq!(raw["reason"], "max_retries_exceeded");
    assert_eq!(raw["job_id"], "9");
    assert_eq!(raw["original_job"]["status"], "failed");
    assert!(raw["failed_at"].is_string());

    let msg = DeadLetterMessage::new("9".to_string(), serde_json::Value::Null, DeadLetterReason::Timeout);
    let raw = serde_json::to_value(&msg).unwrap();
    assert_eq!(raw["reason"], "timeout");
}

#[test]
fn test_dead_letter_round_trip() {
    let msg = DeadLetterMessage::new(
        "3".to_string(),
        serde_json::json!({"name": "n", "payload": "p"}),
        DeadLetterReason::Timeout,
    );
    let raw = serde_json::to_string(&msg).unwrap();
    let back: DeadLetterMessage = serde_json::from_str(&raw).unwrap();

    assert_eq!(back.job_id, "3");
    assert_eq!(back.reason, DeadLetterReason::Timeout);
    assert_eq!(back.original_job["name"], "n");
}
