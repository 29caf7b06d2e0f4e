use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A job as it travels through `job_queue`. The `id` mirrors the database
/// row id, stringified on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMessage {
    pub id: String,
    pub name: String,
    pub payload: String,
}

/// A worker's report on `job_results`. Anything other than
/// `status == "completed"` is treated as a failure. Workers attach extra
/// fields (`error`, `processing_time`, ...) which are carried along so the
/// full report can be parked in the dead-letter queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResultMessage {
    pub job_id: String,
    pub status: String,
    pub worker_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl JobResultMessage {
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }

    /// End-to-end duration in seconds, when the submitter stamped the
    /// message with an RFC3339 `created_at`.
    pub fn elapsed_since_created(&self) -> Option<f64> {
        let created = self.created_at.as_deref()?;
        let created = DateTime::parse_from_rfc3339(created).ok()?;
        let elapsed = Utc::now().signed_duration_since(created.with_timezone(&Utc));
        Some(elapsed.num_milliseconds() as f64 / 1000.0)
    }
}

/// Why a job was parked in the dead-letter queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    MaxRetriesExceeded,
    Timeout,
}

/// Terminal parking record pushed to `dead_letter_queue`. `original_job`
/// carries the full context object the decision was made from, either the
/// worker's last report or a synthetic record for an expired lease.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterMessage {
    pub job_id: String,
    pub original_job: serde_json::Value,
    pub failed_at: DateTime<Utc>,
    pub reason: DeadLetterReason,
}

impl DeadLetterMessage {
    pub fn new(job_id: String, original_job: serde_json::Value, reason: DeadLetterReason) -> Self {
        Self {
            job_id,
            original_job,
            failed_at: Utc::now(),
            reason,
        }
    }
}
