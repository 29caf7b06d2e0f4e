use foreman::monitor::heartbeat::presence_transition;
use foreman::monitor::lease::{expiry_step, ExpiryStep};
use foreman::reconcile::reconciler::{result_step, ResultStep};
use foreman::store::{JobStatus, WorkerState};

const MAX_RETRIES: i32 = 3;

#[test]
fn test_completed_report_completes_a_leased_job() {
    assert_eq!(
        result_step(JobStatus::Leased, true, 0, MAX_RETRIES),
        ResultStep::Complete
    );
    // A report can race a requeue and land while the row is pending again.
    assert_eq!(
        result_step(JobStatus::Pending, true, 2, MAX_RETRIES),
        ResultStep::Complete
    );
}

#[test]
fn test_duplicate_completed_report_is_ignored() {
    assert_eq!(
        result_step(JobStatus::Completed, true, 0, MAX_RETRIES),
        ResultStep::Ignore
    );
}

#[test]
fn test_reports_on_terminal_rows_never_mutate() {
    for reported_completed in [true, false] {
        for retries in 0..=MAX_RETRIES + 1 {
            assert_eq!(
                result_step(JobStatus::Completed, reported_completed, retries, MAX_RETRIES),
                ResultStep::Ignore
            );
            assert_eq!(
                result_step(JobStatus::Failed, reported_completed, retries, MAX_RETRIES),
                ResultStep::Ignore
            );
        }
    }
}

#[test]
fn test_failure_retries_until_the_cap() {
    for retries in 0..MAX_RETRIES {
        assert_eq!(
            result_step(JobStatus::Leased, false, retries, MAX_RETRIES),
            ResultStep::Retry,
            "retries={} should retry",
            retries
        );
    }
}

#[test]
fn test_failure_at_the_cap_parks_the_job() {
    assert_eq!(
        result_step(JobStatus::Leased, false, MAX_RETRIES, MAX_RETRIES),
        ResultStep::Park
    );
    assert_eq!(
        result_step(JobStatus::Leased, false, MAX_RETRIES + 1, MAX_RETRIES),
        ResultStep::Park
    );
}

#[test]
fn test_expired_lease_requeues_until_the_cap() {
    for retries in 0..MAX_RETRIES {
        assert_eq!(expiry_step(retries, MAX_RETRIES), ExpiryStep::Requeue);
    }
    assert_eq!(expiry_step(MAX_RETRIES, MAX_RETRIES), ExpiryStep::Park);
    assert_eq!(expiry_step(MAX_RETRIES + 2, MAX_RETRIES), ExpiryStep::Park);
}

#[test]
fn test_missing_heartbeat_marks_available_worker_unavailable() {
    assert_eq!(
        presence_transition(WorkerState::Available, false),
        Some(WorkerState::Unavailable)
    );
}

#[test]
fn test_heartbeat_resurrects_unavailable_worker() {
    assert_eq!(
        presence_transition(WorkerState::Unavailable, true),
        Some(WorkerState::Available)
    );
}

#[test]
fn test_busy_workers_are_left_alone() {
    assert_eq!(presence_transition(WorkerState::Busy, false), None);
    assert_eq!(presence_transition(WorkerState::Busy, true), None);
}

#[test]
fn test_heartbeat_steady_states_produce_no_writes() {
    assert_eq!(presence_transition(WorkerState::Available, true), None);
    assert_eq!(presence_transition(WorkerState::Unavailable, false), None);
}

#[test]
fn test_terminal_statuses() {
    assert!(JobStatus::Completed.is_terminal());
    assert!(JobStatus::Failed.is_terminal());
    assert!(!JobStatus::Pending.is_terminal());
    assert!(!JobStatus::Leased.is_terminal());
}

#[test]
fn test_status_display_matches_stored_values() {
    assert_eq!(JobStatus::Pending.to_string(), "pending");
    assert_eq!(JobStatus::Leased.to_string(), "leased");
    assert_eq!(JobStatus::Completed.to_string(), "completed");
    assert_eq!(JobStatus::Failed.to_string(), "failed");

    assert_eq!(WorkerState::Available.to_string(), "available");
    assert_eq!(WorkerState::Busy.to_string(), "busy");
    assert_eq!(WorkerState::Unavailable.to_string(), "unavailable");
}
