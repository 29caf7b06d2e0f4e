use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::broker::{
    DeadLetterMessage, DeadLetterReason, JobResultMessage, DEAD_LETTER_QUEUE,
};
use crate::coordinator::Coordinator;

const POP_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Park a job based on a worker's final failed report. The full report is
/// carried as the parking context.
pub async fn park_result(ctx: &Coordinator, report: &JobResultMessage) {
    let original = serde_json::to_value(report).unwrap_or_default();
    park(ctx, report.job_id.clone(), original, DeadLetterReason::MaxRetriesExceeded).await;
}

/// Park a job with an arbitrary context object.
pub async fn park(
    ctx: &Coordinator,
    job_id: String,
    original_job: serde_json::Value,
    reason: DeadLetterReason,
) {
    let msg = DeadLetterMessage::new(job_id, original_job, reason);
    match ctx.broker.push_dead_letter(&msg).await {
        Ok(()) => {
            tracing::info!(job_id = %msg.job_id, reason = ?msg.reason, "Job sent to dead-letter queue")
        }
        Err(e) => {
            tracing::error!(job_id = %msg.job_id, error = %e, "Failed to send job to dead-letter queue")
        }
    }
}

/// Drain the dead-letter queue.
///
/// Pops with a bounded block and logs each parked job. This is the
/// escalation point: anything that should page, notify, or re-ingest dead
/// jobs hangs off this loop.
pub async fn run_dlq_consumer(ctx: Coordinator, shutdown: CancellationToken) {
    let mut consumer = loop {
        match ctx.broker.consumer(DEAD_LETTER_QUEUE).await {
            Ok(c) => break c,
            Err(e) => {
                tracing::error!(error = %e, "DLQ consumer failed to open queue consumer");
                tokio::time::sleep(POP_ERROR_BACKOFF).await;
            }
        }
    };

    loop {
        let raw = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Dead-letter consumer stopping");
                return;
            }
            popped = consumer.pop(ctx.config.dlq_pop_timeout) => match popped {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to pop dead-letter queue");
                    tokio::time::sleep(POP_ERROR_BACKOFF).await;
                    continue;
                }
            }
        };

        match serde_json::from_str::<DeadLetterMessage>(&raw) {
            Ok(msg) => tracing::warn!(
                job_id = %msg.job_id,
                reason = ?msg.reason,
                failed_at = %msg.failed_at,
                "Dead-letter job"
            ),
            Err(e) => tracing::warn!(error = %e, raw = %raw, "Malformed dead-letter message"),
        }
    }
}
