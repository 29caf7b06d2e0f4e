use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::backoff;
use crate::broker::{JobResultMessage, JOB_RESULTS};
use crate::coordinator::Coordinator;
use crate::reconcile::dlq;
use crate::store::{JobStatus, WorkerState};

const POP_TIMEOUT: Duration = Duration::from_secs(5);
const POP_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// What to do with a worker's report, given the job's current row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStep {
    /// The row is already terminal; a duplicate or late report is a no-op
    /// and the worker bookkeeping is skipped too.
    Ignore,
    /// Mark the job completed and store its result.
    Complete,
    /// Schedule a delayed requeue for another attempt.
    Retry,
    /// Retries exhausted: park in the dead-letter queue and mark failed.
    Park,
}

/// Pure decision for one result report. Retries are compared against the
/// cap at decision time, so a job that failed with `retries == max` parks
/// rather than requeueing a fourth time.
pub fn result_step(
    current: JobStatus,
    reported_completed: bool,
    retries: i32,
    max_retries: i32,
) -> ResultStep {
    if current.is_terminal() {
        return ResultStep::Ignore;
    }
    if reported_completed {
        return ResultStep::Complete;
    }
    if retries >= max_retries {
        ResultStep::Park
    } else {
        ResultStep::Retry
    }
}

/// The result reconciliation loop.
///
/// Pops `job_results` and applies [`result_step`] to each report. Whatever
/// the outcome (except an ignored duplicate), the reporting worker is
/// released: its `jobs_completed` is bumped and it goes back to available,
/// so a worker that returned an error is reusable immediately.
pub async fn run_reconciler(ctx: Coordinator, shutdown: CancellationToken) {
    let mut consumer = loop {
        match ctx.broker.consumer(JOB_RESULTS).await {
            Ok(c) => break c,
            Err(e) => {
                tracing::error!(error = %e, "Reconciler failed to open queue consumer");
                tokio::time::sleep(POP_ERROR_BACKOFF).await;
            }
        }
    };

    loop {
        let raw = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Result reconciler stopping");
                return;
            }
            popped = consumer.pop(POP_TIMEOUT) => match popped {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to pop job results");
                    tokio::time::sleep(POP_ERROR_BACKOFF).await;
                    continue;
                }
            }
        };

        let report: JobResultMessage = match serde_json::from_str(&raw) {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, raw = %raw, "Discarding malformed result message");
                continue;
            }
        };

        if let Err(e) = reconcile_one(&ctx, &report).await {
            tracing::error!(job_id = %report.job_id, error = %e, "Failed to reconcile result");
        }
    }
}

async fn reconcile_one(ctx: &Coordinator, report: &JobResultMessage) -> crate::error::Result<()> {
    let job_id: i32 = match report.job_id.parse() {
        Ok(id) => id,
        Err(_) => {
            tracing::warn!(job_id = %report.job_id, "Discarding result with non-numeric job id");
            return Ok(());
        }
    };

    let Some((status, retries)) = ctx.store.job_progress(job_id).await? else {
        tracing::warn!(job_id, "Result for unknown job");
        return Ok(());
    };

    match result_step(status, report.is_completed(), retries, ctx.config.max_retries) {
        ResultStep::Ignore => {
            tracing::info!(
                job_id,
                worker_url = %report.worker_url,
                "Job already terminal, ignoring result"
            );
            return Ok(());
        }
        ResultStep::Complete => {
            ctx.metrics.jobs_total.with_label_values(&["completed"]).inc();
            if let Some(elapsed) = report.elapsed_since_created() {
                ctx.metrics
                    .processing_duration
                    .with_label_values(&[report.worker_url.as_str()])
                    .observe(elapsed);
            }

            let result = report.result.as_deref().unwrap_or_default();
            ctx.store.complete_job(job_id, result).await?;
            tracing::info!(job_id, worker_url = %report.worker_url, "Job completed");
        }
        ResultStep::Park => {
            ctx.metrics.jobs_total.with_label_values(&["failed"]).inc();
            ctx.metrics
                .retry_attempts
                .with_label_values(&["max_retries_exceeded"])
                .observe(retries as f64);

            dlq::park_result(ctx, report).await;
            ctx.store.fail_job(job_id).await?;
            tracing::info!(job_id, retries, "Job exceeded max retries, sent to dead-letter queue");
        }
        ResultStep::Retry => {
            ctx.metrics
                .retry_attempts
                .with_label_values(&["worker_failure"])
                .observe(retries as f64);

            let delay = backoff::retry_delay(retries, ctx.config.backoff_cap);
            tracing::info!(
                job_id,
                delay_ms = delay.as_millis() as u64,
                attempt = retries + 1,
                max = ctx.config.max_retries,
                "Job failed, scheduling retry"
            );

            let ctx = ctx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                requeue(&ctx, job_id).await;
            });
        }
    }

    // Release the worker for reuse regardless of the job's outcome.
    ctx.store.bump_jobs_completed(&report.worker_url).await?;
    ctx.store
        .set_worker_state(&report.worker_url, WorkerState::Available)
        .await?;

    Ok(())
}

/// Reset a job to pending and push it back onto the front of `job_queue`.
pub async fn requeue(ctx: &Coordinator, job_id: i32) {
    let job = match ctx.store.fetch_job(job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            tracing::warn!(job_id, "Job vanished before requeue");
            return;
        }
        Err(e) => {
            tracing::error!(job_id, error = %e, "Failed to fetch job for requeue");
            return;
        }
    };

    if let Err(e) = ctx.store.reset_job_for_retry(job_id).await {
        tracing::error!(job_id, error = %e, "Failed to reset job for retry");
        return;
    }

    let msg = crate::broker::JobMessage {
        id: job.id.to_string(),
        name: job.name,
        payload: job.payload,
    };
    match ctx.broker.push_job(&msg).await {
        Ok(()) => tracing::info!(job_id, "Requeued failed job"),
        Err(e) => tracing::error!(job_id, error = %e, "Failed to push requeued job"),
    }
}
