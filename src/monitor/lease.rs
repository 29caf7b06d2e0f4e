use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::backoff;
use crate::broker::{DeadLetterReason, JobMessage};
use crate::coordinator::Coordinator;
use crate::reconcile::dlq;
use crate::store::ExpiredLease;

/// What to do with an expired lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryStep {
    /// Another attempt: reset to pending, requeue after backoff.
    Requeue,
    /// Retries exhausted: park and mark failed.
    Park,
}

pub fn expiry_step(retries: i32, max_retries: i32) -> ExpiryStep {
    if retries >= max_retries {
        ExpiryStep::Park
    } else {
        ExpiryStep::Requeue
    }
}

/// The lease monitor loop.
///
/// Every interval, sweeps for jobs whose lease has run out. A lost result
/// and a genuinely stuck worker look identical from here; both are retried
/// until the cap, then parked with reason `timeout`.
pub async fn run_lease_monitor(ctx: Coordinator, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(ctx.config.lease_monitor_interval);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Lease monitor stopping");
                return;
            }
            _ = interval.tick() => {}
        }

        let expired = match ctx.store.expired_leases().await {
            Ok(expired) => expired,
            Err(e) => {
                tracing::error!(error = %e, "Failed to query expired leases");
                continue;
            }
        };

        for job in expired {
            ctx.metrics.lease_timeouts.inc();
            handle_expired(&ctx, job).await;
        }
    }
}

async fn handle_expired(ctx: &Coordinator, job: ExpiredLease) {
    ctx.metrics
        .retry_attempts
        .with_label_values(&["lease_timeout"])
        .observe(job.retries as f64);

    match expiry_step(job.retries, ctx.config.max_retries) {
        ExpiryStep::Park => {
            ctx.metrics.jobs_total.with_label_values(&["timeout"]).inc();

            let context = json!({
                "job_id": job.id.to_string(),
                "name": job.name,
                "payload": job.payload,
                "status": "timeout",
                "error": "Job lease expired - max retries exceeded",
                "worker_url": "",
            });
            dlq::park(ctx, job.id.to_string(), context, DeadLetterReason::Timeout).await;

            if let Err(e) = ctx.store.fail_job(job.id).await {
                tracing::error!(job_id = job.id, error = %e, "Failed to mark expired job as failed");
            } else {
                tracing::info!(
                    job_id = job.id,
                    retries = job.retries,
                    "Expired job sent to dead-letter queue"
                );
            }
        }
        ExpiryStep::Requeue => {
            let delay = backoff::retry_delay(job.retries, ctx.config.backoff_cap);
            tracing::info!(
                job_id = job.id,
                delay_ms = delay.as_millis() as u64,
                attempt = job.retries + 1,
                max = ctx.config.max_retries,
                "Job lease expired, scheduling retry"
            );

            if let Err(e) = ctx.store.reset_job_for_retry(job.id).await {
                // The row stays leased and expired, so the next sweep
                // picks it up again.
                tracing::error!(job_id = job.id, error = %e, "Failed to reset expired job");
                return;
            }

            let msg = JobMessage {
                id: job.id.to_string(),
                name: job.name,
                payload: job.payload,
            };
            let ctx = ctx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                match ctx.broker.push_job(&msg).await {
                    Ok(()) => tracing::info!(job_id = %msg.id, "Requeued expired job after backoff"),
                    Err(e) => tracing::error!(job_id = %msg.id, error = %e, "Failed to requeue expired job"),
                }
            });
        }
    }
}
