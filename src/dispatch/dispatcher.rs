use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::broker::{JobMessage, JOB_QUEUE};
use crate::coordinator::Coordinator;
use crate::dispatch::delivery;

/// Bound on each blocking pop so the loop notices shutdown.
const POP_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause before retrying after a broker error.
const POP_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// The dispatch loop.
///
/// For every message popped from `job_queue`:
/// - a message that does not parse is logged and dropped;
/// - when no worker is available (or selection fails transiently), the
///   message is pushed back to the front of the queue after a pause, so it
///   is retried before newer work;
/// - otherwise a delivery task is spawned and the loop resumes immediately.
pub async fn run_dispatcher(ctx: Coordinator, shutdown: CancellationToken) {
    let mut consumer = loop {
        match ctx.broker.consumer(JOB_QUEUE).await {
            Ok(c) => break c,
            Err(e) => {
                tracing::error!(error = %e, "Dispatcher failed to open queue consumer");
                tokio::time::sleep(POP_ERROR_BACKOFF).await;
            }
        }
    };

    loop {
        let raw = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Dispatcher stopping");
                return;
            }
            popped = consumer.pop(POP_TIMEOUT) => match popped {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to pop job queue");
                    tokio::time::sleep(POP_ERROR_BACKOFF).await;
                    continue;
                }
            }
        };

        let job: JobMessage = match serde_json::from_str(&raw) {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!(error = %e, raw = %raw, "Discarding malformed job message");
                continue;
            }
        };

        let job_id: i32 = match job.id.parse() {
            Ok(id) => id,
            Err(_) => {
                tracing::warn!(job_id = %job.id, "Discarding job message with non-numeric id");
                continue;
            }
        };

        tracing::info!(job_id, name = %job.name, "Received job");

        match ctx
            .store
            .select_worker_and_lease(job_id, ctx.config.lease_timeout_secs)
            .await
        {
            Ok(Some(worker_url)) => {
                tracing::info!(job_id, worker_url = %worker_url, "Leased job");
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    delivery::deliver(&ctx, &worker_url, job).await;
                });
            }
            Ok(None) => {
                tracing::info!(job_id, "No available worker, requeueing job after delay");
                requeue_front(&ctx, &job).await;
            }
            Err(e) => {
                tracing::error!(job_id, error = %e, "Lease transaction failed, requeueing job");
                requeue_front(&ctx, &job).await;
            }
        }
    }
}

/// Sleep out the no-worker backoff, then push the message back to the front
/// of the queue. Best-effort ordering: the job runs before newer work, but
/// concurrent pushers can interleave.
async fn requeue_front(ctx: &Coordinator, job: &JobMessage) {
    tokio::time::sleep(ctx.config.no_worker_backoff).await;
    if let Err(e) = ctx.broker.push_job(job).await {
        tracing::error!(job_id = %job.id, error = %e, "Failed to push job back onto queue");
    }
}
