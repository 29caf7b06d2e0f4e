use std::time::Duration;

use serde::Serialize;

use crate::broker::JobMessage;
use crate::coordinator::Coordinator;
use crate::store::WorkerState;

/// Pause before re-pushing a job a worker rejected with a non-200.
const REJECT_BACKOFF: Duration = Duration::from_secs(5);

/// Request body for `POST <worker_url>/run_job`.
#[derive(Debug, Serialize)]
struct RunJobRequest<'a> {
    job_id: &'a str,
    name: &'a str,
    payload: &'a str,
}

/// Deliver one leased job to its worker. Runs as an independent task per
/// dispatched job.
///
/// A 200 means the worker accepted the job; the outcome arrives later on
/// `job_results`. On a transport error the worker is marked unavailable and
/// the job is pushed back for someone else; the lease stays on the row and
/// the lease monitor reclaims it. On a non-200 the job is pushed back after
/// a pause while the worker stays busy until it reports or its lease
/// expires.
pub async fn deliver(ctx: &Coordinator, worker_url: &str, job: JobMessage) {
    let body = RunJobRequest {
        job_id: &job.id,
        name: &job.name,
        payload: &job.payload,
    };

    let response = ctx
        .http
        .post(format!("{}/run_job", worker_url))
        .json(&body)
        .send()
        .await;

    match response {
        Err(e) => {
            tracing::error!(job_id = %job.id, worker_url = %worker_url, error = %e, "Failed to send job to worker");
            if let Err(e) = ctx
                .store
                .set_worker_state(worker_url, WorkerState::Unavailable)
                .await
            {
                tracing::error!(worker_url = %worker_url, error = %e, "Failed to mark worker unavailable");
            }
            if let Err(e) = ctx.broker.push_job(&job).await {
                tracing::error!(job_id = %job.id, error = %e, "Failed to requeue undelivered job");
            }
        }
        // Exactly 200 means accepted; any other status, 2xx included, is a
        // soft failure.
        Ok(resp) if resp.status() == reqwest::StatusCode::OK => {
            tracing::info!(job_id = %job.id, worker_url = %worker_url, "Job accepted by worker");
        }
        Ok(resp) => {
            tracing::warn!(
                job_id = %job.id,
                worker_url = %worker_url,
                status = %resp.status(),
                "Worker rejected job, requeueing"
            );
            tokio::time::sleep(REJECT_BACKOFF).await;
            if let Err(e) = ctx.broker.push_job(&job).await {
                tracing::error!(job_id = %job.id, error = %e, "Failed to requeue rejected job");
            }
        }
    }
}
