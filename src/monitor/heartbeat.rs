use tokio_util::sync::CancellationToken;

use crate::coordinator::Coordinator;
use crate::store::WorkerState;

/// State change implied by a worker's heartbeat key, if any.
///
/// Absence of the key flips an available worker to unavailable; presence
/// resurrects an unavailable one. Busy workers are never touched here: a
/// worker heads-down on a job may skip heartbeats, and its lease already
/// bounds how long it can hold the job.
pub fn presence_transition(state: WorkerState, heartbeat_present: bool) -> Option<WorkerState> {
    match (heartbeat_present, state) {
        (false, WorkerState::Available) => Some(WorkerState::Unavailable),
        (true, WorkerState::Unavailable) => Some(WorkerState::Available),
        _ => None,
    }
}

/// The heartbeat verification loop.
///
/// Every interval: read all worker rows, bulk-read their `worker:<url>`
/// keys in one MGET, and apply [`presence_transition`] per worker. A broker
/// error skips the rest of the iteration; the next tick starts fresh.
pub async fn run_heartbeat_verifier(ctx: Coordinator, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(ctx.config.heartbeat_interval);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Heartbeat verifier stopping");
                return;
            }
            _ = interval.tick() => {}
        }

        let workers = match ctx.store.list_workers().await {
            Ok(workers) => workers,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list workers");
                continue;
            }
        };

        if workers.is_empty() {
            tracing::debug!("No workers registered");
            continue;
        }

        let urls: Vec<String> = workers.iter().map(|w| w.url.clone()).collect();
        let keys = match ctx.broker.heartbeat_keys(&urls).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read heartbeat keys");
                continue;
            }
        };

        for (worker, key) in workers.iter().zip(keys) {
            let Some(next) = presence_transition(worker.state, key.is_some()) else {
                continue;
            };

            match next {
                WorkerState::Unavailable => {
                    tracing::info!(worker_url = %worker.url, "Worker heartbeat missing, marking unavailable")
                }
                _ => {
                    tracing::info!(worker_url = %worker.url, "Heartbeat of unavailable worker found, marking available")
                }
            }

            if let Err(e) = ctx.store.set_worker_state(&worker.url, next).await {
                tracing::error!(worker_url = %worker.url, error = %e, "Failed to update worker state");
            }
        }
    }
}
