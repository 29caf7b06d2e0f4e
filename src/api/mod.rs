//! Coordinator HTTP surface: worker registration, job submission and
//! Prometheus metrics exposition.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::broker::JobMessage;
use crate::coordinator::Coordinator;
use crate::error::Result;

#[derive(Debug, Deserialize)]
struct RegisterWorkerRequest {
    worker_url: String,
}

#[derive(Debug, Deserialize)]
struct SubmitJobRequest {
    name: String,
    payload: String,
}

pub fn router(ctx: Coordinator) -> Router {
    Router::new()
        .route("/register_worker", post(register_worker_handler))
        .route("/submit_job", post(submit_job_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Serve the HTTP surface until shutdown.
pub async fn serve(ctx: Coordinator, shutdown: CancellationToken) -> Result<()> {
    let addr = ctx.config.listen_addr;
    let app = router(ctx);

    tracing::info!(addr = %addr, "Coordinator HTTP server running");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

/// `POST /register_worker`: upsert the worker row. A brand-new worker
/// starts available with zero completed jobs; a re-registration only flips
/// the state back to available.
///
/// Any body that does not decode into the expected shape, whether invalid
/// JSON or missing fields, is a 400.
async fn register_worker_handler(
    State(ctx): State<Coordinator>,
    body: std::result::Result<Json<RegisterWorkerRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Ok(Json(req)) = body else {
        return (StatusCode::BAD_REQUEST, "Invalid request payload");
    };

    match ctx.store.register_worker(&req.worker_url).await {
        Ok(()) => {
            tracing::info!(worker_url = %req.worker_url, "Registered worker");
            (StatusCode::OK, "Worker registered successfully")
        }
        Err(e) => {
            tracing::error!(worker_url = %req.worker_url, error = %e, "Failed to register worker");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to register worker")
        }
    }
}

/// `POST /submit_job`: insert a pending job row, then mirror it onto
/// `job_queue`. A queue-push failure after the insert is logged, not
/// surfaced; the row is in the database and can be requeued by hand.
async fn submit_job_handler(
    State(ctx): State<Coordinator>,
    body: std::result::Result<Json<SubmitJobRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Ok(Json(req)) = body else {
        return (StatusCode::BAD_REQUEST, "Invalid request payload");
    };

    let job_id = match ctx.store.insert_job(&req.name, &req.payload).await {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(name = %req.name, error = %e, "Failed to create job");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create job");
        }
    };

    tracing::info!(job_id, name = %req.name, "Created job");

    let msg = JobMessage {
        id: job_id.to_string(),
        name: req.name,
        payload: req.payload,
    };
    if let Err(e) = ctx.broker.push_job(&msg).await {
        tracing::error!(job_id, error = %e, "Failed to push job onto queue");
    }

    (StatusCode::CREATED, "Job created successfully")
}

/// `GET /metrics`: Prometheus text exposition.
async fn metrics_handler(State(ctx): State<Coordinator>) -> impl IntoResponse {
    match ctx.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to render metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
                String::new(),
            )
        }
    }
}
