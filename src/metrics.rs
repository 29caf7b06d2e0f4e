//! Prometheus metrics for the coordinator.
//!
//! The registry is owned by [`Metrics`] and threaded through the
//! [`Coordinator`](crate::coordinator::Coordinator) context rather than
//! living in a global. Counters and histograms are incremented inline by
//! the component that observes the event; gauges are projected periodically
//! by [`run_sampler`].

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};
use tokio_util::sync::CancellationToken;

use crate::broker::{DEAD_LETTER_QUEUE, JOB_QUEUE};
use crate::coordinator::Coordinator;
use crate::error::Result;

pub struct Metrics {
    registry: Registry,

    /// Jobs reaching a terminal observation, by `completed`/`failed`/`timeout`.
    pub jobs_total: IntCounterVec,
    /// Workers by state, projected from the `workers` table.
    pub workers: IntGaugeVec,
    pub jobs_in_queue: IntGauge,
    pub jobs_in_dlq: IntGauge,
    /// Submit-to-result latency per worker, when the result carries a
    /// `created_at` stamp.
    pub processing_duration: HistogramVec,
    /// Retry count observed at each retry decision, by reason.
    pub retry_attempts: HistogramVec,
    pub lease_timeouts: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let jobs_total = IntCounterVec::new(
            Opts::new("foreman_jobs_total", "Total jobs processed by status"),
            &["status"],
        )?;
        let workers = IntGaugeVec::new(
            Opts::new("foreman_workers", "Number of workers by state"),
            &["state"],
        )?;
        let jobs_in_queue = IntGauge::new("foreman_jobs_in_queue", "Jobs waiting in the queue")?;
        let jobs_in_dlq = IntGauge::new("foreman_jobs_in_dlq", "Jobs in the dead-letter queue")?;
        let processing_duration = HistogramVec::new(
            HistogramOpts::new(
                "foreman_job_processing_duration_seconds",
                "Time from submission to completed result",
            )
            .buckets(vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
            &["worker_url"],
        )?;
        let retry_attempts = HistogramVec::new(
            HistogramOpts::new("foreman_job_retry_attempts", "Retry attempts per job by reason")
                .buckets(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]),
            &["reason"],
        )?;
        let lease_timeouts =
            IntCounter::new("foreman_lease_timeouts_total", "Total job lease timeouts")?;

        registry.register(Box::new(jobs_total.clone()))?;
        registry.register(Box::new(workers.clone()))?;
        registry.register(Box::new(jobs_in_queue.clone()))?;
        registry.register(Box::new(jobs_in_dlq.clone()))?;
        registry.register(Box::new(processing_duration.clone()))?;
        registry.register(Box::new(retry_attempts.clone()))?;
        registry.register(Box::new(lease_timeouts.clone()))?;

        Ok(Self {
            registry,
            jobs_total,
            workers,
            jobs_in_queue,
            jobs_in_dlq,
            processing_duration,
            retry_attempts,
            lease_timeouts,
        })
    }

    /// Render the text exposition format.
    pub fn render(&self) -> Result<String> {
        use prometheus::Encoder;

        let mut buf = Vec::new();
        prometheus::TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Periodically project database and queue state onto the gauges.
///
/// Worker gauges are reset before being set from the `GROUP BY state`
/// counts, so states with zero workers read 0 instead of going stale.
pub async fn run_sampler(ctx: Coordinator, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(ctx.config.metrics_interval);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Metrics sampler stopping");
                return;
            }
            _ = interval.tick() => {}
        }

        match ctx.store.worker_counts_by_state().await {
            Ok(counts) => {
                for state in ["available", "busy", "unavailable"] {
                    ctx.metrics.workers.with_label_values(&[state]).set(0);
                }
                for (state, count) in counts {
                    ctx.metrics
                        .workers
                        .with_label_values(&[state.as_str()])
                        .set(count);
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to sample worker states"),
        }

        match ctx.broker.queue_len(JOB_QUEUE).await {
            Ok(len) => ctx.metrics.jobs_in_queue.set(len),
            Err(e) => tracing::warn!(error = %e, "Failed to sample job queue length"),
        }

        match ctx.broker.queue_len(DEAD_LETTER_QUEUE).await {
            Ok(len) => ctx.metrics.jobs_in_dlq.set(len),
            Err(e) => tracing::warn!(error = %e, "Failed to sample dead-letter queue length"),
        }
    }
}
