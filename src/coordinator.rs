use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api;
use crate::broker::Broker;
use crate::config::CoordinatorConfig;
use crate::dispatch;
use crate::error::Result;
use crate::metrics::{self, Metrics};
use crate::monitor;
use crate::reconcile;
use crate::store::Store;

/// Process-wide context: the database pool, broker client, worker HTTP
/// client and metrics registry, shared by every coordinator task.
#[derive(Clone)]
pub struct Coordinator {
    pub config: CoordinatorConfig,
    pub store: Store,
    pub broker: Broker,
    pub http: reqwest::Client,
    pub metrics: Arc<Metrics>,
}

impl Coordinator {
    /// Connect all external collaborators and bootstrap the schema.
    ///
    /// The database connect is retried (the coordinator routinely starts
    /// before the database is accepting connections); a broker that does
    /// not answer a PING is fatal.
    pub async fn connect(config: CoordinatorConfig) -> Result<Self> {
        let store = Store::connect(
            &config.database_url,
            config.db_connect_attempts,
            config.db_connect_retry_delay,
        )
        .await?;
        store.ensure_schema().await?;

        let broker = Broker::connect(&config.broker_addr).await?;

        let http = reqwest::Client::builder()
            .timeout(config.worker_http_timeout)
            .build()?;

        let metrics = Arc::new(Metrics::new()?);

        Ok(Self {
            config,
            store,
            broker,
            http,
            metrics,
        })
    }

    /// Run the coordinator until shutdown.
    ///
    /// Spawns the six long-lived tasks:
    /// 1. Dispatcher: pops `job_queue`, leases, fires delivery tasks
    /// 2. Result reconciler: pops `job_results`, advances terminal/retry state
    /// 3. Lease monitor: reclaims jobs whose lease expired
    /// 4. Heartbeat verifier: projects heartbeat keys onto worker states
    /// 5. Dead-letter consumer: drains the DLQ
    /// 6. Metrics sampler: projects counts onto gauges
    ///
    /// then blocks on the HTTP server (registration, submission, metrics
    /// exposition). Each task contains its own errors; only startup and the
    /// HTTP listener can fail this function.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        tokio::spawn(dispatch::run_dispatcher(self.clone(), shutdown.clone()));
        tokio::spawn(reconcile::run_reconciler(self.clone(), shutdown.clone()));
        tokio::spawn(monitor::run_lease_monitor(self.clone(), shutdown.clone()));
        tokio::spawn(monitor::run_heartbeat_verifier(
            self.clone(),
            shutdown.clone(),
        ));
        tokio::spawn(reconcile::run_dlq_consumer(self.clone(), shutdown.clone()));
        tokio::spawn(metrics::run_sampler(self.clone(), shutdown.clone()));

        api::serve(self, shutdown).await
    }
}
