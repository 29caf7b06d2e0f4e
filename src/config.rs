use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{ForemanError, Result};

/// Runtime configuration for the coordinator.
///
/// `DATABASE_URL` and `REDIS_ADDR` come from the environment and are
/// required; everything else has a default matching the deployed tuning.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub database_url: String,
    pub broker_addr: String,
    pub listen_addr: SocketAddr,

    /// Requeue attempts before a job is parked in the dead-letter queue.
    pub max_retries: i32,
    /// Seconds a leased job may run before the lease monitor reclaims it.
    pub lease_timeout_secs: i32,
    pub worker_http_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub lease_monitor_interval: Duration,
    pub metrics_interval: Duration,
    /// Pause before re-pushing a job when no worker is available.
    pub no_worker_backoff: Duration,
    /// Upper bound on the exponential retry delay.
    pub backoff_cap: Duration,
    /// Bound on the dead-letter consumer's blocking pop.
    pub dlq_pop_timeout: Duration,
    pub db_connect_attempts: u32,
    pub db_connect_retry_delay: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            broker_addr: String::new(),
            listen_addr: "0.0.0.0:9000".parse().unwrap(),
            max_retries: 3,
            lease_timeout_secs: 20,
            worker_http_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(10),
            lease_monitor_interval: Duration::from_secs(10),
            metrics_interval: Duration::from_secs(10),
            no_worker_backoff: Duration::from_secs(5),
            backoff_cap: Duration::from_secs(60),
            dlq_pop_timeout: Duration::from_secs(60),
            db_connect_attempts: 10,
            db_connect_retry_delay: Duration::from_secs(3),
        }
    }
}

impl CoordinatorConfig {
    /// Build a config from the environment, binding the HTTP surface to `port`.
    pub fn from_env(port: u16) -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ForemanError::Config("DATABASE_URL is not set".to_string()))?;
        let broker_addr = std::env::var("REDIS_ADDR")
            .map_err(|_| ForemanError::Config("REDIS_ADDR is not set".to_string()))?;

        let listen_addr: SocketAddr = format!("0.0.0.0:{}", port)
            .parse()
            .map_err(|e| ForemanError::Config(format!("Invalid listen port: {}", e)))?;

        Ok(Self {
            database_url,
            broker_addr,
            listen_addr,
            ..Default::default()
        })
    }
}
