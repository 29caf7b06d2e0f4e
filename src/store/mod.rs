//! PostgreSQL persistence for the `jobs` and `workers` tables.
//!
//! All coordinator state transitions are row updates here; concurrent
//! writers are serialized by the database. The dispatcher's worker
//! selection runs inside a single transaction with a `FOR UPDATE` row lock
//! (see [`Store::select_worker_and_lease`]), which is also what would keep
//! multiple coordinator instances from picking the same worker.

pub mod job;
pub mod worker;

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::{ForemanError, Result};

pub use job::{ExpiredLease, Job, JobStatus};
pub use worker::{Worker, WorkerState};

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Connect to the database, retrying `attempts` times at `retry_delay`
    /// intervals so the coordinator can come up before the database does.
    pub async fn connect(url: &str, attempts: u32, retry_delay: Duration) -> Result<Self> {
        for attempt in 1..=attempts {
            match PgPoolOptions::new().max_connections(10).connect(url).await {
                Ok(pool) => return Ok(Self { pool }),
                Err(e) => {
                    tracing::info!(attempt, error = %e, "Waiting for database to be ready");
                    if attempt < attempts {
                        tokio::time::sleep(retry_delay).await;
                    }
                }
            }
        }

        Err(ForemanError::Config(format!(
            "Database not reachable after {} attempts",
            attempts
        )))
    }

    /// Create the `jobs` and `workers` tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id serial PRIMARY KEY,
                name text NOT NULL,
                payload text NOT NULL,
                status text NOT NULL DEFAULT 'pending',
                retries int NOT NULL DEFAULT 0,
                lease_start timestamp,
                lease_timeout int,
                leased_to_worker text,
                completed_at timestamp,
                result text
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workers (
                url text PRIMARY KEY,
                state text NOT NULL,
                jobs_completed int NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}
