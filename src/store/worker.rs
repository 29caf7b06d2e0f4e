use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::Result;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Available,
    Busy,
    Unavailable,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Available => write!(f, "available"),
            WorkerState::Busy => write!(f, "busy"),
            WorkerState::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// A `workers` row. `jobs_completed` counts results handled and doubles as
/// the least-loaded-first ordering key for dispatch.
#[derive(Debug, Clone, FromRow)]
pub struct Worker {
    pub url: String,
    pub state: WorkerState,
    pub jobs_completed: i32,
}

impl Store {
    /// Upsert a worker row: new workers start available with a zero job
    /// count, re-registrations only reset the state.
    pub async fn register_worker(&self, url: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workers (url, state, jobs_completed)
            VALUES ($1, 'available', 0)
            ON CONFLICT (url)
            DO UPDATE SET state = 'available'
            "#,
        )
        .bind(url)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn set_worker_state(&self, url: &str, state: WorkerState) -> Result<()> {
        let updated = sqlx::query("UPDATE workers SET state = $1 WHERE url = $2")
            .bind(state)
            .bind(url)
            .execute(self.pool())
            .await?;
        tracing::debug!(
            worker_url = %url,
            state = %state,
            rows = updated.rows_affected(),
            "Worker state updated"
        );
        Ok(())
    }

    /// Count another handled result against the worker.
    pub async fn bump_jobs_completed(&self, url: &str) -> Result<()> {
        sqlx::query("UPDATE workers SET jobs_completed = jobs_completed + 1 WHERE url = $1")
            .bind(url)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn list_workers(&self) -> Result<Vec<Worker>> {
        let rows = sqlx::query_as::<_, Worker>("SELECT url, state, jobs_completed FROM workers")
            .fetch_all(self.pool())
            .await?;
        Ok(rows)
    }

    /// Worker counts grouped by state, for the metrics sampler.
    pub async fn worker_counts_by_state(&self) -> Result<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM workers GROUP BY state")
                .fetch_all(self.pool())
                .await?;
        Ok(rows)
    }
}
