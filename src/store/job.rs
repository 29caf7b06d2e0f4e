use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::Result;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Leased,
    Completed,
    Failed,
}

impl JobStatus {
    /// Completed and failed rows never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Leased => write!(f, "leased"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A `jobs` row.
#[derive(Debug, Clone, FromRow)]
pub struct Job {
    pub id: i32,
    pub name: String,
    pub payload: String,
    pub status: JobStatus,
    pub retries: i32,
    pub lease_start: Option<NaiveDateTime>,
    pub lease_timeout: Option<i32>,
    pub leased_to_worker: Option<String>,
    pub completed_at: Option<NaiveDateTime>,
    pub result: Option<String>,
}

/// A leased job whose lease has run out, as returned by the monitor sweep.
#[derive(Debug, Clone, FromRow)]
pub struct ExpiredLease {
    pub id: i32,
    pub name: String,
    pub payload: String,
    pub retries: i32,
}

impl Store {
    /// Insert a new pending job and return its id.
    pub async fn insert_job(&self, name: &str, payload: &str) -> Result<i32> {
        let id: i32 = sqlx::query_scalar("INSERT INTO jobs (name, payload) VALUES ($1, $2) RETURNING id")
            .bind(name)
            .bind(payload)
            .fetch_one(self.pool())
            .await?;
        Ok(id)
    }

    /// Pick the least-loaded available worker and lease `job_id` to it, all
    /// in one transaction.
    ///
    /// The `FOR UPDATE` lock on the candidate worker row is the
    /// serialization point for worker selection: a concurrent dispatcher
    /// blocks on the same row and, once this transaction commits, no longer
    /// sees it as available. Coupling the worker reservation and the job
    /// lease in one transaction means a crash between them cannot leave the
    /// two tables disagreeing.
    ///
    /// Returns the chosen worker url, or `None` when no worker is available.
    pub async fn select_worker_and_lease(
        &self,
        job_id: i32,
        lease_timeout_secs: i32,
    ) -> Result<Option<String>> {
        let mut tx = self.pool().begin().await?;

        let url: Option<String> = sqlx::query_scalar(
            r#"
            SELECT url FROM workers
            WHERE state = 'available'
            ORDER BY jobs_completed ASC, url ASC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(url) = url else {
            // Dropping the transaction rolls it back.
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'leased', lease_start = NOW(), lease_timeout = $1, leased_to_worker = $2
            WHERE id = $3
            "#,
        )
        .bind(lease_timeout_secs)
        .bind(&url)
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE workers SET state = 'busy' WHERE url = $1")
            .bind(&url)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(url))
    }

    /// Current `(status, retries)` of a job, or `None` if the row is gone.
    pub async fn job_progress(&self, job_id: i32) -> Result<Option<(JobStatus, i32)>> {
        let row: Option<(JobStatus, i32)> =
            sqlx::query_as("SELECT status, retries FROM jobs WHERE id = $1")
                .bind(job_id)
                .fetch_optional(self.pool())
                .await?;
        Ok(row)
    }

    /// Terminal success: store the result and stamp `completed_at`.
    pub async fn complete_job(&self, job_id: i32, result: &str) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'completed', completed_at = NOW(), result = $1 WHERE id = $2",
        )
        .bind(result)
        .bind(job_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Terminal failure: the job keeps its last lease fields for forensics.
    pub async fn fail_job(&self, job_id: i32) -> Result<()> {
        sqlx::query("UPDATE jobs SET status = 'failed', completed_at = NOW() WHERE id = $1")
            .bind(job_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Reset a job to pending for another attempt: lease fields cleared,
    /// retry count bumped.
    pub async fn reset_job_for_retry(&self, job_id: i32) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending', lease_start = NULL, lease_timeout = NULL, retries = retries + 1
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn fetch_job(&self, job_id: i32) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, Job>(
            r#"
            SELECT id, name, payload, status, retries, lease_start, lease_timeout,
                   leased_to_worker, completed_at, result
            FROM jobs WHERE id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    /// Leased jobs whose lease has expired. `lease_timeout` is stored as
    /// integer seconds and widened to an interval at query time.
    pub async fn expired_leases(&self) -> Result<Vec<ExpiredLease>> {
        let rows = sqlx::query_as::<_, ExpiredLease>(
            r#"
            SELECT id, name, payload, retries FROM jobs
            WHERE status = 'leased'
            AND lease_start + lease_timeout * interval '1 second' < NOW()
            "#,
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}
