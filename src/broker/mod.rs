//! Redis-backed queue broker and heartbeat key reads.
//!
//! Three lists carry the coordinator's traffic:
//! - `job_queue`: submitted and requeued jobs, consumed by the dispatcher
//! - `job_results`: worker reports, consumed by the reconciler
//! - `dead_letter_queue`: terminally failed jobs, consumed by the DLQ task
//!
//! Producers push left, consumers pop right, so a requeued job runs before
//! newer work (best-effort, not a strict FIFO across concurrent pushers).
//!
//! Non-blocking commands share a [`redis::aio::ConnectionManager`]. Blocking
//! pops each get a dedicated connection via [`Broker::consumer`] so a BRPOP
//! cannot hold up unrelated traffic.

pub mod message;

use std::time::Duration;

use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::AsyncCommands;
use serde::Serialize;

use crate::error::Result;

pub use message::{DeadLetterMessage, DeadLetterReason, JobMessage, JobResultMessage};

pub const JOB_QUEUE: &str = "job_queue";
pub const JOB_RESULTS: &str = "job_results";
pub const DEAD_LETTER_QUEUE: &str = "dead_letter_queue";

/// Prefix of the per-worker heartbeat keys written by workers with a TTL.
pub const HEARTBEAT_KEY_PREFIX: &str = "worker:";

#[derive(Clone)]
pub struct Broker {
    client: redis::Client,
    conn: ConnectionManager,
}

impl Broker {
    /// Connect and verify the broker with a PING.
    pub async fn connect(addr: &str) -> Result<Self> {
        let client = redis::Client::open(addr)?;
        let mut conn = ConnectionManager::new(client.clone()).await?;
        redis::cmd("PING").query_async::<_, ()>(&mut conn).await?;
        Ok(Self { client, conn })
    }

    /// Push a job to the front of `job_queue`.
    pub async fn push_job(&self, job: &JobMessage) -> Result<()> {
        self.push(JOB_QUEUE, job).await
    }

    /// Push a parking record to the front of `dead_letter_queue`.
    pub async fn push_dead_letter(&self, msg: &DeadLetterMessage) -> Result<()> {
        self.push(DEAD_LETTER_QUEUE, msg).await
    }

    async fn push<T: Serialize>(&self, queue: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(queue, raw).await?;
        Ok(())
    }

    pub async fn queue_len(&self, queue: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        Ok(conn.llen(queue).await?)
    }

    /// Bulk-read heartbeat keys for the given worker urls in one MGET.
    /// The returned vector is positionally aligned with `urls`; `None`
    /// means the key has expired or was never written.
    pub async fn heartbeat_keys(&self, urls: &[String]) -> Result<Vec<Option<String>>> {
        let keys: Vec<String> = urls
            .iter()
            .map(|url| format!("{}{}", HEARTBEAT_KEY_PREFIX, url))
            .collect();
        let mut conn = self.conn.clone();
        let vals: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await?;
        Ok(vals)
    }

    /// Open a dedicated connection for blocking pops on `queue`.
    pub async fn consumer(&self, queue: &'static str) -> Result<QueueConsumer> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(QueueConsumer { conn, queue })
    }
}

/// A blocking right-pop consumer with its own connection.
pub struct QueueConsumer {
    conn: MultiplexedConnection,
    queue: &'static str,
}

impl QueueConsumer {
    /// BRPOP bounded by `timeout`; `Ok(None)` when nothing arrived in time.
    pub async fn pop(&mut self, timeout: Duration) -> Result<Option<String>> {
        let reply: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(self.queue)
            .arg(timeout.as_secs())
            .query_async(&mut self.conn)
            .await?;
        Ok(reply.map(|(_, raw)| raw))
    }
}
