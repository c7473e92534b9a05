//! The metrics sink: durable append of probe results through a bounded pool.
//!
//! Fetching is unbounded-concurrent, persistence is not: every loop shares
//! one [`PgPool`] of `max_pool_size` connections, and a loop that finds the
//! pool saturated waits up to the pool's acquire timeout. That timeout (or a
//! shutdown arriving while waiting) fails only the one `append` call.
use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use super::probe::ProbeResult;
use super::shutdown::Shutdown;
use crate::db::metrics::insert_probe_result;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Timed out waiting for a storage connection")]
    PoolTimeout,
    #[error("Shutdown requested while waiting for a storage connection")]
    Cancelled,
    #[error("Storage error: {0}")]
    Storage(sqlx::Error),
}

impl From<sqlx::Error> for SinkError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut => SinkError::PoolTimeout,
            other => SinkError::Storage(other),
        }
    }
}

/// Durable append of probe results, callable concurrently from every loop.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Persists `result`. Only the wait for capacity observes `shutdown`;
    /// a write that has started is carried through.
    async fn append(&self, result: &ProbeResult, shutdown: &Shutdown) -> Result<(), SinkError>;
}

/// Sink writing to the `website_metrics` table.
#[derive(Debug, Clone)]
pub struct PgMetricsSink {
    pool: PgPool,
}

impl PgMetricsSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetricsSink for PgMetricsSink {
    async fn append(&self, result: &ProbeResult, shutdown: &Shutdown) -> Result<(), SinkError> {
        let mut conn = tokio::select! {
            biased;
            // A free connection wins over a pending shutdown.
            acquired = self.pool.acquire() => acquired?,
            _ = shutdown.cancelled() => return Err(SinkError::Cancelled),
        };
        insert_probe_result(&mut *conn, result).await?;
        Ok(())
    }
}
