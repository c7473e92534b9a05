//! Postgres storage: pool construction, schema, target rows and probe rows.
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tracing::info;

use crate::config::Settings;

pub mod metrics;
pub mod schema;
pub mod targets;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

fn pool_options(settings: &Settings) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(settings.max_pool_size)
        .acquire_timeout(settings.pool_timeout)
}

/// Opens the shared pool every checker loop writes through.
pub async fn connect_pool(settings: &Settings) -> Result<PgPool, DbError> {
    let pool = pool_options(settings)
        .connect(&settings.database_url)
        .await?;
    info!(
        max_connections = settings.max_pool_size,
        acquire_timeout_secs = settings.pool_timeout.as_secs_f64(),
        "Database pool opened."
    );
    Ok(pool)
}
