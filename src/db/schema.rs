use sqlx::PgPool;
use tracing::info;

use super::DbError;

const CREATE_WEBSITE_METRICS: &str = r#"
    CREATE TABLE IF NOT EXISTS website_metrics (
        id BIGSERIAL PRIMARY KEY,
        url TEXT NOT NULL,
        checked_at TIMESTAMPTZ NOT NULL,
        status_code INTEGER,
        response_time DOUBLE PRECISION NOT NULL,
        regex_match BOOLEAN
    )
"#;

const CREATE_MONITORED_URLS: &str = r#"
    CREATE TABLE IF NOT EXISTS monitored_urls (
        id INTEGER GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
        url TEXT NOT NULL UNIQUE,
        interval INTEGER NOT NULL CHECK (interval BETWEEN 5 AND 300),
        regex TEXT
    )
"#;

/// Creates both tables if they are missing, atomically.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), DbError> {
    info!("Ensuring tables exist...");
    let mut tx = pool.begin().await?;
    sqlx::query(CREATE_WEBSITE_METRICS).execute(&mut *tx).await?;
    sqlx::query(CREATE_MONITORED_URLS).execute(&mut *tx).await?;
    tx.commit().await?;
    info!("Tables checked/created.");
    Ok(())
}
