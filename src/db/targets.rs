//! Rows of `monitored_urls`, the stored target list.
use sqlx::{FromRow, PgPool};
use tracing::info;

use super::DbError;
use crate::monitor::target::TargetSpec;

#[derive(Debug, FromRow)]
struct TargetRow {
    url: String,
    interval: i32,
    regex: Option<String>,
}

impl From<TargetRow> for TargetSpec {
    fn from(row: TargetRow) -> Self {
        TargetSpec {
            url: row.url,
            // Negative values cannot pass the table CHECK; map them out of range anyway.
            interval: u64::try_from(row.interval).unwrap_or(0),
            regex: row.regex,
        }
    }
}

/// Inserts each spec, updating interval and pattern of URLs already stored.
pub async fn upsert_targets(pool: &PgPool, specs: &[TargetSpec]) -> Result<u64, DbError> {
    let mut tx = pool.begin().await?;
    let mut affected = 0;
    for spec in specs {
        info!(url = %spec.url, "Upserting monitored URL.");
        let interval = i32::try_from(spec.interval).unwrap_or(i32::MAX);
        affected += sqlx::query(
            r#"
            INSERT INTO monitored_urls (url, interval, regex)
            VALUES ($1, $2, $3)
            ON CONFLICT (url) DO UPDATE SET
                interval = EXCLUDED.interval,
                regex = EXCLUDED.regex
            "#,
        )
        .bind(&spec.url)
        .bind(interval)
        .bind(spec.regex.as_deref())
        .execute(&mut *tx)
        .await?
        .rows_affected();
    }
    tx.commit().await?;
    info!(count = specs.len(), "Monitored URLs successfully upserted.");
    Ok(affected)
}

/// Returns every stored target in insertion order.
pub async fn fetch_targets(pool: &PgPool) -> Result<Vec<TargetSpec>, DbError> {
    let rows: Vec<TargetRow> =
        sqlx::query_as("SELECT url, interval, regex FROM monitored_urls ORDER BY id")
            .fetch_all(pool)
            .await?;
    let specs: Vec<TargetSpec> = rows.into_iter().map(TargetSpec::from).collect();
    info!(count = specs.len(), "Loaded monitored URL(s).");
    Ok(specs)
}
