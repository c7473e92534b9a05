use sqlx::PgExecutor;

use crate::monitor::probe::ProbeResult;

/// Appends one probe outcome to `website_metrics`.
pub async fn insert_probe_result<'e, E>(
    executor: E,
    result: &ProbeResult,
) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO website_metrics
            (url, checked_at, status_code, response_time, regex_match)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(&result.target_address)
    .bind(result.observed_at)
    .bind(result.status_code.map(i32::from))
    .bind(result.latency_secs())
    .bind(result.pattern_matched)
    .execute(executor)
    .await?;
    Ok(())
}
