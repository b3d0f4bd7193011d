//! Persisted run reports

use catclass_common::{Error, Result};
use sqlx::SqlitePool;

use crate::models::RunReport;

/// Store the report of a finished run
pub async fn save_run(pool: &SqlitePool, report: &RunReport) -> Result<()> {
    let summary = serde_json::to_string(report)
        .map_err(|e| Error::Internal(format!("Failed to serialize run report: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO classification_runs (run_id, rule_source, started_at, ended_at, summary)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(report.run_id.to_string())
    .bind(&report.rule_source)
    .bind(report.started_at.to_rfc3339())
    .bind(report.ended_at.to_rfc3339())
    .bind(summary)
    .execute(pool)
    .await?;

    Ok(())
}

/// Most recently finished run, if any
pub async fn latest_run(pool: &SqlitePool) -> Result<Option<RunReport>> {
    let summary: Option<String> = sqlx::query_scalar(
        "SELECT summary FROM classification_runs ORDER BY ended_at DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    summary
        .map(|s| {
            serde_json::from_str(&s)
                .map_err(|e| Error::Internal(format!("Failed to deserialize run report: {}", e)))
        })
        .transpose()
}

/// Number of stored runs
pub async fn count_runs(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM classification_runs")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
