//! Product queries used by the batch executor
//!
//! Only `category_guid`, `confidence` and `updated_at` are ever written, and
//! only on rows with `locked = 0`.

use catclass_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

/// A pending (category, confidence) write for one product
#[derive(Debug, Clone, PartialEq)]
pub struct StagedUpdate {
    pub guid: Uuid,
    pub category_guid: Option<Uuid>,
    pub confidence: f64,
}

/// Guids of every unlocked product, in storage order
///
/// Locked products are excluded here and are never evaluated.
pub async fn list_unlocked_guids(pool: &SqlitePool) -> Result<Vec<String>> {
    let guids: Vec<String> =
        sqlx::query_scalar("SELECT guid FROM products WHERE locked = 0 ORDER BY guid")
            .fetch_all(pool)
            .await?;
    Ok(guids)
}

/// Load the classification projection of one page
///
/// A page is the inclusive guid range `[first, last]` of the ordered unlocked
/// guid list, so pages never overlap.
pub async fn load_page(pool: &SqlitePool, first: &str, last: &str) -> Result<Vec<SqliteRow>> {
    let rows = sqlx::query(
        r#"
        SELECT guid, name, brand, raw_category, category_guid, confidence, locked
        FROM products
        WHERE guid >= ? AND guid <= ? AND locked = 0
        ORDER BY guid
        "#,
    )
    .bind(first)
    .bind(last)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Write staged updates inside the caller's transaction
///
/// Returns the number of rows changed. The `locked = 0` guard also covers a
/// product locked between page load and write.
pub async fn apply_updates(
    tx: &mut Transaction<'_, Sqlite>,
    updates: &[StagedUpdate],
) -> Result<u64> {
    let mut changed = 0;

    for update in updates {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET category_guid = ?, confidence = ?, updated_at = CURRENT_TIMESTAMP
            WHERE guid = ? AND locked = 0
            "#,
        )
        .bind(update.category_guid.map(|guid| guid.to_string()))
        .bind(update.confidence)
        .bind(update.guid.to_string())
        .execute(&mut **tx)
        .await?;

        changed += result.rows_affected();
    }

    Ok(changed)
}
