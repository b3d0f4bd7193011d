//! Category (taxonomy node) queries

use catclass_common::db::models::{parse_guid, CategoryNode};
use catclass_common::{Error, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

const CATEGORY_COLUMNS: &str = "guid, name, slug, parent_guid, active";

/// Find the child of `parent` named exactly `name` (case-sensitive)
///
/// `parent = None` looks among root nodes.
pub async fn find_child(
    pool: &SqlitePool,
    name: &str,
    parent: Option<Uuid>,
) -> Result<Option<CategoryNode>> {
    // `IS` compares NULL parents as equal, `=` would not
    let sql = format!(
        "SELECT {} FROM categories WHERE name = ? AND parent_guid IS ? LIMIT 1",
        CATEGORY_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(name)
        .bind(parent.map(|guid| guid.to_string()))
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(CategoryNode::from_row).transpose()
}

/// Insert a new category
///
/// Returns `Ok(false)` when the slug is already taken so the caller can try the
/// next candidate; every other failure is an error.
pub async fn try_insert(pool: &SqlitePool, node: &CategoryNode) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO categories (guid, name, slug, parent_guid, active)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(node.guid.to_string())
    .bind(&node.name)
    .bind(&node.slug)
    .bind(node.parent_guid.map(|guid| guid.to_string()))
    .bind(node.active as i64)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(true),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Ok(false),
        Err(e) => Err(Error::Database(e)),
    }
}

/// Load one category by guid
pub async fn get_category(pool: &SqlitePool, guid: Uuid) -> Result<Option<CategoryNode>> {
    let sql = format!("SELECT {} FROM categories WHERE guid = ?", CATEGORY_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(guid.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(CategoryNode::from_row).transpose()
}

/// Names from the root down to `guid`
///
/// Walks parent links; a cycle would be a corrupted store and is reported as
/// an internal error instead of looping.
pub async fn category_path(pool: &SqlitePool, guid: Uuid) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut visited = std::collections::HashSet::new();
    let mut current = Some(guid);

    while let Some(id) = current {
        if !visited.insert(id) {
            return Err(Error::Internal(format!("category cycle detected at {}", id)));
        }
        let node = get_category(pool, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("category {}", id)))?;
        names.push(node.name);
        current = node.parent_guid;
    }

    names.reverse();
    Ok(names)
}

/// Count all categories
pub async fn count_categories(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Guid of the category with `slug`, if any
pub async fn find_by_slug(pool: &SqlitePool, slug: &str) -> Result<Option<Uuid>> {
    let guid: Option<String> = sqlx::query_scalar("SELECT guid FROM categories WHERE slug = ?")
        .bind(slug)
        .fetch_optional(pool)
        .await?;
    guid.as_deref().map(parse_guid).transpose()
}
