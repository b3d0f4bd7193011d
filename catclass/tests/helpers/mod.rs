//! Test helpers: temporary catalog databases, seeded products, rule sheets

#![allow(dead_code)]

use catclass::rules::RuleSource;
use catclass_common::db::init::init_database;
use sqlx::SqlitePool;
use std::io::Write;
use tempfile::TempDir;
use uuid::Uuid;

/// File-backed catalog database
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("catalog.db")).await.unwrap();
    (temp_dir, pool)
}

/// Write a rule sheet next to the database and return its source
pub fn write_rules(dir: &TempDir, csv: &str) -> RuleSource {
    let path = dir.path().join("rules.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(csv.as_bytes()).unwrap();
    RuleSource::File(path)
}

/// Insert a product as the ingestion process would
pub async fn seed_product(
    pool: &SqlitePool,
    name: &str,
    brand: Option<&str>,
    raw_category: Option<&str>,
) -> Uuid {
    let guid = Uuid::new_v4();
    sqlx::query("INSERT INTO products (guid, name, brand, raw_category) VALUES (?, ?, ?, ?)")
        .bind(guid.to_string())
        .bind(name)
        .bind(brand)
        .bind(raw_category)
        .execute(pool)
        .await
        .unwrap();
    guid
}

/// Insert a locked product already assigned to `category`
pub async fn seed_locked_product(
    pool: &SqlitePool,
    name: &str,
    category: Option<Uuid>,
    confidence: f64,
) -> Uuid {
    let guid = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO products (guid, name, category_guid, confidence, locked) VALUES (?, ?, ?, ?, 1)",
    )
    .bind(guid.to_string())
    .bind(name)
    .bind(category.map(|c| c.to_string()))
    .bind(confidence)
    .execute(pool)
    .await
    .unwrap();
    guid
}

/// (category path, confidence) of one product
pub async fn assignment(pool: &SqlitePool, guid: Uuid) -> (Option<Vec<String>>, f64) {
    let (category, confidence): (Option<String>, f64) =
        sqlx::query_as("SELECT category_guid, confidence FROM products WHERE guid = ?")
            .bind(guid.to_string())
            .fetch_one(pool)
            .await
            .unwrap();

    let path = match category {
        Some(c) => Some(
            catclass::db::categories::category_path(pool, Uuid::parse_str(&c).unwrap())
                .await
                .unwrap(),
        ),
        None => None,
    };
    (path, confidence)
}

/// Raw (category_guid, confidence, updated_at) row for before/after comparisons
pub async fn raw_row(pool: &SqlitePool, guid: Uuid) -> (Option<String>, f64, String) {
    sqlx::query_as(
        "SELECT category_guid, confidence, CAST(updated_at AS TEXT) FROM products WHERE guid = ?",
    )
    .bind(guid.to_string())
    .fetch_one(pool)
    .await
    .unwrap()
}

pub fn path(segments: &[&str]) -> Option<Vec<String>> {
    Some(segments.iter().map(|s| s.to_string()).collect())
}
