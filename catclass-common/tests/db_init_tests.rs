//! Database initialization against real files

use catclass_common::db::init::init_database;
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("catalog.db");

    let pool = init_database(&db_path).await;
    assert!(pool.is_ok(), "Database initialization failed: {:?}", pool.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing_and_keeps_rows() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("catalog.db");

    let pool = init_database(&db_path).await.unwrap();
    sqlx::query("INSERT INTO products (guid, name) VALUES ('00000000-0000-0000-0000-000000000001', 'Kept')")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_foreign_keys_enforced() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("catalog.db")).await.unwrap();

    let result = sqlx::query(
        "INSERT INTO products (guid, name, category_guid) VALUES ('00000000-0000-0000-0000-000000000002', 'Orphan', 'missing')",
    )
    .execute(&pool)
    .await;

    assert!(result.is_err(), "category_guid must reference categories");
}
