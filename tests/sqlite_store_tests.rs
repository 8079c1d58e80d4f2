//! Round-trip tests for the SQLite reference stores.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use supplier_sync::domain::product::{StockConfidence, StockInfo, UnifiedProduct};
use supplier_sync::domain::repositories::{CatalogStore, CrashLogStore, SessionStore};
use supplier_sync::domain::session::{CrashLogEntry, SyncSession, SyncStatus};
use supplier_sync::domain::supplier::{ConnectorType, Supplier};
use supplier_sync::infrastructure::store::sqlite::{
    connect, init_schema, SqliteCatalogStore, SqliteCrashLog, SqliteSessionStore,
};

async fn test_pool(dir: &tempfile::TempDir) -> sqlx::SqlitePool {
    let path = dir.path().join("catalog.db");
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let pool = connect(&url).await.expect("open test database");
    init_schema(&pool).await.expect("create schema");
    pool
}

fn product(supplier_id: i64, sku: &str) -> UnifiedProduct {
    let now = Utc::now();
    let mut by_region = BTreeMap::new();
    by_region.insert("gauteng".to_string(), 5);
    by_region.insert("cape_town".to_string(), 3);

    let mut specifications = BTreeMap::new();
    specifications.insert("ports".to_string(), serde_json::json!(4));

    UnifiedProduct {
        name: format!("Product {sku}"),
        sku: Some(sku.to_string()),
        model: Some("M-1".to_string()),
        brand: Some("Nology".to_string()),
        category: Some("Networking".to_string()),
        description: Some("A product".to_string()),
        cost_price: 100.0,
        selling_price: 132.25,
        margin_percentage: 15.0,
        stock: StockInfo::counted(by_region, 8),
        images: vec!["https://cdn.example/a.jpg".to_string()],
        specifications,
        supplier_id,
        supplier_sku: Some(sku.to_string()),
        active: true,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn catalog_upsert_round_trips_structured_fields() {
    let dir = tempfile::tempdir().unwrap();
    let pool = test_pool(&dir).await;
    let store = SqliteCatalogStore::new(pool);

    let outcome = store.upsert(&product(1, "NET-1")).await.unwrap();
    assert!(outcome.is_new);

    let stored = store.get_by_supplier_sku(1, "NET-1").await.unwrap().unwrap();
    assert_eq!(stored.product.name, "Product NET-1");
    assert_eq!(stored.product.stock.total, 8);
    assert_eq!(stored.product.stock.confidence, StockConfidence::Counted);
    assert_eq!(stored.product.stock.by_region.get("gauteng"), Some(&5));
    assert_eq!(stored.product.images.len(), 1);
    assert_eq!(
        stored.product.specifications.get("ports"),
        Some(&serde_json::json!(4))
    );

    // Second upsert of the same natural key updates in place.
    let mut changed = product(1, "NET-1");
    changed.cost_price = 120.0;
    let outcome = store.upsert(&changed).await.unwrap();
    assert!(!outcome.is_new);
    assert_eq!(store.count(1).await.unwrap(), 1);

    let stored = store.get_by_supplier_sku(1, "NET-1").await.unwrap().unwrap();
    assert!((stored.product.cost_price - 120.0).abs() < 1e-9);
}

#[tokio::test]
async fn sku_lookup_is_normalized_and_cross_supplier() {
    let dir = tempfile::tempdir().unwrap();
    let pool = test_pool(&dir).await;
    let store = SqliteCatalogStore::new(pool);

    store.upsert(&product(1, "net-99")).await.unwrap();

    let found = store.get_by_sku("  NET-99 ").await.unwrap();
    assert!(found.is_some());

    // A different supplier writing the same catalog SKU lands on the
    // same canonical row.
    let outcome = store.upsert(&product(2, "NET-99")).await.unwrap();
    assert!(!outcome.is_new);
    let stored = store.get_by_sku("net-99").await.unwrap().unwrap();
    assert_eq!(stored.product.supplier_id, 2);
}

#[tokio::test]
async fn deactivate_missing_only_touches_unseen_active_rows() {
    let dir = tempfile::tempdir().unwrap();
    let pool = test_pool(&dir).await;
    let store = SqliteCatalogStore::new(pool);

    store.upsert(&product(1, "A-1")).await.unwrap();
    store.upsert(&product(1, "A-2")).await.unwrap();
    store.upsert(&product(2, "B-1")).await.unwrap();

    let seen: HashSet<String> = ["A-1".to_string()].into_iter().collect();
    let deactivated = store.deactivate_missing(1, &seen).await.unwrap();
    assert_eq!(deactivated, 1);

    let a2 = store.get_by_supplier_sku(1, "A-2").await.unwrap().unwrap();
    assert!(!a2.product.active);
    let b1 = store.get_by_supplier_sku(2, "B-1").await.unwrap().unwrap();
    assert!(b1.product.active);
}

#[tokio::test]
async fn supplier_rows_register_and_update() {
    let dir = tempfile::tempdir().unwrap();
    let pool = test_pool(&dir).await;
    let store = SqliteCatalogStore::new(pool);

    let supplier = Supplier::new(1, "Nology", ConnectorType::Api);
    store.register_supplier(&supplier).await.unwrap();

    store
        .update_supplier_status(1, "completed", None)
        .await
        .unwrap();
    store.update_supplier_last_sync(1).await.unwrap();

    let stored = store.get_supplier(1).await.unwrap().unwrap();
    assert_eq!(stored.status, "completed");
    assert_eq!(stored.connector_type, ConnectorType::Api);
    assert!(stored.last_sync.is_some());
}

#[tokio::test]
async fn session_lifecycle_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let pool = test_pool(&dir).await;
    let store = SqliteSessionStore::new(pool);

    let mut session = SyncSession::new(1, "operator");
    store.create_session(&session).await.unwrap();

    session.stats.added = 12;
    session.warnings.push("record skipped: no usable SKU".to_string());
    session.status = SyncStatus::Completed;
    session.completed_at = Some(Utc::now());
    store.complete_session(&session).await.unwrap();

    let stored = store.get_session(&session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SyncStatus::Completed);
    assert_eq!(stored.stats.added, 12);
    assert_eq!(stored.warnings.len(), 1);
    assert_eq!(stored.triggered_by, "operator");
}

#[tokio::test]
async fn failed_sessions_accumulate_the_fatal_error() {
    let dir = tempfile::tempdir().unwrap();
    let pool = test_pool(&dir).await;
    let store = SqliteSessionStore::new(pool);

    let session = SyncSession::new(1, "scheduler");
    store.create_session(&session).await.unwrap();

    store
        .fail_session(&session.id, session.stats, "page 1 failed after 3 attempt(s)")
        .await
        .unwrap();

    let stored = store.get_session(&session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SyncStatus::Failed);
    assert!(stored.completed_at.is_some());
    assert_eq!(stored.errors.len(), 1);
}

#[tokio::test]
async fn crash_log_appends_entries() {
    let dir = tempfile::tempdir().unwrap();
    let pool = test_pool(&dir).await;
    let store = SqliteCrashLog::new(pool.clone());

    let entry = CrashLogEntry {
        supplier_name: "Scoop".to_string(),
        error_type: "engine_unavailable".to_string(),
        error_message: "automation engine unavailable: no display".to_string(),
        stack_trace: None,
        context: Some(serde_json::json!({"listing_urls": 3})),
        created_at: Utc::now(),
    };
    store.log_crash(&entry).await.unwrap();
    store.log_crash(&entry).await.unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM crash_log")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 2);
}
