//! SQLite-backed reference stores
//!
//! Implements the catalog, session, and crash-log contracts over one
//! SQLite pool. Structured fields (stock, images, specifications, error
//! lists) are stored as JSON text columns.

use std::collections::HashSet;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::domain::product::{normalize_sku, UnifiedProduct};
use crate::domain::repositories::{
    CatalogStore, CrashLogStore, SessionStore, StoredProduct, UpsertOutcome,
};
use crate::domain::session::{CrashLogEntry, SessionStats, SyncSession, SyncStatus};
use crate::domain::supplier::{ConnectorType, Supplier};

/// Open (or create) a SQLite database for the sync engine.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .with_context(|| format!("Failed to open database: {database_url}"))
}

/// Create the engine's tables if they do not exist yet.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            supplier_id INTEGER NOT NULL,
            supplier_sku TEXT,
            sku TEXT,
            sku_norm TEXT,
            name TEXT NOT NULL,
            model TEXT,
            brand TEXT,
            category TEXT,
            description TEXT,
            cost_price REAL NOT NULL,
            selling_price REAL NOT NULL,
            margin_percentage REAL NOT NULL,
            stock TEXT NOT NULL,
            images TEXT NOT NULL,
            specifications TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_products_supplier_sku
         ON products (supplier_id, supplier_sku)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_products_sku_norm ON products (sku_norm)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS suppliers (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            connector_type TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            status TEXT NOT NULL DEFAULT 'idle',
            error_message TEXT,
            last_sync TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_sessions (
            id TEXT PRIMARY KEY,
            supplier_id INTEGER NOT NULL,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            status TEXT NOT NULL,
            added INTEGER NOT NULL DEFAULT 0,
            updated INTEGER NOT NULL DEFAULT 0,
            unchanged INTEGER NOT NULL DEFAULT 0,
            deactivated INTEGER NOT NULL DEFAULT 0,
            skipped INTEGER NOT NULL DEFAULT 0,
            errors TEXT NOT NULL DEFAULT '[]',
            warnings TEXT NOT NULL DEFAULT '[]',
            triggered_by TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS crash_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            supplier_name TEXT NOT NULL,
            error_type TEXT NOT NULL,
            error_message TEXT NOT NULL,
            stack_trace TEXT,
            context TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// SQLite catalog store.
#[derive(Clone)]
pub struct SqliteCatalogStore {
    pool: SqlitePool,
}

impl SqliteCatalogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register (or refresh) a supplier row.
    pub async fn register_supplier(&self, supplier: &Supplier) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO suppliers (id, name, connector_type, active, status, error_message, last_sync)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                connector_type = excluded.connector_type,
                active = excluded.active
            "#,
        )
        .bind(supplier.id)
        .bind(&supplier.name)
        .bind(supplier.connector_type.as_str())
        .bind(supplier.active)
        .bind(&supplier.status)
        .bind(&supplier.error_message)
        .bind(supplier.last_sync)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_supplier(&self, supplier_id: i64) -> Result<Option<Supplier>> {
        let row = sqlx::query("SELECT * FROM suppliers WHERE id = ?")
            .bind(supplier_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| row_to_supplier(&row)).transpose()
    }

    async fn resolve(&self, product: &UnifiedProduct) -> Result<Option<i64>> {
        if let Some(key) = product
            .supplier_sku
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            let id: Option<i64> = sqlx::query_scalar(
                "SELECT id FROM products WHERE supplier_id = ? AND supplier_sku = ?",
            )
            .bind(product.supplier_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
            if id.is_some() {
                return Ok(id);
            }
        }
        if let Some(norm) = product.sku.as_deref().map(normalize_sku) {
            let id: Option<i64> = sqlx::query_scalar("SELECT id FROM products WHERE sku_norm = ?")
                .bind(norm)
                .fetch_optional(&self.pool)
                .await?;
            return Ok(id);
        }
        Ok(None)
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn upsert(&self, product: &UnifiedProduct) -> Result<UpsertOutcome> {
        let supplier_sku = product.supplier_sku.as_deref().map(str::trim);
        let sku_norm = product.sku.as_deref().map(normalize_sku);
        let stock = serde_json::to_string(&product.stock)?;
        let images = serde_json::to_string(&product.images)?;
        let specifications = serde_json::to_string(&product.specifications)?;

        match self.resolve(product).await? {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE products SET
                        supplier_id = ?, supplier_sku = ?, sku = ?, sku_norm = ?,
                        name = ?, model = ?, brand = ?, category = ?, description = ?,
                        cost_price = ?, selling_price = ?, margin_percentage = ?,
                        stock = ?, images = ?, specifications = ?,
                        active = ?, updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(product.supplier_id)
                .bind(supplier_sku)
                .bind(&product.sku)
                .bind(&sku_norm)
                .bind(&product.name)
                .bind(&product.model)
                .bind(&product.brand)
                .bind(&product.category)
                .bind(&product.description)
                .bind(product.cost_price)
                .bind(product.selling_price)
                .bind(product.margin_percentage)
                .bind(&stock)
                .bind(&images)
                .bind(&specifications)
                .bind(product.active)
                .bind(Utc::now())
                .bind(id)
                .execute(&self.pool)
                .await?;
                Ok(UpsertOutcome { is_new: false, id })
            }
            None => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO products
                        (supplier_id, supplier_sku, sku, sku_norm, name, model, brand,
                         category, description, cost_price, selling_price,
                         margin_percentage, stock, images, specifications, active,
                         created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(product.supplier_id)
                .bind(supplier_sku)
                .bind(&product.sku)
                .bind(&sku_norm)
                .bind(&product.name)
                .bind(&product.model)
                .bind(&product.brand)
                .bind(&product.category)
                .bind(&product.description)
                .bind(product.cost_price)
                .bind(product.selling_price)
                .bind(product.margin_percentage)
                .bind(&stock)
                .bind(&images)
                .bind(&specifications)
                .bind(product.active)
                .bind(product.created_at)
                .bind(product.updated_at)
                .execute(&self.pool)
                .await?;
                Ok(UpsertOutcome {
                    is_new: true,
                    id: result.last_insert_rowid(),
                })
            }
        }
    }

    async fn get_by_supplier_sku(
        &self,
        supplier_id: i64,
        supplier_sku: &str,
    ) -> Result<Option<StoredProduct>> {
        let row = sqlx::query("SELECT * FROM products WHERE supplier_id = ? AND supplier_sku = ?")
            .bind(supplier_id)
            .bind(supplier_sku.trim())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| row_to_product(&row)).transpose()
    }

    async fn get_by_sku(&self, sku: &str) -> Result<Option<StoredProduct>> {
        let row = sqlx::query("SELECT * FROM products WHERE sku_norm = ?")
            .bind(normalize_sku(sku))
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| row_to_product(&row)).transpose()
    }

    async fn count(&self, supplier_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE supplier_id = ?")
            .bind(supplier_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn deactivate_missing(
        &self,
        supplier_id: i64,
        seen_keys: &HashSet<String>,
    ) -> Result<u64> {
        let rows = sqlx::query(
            "SELECT id, supplier_sku, sku_norm FROM products WHERE supplier_id = ? AND active = 1",
        )
        .bind(supplier_id)
        .fetch_all(&self.pool)
        .await?;

        let mut deactivated = 0u64;
        let now = Utc::now();
        for row in &rows {
            let id: i64 = row.try_get("id")?;
            let supplier_sku: Option<String> = row.try_get("supplier_sku")?;
            let sku_norm: Option<String> = row.try_get("sku_norm")?;
            let Some(key) = supplier_sku.or(sku_norm) else {
                continue;
            };
            if seen_keys.contains(&key) {
                continue;
            }
            sqlx::query("UPDATE products SET active = 0, updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await?;
            deactivated += 1;
        }
        Ok(deactivated)
    }

    async fn update_supplier_status(
        &self,
        supplier_id: i64,
        status: &str,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE suppliers SET status = ?, error_message = ? WHERE id = ?")
            .bind(status)
            .bind(error_message)
            .bind(supplier_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_supplier_last_sync(&self, supplier_id: i64) -> Result<()> {
        sqlx::query("UPDATE suppliers SET last_sync = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(supplier_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn row_to_product(row: &SqliteRow) -> Result<StoredProduct> {
    let stock: String = row.try_get("stock")?;
    let images: String = row.try_get("images")?;
    let specifications: String = row.try_get("specifications")?;

    Ok(StoredProduct {
        id: row.try_get("id")?,
        product: UnifiedProduct {
            name: row.try_get("name")?,
            sku: row.try_get("sku")?,
            model: row.try_get("model")?,
            brand: row.try_get("brand")?,
            category: row.try_get("category")?,
            description: row.try_get("description")?,
            cost_price: row.try_get("cost_price")?,
            selling_price: row.try_get("selling_price")?,
            margin_percentage: row.try_get("margin_percentage")?,
            stock: serde_json::from_str(&stock).context("invalid stock JSON")?,
            images: serde_json::from_str(&images).context("invalid images JSON")?,
            specifications: serde_json::from_str(&specifications)
                .context("invalid specifications JSON")?,
            supplier_id: row.try_get("supplier_id")?,
            supplier_sku: row.try_get("supplier_sku")?,
            active: row.try_get("active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        },
    })
}

fn row_to_supplier(row: &SqliteRow) -> Result<Supplier> {
    let connector_type: String = row.try_get("connector_type")?;
    Ok(Supplier {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        connector_type: connector_type
            .parse::<ConnectorType>()
            .map_err(|e| anyhow!(e))?,
        active: row.try_get("active")?,
        last_sync: row.try_get("last_sync")?,
        status: row.try_get("status")?,
        error_message: row.try_get("error_message")?,
    })
}

/// SQLite session store.
#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<SyncSession>> {
        let row = sqlx::query("SELECT * FROM sync_sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| row_to_session(&row)).transpose()
    }
}

fn row_to_session(row: &SqliteRow) -> Result<SyncSession> {
    let status: String = row.try_get("status")?;
    let errors: String = row.try_get("errors")?;
    let warnings: String = row.try_get("warnings")?;

    Ok(SyncSession {
        id: row.try_get("id")?,
        supplier_id: row.try_get("supplier_id")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        status: status.parse::<SyncStatus>().map_err(|e| anyhow!(e))?,
        stats: SessionStats {
            added: row.try_get::<i64, _>("added")? as u32,
            updated: row.try_get::<i64, _>("updated")? as u32,
            unchanged: row.try_get::<i64, _>("unchanged")? as u32,
            deactivated: row.try_get::<i64, _>("deactivated")? as u32,
            skipped: row.try_get::<i64, _>("skipped")? as u32,
        },
        errors: serde_json::from_str(&errors).context("invalid errors JSON")?,
        warnings: serde_json::from_str(&warnings).context("invalid warnings JSON")?,
        triggered_by: row.try_get("triggered_by")?,
    })
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn create_session(&self, session: &SyncSession) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO sync_sessions
                (id, supplier_id, started_at, completed_at, status,
                 added, updated, unchanged, deactivated, skipped,
                 errors, warnings, triggered_by)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(session.supplier_id)
        .bind(session.started_at)
        .bind(session.completed_at)
        .bind(session.status.as_str())
        .bind(i64::from(session.stats.added))
        .bind(i64::from(session.stats.updated))
        .bind(i64::from(session.stats.unchanged))
        .bind(i64::from(session.stats.deactivated))
        .bind(i64::from(session.stats.skipped))
        .bind(serde_json::to_string(&session.errors)?)
        .bind(serde_json::to_string(&session.warnings)?)
        .bind(&session.triggered_by)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete_session(&self, session: &SyncSession) -> Result<()> {
        // Terminal snapshot carries everything; same statement as create.
        self.create_session(session).await
    }

    async fn fail_session(&self, session_id: &str, stats: SessionStats, error: &str) -> Result<()> {
        let existing: Option<String> =
            sqlx::query_scalar("SELECT errors FROM sync_sessions WHERE id = ?")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;
        let mut errors: Vec<String> = existing
            .as_deref()
            .and_then(|json| serde_json::from_str(json).ok())
            .unwrap_or_default();
        if !errors.iter().any(|e| e == error) {
            errors.push(error.to_string());
        }

        sqlx::query(
            r#"
            UPDATE sync_sessions SET
                status = 'failed', completed_at = ?,
                added = ?, updated = ?, unchanged = ?, deactivated = ?, skipped = ?,
                errors = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now())
        .bind(i64::from(stats.added))
        .bind(i64::from(stats.updated))
        .bind(i64::from(stats.unchanged))
        .bind(i64::from(stats.deactivated))
        .bind(i64::from(stats.skipped))
        .bind(serde_json::to_string(&errors)?)
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// SQLite crash log.
#[derive(Clone)]
pub struct SqliteCrashLog {
    pool: SqlitePool,
}

impl SqliteCrashLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CrashLogStore for SqliteCrashLog {
    async fn log_crash(&self, entry: &CrashLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO crash_log
                (supplier_name, error_type, error_message, stack_trace, context, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.supplier_name)
        .bind(&entry.error_type)
        .bind(&entry.error_message)
        .bind(&entry.stack_trace)
        .bind(entry.context.as_ref().map(ToString::to_string))
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
