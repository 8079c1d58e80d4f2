//! Store contracts consumed by the sync engine.
//!
//! The catalog storage engine itself lives outside this crate; the
//! orchestrator only ever talks to these traits. Reference SQLite and
//! in-memory implementations live under `infrastructure::store`.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::product::UnifiedProduct;
use crate::domain::session::{CrashLogEntry, SessionStats, SyncSession};

/// Result of an upsert: whether a new row was created, and its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub is_new: bool,
    pub id: i64,
}

/// A persisted canonical record together with its row id.
#[derive(Debug, Clone)]
pub struct StoredProduct {
    pub id: i64,
    pub product: UnifiedProduct,
}

/// Upsert/query contract over the canonical product catalog.
///
/// Must be safe under concurrent callers syncing different suppliers; the
/// authority guard, not a lock, resolves same-SKU write conflicts.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert or overwrite the canonical record for the product's natural
    /// key. Resolution order: `(supplier_id, supplier_sku)`, then the
    /// normalized catalog SKU across suppliers.
    async fn upsert(&self, product: &UnifiedProduct) -> Result<UpsertOutcome>;

    /// Look up by the supplier-scoped natural key.
    async fn get_by_supplier_sku(
        &self,
        supplier_id: i64,
        supplier_sku: &str,
    ) -> Result<Option<StoredProduct>>;

    /// Look up the canonical record for a normalized SKU, regardless of
    /// which supplier wrote it.
    async fn get_by_sku(&self, sku: &str) -> Result<Option<StoredProduct>>;

    /// Number of records currently attributed to a supplier.
    async fn count(&self, supplier_id: i64) -> Result<i64>;

    /// Mark records of this supplier inactive when their natural key was
    /// not observed during a full sync. Returns how many were deactivated.
    async fn deactivate_missing(&self, supplier_id: i64, seen_keys: &HashSet<String>)
    -> Result<u64>;

    async fn update_supplier_status(
        &self,
        supplier_id: i64,
        status: &str,
        error_message: Option<&str>,
    ) -> Result<()>;

    async fn update_supplier_last_sync(&self, supplier_id: i64) -> Result<()>;
}

/// Audit-session persistence contract.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Record a session in `running` state.
    async fn create_session(&self, session: &SyncSession) -> Result<()>;

    /// Persist the terminal snapshot of a session.
    async fn complete_session(&self, session: &SyncSession) -> Result<()>;

    /// Persist a failed terminal snapshot with its fatal error.
    async fn fail_session(&self, session_id: &str, stats: SessionStats, error: &str) -> Result<()>;
}

/// Append-only crash trail, independent of session bookkeeping.
#[async_trait]
pub trait CrashLogStore: Send + Sync {
    async fn log_crash(&self, entry: &CrashLogEntry) -> Result<()>;
}
