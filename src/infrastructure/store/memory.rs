//! In-memory store implementations
//!
//! Back the store contracts with `Arc<RwLock<..>>` state for tests and
//! lightweight embedding. Resolution semantics mirror the SQLite store
//! exactly: supplier-scoped natural key first, then the normalized SKU
//! across suppliers.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::product::{normalize_sku, UnifiedProduct};
use crate::domain::repositories::{
    CatalogStore, CrashLogStore, SessionStore, StoredProduct, UpsertOutcome,
};
use crate::domain::session::{CrashLogEntry, SessionStats, SyncSession, SyncStatus};

#[derive(Debug, Default)]
struct CatalogState {
    rows: HashMap<i64, UnifiedProduct>,
    next_id: i64,
    supplier_status: HashMap<i64, (String, Option<String>)>,
    supplier_last_sync: HashMap<i64, DateTime<Utc>>,
}

impl CatalogState {
    fn resolve(&self, product: &UnifiedProduct) -> Option<i64> {
        if let Some(key) = product
            .supplier_sku
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            let hit = self.rows.iter().find(|(_, row)| {
                row.supplier_id == product.supplier_id
                    && row.supplier_sku.as_deref().map(str::trim) == Some(key)
            });
            if let Some((id, _)) = hit {
                return Some(*id);
            }
        }
        if let Some(norm) = product.sku.as_deref().map(normalize_sku) {
            let hit = self
                .rows
                .iter()
                .find(|(_, row)| row.sku.as_deref().map(normalize_sku) == Some(norm.clone()));
            if let Some((id, _)) = hit {
                return Some(*id);
            }
        }
        None
    }
}

/// In-memory catalog store.
#[derive(Debug, Default, Clone)]
pub struct MemoryCatalogStore {
    state: Arc<RwLock<CatalogState>>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored product, for assertions.
    pub async fn all_products(&self) -> Vec<StoredProduct> {
        let state = self.state.read().await;
        let mut products: Vec<StoredProduct> = state
            .rows
            .iter()
            .map(|(id, product)| StoredProduct {
                id: *id,
                product: product.clone(),
            })
            .collect();
        products.sort_by_key(|p| p.id);
        products
    }

    pub async fn supplier_status(&self, supplier_id: i64) -> Option<(String, Option<String>)> {
        self.state
            .read()
            .await
            .supplier_status
            .get(&supplier_id)
            .cloned()
    }

    pub async fn supplier_last_sync(&self, supplier_id: i64) -> Option<DateTime<Utc>> {
        self.state
            .read()
            .await
            .supplier_last_sync
            .get(&supplier_id)
            .copied()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn upsert(&self, product: &UnifiedProduct) -> Result<UpsertOutcome> {
        let mut state = self.state.write().await;
        match state.resolve(product) {
            Some(id) => {
                let mut updated = product.clone();
                if let Some(existing) = state.rows.get(&id) {
                    updated.created_at = existing.created_at;
                }
                state.rows.insert(id, updated);
                Ok(UpsertOutcome { is_new: false, id })
            }
            None => {
                state.next_id += 1;
                let id = state.next_id;
                state.rows.insert(id, product.clone());
                Ok(UpsertOutcome { is_new: true, id })
            }
        }
    }

    async fn get_by_supplier_sku(
        &self,
        supplier_id: i64,
        supplier_sku: &str,
    ) -> Result<Option<StoredProduct>> {
        let state = self.state.read().await;
        let key = supplier_sku.trim();
        Ok(state
            .rows
            .iter()
            .find(|(_, row)| {
                row.supplier_id == supplier_id
                    && row.supplier_sku.as_deref().map(str::trim) == Some(key)
            })
            .map(|(id, product)| StoredProduct {
                id: *id,
                product: product.clone(),
            }))
    }

    async fn get_by_sku(&self, sku: &str) -> Result<Option<StoredProduct>> {
        let state = self.state.read().await;
        let norm = normalize_sku(sku);
        Ok(state
            .rows
            .iter()
            .find(|(_, row)| row.sku.as_deref().map(normalize_sku) == Some(norm.clone()))
            .map(|(id, product)| StoredProduct {
                id: *id,
                product: product.clone(),
            }))
    }

    async fn count(&self, supplier_id: i64) -> Result<i64> {
        let state = self.state.read().await;
        Ok(state
            .rows
            .values()
            .filter(|row| row.supplier_id == supplier_id)
            .count() as i64)
    }

    async fn deactivate_missing(
        &self,
        supplier_id: i64,
        seen_keys: &HashSet<String>,
    ) -> Result<u64> {
        let mut state = self.state.write().await;
        let mut deactivated = 0;
        for row in state.rows.values_mut() {
            if row.supplier_id != supplier_id || !row.active {
                continue;
            }
            let Some(key) = row.natural_key() else {
                continue;
            };
            if !seen_keys.contains(&key) {
                row.active = false;
                row.updated_at = Utc::now();
                deactivated += 1;
            }
        }
        Ok(deactivated)
    }

    async fn update_supplier_status(
        &self,
        supplier_id: i64,
        status: &str,
        error_message: Option<&str>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.supplier_status.insert(
            supplier_id,
            (status.to_string(), error_message.map(str::to_string)),
        );
        Ok(())
    }

    async fn update_supplier_last_sync(&self, supplier_id: i64) -> Result<()> {
        let mut state = self.state.write().await;
        state.supplier_last_sync.insert(supplier_id, Utc::now());
        Ok(())
    }
}

/// In-memory session store.
#[derive(Debug, Default, Clone)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<BTreeMap<String, SyncSession>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session(&self, session_id: &str) -> Option<SyncSession> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn all_sessions(&self) -> Vec<SyncSession> {
        self.sessions.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, session: &SyncSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn complete_session(&self, session: &SyncSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn fail_session(&self, session_id: &str, stats: SessionStats, error: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.status = SyncStatus::Failed;
            session.completed_at = Some(Utc::now());
            session.stats = stats;
            if !session.errors.iter().any(|e| e == error) {
                session.errors.push(error.to_string());
            }
        }
        Ok(())
    }
}

/// In-memory crash log.
#[derive(Debug, Default, Clone)]
pub struct MemoryCrashLog {
    entries: Arc<RwLock<Vec<CrashLogEntry>>>,
}

impl MemoryCrashLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<CrashLogEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl CrashLogStore for MemoryCrashLog {
    async fn log_crash(&self, entry: &CrashLogEntry) -> Result<()> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }
}
