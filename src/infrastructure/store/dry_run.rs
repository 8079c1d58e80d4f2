//! Dry-run catalog store decorator
//!
//! Same interface as a real catalog store; reads pass through, writes are
//! discarded. Injecting this instead of branching on a dry-run flag keeps
//! the orchestrator's algorithm identical in both modes.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::domain::product::{normalize_sku, UnifiedProduct};
use crate::domain::repositories::{CatalogStore, StoredProduct, UpsertOutcome};

pub struct DryRunStore {
    inner: Arc<dyn CatalogStore>,
}

impl DryRunStore {
    pub fn new(inner: Arc<dyn CatalogStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl CatalogStore for DryRunStore {
    /// Classify the would-be outcome from reads alone; nothing is written.
    async fn upsert(&self, product: &UnifiedProduct) -> Result<UpsertOutcome> {
        let existing = match product
            .supplier_sku
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(key) => {
                self.inner
                    .get_by_supplier_sku(product.supplier_id, key)
                    .await?
            }
            None => None,
        };
        let existing = match existing {
            Some(found) => Some(found),
            None => match product.sku.as_deref() {
                Some(sku) => self.inner.get_by_sku(&normalize_sku(sku)).await?,
                None => None,
            },
        };

        debug!(
            "Dry run: would {} {}",
            if existing.is_some() { "update" } else { "add" },
            product.name
        );
        Ok(match existing {
            Some(found) => UpsertOutcome {
                is_new: false,
                id: found.id,
            },
            None => UpsertOutcome { is_new: true, id: 0 },
        })
    }

    async fn get_by_supplier_sku(
        &self,
        supplier_id: i64,
        supplier_sku: &str,
    ) -> Result<Option<StoredProduct>> {
        self.inner.get_by_supplier_sku(supplier_id, supplier_sku).await
    }

    async fn get_by_sku(&self, sku: &str) -> Result<Option<StoredProduct>> {
        self.inner.get_by_sku(sku).await
    }

    async fn count(&self, supplier_id: i64) -> Result<i64> {
        self.inner.count(supplier_id).await
    }

    /// A dry run reports 0 deactivations rather than enumerating victims.
    async fn deactivate_missing(
        &self,
        _supplier_id: i64,
        _seen_keys: &HashSet<String>,
    ) -> Result<u64> {
        Ok(0)
    }

    async fn update_supplier_status(
        &self,
        _supplier_id: i64,
        _status: &str,
        _error_message: Option<&str>,
    ) -> Result<()> {
        Ok(())
    }

    async fn update_supplier_last_sync(&self, _supplier_id: i64) -> Result<()> {
        Ok(())
    }
}
