//! Engine assembly
//!
//! Builds one orchestrator per registered supplier over shared stores, a
//! shared authority guard, and a shared run-lock registry, and runs the
//! scheduled "sync all" shape: supplier runs execute concurrently, while
//! the per-supplier lock keeps any single supplier serialized.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::application::orchestrator::{
    RunLockRegistry, SyncError, SyncOptions, SyncOrchestrator,
};
use crate::domain::authority::AuthorityGuard;
use crate::domain::repositories::{CatalogStore, CrashLogStore, SessionStore};
use crate::domain::session::SyncResult;
use crate::domain::supplier::{ConnectorType, Supplier};
use crate::infrastructure::config::{AppConfig, SupplierConfig};
use crate::infrastructure::connectors::Connector;

struct SupplierEntry {
    supplier: Supplier,
    config: SupplierConfig,
    connector: Option<Arc<dyn Connector>>,
}

/// Collects suppliers and store handles, then builds a `SyncEngine`.
pub struct SyncEngineBuilder {
    catalog: Arc<dyn CatalogStore>,
    sessions: Arc<dyn SessionStore>,
    crash_log: Arc<dyn CrashLogStore>,
    entries: Vec<SupplierEntry>,
}

impl SyncEngineBuilder {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        sessions: Arc<dyn SessionStore>,
        crash_log: Arc<dyn CrashLogStore>,
    ) -> Self {
        Self {
            catalog,
            sessions,
            crash_log,
            entries: Vec::new(),
        }
    }

    /// Register every supplier from a loaded configuration.
    pub fn from_config(
        config: &AppConfig,
        catalog: Arc<dyn CatalogStore>,
        sessions: Arc<dyn SessionStore>,
        crash_log: Arc<dyn CrashLogStore>,
    ) -> Self {
        let mut builder = Self::new(catalog, sessions, crash_log);
        for entry in &config.suppliers {
            let mut supplier = Supplier::new(entry.id, entry.name.clone(), entry.connector_type);
            supplier.active = entry.active;
            builder = builder.register(supplier, entry.config.clone());
        }
        builder
    }

    pub fn register(mut self, supplier: Supplier, config: SupplierConfig) -> Self {
        self.entries.push(SupplierEntry {
            supplier,
            config,
            connector: None,
        });
        self
    }

    /// Register a supplier with a pre-built connector (embedders, tests).
    pub fn register_with_connector(
        mut self,
        supplier: Supplier,
        config: SupplierConfig,
        connector: Arc<dyn Connector>,
    ) -> Self {
        self.entries.push(SupplierEntry {
            supplier,
            config,
            connector: Some(connector),
        });
        self
    }

    /// Build the engine: the authority guard sees every registered
    /// supplier, and all orchestrators share one run-lock registry.
    pub fn build(self) -> SyncEngine {
        let guard = AuthorityGuard::from_suppliers(self.entries.iter().map(|e| &e.supplier));
        let locks = RunLockRegistry::new();

        let mut orchestrators = Vec::with_capacity(self.entries.len());
        let mut by_id = HashMap::new();
        for entry in self.entries {
            let mut orchestrator = SyncOrchestrator::new(
                entry.supplier.clone(),
                entry.config,
                Arc::clone(&self.catalog),
                Arc::clone(&self.sessions),
                Arc::clone(&self.crash_log),
                guard.clone(),
            )
            .with_lock_registry(locks.clone());
            if let Some(connector) = entry.connector {
                orchestrator = orchestrator.with_connector(connector);
            }
            by_id.insert(entry.supplier.id, orchestrators.len());
            orchestrators.push(Arc::new(orchestrator));
        }

        SyncEngine {
            orchestrators,
            by_id,
        }
    }
}

/// Outcome of one supplier's run within a `sync_all` sweep.
pub struct SupplierSyncOutcome {
    pub supplier: Supplier,
    pub result: Result<SyncResult, SyncError>,
}

pub struct SyncEngine {
    orchestrators: Vec<Arc<SyncOrchestrator>>,
    by_id: HashMap<i64, usize>,
}

impl SyncEngine {
    pub fn orchestrator(&self, supplier_id: i64) -> Option<&Arc<SyncOrchestrator>> {
        self.by_id
            .get(&supplier_id)
            .map(|index| &self.orchestrators[*index])
    }

    pub fn suppliers(&self) -> Vec<Supplier> {
        self.orchestrators
            .iter()
            .map(|o| o.get_supplier_info())
            .collect()
    }

    /// Run every syncable supplier concurrently. Manual pseudo-suppliers
    /// and inactive suppliers are skipped, not failed.
    pub async fn sync_all(&self, options: &SyncOptions) -> Vec<SupplierSyncOutcome> {
        let runs = self
            .orchestrators
            .iter()
            .filter(|orchestrator| {
                let supplier = orchestrator.get_supplier_info();
                if !supplier.active || supplier.connector_type == ConnectorType::Manual {
                    debug!(
                        "Skipping '{}' in sync-all ({}, active={})",
                        supplier.name, supplier.connector_type, supplier.active
                    );
                    return false;
                }
                true
            })
            .map(|orchestrator| {
                let orchestrator = Arc::clone(orchestrator);
                let options = options.clone();
                async move {
                    let supplier = orchestrator.get_supplier_info();
                    let result = orchestrator.sync_products(options).await;
                    SupplierSyncOutcome { supplier, result }
                }
            });

        futures::future::join_all(runs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::connectors::{ConnectorError, RawPage};
    use crate::infrastructure::pagination::{PageRequest, PaginationPreference};
    use crate::infrastructure::store::memory::{
        MemoryCatalogStore, MemoryCrashLog, MemorySessionStore,
    };
    use async_trait::async_trait;
    use serde_json::json;

    struct StubConnector {
        supplier: Supplier,
        records: Vec<serde_json::Value>,
    }

    #[async_trait]
    impl Connector for StubConnector {
        fn supplier_info(&self) -> &Supplier {
            &self.supplier
        }

        async fn test_connection(&self) -> Result<bool, ConnectorError> {
            Ok(true)
        }

        async fn fetch_page(&self, request: &PageRequest) -> Result<RawPage, ConnectorError> {
            if request.page_number > 1 {
                return Ok(RawPage::empty());
            }
            Ok(RawPage {
                records: self.records.clone(),
                last_id: None,
            })
        }
    }

    fn fast_config() -> SupplierConfig {
        SupplierConfig {
            pagination: PaginationPreference::PageNumber,
            inter_page_delay_ms: 0,
            retry_base_delay_ms: 1,
            max_retries: 1,
            ..Default::default()
        }
    }

    fn stub(supplier: &Supplier, skus: &[&str]) -> Arc<dyn Connector> {
        Arc::new(StubConnector {
            supplier: supplier.clone(),
            records: skus
                .iter()
                .map(|sku| json!({"sku": sku, "name": format!("Product {sku}"), "cost_price": 10.0}))
                .collect(),
        })
    }

    #[tokio::test]
    async fn sync_all_runs_active_suppliers_and_skips_manual() {
        let catalog = MemoryCatalogStore::new();
        let nology = Supplier::new(1, "Nology", ConnectorType::Api);
        let syntech = Supplier::new(2, "Syntech", ConnectorType::Feed);
        let manual = Supplier::new(3, "Manual Upload", ConnectorType::Manual);

        let engine = SyncEngineBuilder::new(
            Arc::new(catalog.clone()),
            Arc::new(MemorySessionStore::new()),
            Arc::new(MemoryCrashLog::new()),
        )
        .register_with_connector(nology.clone(), fast_config(), stub(&nology, &["N-1", "N-2"]))
        .register_with_connector(syntech.clone(), fast_config(), stub(&syntech, &["S-1"]))
        .register_with_connector(manual.clone(), fast_config(), stub(&manual, &["M-1"]))
        .build();

        let outcomes = engine.sync_all(&SyncOptions::default()).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
        assert_eq!(catalog.count(1).await.unwrap(), 2);
        assert_eq!(catalog.count(2).await.unwrap(), 1);
        assert_eq!(catalog.count(3).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn engine_guard_spans_all_registered_suppliers() {
        let catalog = MemoryCatalogStore::new();
        let nology = Supplier::new(1, "Nology", ConnectorType::Api);
        let manual = Supplier::new(2, "Manual Upload", ConnectorType::Manual);

        let engine = SyncEngineBuilder::new(
            Arc::new(catalog.clone()),
            Arc::new(MemorySessionStore::new()),
            Arc::new(MemoryCrashLog::new()),
        )
        .register_with_connector(nology.clone(), fast_config(), stub(&nology, &["SHARED"]))
        .register_with_connector(manual.clone(), fast_config(), stub(&manual, &["SHARED"]))
        .build();

        // Nology writes first; the manual orchestrator (invoked directly,
        // since sync-all skips it) must be refused by the guard.
        let nology_run = engine
            .orchestrator(1)
            .unwrap()
            .sync_products(SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(nology_run.stats.added, 1);

        let manual_run = engine
            .orchestrator(2)
            .unwrap()
            .sync_products(SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(manual_run.stats.skipped, 1);
        assert_eq!(manual_run.stats.added, 0);

        let stored = catalog.get_by_sku("SHARED").await.unwrap().unwrap();
        assert_eq!(stored.product.supplier_id, 1);
    }

    #[tokio::test]
    async fn lookup_by_supplier_id() {
        let nology = Supplier::new(1, "Nology", ConnectorType::Api);
        let engine = SyncEngineBuilder::new(
            Arc::new(MemoryCatalogStore::new()),
            Arc::new(MemorySessionStore::new()),
            Arc::new(MemoryCrashLog::new()),
        )
        .register_with_connector(nology.clone(), fast_config(), stub(&nology, &[]))
        .build();

        assert!(engine.orchestrator(1).is_some());
        assert!(engine.orchestrator(99).is_none());
        assert_eq!(engine.suppliers().len(), 1);
    }
}
