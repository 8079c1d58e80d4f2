//! # Sync Orchestrator
//!
//! Drives one supplier's sync run: acquires the per-supplier run lock,
//! opens an audit session, loops the connector's pages, pushes every raw
//! record through transform → authority guard → upsert, and closes the
//! session with a terminal status. Nothing propagates uncaught past this
//! surface - callers always receive a `SyncResult` or a typed error.
//!
//! Failure semantics: a single record's transform failure is a warning;
//! a page that exhausts its retry budget fails the run on page one and
//! downgrades it to `partial` afterwards; connector construction errors
//! (bad credentials, engine unavailable) bypass session bookkeeping and
//! land in the crash log.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::crash_logger::CrashLogger;
use crate::application::session_tracker::SessionTracker;
use crate::domain::authority::{AuthorityGuard, WriteDecision};
use crate::domain::product::{normalize_sku, UnifiedProduct};
use crate::domain::repositories::{CatalogStore, CrashLogStore, SessionStore, StoredProduct};
use crate::domain::session::{SyncResult, SyncSession, SyncStatus};
use crate::domain::supplier::{Supplier, SupplierStatus};
use crate::infrastructure::config::SupplierConfig;
use crate::infrastructure::connectors::{build_connector, Connector, ConnectorError};
use crate::infrastructure::pagination::PageWalker;
use crate::infrastructure::store::dry_run::DryRunStore;
use crate::infrastructure::transform::{TransformProfile, Transformer};

/// Options for one sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Stop after this many records.
    pub limit: Option<usize>,
    /// Deactivate records whose natural key was not seen this run.
    pub full_sync: bool,
    /// Perform all read/transform/decision steps but suppress writes.
    pub dry_run: bool,
    /// Actor label recorded on the audit session.
    pub session_name: Option<String>,
}

/// Errors surfaced to sync callers. Everything else is folded into the
/// returned `SyncResult`.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("a sync is already running for supplier '{0}'")]
    AlreadyRunning(String),

    #[error("supplier '{0}' is inactive")]
    SupplierInactive(String),

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error("session store error: {0}")]
    SessionStore(#[source] anyhow::Error),
}

/// Per-supplier run locks. A single supplier must never have two syncs
/// running concurrently; different suppliers run freely in parallel.
#[derive(Debug, Default, Clone)]
pub struct RunLockRegistry {
    running: Arc<Mutex<HashSet<i64>>>,
}

impl RunLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_acquire(&self, supplier_id: i64) -> Option<RunLockGuard> {
        let mut running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !running.insert(supplier_id) {
            return None;
        }
        Some(RunLockGuard {
            running: Arc::clone(&self.running),
            supplier_id,
        })
    }
}

struct RunLockGuard {
    running: Arc<Mutex<HashSet<i64>>>,
    supplier_id: i64,
}

impl Drop for RunLockGuard {
    fn drop(&mut self) {
        let mut running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        running.remove(&self.supplier_id);
    }
}

/// Supplier fields the orchestrator mutates after each run.
#[derive(Debug, Clone)]
struct RunState {
    status: String,
    error_message: Option<String>,
    last_sync: Option<DateTime<Utc>>,
}

enum RecordOutcome {
    Added(String),
    Updated(String),
    Unchanged(String),
    Skipped(String),
    Warning(String),
    StoreError(String),
}

pub struct SyncOrchestrator {
    supplier: Supplier,
    config: SupplierConfig,
    catalog: Arc<dyn CatalogStore>,
    sessions: SessionTracker,
    crash_logger: CrashLogger,
    guard: Arc<AuthorityGuard>,
    locks: RunLockRegistry,
    cancel: CancellationToken,
    connector_override: Option<Arc<dyn Connector>>,
    state: Mutex<RunState>,
}

impl SyncOrchestrator {
    pub fn new(
        supplier: Supplier,
        config: SupplierConfig,
        catalog: Arc<dyn CatalogStore>,
        session_store: Arc<dyn SessionStore>,
        crash_store: Arc<dyn CrashLogStore>,
        guard: AuthorityGuard,
    ) -> Self {
        let state = RunState {
            status: supplier.status.clone(),
            error_message: supplier.error_message.clone(),
            last_sync: supplier.last_sync,
        };
        Self {
            supplier,
            config,
            catalog,
            sessions: SessionTracker::new(session_store),
            crash_logger: CrashLogger::new(crash_store),
            guard: Arc::new(guard),
            locks: RunLockRegistry::new(),
            cancel: CancellationToken::new(),
            connector_override: None,
            state: Mutex::new(state),
        }
    }

    /// Share a lock registry across orchestrators (one per process is the
    /// normal deployment shape).
    pub fn with_lock_registry(mut self, locks: RunLockRegistry) -> Self {
        self.locks = locks;
        self
    }

    /// Inject a pre-built connector instead of constructing one from
    /// configuration. Used by embedders and tests.
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector_override = Some(connector);
        self
    }

    /// Token checked between pages; cancelling it transitions the running
    /// session to `cancelled` after in-flight record work completes.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn get_supplier_info(&self) -> Supplier {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Supplier {
            status: state.status.clone(),
            error_message: state.error_message.clone(),
            last_sync: state.last_sync,
            ..self.supplier.clone()
        }
    }

    pub async fn get_status(&self) -> anyhow::Result<SupplierStatus> {
        let total_products = self.catalog.count(self.supplier.id).await?;
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(SupplierStatus {
            supplier_name: self.supplier.name.clone(),
            last_sync: state.last_sync,
            total_products,
            status: state.status.clone(),
            error_message: state.error_message.clone(),
        })
    }

    /// Cheapest possible connectivity check. Network failures return
    /// `Ok(false)`; configuration errors fail fast.
    pub async fn test_connection(&self) -> Result<bool, ConnectorError> {
        self.connector()?.test_connection().await
    }

    fn connector(&self) -> Result<Arc<dyn Connector>, ConnectorError> {
        if let Some(connector) = &self.connector_override {
            return Ok(Arc::clone(connector));
        }
        build_connector(&self.supplier, &self.config)
    }

    /// Run one sync for this supplier.
    pub async fn sync_products(&self, options: SyncOptions) -> Result<SyncResult, SyncError> {
        if !self.supplier.active {
            return Err(SyncError::SupplierInactive(self.supplier.name.clone()));
        }
        let Some(_lock) = self.locks.try_acquire(self.supplier.id) else {
            return Err(SyncError::AlreadyRunning(self.supplier.name.clone()));
        };
        let started = Instant::now();

        // Connector construction failures precede any session work and go
        // to the crash log instead.
        let connector = match self.connector() {
            Ok(connector) => connector,
            Err(e) => {
                let error_type = match &e {
                    ConnectorError::EngineUnavailable(_) => "engine_unavailable",
                    ConnectorError::Configuration(_) => "configuration",
                    _ => "connector_init",
                };
                self.crash_logger
                    .log_crash(
                        &self.supplier.name,
                        error_type,
                        &e.to_string(),
                        None,
                        Some(serde_json::json!({
                            "supplier_id": self.supplier.id,
                            "connector_type": self.supplier.connector_type.as_str(),
                        })),
                    )
                    .await;
                return Err(e.into());
            }
        };

        let catalog: Arc<dyn CatalogStore> = if options.dry_run {
            Arc::new(DryRunStore::new(Arc::clone(&self.catalog)))
        } else {
            Arc::clone(&self.catalog)
        };

        let triggered_by = options
            .session_name
            .clone()
            .unwrap_or_else(|| "scheduler".to_string());
        let mut session = self
            .sessions
            .create_session(self.supplier.id, &triggered_by)
            .await
            .map_err(SyncError::SessionStore)?;

        info!(
            "🔄 Starting {}sync for supplier '{}'",
            if options.dry_run { "dry-run " } else { "" },
            self.supplier.name
        );

        let transformer = Transformer::new(
            &self.supplier,
            TransformProfile::from_config(&self.config),
        );
        let mut walker = PageWalker::new(
            connector.as_ref(),
            self.config.pager_config(),
            self.config.pagination,
        );

        let mut seen_keys: HashSet<String> = HashSet::new();
        let mut records_processed: usize = 0;
        let mut pages_ok: u32 = 0;
        let mut terminal = SyncStatus::Completed;

        loop {
            if self.cancel.is_cancelled() {
                info!("Sync cancelled for supplier '{}'", self.supplier.name);
                terminal = SyncStatus::Cancelled;
                break;
            }
            if options.limit.is_some_and(|limit| records_processed >= limit) {
                break;
            }

            match walker.next_page().await {
                Ok(Some(mut records)) => {
                    if let Some(limit) = options.limit {
                        let remaining = limit - records_processed;
                        if records.len() > remaining {
                            records.truncate(remaining);
                        }
                    }
                    records_processed += records.len();
                    pages_ok += 1;
                    self.process_batch(records, &transformer, &catalog, &mut session, &mut seen_keys)
                        .await;
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(
                        "Page fetch failed during sync of '{}': {}",
                        self.supplier.name, err
                    );
                    session.errors.push(err.to_string());
                    // Nothing collected yet means the run failed outright;
                    // anything after page one closes out with what we have.
                    terminal = if pages_ok == 0 {
                        SyncStatus::Failed
                    } else {
                        SyncStatus::Partial
                    };
                    break;
                }
            }
        }

        if options.full_sync && terminal == SyncStatus::Completed {
            match catalog
                .deactivate_missing(self.supplier.id, &seen_keys)
                .await
            {
                Ok(count) => session.stats.deactivated = count as u32,
                Err(e) => session.errors.push(format!("deactivation failed: {e}")),
            }
        }

        let close_result = match terminal {
            SyncStatus::Failed => {
                let error = session
                    .errors
                    .last()
                    .cloned()
                    .unwrap_or_else(|| "sync failed".to_string());
                self.sessions.fail_session(&mut session, error).await
            }
            status => self.sessions.complete_session(&mut session, status).await,
        };
        if let Err(e) = close_result {
            warn!("Failed to persist session close-out: {}", e);
        }

        self.update_supplier_after_run(&catalog, terminal, &session)
            .await;

        let result = SyncResult::from_session(&session, started.elapsed());
        info!(
            "Sync for '{}' finished as {} in {:.1}s (added={}, updated={}, unchanged={}, skipped={}, warnings={})",
            self.supplier.name,
            terminal,
            result.duration.as_secs_f64(),
            result.stats.added,
            result.stats.updated,
            result.stats.unchanged,
            result.stats.skipped,
            result.warnings.len()
        );
        Ok(result)
    }

    /// Transform, guard, and upsert one page of records with a small
    /// bounded worker pool; records are independent, the catalog store's
    /// rate limits are not.
    async fn process_batch(
        &self,
        records: Vec<Value>,
        transformer: &Transformer,
        catalog: &Arc<dyn CatalogStore>,
        session: &mut SyncSession,
        seen_keys: &mut HashSet<String>,
    ) {
        let concurrency = self.config.record_concurrency.max(1);
        let supplier = &self.supplier;
        let guard = self.guard.as_ref();

        let outcomes: Vec<RecordOutcome> = stream::iter(records)
            .map(|raw| {
                let catalog = Arc::clone(catalog);
                async move { process_record(raw, transformer, guard, supplier, catalog).await }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                RecordOutcome::Added(key) => {
                    session.stats.added += 1;
                    seen_keys.insert(key);
                }
                RecordOutcome::Updated(key) => {
                    session.stats.updated += 1;
                    seen_keys.insert(key);
                }
                RecordOutcome::Unchanged(key) => {
                    session.stats.unchanged += 1;
                    seen_keys.insert(key);
                }
                RecordOutcome::Skipped(key) => {
                    session.stats.skipped += 1;
                    seen_keys.insert(key);
                }
                RecordOutcome::Warning(message) => session.warnings.push(message),
                RecordOutcome::StoreError(message) => session.errors.push(message),
            }
        }
    }

    async fn update_supplier_after_run(
        &self,
        catalog: &Arc<dyn CatalogStore>,
        terminal: SyncStatus,
        session: &SyncSession,
    ) {
        let last_error = session.errors.last().map(String::as_str);
        if let Err(e) = catalog
            .update_supplier_status(self.supplier.id, terminal.as_str(), last_error)
            .await
        {
            warn!("Failed to update supplier status: {}", e);
        }
        if matches!(terminal, SyncStatus::Completed | SyncStatus::Partial) {
            if let Err(e) = catalog.update_supplier_last_sync(self.supplier.id).await {
                warn!("Failed to update supplier last_sync: {}", e);
            }
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.status = terminal.as_str().to_string();
        state.error_message = session.errors.last().cloned();
        if matches!(terminal, SyncStatus::Completed | SyncStatus::Partial) {
            state.last_sync = Some(Utc::now());
        }
    }
}

async fn process_record(
    raw: Value,
    transformer: &Transformer,
    guard: &AuthorityGuard,
    supplier: &Supplier,
    catalog: Arc<dyn CatalogStore>,
) -> RecordOutcome {
    let product = match transformer.transform(&raw) {
        Ok(product) => product,
        Err(e) => return RecordOutcome::Warning(format!("record skipped: {e}")),
    };
    let Some(key) = product.natural_key() else {
        return RecordOutcome::Warning(format!(
            "record '{}' skipped: no usable SKU",
            product.name
        ));
    };

    let existing = match find_existing(catalog.as_ref(), &product).await {
        Ok(existing) => existing,
        Err(e) => return RecordOutcome::StoreError(format!("lookup failed for '{key}': {e}")),
    };

    if guard.decide(existing.as_ref(), supplier) == WriteDecision::Skip {
        debug!(
            "Authority guard skipped '{}' from '{}' (existing record outranks it)",
            key, supplier.name
        );
        return RecordOutcome::Skipped(key);
    }

    if let Some(existing) = &existing {
        if existing.product.fingerprint() == product.fingerprint() {
            return RecordOutcome::Unchanged(key);
        }
    }

    match catalog.upsert(&product).await {
        Ok(outcome) if outcome.is_new => RecordOutcome::Added(key),
        Ok(_) => RecordOutcome::Updated(key),
        Err(e) => RecordOutcome::StoreError(format!("upsert failed for '{key}': {e}")),
    }
}

/// Resolve the record the authority guard should judge: the supplier's
/// own row first, then the canonical row for the catalog SKU regardless
/// of which supplier wrote it.
async fn find_existing(
    catalog: &dyn CatalogStore,
    product: &UnifiedProduct,
) -> anyhow::Result<Option<StoredProduct>> {
    if let Some(key) = product
        .supplier_sku
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        if let Some(found) = catalog.get_by_supplier_sku(product.supplier_id, key).await? {
            return Ok(Some(found));
        }
    }
    if let Some(sku) = product.sku.as_deref() {
        return catalog.get_by_sku(&normalize_sku(sku)).await;
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_lock_rejects_concurrent_acquisition() {
        let registry = RunLockRegistry::new();

        let first = registry.try_acquire(1);
        assert!(first.is_some());
        assert!(registry.try_acquire(1).is_none());

        // Different suppliers are independent.
        assert!(registry.try_acquire(2).is_some());

        drop(first);
        assert!(registry.try_acquire(1).is_some());
    }
}
