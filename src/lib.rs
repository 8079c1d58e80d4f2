//! Supplier Synchronization Engine
//!
//! Ingests product catalogs from heterogeneous upstream sources (vendor
//! REST APIs, JSON/XML feeds, rendered category pages) and merges them into
//! one canonical catalog. Per supplier, a sync run fetches raw records
//! through a pluggable connector, normalizes pricing and schema, consults
//! an authority guard before overwriting canonical records, and persists
//! through the catalog store contract while keeping an auditable session
//! trail.

// Module declarations
pub mod domain;
pub mod application;
pub mod infrastructure;

// Re-export the types most embedders need
pub use application::orchestrator::{SyncOptions, SyncOrchestrator};
pub use domain::product::UnifiedProduct;
pub use domain::session::{SyncResult, SyncStatus};
pub use domain::supplier::{ConnectorType, Supplier};
