//! Reference implementations of the store contracts
//!
//! The engine only ever depends on the traits in `domain::repositories`;
//! these modules provide a SQLite-backed store, an in-memory store for
//! tests and embedding, and the dry-run decorator.

pub mod dry_run;
pub mod memory;
pub mod sqlite;

pub use dry_run::DryRunStore;
pub use memory::{MemoryCatalogStore, MemoryCrashLog, MemorySessionStore};
pub use sqlite::{SqliteCatalogStore, SqliteCrashLog, SqliteSessionStore};
