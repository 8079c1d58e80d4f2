//! Application module - sync orchestration
//!
//! Drives one supplier's run through connector → transformer → authority
//! guard → catalog store, with session bookkeeping and crash logging, and
//! assembles per-supplier orchestrators into a sync-all engine.

pub mod crash_logger;
pub mod engine;
pub mod orchestrator;
pub mod session_tracker;

pub use crash_logger::CrashLogger;
pub use engine::{SupplierSyncOutcome, SyncEngine, SyncEngineBuilder};
pub use orchestrator::{RunLockRegistry, SyncError, SyncOptions, SyncOrchestrator};
pub use session_tracker::SessionTracker;
