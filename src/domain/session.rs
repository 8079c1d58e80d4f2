//! Sync session bookkeeping
//!
//! A `SyncSession` is one audited execution of a sync for one supplier.
//! The live session is owned by the orchestrator for the run's lifetime;
//! the persisted row is append-only once a terminal status is written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a sync session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Running,
    Completed,
    /// A later page failed after retry exhaustion; earlier pages were kept.
    Partial,
    Failed,
    Cancelled,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "partial" => Ok(Self::Partial),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown sync status: {other}")),
        }
    }
}

/// Per-run record counters.
///
/// `skipped` counts authority-guard skips separately from `unchanged` so
/// loop-prevention stays observable in the audit trail.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionStats {
    pub added: u32,
    pub updated: u32,
    pub unchanged: u32,
    pub deactivated: u32,
    pub skipped: u32,
}

impl SessionStats {
    pub fn total_processed(&self) -> u32 {
        self.added + self.updated + self.unchanged + self.skipped
    }
}

/// One run of one supplier's sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSession {
    pub id: String,
    pub supplier_id: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: SyncStatus,
    pub stats: SessionStats,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub triggered_by: String,
}

impl SyncSession {
    pub fn new(supplier_id: i64, triggered_by: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            supplier_id,
            started_at: Utc::now(),
            completed_at: None,
            status: SyncStatus::Running,
            stats: SessionStats::default(),
            errors: Vec::new(),
            warnings: Vec::new(),
            triggered_by: triggered_by.into(),
        }
    }
}

/// Value returned to the caller of a sync run. Derived entirely from the
/// session; not separately persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    pub success: bool,
    pub session_id: String,
    pub stats: SessionStats,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(with = "duration_secs")]
    pub duration: std::time::Duration,
}

impl SyncResult {
    pub fn from_session(session: &SyncSession, duration: std::time::Duration) -> Self {
        Self {
            success: matches!(session.status, SyncStatus::Completed | SyncStatus::Partial),
            session_id: session.id.clone(),
            stats: session.stats,
            errors: session.errors.clone(),
            warnings: session.warnings.clone(),
            duration,
        }
    }
}

/// Catastrophic connector failure recorded outside session bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashLogEntry {
    pub supplier_name: String,
    pub error_type: String,
    pub error_message: String,
    pub stack_trace: Option<String>,
    pub context: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs_f64().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
