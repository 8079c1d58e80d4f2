//! Crash logging
//!
//! Records catastrophic, non-recoverable connector failures that occur
//! before a sync session can even be opened (bad credentials, the
//! automation engine refusing to start). Deliberately infallible from the
//! caller's perspective: a crash log that cannot be written is itself
//! logged and swallowed, never masking the original failure.

use std::sync::Arc;

use chrono::Utc;
use tracing::error;

use crate::domain::repositories::CrashLogStore;
use crate::domain::session::CrashLogEntry;

#[derive(Clone)]
pub struct CrashLogger {
    store: Arc<dyn CrashLogStore>,
}

impl CrashLogger {
    pub fn new(store: Arc<dyn CrashLogStore>) -> Self {
        Self { store }
    }

    pub async fn log_crash(
        &self,
        supplier_name: &str,
        error_type: &str,
        error_message: &str,
        stack_trace: Option<String>,
        context: Option<serde_json::Value>,
    ) {
        error!(
            "💥 Crash for supplier '{}' ({}): {}",
            supplier_name, error_type, error_message
        );

        let entry = CrashLogEntry {
            supplier_name: supplier_name.to_string(),
            error_type: error_type.to_string(),
            error_message: error_message.to_string(),
            stack_trace,
            context,
            created_at: Utc::now(),
        };

        if let Err(e) = self.store.log_crash(&entry).await {
            error!("Failed to persist crash log entry: {}", e);
        }
    }
}
