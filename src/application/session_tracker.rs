//! Session tracking
//!
//! Owns the create/complete/fail lifecycle of audit sessions against the
//! session store. Terminal transitions are one-shot: a session that has
//! already completed ignores further transition calls, so double
//! close-outs during error handling cannot corrupt the audit trail.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::domain::repositories::SessionStore;
use crate::domain::session::{SyncSession, SyncStatus};

#[derive(Clone)]
pub struct SessionTracker {
    store: Arc<dyn SessionStore>,
}

impl SessionTracker {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Open a new session in `running` state and persist it.
    pub async fn create_session(
        &self,
        supplier_id: i64,
        triggered_by: &str,
    ) -> Result<SyncSession> {
        let session = SyncSession::new(supplier_id, triggered_by);
        self.store.create_session(&session).await?;
        info!(
            "Started sync session {} for supplier {}",
            session.id, supplier_id
        );
        Ok(session)
    }

    /// Close the session with a terminal status. Idempotent: a session
    /// that already holds a terminal status is left untouched.
    pub async fn complete_session(
        &self,
        session: &mut SyncSession,
        status: SyncStatus,
    ) -> Result<()> {
        if session.completed_at.is_some() {
            warn!(
                "Session {} already closed with status {}; ignoring {}",
                session.id, session.status, status
            );
            return Ok(());
        }
        session.status = status;
        session.completed_at = Some(Utc::now());
        self.store.complete_session(session).await?;
        info!(
            "Closed sync session {} as {} (added={}, updated={}, unchanged={}, skipped={}, deactivated={})",
            session.id,
            status,
            session.stats.added,
            session.stats.updated,
            session.stats.unchanged,
            session.stats.skipped,
            session.stats.deactivated
        );
        Ok(())
    }

    /// Close the session as `failed`, recording the fatal error.
    pub async fn fail_session(&self, session: &mut SyncSession, error: String) -> Result<()> {
        if session.completed_at.is_some() {
            warn!(
                "Session {} already closed with status {}; ignoring failure",
                session.id, session.status
            );
            return Ok(());
        }
        if !session.errors.iter().any(|e| *e == error) {
            session.errors.push(error.clone());
        }
        session.status = SyncStatus::Failed;
        session.completed_at = Some(Utc::now());
        self.store
            .fail_session(&session.id, session.stats, &error)
            .await?;
        warn!("Sync session {} failed: {}", session.id, error);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::store::memory::MemorySessionStore;

    #[tokio::test]
    async fn terminal_transitions_are_one_shot() {
        let store = MemorySessionStore::new();
        let tracker = SessionTracker::new(Arc::new(store.clone()));

        let mut session = tracker.create_session(1, "test").await.unwrap();
        tracker
            .complete_session(&mut session, SyncStatus::Completed)
            .await
            .unwrap();

        // A second close-out must not overwrite the terminal state.
        tracker
            .fail_session(&mut session, "late failure".to_string())
            .await
            .unwrap();

        let persisted = store.session(&session.id).await.unwrap();
        assert_eq!(persisted.status, SyncStatus::Completed);
        assert!(persisted.errors.is_empty());
    }

    #[tokio::test]
    async fn fail_session_records_the_error() {
        let store = MemorySessionStore::new();
        let tracker = SessionTracker::new(Arc::new(store.clone()));

        let mut session = tracker.create_session(1, "test").await.unwrap();
        tracker
            .fail_session(&mut session, "page 1 failed".to_string())
            .await
            .unwrap();

        let persisted = store.session(&session.id).await.unwrap();
        assert_eq!(persisted.status, SyncStatus::Failed);
        assert_eq!(persisted.errors, vec!["page 1 failed".to_string()]);
        assert!(persisted.completed_at.is_some());
    }
}
