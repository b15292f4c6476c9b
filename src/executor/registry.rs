//! Live session registry
//!
//! Shared map from cell id to its running session. Entries are registered at
//! spawn and removed by the session's own supervisor, so the registry only
//! ever holds sessions whose process is still being driven.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use super::session::ExecutionSession;
use super::types::SessionSnapshot;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<ExecutionSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under its cell id, returning any session the id
    /// previously mapped to
    pub async fn register(&self, session: Arc<ExecutionSession>) -> Option<Arc<ExecutionSession>> {
        let prior = self
            .sessions
            .write()
            .await
            .insert(session.cell_id().to_string(), session);
        if prior.is_some() {
            debug!("Replaced existing session registration");
        }
        prior
    }

    pub async fn lookup(&self, cell_id: &str) -> Option<Arc<ExecutionSession>> {
        self.sessions.read().await.get(cell_id).cloned()
    }

    /// Remove and return the session registered under `cell_id`
    pub async fn remove(&self, cell_id: &str) -> Option<Arc<ExecutionSession>> {
        self.sessions.write().await.remove(cell_id)
    }

    /// Remove the entry for `cell_id` only if it still points at `session`
    ///
    /// A cell re-executed while its old process winds down re-registers the
    /// id; the old supervisor's cleanup must not evict the new session.
    pub async fn remove_if_same(&self, cell_id: &str, session: &Arc<ExecutionSession>) {
        let mut sessions = self.sessions.write().await;
        if let Some(current) = sessions.get(cell_id) {
            if Arc::ptr_eq(current, session) {
                sessions.remove(cell_id);
            }
        }
    }

    /// Request termination of one session. Returns whether a live session
    /// was found; the kill itself completes asynchronously.
    pub async fn terminate_one(&self, cell_id: &str) -> bool {
        match self.lookup(cell_id).await {
            Some(session) => {
                debug!(cell_id = %cell_id, "Requesting session termination");
                session.request_termination();
                true
            }
            None => false,
        }
    }

    /// Request termination of every live session, fire-and-forget
    pub async fn terminate_all(&self) {
        let sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        if sessions.is_empty() {
            return;
        }
        debug!(count = sessions.len(), "Requesting termination of all sessions");
        for session in sessions {
            session.request_termination();
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Point-in-time view of every live session
    pub async fn snapshots(&self) -> Vec<SessionSnapshot> {
        let sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(sessions.len());
        for session in sessions {
            out.push(session.snapshot().await);
        }
        out
    }
}
