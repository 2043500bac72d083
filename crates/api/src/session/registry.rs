use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sketchflow_core::error::CoreError;
use sketchflow_core::types::{SessionId, Timestamp};
use tokio::sync::RwLock;

use crate::session::Session;
use crate::storage::ArtifactStore;

/// Owns every live [`Session`] and enforces the admission limit.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application. Lock order is always registry first,
/// then a session's own lock.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    max_active: usize,
    session_timeout: Duration,
    store: ArtifactStore,
}

impl SessionRegistry {
    pub fn new(max_active: usize, session_timeout: Duration, store: ArtifactStore) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_active,
            session_timeout,
            store,
        }
    }

    /// Admit a new session.
    ///
    /// Fails with [`CoreError::AdmissionRejected`] when the registry is at
    /// capacity and with [`CoreError::Validation`] if `id` is already taken.
    pub async fn create(&self, id: &str, style: &str) -> Result<Arc<Session>, CoreError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(id) {
            return Err(CoreError::Validation(format!("Session {id} already exists")));
        }
        self.admit(&mut sessions, id, style)
    }

    /// Return the existing session for `id`, or admit a new one.
    ///
    /// The boolean is `true` when the session was created by this call.
    pub async fn get_or_create(
        &self,
        id: &str,
        style: &str,
    ) -> Result<(Arc<Session>, bool), CoreError> {
        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(id) {
            return Ok((Arc::clone(existing), false));
        }
        self.admit(&mut sessions, id, style).map(|s| (s, true))
    }

    fn admit(
        &self,
        sessions: &mut HashMap<SessionId, Arc<Session>>,
        id: &str,
        style: &str,
    ) -> Result<Arc<Session>, CoreError> {
        if sessions.len() >= self.max_active {
            tracing::warn!(
                session_id = id,
                capacity = self.max_active,
                "Session admission rejected",
            );
            return Err(CoreError::AdmissionRejected {
                capacity: self.max_active,
            });
        }

        let session = Arc::new(Session::new(id.to_string(), style.to_string()));
        sessions.insert(id.to_string(), Arc::clone(&session));
        tracing::info!(session_id = id, active = sessions.len(), "Session created");
        Ok(session)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Remove a session, cancel its job, close its channel and delete its
    /// files. Returns `false` if no such session existed.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some(session) => {
                self.retire(&session, "Session closed").await;
                true
            }
            None => false,
        }
    }

    /// Remove every session idle for longer than the session timeout as of
    /// `now`, releasing their resources. Returns the removed ids.
    ///
    /// Expired sessions leave the map under one write lock, so a concurrent
    /// lookup either sees a session whole or not at all.
    pub async fn sweep_expired(&self, now: Timestamp) -> Vec<SessionId> {
        let timeout = chrono::Duration::from_std(self.session_timeout)
            .unwrap_or_else(|_| chrono::Duration::MAX);

        let expired: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write().await;
            let mut ids = Vec::new();
            for (id, session) in sessions.iter() {
                let last_update = session.state().await.last_update;
                if now.signed_duration_since(last_update) > timeout {
                    ids.push(id.clone());
                }
            }
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        let mut ids = Vec::with_capacity(expired.len());
        for session in expired {
            self.retire(&session, "Session expired").await;
            ids.push(session.id().to_string());
        }

        if !ids.is_empty() {
            tracing::info!(count = ids.len(), "Expired sessions removed");
        }
        ids
    }

    async fn retire(&self, session: &Session, reason: &'static str) {
        let artifacts = session.retire(reason).await;
        let deleted = self.store.delete_best_effort(session.id(), &artifacts).await;
        tracing::info!(
            session_id = session.id(),
            reason,
            files_deleted = deleted,
            "Session retired",
        );
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn ids(&self) -> Vec<SessionId> {
        self.sessions.read().await.keys().cloned().collect()
    }

    /// Snapshot of every live session.
    pub async fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Drain the registry: cancel every job and close every channel.
    ///
    /// Files are left on disk. Returns the number of sessions drained.
    pub async fn shutdown(&self) -> usize {
        let drained: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map(|(_, session)| session).collect()
        };
        for session in &drained {
            session.retire("Server shutting down").await;
        }
        tracing::info!(count = drained.len(), "Session registry drained");
        drained.len()
    }
}
