// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use super::{RemoteError, RemoteSession, SessionInfo};

/// Live remote sessions keyed by caller-chosen connection id.
///
/// At most one session exists per id. Mutations (`put`, `remove`,
/// `shutdown`) are serialized so disconnect-then-replace is atomic with
/// respect to each other; the map lock itself is only held while the map
/// is touched, never across a disconnect.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<RemoteSession>>>,
    mutate: tokio::sync::Mutex<()>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `session` under its id, disconnecting any previous entry first.
    pub async fn put(&self, session: Arc<RemoteSession>) {
        let _guard = self.mutate.lock().await;
        let id = session.id().to_owned();
        let previous = self.sessions.lock().remove(&id);
        if let Some(previous) = previous {
            info!(conn_id = %id, "replacing remote session");
            previous.disconnect().await;
        }
        self.sessions.lock().insert(id, session);
    }

    pub fn get(&self, id: &str) -> Result<Arc<RemoteSession>, RemoteError> {
        self.sessions
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteError::SessionNotFound(id.to_owned()))
    }

    /// Disconnect and drop the session registered under `id`.
    pub async fn remove(&self, id: &str) -> Result<(), RemoteError> {
        let _guard = self.mutate.lock().await;
        let removed = self.sessions.lock().remove(id);
        match removed {
            Some(session) => {
                session.disconnect().await;
                Ok(())
            }
            None => Err(RemoteError::SessionNotFound(id.to_owned())),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.lock().contains_key(id)
    }

    /// Snapshot of every registered session, ordered by id.
    pub fn list(&self) -> Vec<SessionInfo> {
        let sessions: Vec<Arc<RemoteSession>> = self.sessions.lock().values().cloned().collect();
        let mut infos: Vec<SessionInfo> = sessions.iter().map(|s| s.info()).collect();
        infos.sort_by(|a, b| a.conn_id.cmp(&b.conn_id));
        infos
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Disconnect and drop every session.
    pub async fn shutdown(&self) {
        let _guard = self.mutate.lock().await;
        let sessions: Vec<Arc<RemoteSession>> =
            self.sessions.lock().drain().map(|(_, session)| session).collect();
        let count = sessions.len();
        for session in sessions {
            session.disconnect().await;
        }
        if count > 0 {
            info!(count, "remote sessions closed");
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
