// SPDX-License-Identifier: MIT

//! Session-scoped conversation memory
//!
//! Conversations are the only state that crosses runs. Each session is a
//! caller-owned handle keyed by UUID; the store hands out history snapshots
//! and the caller appends turns after a successful run. No process-wide
//! singleton: create one store per server, drop it with the server.

use crate::workflow::state::Turn;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Vec<Turn>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Snapshot of a session's history; empty for unknown sessions
    pub async fn history(&self, id: &Uuid) -> Vec<Turn> {
        let sessions = self.sessions.read().await;
        sessions.get(id).cloned().unwrap_or_default()
    }

    /// Append turns to a session, creating it on first use
    pub async fn append(&self, id: Uuid, turns: Vec<Turn>) {
        let mut sessions = self.sessions.write().await;
        sessions.entry(id).or_default().extend(turns);
    }

    /// Drop a session; `true` if it existed
    pub async fn remove(&self, id: &Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions.remove(id).is_some()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
