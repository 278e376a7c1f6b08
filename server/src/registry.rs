//! Bookkeeping for in-flight sessions.

use crate::connection::ConnHandle;
use log::info;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::Mutex;

/// Unique session identifier assigned on registration.
pub type SessionId = u64;

struct SessionEntry {
    players: [ConnHandle; 2],
    started_at: Instant,
}

/// Server-owned collection of active sessions.
///
/// Sessions register on creation and unregister on teardown; nothing else
/// reads the entries during a game. [`Registry::shutdown_all`] drains
/// whatever is left when the process stops.
#[derive(Default)]
pub struct Registry {
    sessions: Mutex<HashMap<SessionId, SessionEntry>>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new session and returns its identifier.
    pub async fn add(&self, players: [ConnHandle; 2]) -> SessionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut sessions = self.sessions.lock().await;
        sessions.insert(
            id,
            SessionEntry {
                players,
                started_at: Instant::now(),
            },
        );
        id
    }

    /// Unregisters a finished session. Returns false if it was already
    /// removed (shutdown may race a finishing game).
    pub async fn remove(&self, id: SessionId) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.remove(&id) {
            Some(entry) => {
                info!("Session {} finished after {:?}", id, entry.started_at.elapsed());
                true
            }
            None => false,
        }
    }

    /// Number of sessions currently in flight.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Closes every connection still attached to a live session. Used on
    /// process shutdown.
    pub async fn shutdown_all(&self) {
        let mut sessions = self.sessions.lock().await;
        for (id, entry) in sessions.drain() {
            info!("Closing session {}", id);
            for player in &entry.players {
                player.shutdown();
            }
        }
    }
}
