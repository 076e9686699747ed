//! Connection registry: the one shared table of live connections.
//!
//! Writes (register, remove) take the write lock briefly. Removal flips the
//! connection to `Closed` and erases it under the same lock, so a snapshot
//! taken under the read lock never contains a `Closed` entry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use pgcast_core::ClientId;
use tokio::sync::mpsc;
use tracing::debug;

use super::connection::{ClientConnection, ConnectionEvent, ConnectionState};

pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ClientId, Arc<ClientConnection>>>,
    default_channel: String,
}

impl ConnectionRegistry {
    pub fn new(default_channel: impl Into<String>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            default_channel: default_channel.into(),
        }
    }

    pub fn default_channel(&self) -> &str {
        &self.default_channel
    }

    /// Insert a fresh `Connecting` entry with a new identity.
    pub fn register(&self, tx: mpsc::Sender<Arc<str>>) -> Arc<ClientConnection> {
        let conn = Arc::new(ClientConnection::new(
            ClientId::new(),
            self.default_channel.as_str(),
            tx,
        ));
        let _ = self
            .connections
            .write()
            .insert(conn.id.clone(), Arc::clone(&conn));
        debug!(client_id = %conn.id, "connection registered");
        conn
    }

    /// `Connecting -> Open`. Returns `false` if the entry is gone or was
    /// not moved to `Open`.
    pub fn mark_open(&self, id: &ClientId) -> bool {
        let map = self.connections.read();
        map.get(id)
            .is_some_and(|c| c.apply(ConnectionEvent::HandshakeQueued) == ConnectionState::Open)
    }

    /// Record the channel a client subscribed to. Returns `false` if unknown.
    pub fn update_subscription(&self, id: &ClientId, channel: &str) -> bool {
        let map = self.connections.read();
        match map.get(id) {
            Some(conn) => {
                conn.set_subscription(channel);
                true
            }
            None => false,
        }
    }

    /// Mark `Closed` and erase. Idempotent: returns `true` only for the call
    /// that actually removed the entry.
    pub fn remove(&self, id: &ClientId) -> bool {
        let mut map = self.connections.write();
        match map.remove(id) {
            Some(conn) => {
                conn.terminate();
                debug!(client_id = %id, remaining = map.len(), "connection removed");
                true
            }
            None => false,
        }
    }

    /// Point-in-time copy of the `Open` connections.
    pub fn snapshot_open(&self) -> Vec<Arc<ClientConnection>> {
        self.connections
            .read()
            .values()
            .filter(|c| c.is_open())
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &ClientId) -> Option<Arc<ClientConnection>> {
        self.connections.read().get(id).cloned()
    }

    pub fn subscription(&self, id: &ClientId) -> Option<String> {
        self.connections
            .read()
            .get(id)
            .map(|c| c.subscribed_channel())
    }

    /// Entries in any state.
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    pub fn open_count(&self) -> usize {
        self.connections
            .read()
            .values()
            .filter(|c| c.is_open())
            .count()
    }

    /// Ask every connection to close. Sessions remove themselves once their
    /// writer has sent the Close frame.
    pub fn close_all(&self) -> usize {
        let conns: Vec<_> = self.connections.read().values().cloned().collect();
        for conn in &conns {
            conn.request_close();
        }
        conns.len()
    }
}
