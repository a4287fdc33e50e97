use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::websocket::OutboundMessage;

use super::stats::{ConnectionInfo, ConnectionStats};
use super::types::ConnectionHandle;

/// Tracks every live connection and the process-wide connection count
pub struct ConnectionManager {
    /// connection_id -> ConnectionHandle
    connections: DashMap<Uuid, Arc<ConnectionHandle>>,
    /// Incremented on register, decremented on unregister of a known id
    connected: AtomicUsize,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            connected: AtomicUsize::new(0),
        }
    }

    /// Register a new connection, returning its handle and the new total
    pub fn register(&self, sender: mpsc::Sender<OutboundMessage>) -> (Arc<ConnectionHandle>, usize) {
        let handle = Arc::new(ConnectionHandle::new(sender));
        let total = self.register_handle(handle.clone());
        (handle, total)
    }

    /// Register an already created handle, returning the new total.
    ///
    /// Frames queued on the handle beforehand reach the client ahead of any
    /// broadcast issued after registration.
    pub fn register_handle(&self, handle: Arc<ConnectionHandle>) -> usize {
        let conn_id = handle.id;

        self.connections.insert(conn_id, handle.clone());
        let total = self.connected.fetch_add(1, Ordering::SeqCst) + 1;

        tracing::info!(connection_id = %conn_id, total = total, "Connection registered");

        total
    }

    /// Unregister a connection, returning the new total if it was registered
    pub fn unregister(&self, connection_id: Uuid) -> Option<usize> {
        self.connections.remove(&connection_id)?;
        let total = self.connected.fetch_sub(1, Ordering::SeqCst) - 1;

        tracing::info!(connection_id = %connection_id, total = total, "Connection unregistered");

        Some(total)
    }

    /// Current connection count
    pub fn count(&self) -> usize {
        self.connected.load(Ordering::SeqCst)
    }

    /// Get all connections
    pub fn get_all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.iter().map(|r| r.value().clone()).collect()
    }

    /// Get connection by ID
    pub fn get_connection(&self, connection_id: Uuid) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(&connection_id).map(|h| h.clone())
    }

    pub fn list_connections(&self) -> Vec<ConnectionInfo> {
        self.connections
            .iter()
            .map(|entry| {
                let handle = entry.value();
                ConnectionInfo {
                    id: handle.id,
                    connected_at: handle.connected_at,
                    last_activity: handle.last_activity(),
                }
            })
            .collect()
    }

    /// Get statistics
    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            total_connections: self.count(),
            oldest_connected_at: self
                .connections
                .iter()
                .map(|entry| entry.value().connected_at)
                .min(),
        }
    }

    /// Find connections that have been silent for longer than the timeout
    pub fn find_stale_connections(&self, timeout_secs: u64) -> Vec<Arc<ConnectionHandle>> {
        let now = Utc::now();
        let timeout = chrono::Duration::seconds(timeout_secs as i64);

        self.connections
            .iter()
            .filter(|entry| now.signed_duration_since(entry.value().last_activity()) > timeout)
            .map(|entry| entry.value().clone())
            .collect()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
