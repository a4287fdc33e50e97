//! Graceful shutdown for the relay.
//!
//! Upgraded WebSocket connections outlive the HTTP server's own graceful
//! shutdown, so they are closed here explicitly:
//! 1. Signal background tasks to stop
//! 2. Ask every connection's send task to close its socket
//! 3. Wait, bounded, for the registry to empty

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::connection_manager::ConnectionManager;

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time allowed for queueing close requests (default: 5 seconds)
    pub close_request_timeout: Duration,
    /// Time to wait for connections to unregister (default: 10 seconds)
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            close_request_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(10),
        }
    }
}

pub struct GracefulShutdown {
    connection_manager: Arc<ConnectionManager>,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(connection_manager: Arc<ConnectionManager>, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self::with_config(connection_manager, shutdown_tx, ShutdownConfig::default())
    }

    pub fn with_config(
        connection_manager: Arc<ConnectionManager>,
        shutdown_tx: broadcast::Sender<()>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            connection_manager,
            shutdown_tx,
            config,
        }
    }

    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(total_connections = self.connection_manager.count())
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = std::time::Instant::now();
        let mut result = ShutdownResult::default();

        tracing::info!(reason = %reason, "Starting graceful shutdown");
        let _ = self.shutdown_tx.send(());

        result.close_requested = self.request_close().await;
        result.connections_closed = self.wait_for_connections_to_close().await;
        result.remaining = self.connection_manager.count();
        result.duration = start.elapsed();

        tracing::info!(
            close_requested = result.close_requested,
            connections_closed = result.connections_closed,
            remaining = result.remaining,
            duration_ms = result.duration.as_millis() as u64,
            "Graceful shutdown completed"
        );

        result
    }

    async fn request_close(&self) -> usize {
        let connections = self.connection_manager.get_all_connections();
        if connections.is_empty() {
            return 0;
        }

        let mut pending: FuturesUnordered<_> = connections
            .into_iter()
            .map(|conn| async move {
                match conn.close().await {
                    Ok(()) => true,
                    Err(_) => {
                        tracing::debug!(connection_id = %conn.id, "Connection already gone");
                        false
                    }
                }
            })
            .collect();

        let mut requested = 0;
        let collect = async {
            while let Some(ok) = pending.next().await {
                if ok {
                    requested += 1;
                }
            }
        };
        let _ = timeout(self.config.close_request_timeout, collect).await;

        requested
    }

    async fn wait_for_connections_to_close(&self) -> usize {
        let initial = self.connection_manager.count();
        if initial == 0 {
            return 0;
        }

        let drain = async {
            while self.connection_manager.count() > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };

        if timeout(self.config.drain_timeout, drain).await.is_err() {
            tracing::warn!(
                remaining_connections = self.connection_manager.count(),
                "Some connections did not close gracefully"
            );
        }

        initial.saturating_sub(self.connection_manager.count())
    }
}

/// Outcome of a graceful shutdown
#[derive(Debug, Default)]
pub struct ShutdownResult {
    pub close_requested: usize,
    pub connections_closed: usize,
    pub remaining: usize,
    pub duration: Duration,
}
