use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::timeout;

use crate::config::WebSocketConfig;
use crate::connection_manager::ConnectionManager;
use crate::metrics::LivenessMetrics;
use crate::websocket::OutboundMessage;

/// Timeout for queueing a close request on a stuck connection
const CLOSE_SEND_TIMEOUT_MS: u64 = 1000;

/// Background task for transport pings and idle-connection cleanup.
///
/// Pings are WebSocket control frames, invisible to the event protocol.
/// Closing an idle connection goes through its send task, so the usual
/// disconnect announcement still happens.
pub struct HeartbeatTask {
    config: WebSocketConfig,
    connection_manager: Arc<ConnectionManager>,
    shutdown: broadcast::Receiver<()>,
}

impl HeartbeatTask {
    pub fn new(
        config: WebSocketConfig,
        connection_manager: Arc<ConnectionManager>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            connection_manager,
            shutdown,
        }
    }

    /// Run until the shutdown signal fires
    pub async fn run(mut self) {
        let mut heartbeat_timer = tokio::time::interval(self.config.heartbeat_interval());
        let mut cleanup_timer = tokio::time::interval(self.config.cleanup_interval());
        let connection_timeout = self.config.connection_timeout;

        // Skip immediate first tick
        heartbeat_timer.tick().await;
        cleanup_timer.tick().await;

        tracing::info!(
            heartbeat_interval_secs = self.config.heartbeat_interval,
            cleanup_interval_secs = self.config.cleanup_interval,
            connection_timeout_secs = connection_timeout,
            "Heartbeat task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Heartbeat task received shutdown signal");
                    break;
                }
                _ = heartbeat_timer.tick() => {
                    self.send_pings();
                }
                _ = cleanup_timer.tick() => {
                    self.close_idle_connections(connection_timeout).await;
                }
            }
        }

        tracing::info!("Heartbeat task stopped");
    }

    /// Queue a ping on every connection without waiting on any of them
    fn send_pings(&self) -> usize {
        let start = Instant::now();
        let connections = self.connection_manager.get_all_connections();
        let mut sent = 0;
        let mut skipped = 0;

        for handle in &connections {
            match handle.try_send(OutboundMessage::Ping) {
                Ok(()) => sent += 1,
                Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => skipped += 1,
            }
        }

        LivenessMetrics::record_pings(sent);
        if !connections.is_empty() {
            tracing::debug!(
                total = connections.len(),
                sent = sent,
                skipped = skipped,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Ping round completed"
            );
        }

        sent
    }

    /// Ask idle connections to close and return how many were asked
    async fn close_idle_connections(&self, timeout_secs: u64) -> usize {
        let stale = self.connection_manager.find_stale_connections(timeout_secs);

        for handle in &stale {
            tracing::info!(connection_id = %handle.id, "Closing connection after inactivity timeout");
            if timeout(Duration::from_millis(CLOSE_SEND_TIMEOUT_MS), handle.close())
                .await
                .is_err()
            {
                tracing::warn!(connection_id = %handle.id, "Close request timed out");
            }
        }

        if !stale.is_empty() {
            LivenessMetrics::record_idle_closed(stale.len());
            tracing::info!(
                closed = stale.len(),
                timeout_secs = timeout_secs,
                "Closed idle connections"
            );
        }

        stale.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_heartbeat_task_shutdown() {
        let config = WebSocketConfig::default();
        let connection_manager = Arc::new(ConnectionManager::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = HeartbeatTask::new(config, connection_manager, shutdown_rx);

        let handle = tokio::spawn(async move {
            task.run().await;
        });

        // Wait a bit then send shutdown
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Task should complete")
            .expect("Task should not panic");
    }

    #[tokio::test]
    async fn test_heartbeat_pings_connections() {
        let config = WebSocketConfig {
            heartbeat_interval: 1,
            connection_timeout: 60,
            cleanup_interval: 60,
            ..Default::default()
        };
        let connection_manager = Arc::new(ConnectionManager::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let (tx, mut rx) = mpsc::channel::<OutboundMessage>(10);
        let _handle = connection_manager.register(tx);

        let task = HeartbeatTask::new(config, connection_manager, shutdown_rx);
        let task_handle = tokio::spawn(async move {
            task.run().await;
        });

        let msg = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("Should receive ping")
            .expect("Channel should not be closed");
        assert!(matches!(msg, OutboundMessage::Ping));

        shutdown_tx.send(()).unwrap();
        let _ = task_handle.await;
    }

    #[tokio::test]
    async fn test_idle_connections_are_closed() {
        let connection_manager = Arc::new(ConnectionManager::new());
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let (idle_tx, mut idle_rx) = mpsc::channel::<OutboundMessage>(4);
        let (active_tx, mut active_rx) = mpsc::channel::<OutboundMessage>(4);
        let (idle, _) = connection_manager.register(idle_tx);
        connection_manager.register(active_tx);
        idle.set_last_activity(Utc::now() - chrono::Duration::seconds(300));

        let task = HeartbeatTask::new(WebSocketConfig::default(), connection_manager, shutdown_rx);
        assert_eq!(task.close_idle_connections(60).await, 1);

        assert!(matches!(idle_rx.try_recv(), Ok(OutboundMessage::Close)));
        assert!(active_rx.try_recv().is_err());
    }

    #[test]
    fn test_ping_skips_full_queues() {
        let connection_manager = Arc::new(ConnectionManager::new());
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let (full_tx, _full_rx) = mpsc::channel::<OutboundMessage>(1);
        full_tx.try_send(OutboundMessage::Ping).unwrap();
        let (open_tx, _open_rx) = mpsc::channel::<OutboundMessage>(4);
        connection_manager.register(full_tx);
        connection_manager.register(open_tx);

        let task = HeartbeatTask::new(WebSocketConfig::default(), connection_manager, shutdown_rx);
        assert_eq!(task.send_pings(), 1);
    }
}
