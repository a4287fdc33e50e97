use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;

use crate::connection_manager::ConnectionManager;
use crate::metrics::BroadcastMetrics;
use crate::websocket::{Envelope, OutboundMessage};

use super::Notification;

/// Result of a broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryResult {
    /// Connections the frame was queued on
    pub delivered_to: usize,
    /// Connections whose queue was full or already closed
    pub dropped: usize,
}

/// Statistics for the dispatcher
#[derive(Debug, Default)]
pub struct DispatcherStats {
    pub total_broadcasts: AtomicU64,
    pub total_delivered: AtomicU64,
    pub total_dropped: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            total_broadcasts: self.total_broadcasts.load(Ordering::Relaxed),
            total_delivered: self.total_delivered.load(Ordering::Relaxed),
            total_dropped: self.total_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatcher statistics
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub total_broadcasts: u64,
    pub total_delivered: u64,
    pub total_dropped: u64,
}

/// Fans events out to every registered connection.
///
/// Delivery is at-most-once: each envelope is serialized once and queued
/// without waiting on every connection. A connection whose queue is full
/// misses the frame; nothing is retried.
pub struct NotificationDispatcher {
    connection_manager: Arc<ConnectionManager>,
    stats: DispatcherStats,
}

impl NotificationDispatcher {
    pub fn new(connection_manager: Arc<ConnectionManager>) -> Self {
        Self {
            connection_manager,
            stats: DispatcherStats::default(),
        }
    }

    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }

    /// Queue an envelope on every connection, the sender included
    #[tracing::instrument(name = "dispatcher.broadcast", skip(self, envelope), fields(event = %envelope.event))]
    pub fn broadcast(&self, envelope: &Envelope) -> DeliveryResult {
        let message = match OutboundMessage::preserialize(envelope) {
            Ok(m) => m,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize broadcast");
                return DeliveryResult::default();
            }
        };

        let mut result = DeliveryResult::default();
        for handle in self.connection_manager.get_all_connections() {
            match handle.try_send(message.clone()) {
                Ok(()) => result.delivered_to += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(connection_id = %handle.id, "Outbound queue full, dropping frame");
                    result.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(connection_id = %handle.id, "Connection closing, dropping frame");
                    result.dropped += 1;
                }
            }
        }

        self.stats.total_broadcasts.fetch_add(1, Ordering::Relaxed);
        self.stats
            .total_delivered
            .fetch_add(result.delivered_to as u64, Ordering::Relaxed);
        self.stats
            .total_dropped
            .fetch_add(result.dropped as u64, Ordering::Relaxed);
        BroadcastMetrics::record(&envelope.event, result.delivered_to, result.dropped);

        tracing::debug!(
            delivered_to = result.delivered_to,
            dropped = result.dropped,
            "Broadcast complete"
        );

        result
    }

    /// Broadcast a typed notification under the given event name
    pub fn broadcast_notification(&self, event: &str, notification: &Notification) -> DeliveryResult {
        match Envelope::from_notification(event, notification) {
            Ok(envelope) => self.broadcast(&envelope),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode notification");
                DeliveryResult::default()
            }
        }
    }
}
