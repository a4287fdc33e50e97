//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    BROADCASTS_TOTAL, BROADCAST_DELIVERED_TOTAL, BROADCAST_DROPPED_TOTAL, CONNECTIONS_ACTIVE,
    IDLE_CONNECTIONS_CLOSED, PINGS_SENT_TOTAL, WS_CONNECTIONS_CLOSED, WS_CONNECTIONS_OPENED,
    WS_CONNECTION_DURATION, WS_EVENTS_RECEIVED, WS_INVALID_FRAMES,
};
use crate::websocket::events;

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for connection lifecycle metrics
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn record_opened(active: usize) {
        WS_CONNECTIONS_OPENED.inc();
        CONNECTIONS_ACTIVE.set(active as i64);
    }

    pub fn record_closed(active: usize, duration_secs: f64) {
        WS_CONNECTIONS_CLOSED.inc();
        CONNECTIONS_ACTIVE.set(active as i64);
        WS_CONNECTION_DURATION.observe(duration_secs);
    }
}

/// Helper struct for inbound WebSocket frames
pub struct WsMessageMetrics;

impl WsMessageMetrics {
    /// Record a received event; unknown names share one label
    pub fn record_event(event: &str) {
        let label = match event {
            events::MESSAGE | events::NOTIFICATION => event,
            _ => "other",
        };
        WS_EVENTS_RECEIVED.with_label_values(&[label]).inc();
    }

    pub fn record_invalid() {
        WS_INVALID_FRAMES.inc();
    }
}

/// Helper struct for broadcast fan-out
pub struct BroadcastMetrics;

impl BroadcastMetrics {
    pub fn record(event: &str, delivered: usize, dropped: usize) {
        BROADCASTS_TOTAL.with_label_values(&[event]).inc();
        BROADCAST_DELIVERED_TOTAL.inc_by(delivered as u64);
        BROADCAST_DROPPED_TOTAL.inc_by(dropped as u64);
    }
}

/// Helper struct for transport liveness
pub struct LivenessMetrics;

impl LivenessMetrics {
    pub fn record_pings(count: usize) {
        PINGS_SENT_TOTAL.inc_by(count as u64);
    }

    pub fn record_idle_closed(count: usize) {
        IDLE_CONNECTIONS_CLOSED.inc_by(count as u64);
    }
}
