//! Prometheus metrics for the relay.
//!
//! - Connection metrics (active, opened, closed, duration)
//! - Inbound event metrics (by event name, invalid frames)
//! - Broadcast metrics (frames queued, frames dropped)
//! - Liveness metrics (pings sent, idle connections closed)

mod helpers;

pub use helpers::{encode_metrics, BroadcastMetrics, ConnectionMetrics, LivenessMetrics, WsMessageMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "relay";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Number of currently open WebSocket connections
    pub static ref CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_connections_active", METRIC_PREFIX),
        "Number of currently open WebSocket connections"
    ).unwrap();

    pub static ref WS_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections opened"
    ).unwrap();

    pub static ref WS_CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections closed"
    ).unwrap();

    /// Connection lifetime in seconds
    pub static ref WS_CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_ws_connection_duration_seconds", METRIC_PREFIX),
        "WebSocket connection duration in seconds",
        vec![1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 14400.0]
    ).unwrap();

    // ============================================================================
    // Inbound Event Metrics
    // ============================================================================

    /// Events received from connections, by event name
    pub static ref WS_EVENTS_RECEIVED: IntCounterVec = register_int_counter_vec!(
        format!("{}_ws_events_received_total", METRIC_PREFIX),
        "Total events received from WebSocket clients",
        &["event"]
    ).unwrap();

    /// Frames that could not be read as an event envelope
    pub static ref WS_INVALID_FRAMES: IntCounter = register_int_counter!(
        format!("{}_ws_invalid_frames_total", METRIC_PREFIX),
        "Total inbound frames ignored as malformed or unsupported"
    ).unwrap();

    // ============================================================================
    // Broadcast Metrics
    // ============================================================================

    pub static ref BROADCASTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_broadcasts_total", METRIC_PREFIX),
        "Total broadcasts by event name",
        &["event"]
    ).unwrap();

    /// Frames queued on a connection by a broadcast
    pub static ref BROADCAST_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_broadcast_delivered_total", METRIC_PREFIX),
        "Total frames queued on connections by broadcasts"
    ).unwrap();

    /// Frames lost to a full or closed connection queue
    pub static ref BROADCAST_DROPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_broadcast_dropped_total", METRIC_PREFIX),
        "Total broadcast frames dropped for full or closed connection queues"
    ).unwrap();

    // ============================================================================
    // Liveness Metrics
    // ============================================================================

    pub static ref PINGS_SENT_TOTAL: IntCounter = register_int_counter!(
        format!("{}_pings_sent_total", METRIC_PREFIX),
        "Total transport ping frames queued"
    ).unwrap();

    pub static ref IDLE_CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_idle_connections_closed_total", METRIC_PREFIX),
        "Total connections closed for inactivity"
    ).unwrap();
}
