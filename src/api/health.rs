//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::connection_manager::{ConnectionInfo, ConnectionStats};
use crate::notification::DispatcherStatsSnapshot;
use crate::server::AppState;

/// Banner served on the root path
pub const INDEX_BANNER: &str = "Notification relay is running";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub connections: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub connections: ConnectionStats,
    pub broadcasts: DispatcherStatsSnapshot,
    pub active: Vec<ConnectionInfo>,
}

pub async fn index() -> &'static str {
    INDEX_BANNER
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        connections: state.connection_manager.count(),
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        connections: state.connection_manager.stats(),
        broadcasts: state.dispatcher.stats(),
        active: state.connection_manager.list_connections(),
    })
}
