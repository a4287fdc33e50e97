//! Connection statistics and info structures

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Connection statistics
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub oldest_connected_at: Option<DateTime<Utc>>,
}

/// Per-connection information
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub id: Uuid,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}
