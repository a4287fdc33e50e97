use serde::Serialize;
use serde_json::Value;

/// Snapshot of the shared connection, as shown to consumers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionState {
    pub is_connected: bool,
    /// Most recent transport error; cleared by the next successful connect
    pub last_error: Option<String>,
    /// Successful connects observed over the client's lifetime
    pub connection_count: u64,
    /// Identifier the relay assigned to the current session
    pub socket_id: Option<String>,
}

/// Everything a consumer can observe on the shared connection
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    Connected { id: String },
    Disconnected { reason: String },
    ConnectError { message: String },
    /// Any named event sent by the relay
    Event { name: String, data: Value },
}

impl RelayEvent {
    /// Name and payload for application events, `None` for lifecycle events
    pub fn as_event(&self) -> Option<(&str, &Value)> {
        match self {
            RelayEvent::Event { name, data } => Some((name.as_str(), data)),
            _ => None,
        }
    }
}
