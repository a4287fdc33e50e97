use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of a notification.
///
/// The set is closed: any other value seen on the wire is read as `Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum NotificationKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationKind {
    /// Parse a wire value, falling back to `Info` for anything unrecognized
    pub fn from_str_lossy(value: &str) -> Self {
        Self::parse(value).unwrap_or_default()
    }

    /// Strict parse, `None` when the value is not one of the four kinds
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "info" => Some(Self::Info),
            "success" => Some(Self::Success),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl From<String> for NotificationKind {
    fn from(value: String) -> Self {
        Self::from_str_lossy(&value)
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transient notification as carried on the `notification` and `message` events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
}

impl Notification {
    /// Create a notification with a fresh id stamped with the current time
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            kind,
            message: message.into(),
            timestamp: Utc::now(),
            sender: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Error, message)
    }

    /// Attach the identifier of the party that sent this notification
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Private greeting sent to a connection right after it joins
    pub fn welcome(connection_id: Uuid) -> Self {
        Self::info(format!(
            "Welcome! You are connected to the notification relay. Your ID: {}",
            connection_id
        ))
    }

    /// Public announcement that a client joined
    pub fn client_connected(total: usize) -> Self {
        Self::success(format!("A new client connected. Total: {}", total))
    }

    /// Public announcement that a client left
    pub fn client_disconnected(total: usize) -> Self {
        Self::warning(format!("A client disconnected. Total: {}", total))
    }
}

pub(crate) fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
