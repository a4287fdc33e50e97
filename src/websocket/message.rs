use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::notification::Notification;

/// Event names on the wire
pub mod events {
    pub const CONNECT: &str = "connect";
    pub const MESSAGE: &str = "message";
    pub const NOTIFICATION: &str = "notification";
}

/// A named event with an arbitrary JSON payload, one per text frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Handshake frame telling a fresh connection its identifier
    pub fn connect(connection_id: Uuid) -> Self {
        Self::new(
            events::CONNECT,
            serde_json::json!({ "id": connection_id.to_string() }),
        )
    }

    pub fn message(data: Value) -> Self {
        Self::new(events::MESSAGE, data)
    }

    pub fn notification(data: Value) -> Self {
        Self::new(events::NOTIFICATION, data)
    }

    /// Wrap a typed notification under the given event name
    pub fn from_notification(
        event: impl Into<String>,
        notification: &Notification,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(event, serde_json::to_value(notification)?))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Events a connection may send that the relay acts on
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Message(Value),
    Notification(Value),
    Unhandled { event: String },
}

impl From<Envelope> for ClientEvent {
    fn from(envelope: Envelope) -> Self {
        match envelope.event.as_str() {
            events::MESSAGE => ClientEvent::Message(envelope.data),
            events::NOTIFICATION => ClientEvent::Notification(envelope.data),
            _ => ClientEvent::Unhandled {
                event: envelope.event,
            },
        }
    }
}

/// Items queued for a connection's send task
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// Serialized by the send task
    Raw(Envelope),
    /// Serialized once and shared across every recipient of a broadcast
    Preserialized(Arc<str>),
    /// Transport-level liveness probe
    Ping,
    /// Ask the send task to close the socket
    Close,
}

impl OutboundMessage {
    pub fn preserialize(envelope: &Envelope) -> Result<Self, serde_json::Error> {
        Ok(Self::Preserialized(Arc::from(envelope.to_json()?)))
    }
}
