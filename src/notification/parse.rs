//! Best-effort reconstruction of inbound notification payloads.
//!
//! Senders may put anything on the `notification` event. Receivers never
//! reject a payload: every input maps to a usable [`Notification`], and the
//! result records whether defaults had to be applied.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::types::{generate_id, Notification, NotificationKind};

/// Message used when the payload carries nothing displayable
pub const FALLBACK_MESSAGE: &str = "Notification received";

/// Outcome of [`parse_notification`]
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedNotification {
    /// Every field was present and well-formed
    Valid(Notification),
    /// At least one field was missing or invalid and got a default
    Reconstructed(Notification),
}

impl ParsedNotification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    pub fn notification(&self) -> &Notification {
        match self {
            Self::Valid(n) | Self::Reconstructed(n) => n,
        }
    }

    pub fn into_inner(self) -> Notification {
        match self {
            Self::Valid(n) | Self::Reconstructed(n) => n,
        }
    }
}

/// Turn any JSON value into a notification, defaulting what is missing.
pub fn parse_notification(value: &Value) -> ParsedNotification {
    match value {
        Value::String(text) => parse_text(text),
        Value::Object(_) => parse_object(value),
        Value::Array(_) => ParsedNotification::Reconstructed(Notification::info(value.to_string())),
        _ => ParsedNotification::Reconstructed(Notification::info(FALLBACK_MESSAGE)),
    }
}

fn parse_text(text: &str) -> ParsedNotification {
    match serde_json::from_str::<Value>(text) {
        // A JSON string inside a string is still just text
        Ok(Value::String(inner)) => ParsedNotification::Reconstructed(Notification::info(inner)),
        Ok(inner) => parse_notification(&inner),
        Err(_) => ParsedNotification::Reconstructed(Notification::info(text)),
    }
}

fn parse_object(value: &Value) -> ParsedNotification {
    let Some(message) = value.get("message").and_then(Value::as_str) else {
        return ParsedNotification::Reconstructed(Notification::info(value.to_string()));
    };

    let mut complete = true;

    let id = match value.get("id").and_then(Value::as_str) {
        Some(id) => id.to_string(),
        None => {
            complete = false;
            generate_id()
        }
    };

    let kind = match value
        .get("type")
        .and_then(Value::as_str)
        .and_then(NotificationKind::parse)
    {
        Some(kind) => kind,
        None => {
            complete = false;
            NotificationKind::Info
        }
    };

    let timestamp = match value.get("timestamp").and_then(parse_timestamp) {
        Some(ts) => ts,
        None => {
            complete = false;
            Utc::now()
        }
    };

    let sender = value
        .get("sender")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let notification = Notification {
        id,
        kind,
        message: message.to_string(),
        timestamp,
        sender,
    };

    if complete {
        ParsedNotification::Valid(notification)
    } else {
        ParsedNotification::Reconstructed(notification)
    }
}

/// Accepts RFC 3339 strings and Unix epoch milliseconds
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_well_formed_notification_is_valid() {
        let value = json!({
            "id": "42",
            "type": "error",
            "message": "disk full",
            "timestamp": "2024-05-01T10:00:00.000Z",
            "sender": "node-a"
        });

        let parsed = parse_notification(&value);
        assert!(parsed.is_valid());

        let n = parsed.into_inner();
        assert_eq!(n.id, "42");
        assert_eq!(n.kind, NotificationKind::Error);
        assert_eq!(n.message, "disk full");
        assert_eq!(n.sender.as_deref(), Some("node-a"));
        assert_eq!(n.timestamp.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn test_plain_string_becomes_info() {
        let parsed = parse_notification(&json!("server restarting"));
        assert!(!parsed.is_valid());
        let n = parsed.notification();
        assert_eq!(n.kind, NotificationKind::Info);
        assert_eq!(n.message, "server restarting");
        assert!(!n.id.is_empty());
    }

    #[test]
    fn test_json_encoded_string_is_unwrapped() {
        let encoded = json!({
            "id": "7",
            "type": "success",
            "message": "saved",
            "timestamp": "2024-05-01T10:00:00Z"
        })
        .to_string();

        let parsed = parse_notification(&Value::String(encoded));
        assert!(parsed.is_valid());
        assert_eq!(parsed.notification().kind, NotificationKind::Success);
        assert_eq!(parsed.notification().message, "saved");
    }

    #[test]
    fn test_missing_fields_are_defaulted() {
        let parsed = parse_notification(&json!({"message": "hi"}));
        assert!(!parsed.is_valid());
        let n = parsed.notification();
        assert_eq!(n.kind, NotificationKind::Info);
        assert_eq!(n.message, "hi");
        assert!(!n.id.is_empty());
    }

    #[test]
    fn test_unknown_type_is_coerced() {
        let parsed = parse_notification(&json!({
            "id": "1",
            "type": "fatal",
            "message": "x",
            "timestamp": "2024-05-01T10:00:00Z"
        }));
        assert!(!parsed.is_valid());
        assert_eq!(parsed.notification().kind, NotificationKind::Info);
        assert_eq!(parsed.notification().id, "1");
    }

    #[test]
    fn test_epoch_millis_timestamp() {
        let parsed = parse_notification(&json!({
            "id": "1",
            "type": "info",
            "message": "x",
            "timestamp": 1714557600000i64
        }));
        assert!(parsed.is_valid());
        assert_eq!(parsed.notification().timestamp.timestamp(), 1714557600);
    }

    #[test]
    fn test_object_without_message_is_stringified() {
        let value = json!({"id": "1", "foo": "bar"});
        let parsed = parse_notification(&value);
        assert!(!parsed.is_valid());
        let n = parsed.notification();
        assert_eq!(n.kind, NotificationKind::Info);
        assert_eq!(n.message, value.to_string());
    }

    #[test]
    fn test_scalars_get_fallback_message() {
        for value in [Value::Null, json!(12), json!(true)] {
            let n = parse_notification(&value).into_inner();
            assert_eq!(n.kind, NotificationKind::Info);
            assert_eq!(n.message, FALLBACK_MESSAGE);
        }
    }

    #[test]
    fn test_array_is_stringified() {
        let n = parse_notification(&json!([1, 2])).into_inner();
        assert_eq!(n.message, "[1,2]");
    }

    #[test]
    fn test_empty_sender_is_dropped() {
        let n = parse_notification(&json!({"message": "x", "sender": ""})).into_inner();
        assert_eq!(n.sender, None);
    }
}
