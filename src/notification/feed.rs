use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::parse::{parse_notification, ParsedNotification};
use super::types::Notification;

/// Maximum number of notifications kept by a feed
pub const FEED_CAPACITY: usize = 20;

/// A notification as held by a feed, stamped with its local arrival time
#[derive(Debug, Clone, Serialize)]
pub struct FeedEntry {
    pub notification: Notification,
    pub received_at: DateTime<Utc>,
}

/// Most-recent-first list of received notifications with an unread counter.
#[derive(Debug, Clone, Default)]
pub struct NotificationFeed {
    entries: VecDeque<FeedEntry>,
    unread: usize,
}

impl NotificationFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the front, evicting the oldest entry once full
    pub fn push(&mut self, notification: Notification) {
        if self.entries.len() == FEED_CAPACITY {
            self.entries.pop_back();
        }
        self.entries.push_front(FeedEntry {
            notification,
            received_at: Utc::now(),
        });
        self.unread += 1;
    }

    /// Parse a raw payload with defaults and push the result
    pub fn push_raw(&mut self, payload: &serde_json::Value) -> ParsedNotification {
        let parsed = parse_notification(payload);
        if !parsed.is_valid() {
            tracing::debug!(payload = %payload, "Reconstructed malformed notification payload");
        }
        self.push(parsed.notification().clone());
        parsed
    }

    pub fn entries(&self) -> impl Iterator<Item = &FeedEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&FeedEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn unread(&self) -> usize {
        self.unread
    }

    pub fn mark_read(&mut self) {
        self.unread = 0;
    }

    /// Drop every entry; the unread counter is left as is
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
