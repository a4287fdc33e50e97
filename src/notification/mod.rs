//! Notification types, broadcasting, and receiver-side handling.
//!
//! - `types`: the `Notification` record and its closed `NotificationKind` set
//! - `dispatcher`: at-most-once fan-out to every relay connection
//! - `parse`: best-effort reconstruction of arbitrary inbound payloads
//! - `feed`: the capped most-recent-first list kept by receivers

mod dispatcher;
mod feed;
mod parse;
mod types;

pub use dispatcher::{DeliveryResult, DispatcherStatsSnapshot, NotificationDispatcher};
pub use feed::{FeedEntry, NotificationFeed, FEED_CAPACITY};
pub use parse::{parse_notification, ParsedNotification, FALLBACK_MESSAGE};
pub use types::{Notification, NotificationKind};
