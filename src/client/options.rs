use std::time::Duration;

use crate::config::ClientConfig;

/// Connection settings for a [`RelayClient`](super::RelayClient)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// WebSocket endpoint, e.g. `ws://localhost:3001/ws`
    pub url: String,
    /// Retries after a failed or lost connection before giving up
    pub reconnection_attempts: u32,
    /// Fixed pause between retries
    pub reconnection_delay: Duration,
}

impl ClientOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn reconnection_attempts(mut self, attempts: u32) -> Self {
        self.reconnection_attempts = attempts;
        self
    }

    pub fn reconnection_delay(mut self, delay: Duration) -> Self {
        self.reconnection_delay = delay;
        self
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for ClientOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            url: config.url.clone(),
            reconnection_attempts: config.reconnection_attempts,
            reconnection_delay: Duration::from_millis(config.reconnection_delay_ms),
        }
    }
}
