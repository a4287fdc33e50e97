use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::{ConnectionState, RelayClient, RelayEvent};

/// One attachment to the shared connection.
///
/// Holds its own event receiver and, for [`RelayClient::attach_with`], the
/// task running the catch-all handler. Dropping it detaches both; the
/// connection stays up for the remaining handles.
pub struct Consumer {
    client: RelayClient,
    events: broadcast::Receiver<RelayEvent>,
    state: watch::Receiver<ConnectionState>,
    listener: Option<JoinHandle<()>>,
}

impl Consumer {
    pub(super) fn new(client: RelayClient, listener: Option<JoinHandle<()>>) -> Self {
        Self {
            events: client.subscribe_events(),
            state: client.subscribe_state(),
            client,
            listener,
        }
    }

    /// Next event on the connection; `None` once the client is gone
    pub async fn recv(&mut self) -> Option<RelayEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped = skipped, "Consumer lagged behind relay events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Wait for the next state change and return the new snapshot
    pub async fn state_changed(&mut self) -> Option<ConnectionState> {
        self.state.changed().await.ok()?;
        Some(self.state.borrow_and_update().clone())
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn connect(&self) {
        self.client.connect();
    }

    pub fn disconnect(&self) {
        self.client.disconnect();
    }

    pub fn send_message(&self, event: &str, payload: Value) -> bool {
        self.client.send_message(event, payload)
    }

    pub fn client(&self) -> &RelayClient {
        &self.client
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}
