//! Client side of the relay: one shared connection, many consumers.
//!
//! A [`RelayClient`] owns a single WebSocket connection to the relay. Clones
//! share it. Each part of an application that wants events calls
//! [`RelayClient::attach`] or [`RelayClient::attach_with`] and gets a
//! [`Consumer`]; dropping the consumer detaches its listeners without touching
//! the connection.
//!
//! ```no_run
//! use notification_relay::client::{ClientOptions, RelayClient};
//!
//! # async fn demo() {
//! let client = RelayClient::new(ClientOptions::default());
//! let _feed = client.attach_with(|event, data| println!("{event}: {data}"));
//! client.connect();
//! client.send_message("message", serde_json::json!({"message": "hi"}));
//! # }
//! ```

mod consumer;
mod driver;
mod options;
mod state;

pub use consumer::Consumer;
pub use options::ClientOptions;
pub use state::{ConnectionState, RelayEvent};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::ClientError;
use crate::websocket::Envelope;

/// Events buffered per consumer before the slowest one starts lagging
const EVENT_BUFFER: usize = 256;

/// State the background driver shares with every handle
pub(crate) struct Shared {
    options: ClientOptions,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: broadcast::Sender<RelayEvent>,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    stop_tx: watch::Sender<bool>,
    driver_running: AtomicBool,
    /// Bumped by every `connect()` that wants a driver
    connect_requests: AtomicU64,
}

impl Shared {
    fn emit(&self, event: RelayEvent) {
        // No receivers just means nobody is attached right now
        let _ = self.events_tx.send(event);
    }

    fn set_outbound(&self, sender: Option<mpsc::Sender<String>>) {
        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = sender;
    }

    fn record_error(&self, err: &ClientError) {
        let message = err.to_string();
        tracing::warn!(error = %message, "Relay connection error");
        self.state_tx.send_modify(|state| {
            state.is_connected = false;
            state.last_error = Some(message.clone());
        });
        self.emit(RelayEvent::ConnectError { message });
    }
}

struct Inner {
    shared: Arc<Shared>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            driver.abort();
        }
    }
}

/// Handle to the shared relay connection
#[derive(Clone)]
pub struct RelayClient {
    inner: Arc<Inner>,
}

impl RelayClient {
    /// Create the client without connecting
    pub fn new(options: ClientOptions) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::default());
        let (events_tx, _) = broadcast::channel(EVENT_BUFFER);
        let (stop_tx, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                shared: Arc::new(Shared {
                    options,
                    state_tx,
                    events_tx,
                    outbound: Mutex::new(None),
                    stop_tx,
                    driver_running: AtomicBool::new(false),
                    connect_requests: AtomicU64::new(0),
                }),
                driver: Mutex::new(None),
            }),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.shared.options
    }

    /// Start the connection driver unless one is already running.
    ///
    /// A pending `disconnect()` is taken back. Must be called from within a
    /// Tokio runtime.
    pub fn connect(&self) {
        let shared = &self.inner.shared;
        let stopping = *shared.stop_tx.borrow();
        if !stopping && shared.state_tx.borrow().is_connected {
            return;
        }

        // Counted before the stop is cleared so the driver never sees one without the other
        shared.connect_requests.fetch_add(1, Ordering::SeqCst);
        shared.stop_tx.send_replace(false);
        if shared
            .driver_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Relay connection driver already running");
            return;
        }

        let handle = tokio::spawn(driver::run(shared.clone()));
        let previous = self
            .inner
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Close the connection and cancel any pending reconnection
    pub fn disconnect(&self) {
        let shared = &self.inner.shared;
        if shared.state_tx.borrow().is_connected || shared.driver_running.load(Ordering::SeqCst) {
            shared.stop_tx.send_replace(true);
        }
    }

    /// Queue an event for the relay.
    ///
    /// Returns `false` without writing anything while disconnected. `true`
    /// only means the frame was queued; there is no delivery confirmation.
    pub fn send_message(&self, event: &str, payload: Value) -> bool {
        let shared = &self.inner.shared;
        if !shared.state_tx.borrow().is_connected {
            tracing::debug!(event = %event, "Not connected, message not sent");
            return false;
        }

        let text = match Envelope::new(event, payload).to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode outbound message");
                return false;
            }
        };

        let guard = shared.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => match tx.try_send(text) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(event = %event, error = %e, "Outbound queue rejected message");
                    false
                }
            },
            None => false,
        }
    }

    /// Current connection snapshot
    pub fn state(&self) -> ConnectionState {
        self.inner.shared.state_tx.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.shared.state_tx.borrow().is_connected
    }

    /// Receiver that wakes on every state change
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.shared.state_tx.subscribe()
    }

    /// Register a consumer with its own event stream
    pub fn attach(&self) -> Consumer {
        Consumer::new(self.clone(), None)
    }

    /// Register a consumer whose handler sees every inbound event name and payload
    pub fn attach_with<F>(&self, handler: F) -> Consumer
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        let mut events = self.inner.shared.events_tx.subscribe();
        let listener = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Some((name, data)) = event.as_event() {
                            handler(name, data);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped = skipped, "Catch-all listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Consumer::new(self.clone(), Some(listener))
    }

    /// Number of live event receivers, consumers and catch-all listeners alike
    pub fn listener_count(&self) -> usize {
        self.inner.shared.events_tx.receiver_count()
    }

    fn subscribe_events(&self) -> broadcast::Receiver<RelayEvent> {
        self.inner.shared.events_tx.subscribe()
    }
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("url", &self.inner.shared.options.url)
            .field("state", &*self.inner.shared.state_tx.borrow())
            .finish()
    }
}
