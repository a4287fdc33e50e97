use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::ClientError;
use crate::websocket::{events, Envelope};

use super::state::RelayEvent;
use super::Shared;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outbound frames queued by `send_message`
const OUTBOUND_BUFFER: usize = 64;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// How a connected session came to an end
enum SessionEnd {
    /// `disconnect()` was called
    Requested,
    /// The transport went away on its own
    Lost(String),
}

/// Own the connection for as long as it should exist.
///
/// A `connect()` that lands while the driver is winding down bumps
/// `connect_requests`; the driver notices after clearing `driver_running`
/// and starts over instead of leaving the client disconnected.
pub(super) async fn run(shared: Arc<Shared>) {
    let mut stop_rx = shared.stop_tx.subscribe();

    loop {
        let mut seen = shared.connect_requests.load(Ordering::SeqCst);
        drive(&shared, &mut stop_rx, &mut seen).await;

        shared.driver_running.store(false, Ordering::SeqCst);
        if shared.connect_requests.load(Ordering::SeqCst) == seen {
            break;
        }
        if shared
            .driver_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // A fresh driver already took over
            break;
        }
        tracing::debug!("Connect requested while stopping, restarting driver");
    }

    tracing::debug!("Relay connection driver stopped");
}

/// Connect, run sessions and retry with a fixed delay until the attempts
/// run out or a disconnect is requested.
async fn drive(shared: &Shared, stop_rx: &mut watch::Receiver<bool>, seen: &mut u64) {
    let options = &shared.options;
    let mut attempt: u32 = 0;

    loop {
        if *stop_rx.borrow_and_update() {
            return;
        }

        tracing::debug!(url = %options.url, attempt = attempt, "Connecting to relay");
        match connect_async(options.url.as_str()).await {
            Ok((socket, _response)) => match run_session(shared, socket, stop_rx, seen).await {
                Ok(SessionEnd::Requested) => return,
                Ok(SessionEnd::Lost(reason)) => {
                    tracing::info!(reason = %reason, "Relay connection lost");
                    attempt = 0;
                }
                Err(err) => shared.record_error(&err),
            },
            Err(err) => shared.record_error(&ClientError::from(err)),
        }

        if attempt >= options.reconnection_attempts {
            tracing::warn!(
                attempts = options.reconnection_attempts,
                "Giving up on relay connection"
            );
            return;
        }
        attempt += 1;

        tokio::select! {
            _ = tokio::time::sleep(options.reconnection_delay) => {}
            _ = stop_rx.changed() => {}
        }
    }
}

/// Wait for the handshake, then pump frames both ways until the session ends
async fn run_session(
    shared: &Shared,
    socket: Socket,
    stop_rx: &mut watch::Receiver<bool>,
    seen: &mut u64,
) -> Result<SessionEnd, ClientError> {
    let (mut write, mut read) = socket.split();

    let socket_id = tokio::time::timeout(HANDSHAKE_TIMEOUT, await_handshake(&mut read))
        .await
        .map_err(|_| ClientError::HandshakeTimeout)??;

    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
    shared.set_outbound(Some(tx));
    shared.state_tx.send_modify(|state| {
        state.is_connected = true;
        state.last_error = None;
        state.connection_count += 1;
        state.socket_id = Some(socket_id.clone());
    });
    // Earlier connect() calls are satisfied by this session
    *seen = shared.connect_requests.load(Ordering::SeqCst);
    shared.emit(RelayEvent::Connected {
        id: socket_id.clone(),
    });
    tracing::info!(socket_id = %socket_id, "Connected to relay");

    let end = loop {
        tokio::select! {
            _ = stop_rx.changed() => {
                if *stop_rx.borrow_and_update() {
                    let _ = write.send(Message::Close(None)).await;
                    break SessionEnd::Requested;
                }
                // The disconnect was taken back before we acted on it
                *seen = shared.connect_requests.load(Ordering::SeqCst);
            }
            outbound = rx.recv() => {
                let Some(text) = outbound else {
                    break SessionEnd::Lost("outbound queue closed".to_string());
                };
                if let Err(err) = write.send(Message::Text(text.into())).await {
                    break SessionEnd::Lost(err.to_string());
                }
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => dispatch(shared, text.as_str()),
                Some(Ok(Message::Close(_))) | None => {
                    break SessionEnd::Lost("server closed the connection".to_string());
                }
                Some(Ok(Message::Binary(_))) => {
                    tracing::warn!("Ignoring binary frame from relay");
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => break SessionEnd::Lost(err.to_string()),
            },
        }
    };

    shared.set_outbound(None);
    shared.state_tx.send_modify(|state| {
        state.is_connected = false;
        state.socket_id = None;
    });

    let reason = match &end {
        SessionEnd::Requested => "client disconnect".to_string(),
        SessionEnd::Lost(reason) => reason.clone(),
    };
    shared.emit(RelayEvent::Disconnected { reason });

    Ok(end)
}

/// The first text frame must be the `connect` envelope carrying our id
async fn await_handshake<S>(read: &mut S) -> Result<String, ClientError>
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(frame) = read.next().await {
        match frame? {
            Message::Text(text) => {
                let envelope = Envelope::parse(text.as_str())?;
                if envelope.event != events::CONNECT {
                    tracing::warn!(event = %envelope.event, "Frame before handshake ignored");
                    continue;
                }
                return envelope
                    .data
                    .get("id")
                    .and_then(|id| id.as_str())
                    .map(str::to_string)
                    .ok_or(ClientError::MissingSocketId);
            }
            Message::Close(_) => return Err(ClientError::HandshakeClosed),
            _ => {}
        }
    }
    Err(ClientError::HandshakeClosed)
}

fn dispatch(shared: &Shared, text: &str) {
    match Envelope::parse(text) {
        Ok(envelope) if envelope.event == events::CONNECT => {
            tracing::debug!("Ignoring repeated handshake frame");
        }
        Ok(envelope) => shared.emit(RelayEvent::Event {
            name: envelope.event,
            data: envelope.data,
        }),
        Err(err) => tracing::warn!(error = %err, "Ignoring malformed frame from relay"),
    }
}
