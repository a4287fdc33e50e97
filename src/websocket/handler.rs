use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::connection_manager::ConnectionHandle;
use crate::metrics::{ConnectionMetrics, WsMessageMetrics};
use crate::notification::Notification;
use crate::server::AppState;

use super::message::{events, ClientEvent, Envelope, OutboundMessage};

/// WebSocket upgrade handler
#[tracing::instrument(name = "ws.upgrade", skip(ws, state))]
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    tracing::debug!("WebSocket upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one connection from Connected to Disconnected
#[tracing::instrument(name = "ws.connection", skip(socket, state))]
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_start = std::time::Instant::now();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // The send task must be draining before anything is queued
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(state.settings.websocket.channel_buffer_size.max(4));
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let frame = match msg {
                OutboundMessage::Raw(envelope) => match envelope.to_json() {
                    Ok(text) => Message::Text(text.into()),
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to serialize message");
                        continue;
                    }
                },
                OutboundMessage::Preserialized(text) => Message::Text(text.to_string().into()),
                OutboundMessage::Ping => Message::Ping(Bytes::new()),
                OutboundMessage::Close => {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
            };

            if ws_sender.send(frame).await.is_err() {
                break;
            }
        }
    });

    let handle = Arc::new(ConnectionHandle::new(tx));
    let connection_id = handle.id;
    greet(&handle).await;

    let total = state.connection_manager.register_handle(handle.clone());
    ConnectionMetrics::record_opened(total);

    tracing::info!(
        connection_id = %connection_id,
        total = total,
        "WebSocket connection established"
    );

    state
        .dispatcher
        .broadcast_notification(events::NOTIFICATION, &Notification::client_connected(total));

    // Task for receiving messages from WebSocket
    let state_clone = state.clone();
    let handle_clone = handle.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, &state_clone, &handle_clone) {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    // Whichever side finishes first ends the connection
    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
            recv_task.abort();
        }
        _ = &mut recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
            send_task.abort();
        }
    }

    drop(handle);
    if let Some(remaining) = state.connection_manager.unregister(connection_id) {
        let duration = connection_start.elapsed().as_secs_f64();
        ConnectionMetrics::record_closed(remaining, duration);

        state
            .dispatcher
            .broadcast_notification(events::NOTIFICATION, &Notification::client_disconnected(remaining));

        tracing::info!(
            connection_id = %connection_id,
            remaining = remaining,
            duration_secs = duration,
            "WebSocket connection closed"
        );
    }
}

/// Queue the handshake frame and the private welcome for a new connection
async fn greet(handle: &ConnectionHandle) {
    if handle.send(Envelope::connect(handle.id)).await.is_err() {
        return;
    }

    match Envelope::from_notification(events::MESSAGE, &Notification::welcome(handle.id)) {
        Ok(welcome) => {
            let _ = handle.send(welcome).await;
        }
        Err(e) => tracing::error!(error = %e, "Failed to encode welcome"),
    }
}

/// Process a received WebSocket message
/// Returns false if the connection should be closed
fn process_message(msg: Message, state: &AppState, handle: &Arc<ConnectionHandle>) -> bool {
    match msg {
        Message::Text(text) => {
            handle.update_activity();

            let envelope = match Envelope::parse(text.as_str()) {
                Ok(e) => e,
                Err(e) => {
                    WsMessageMetrics::record_invalid();
                    tracing::warn!(connection_id = %handle.id, error = %e, "Ignoring malformed frame");
                    return true;
                }
            };

            WsMessageMetrics::record_event(&envelope.event);
            handle_client_event(envelope.into(), state, handle);
            true
        }
        Message::Binary(_) => {
            handle.update_activity();
            WsMessageMetrics::record_invalid();
            tracing::warn!(connection_id = %handle.id, "Ignoring binary frame");
            true
        }
        Message::Ping(_) | Message::Pong(_) => {
            // Axum answers pings itself; any frame counts as liveness
            handle.update_activity();
            true
        }
        Message::Close(_) => {
            tracing::debug!(connection_id = %handle.id, "Received close frame");
            false
        }
    }
}

/// Relay an event to every connection, the sender included
#[tracing::instrument(name = "ws.event", skip(state, handle), fields(connection_id = %handle.id))]
fn handle_client_event(event: ClientEvent, state: &AppState, handle: &Arc<ConnectionHandle>) {
    match event {
        ClientEvent::Message(data) => {
            tracing::debug!(payload = %data, "Relaying message");
            state.dispatcher.broadcast(&Envelope::message(data));
        }
        ClientEvent::Notification(data) => {
            tracing::debug!(payload = %data, "Relaying notification");
            state.dispatcher.broadcast(&Envelope::notification(data));
        }
        ClientEvent::Unhandled { event } => {
            tracing::debug!(event = %event, "Ignoring event without a handler");
        }
    }
}
