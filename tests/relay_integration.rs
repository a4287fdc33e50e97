//! End-to-end tests for the relay
//!
//! Each test starts the real router on a loopback listener and talks to it
//! through `RelayClient` or a raw tokio-tungstenite socket.

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_test::assert_ok;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

use notification_relay::client::{ClientOptions, Consumer, RelayClient, RelayEvent};
use notification_relay::config::Settings;
use notification_relay::notification::{parse_notification, NotificationKind};
use notification_relay::server::{create_app, AppState};

const WAIT: Duration = Duration::from_secs(5);

/// Serve the relay on an ephemeral port and return its WebSocket URL
async fn spawn_relay() -> (String, AppState) {
    let state = AppState::new(Settings::default());
    let app = create_app(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("ws://{}/ws", addr), state)
}

fn client_for(url: &str) -> RelayClient {
    RelayClient::new(
        ClientOptions::new(url)
            .reconnection_attempts(0)
            .reconnection_delay(Duration::from_millis(50)),
    )
}

async fn next_event(consumer: &mut Consumer) -> RelayEvent {
    tokio::time::timeout(WAIT, consumer.recv())
        .await
        .expect("event within timeout")
        .expect("event stream open")
}

/// Skip ahead to the next application event with the given name
async fn next_named(consumer: &mut Consumer, name: &str) -> Value {
    loop {
        if let RelayEvent::Event { name: got, data } = next_event(consumer).await {
            if got == name {
                return data;
            }
        }
    }
}

/// Skip ahead until the named event carries exactly `expected`
async fn wait_for_payload(consumer: &mut Consumer, name: &str, expected: &Value) -> Value {
    loop {
        let data = next_named(consumer, name).await;
        if &data == expected {
            return data;
        }
    }
}

/// Connect and wait for the handshake, returning the assigned id
async fn connect(client: &RelayClient) -> (Consumer, String) {
    let mut consumer = client.attach();
    client.connect();
    loop {
        if let RelayEvent::Connected { id } = next_event(&mut consumer).await {
            return (consumer, id);
        }
    }
}

async fn wait_for_count(state: &AppState, expected: usize) {
    tokio::time::timeout(WAIT, async {
        while state.connection_manager.count() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection count settles");
}

#[tokio::test]
async fn test_welcome_then_join_announcements() {
    let (url, _state) = spawn_relay().await;

    let a = client_for(&url);
    let (mut a_events, a_id) = connect(&a).await;

    let welcome = parse_notification(&next_named(&mut a_events, "message").await).into_inner();
    assert_eq!(welcome.kind, NotificationKind::Info);
    assert!(welcome.message.contains(&a_id));

    let joined = parse_notification(&next_named(&mut a_events, "notification").await).into_inner();
    assert_eq!(joined.kind, NotificationKind::Success);
    assert!(joined.message.ends_with("Total: 1"));

    let b = client_for(&url);
    let (mut b_events, b_id) = connect(&b).await;
    assert_ne!(a_id, b_id);

    let welcome = parse_notification(&next_named(&mut b_events, "message").await).into_inner();
    assert!(welcome.message.contains(&b_id));

    for events in [&mut a_events, &mut b_events] {
        let joined = parse_notification(&next_named(events, "notification").await).into_inner();
        assert_eq!(joined.kind, NotificationKind::Success);
        assert!(joined.message.ends_with("Total: 2"));
    }
}

#[tokio::test]
async fn test_message_reaches_every_client_including_sender() {
    let (url, state) = spawn_relay().await;
    let a = client_for(&url);
    let b = client_for(&url);
    let (mut a_events, _) = connect(&a).await;
    let (mut b_events, _) = connect(&b).await;
    wait_for_count(&state, 2).await;

    let payload = json!({"id": "1", "message": "hi"});
    assert!(a.send_message("message", payload.clone()));

    // Welcomes arrive on the same event ahead of the echo
    for events in [&mut a_events, &mut b_events] {
        let received = wait_for_payload(events, "message", &payload).await;
        assert_eq!(received, json!({"id": "1", "message": "hi"}));
    }
}

#[tokio::test]
async fn test_notification_payload_relayed_unchanged() {
    let (url, state) = spawn_relay().await;
    let a = client_for(&url);
    let (mut a_events, _) = connect(&a).await;
    wait_for_count(&state, 1).await;

    assert!(a.send_message("notification", json!("just text")));
    let raw = wait_for_payload(&mut a_events, "notification", &json!("just text")).await;

    let parsed = parse_notification(&raw);
    assert!(!parsed.is_valid());
    assert_eq!(parsed.notification().kind, NotificationKind::Info);
    assert_eq!(parsed.notification().message, "just text");
}

#[tokio::test]
async fn test_disconnect_is_announced_to_remaining_clients() {
    let (url, state) = spawn_relay().await;
    let a = client_for(&url);
    let b = client_for(&url);
    let (mut a_events, _) = connect(&a).await;
    let (mut b_events, _) = connect(&b).await;
    wait_for_count(&state, 2).await;

    b.disconnect();
    loop {
        if let RelayEvent::Disconnected { .. } = next_event(&mut b_events).await {
            break;
        }
    }
    assert!(!b.is_connected());
    assert!(!b.send_message("message", json!({"message": "late"})));

    loop {
        let notice = parse_notification(&next_named(&mut a_events, "notification").await).into_inner();
        if notice.kind == NotificationKind::Warning {
            assert!(notice.message.ends_with("Total: 1"));
            break;
        }
    }
    wait_for_count(&state, 1).await;
}

#[tokio::test]
async fn test_client_state_tracks_session() {
    let (url, _state) = spawn_relay().await;
    let client = client_for(&url);
    let (_events, id) = connect(&client).await;

    let snapshot = client.state();
    assert!(snapshot.is_connected);
    assert_eq!(snapshot.connection_count, 1);
    assert_eq!(snapshot.socket_id.as_deref(), Some(id.as_str()));
    assert!(snapshot.last_error.is_none());
}

#[tokio::test]
async fn test_repeated_connect_opens_one_session() {
    let (url, state) = spawn_relay().await;
    let client = client_for(&url);
    let mut events = client.attach();

    client.connect();
    client.connect();
    client.clone().connect();

    loop {
        if let RelayEvent::Connected { .. } = next_event(&mut events).await {
            break;
        }
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(state.connection_manager.count(), 1);
    assert_eq!(client.state().connection_count, 1);
}

#[tokio::test]
async fn test_connect_right_after_disconnect_keeps_client_online() {
    let (url, state) = spawn_relay().await;
    let client = client_for(&url);
    let (mut events, _) = connect(&client).await;
    wait_for_count(&state, 1).await;

    client.disconnect();
    client.connect();

    // Give the driver time to act on both calls
    tokio::time::sleep(Duration::from_millis(300)).await;
    tokio::time::timeout(WAIT, async {
        while !client.is_connected() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("client back online");

    let payload = json!({"id": "after-reconnect", "message": "still here"});
    assert!(client.send_message("message", payload.clone()));
    wait_for_payload(&mut events, "message", &payload).await;
    wait_for_count(&state, 1).await;
}

#[tokio::test]
async fn test_cors_preflight_allows_any_origin() {
    let app = create_app(AppState::new(Settings::default()));

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/health")
                .header(header::ORIGIN, "http://example.com")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_success());
    let headers = response.headers();
    assert_eq!(
        headers
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
    let methods = headers
        .get(header::ACCESS_CONTROL_ALLOW_METHODS)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(methods.contains("POST"), "allowed methods: {}", methods);
    assert!(methods.contains("GET"), "allowed methods: {}", methods);
}

#[tokio::test]
async fn test_client_reconnects_after_server_close() {
    let (url, state) = spawn_relay().await;
    let client = RelayClient::new(
        ClientOptions::new(url.as_str())
            .reconnection_attempts(1)
            .reconnection_delay(Duration::from_millis(50)),
    );
    let (mut events, first_id) = connect(&client).await;
    wait_for_count(&state, 1).await;

    for handle in state.connection_manager.get_all_connections() {
        assert_ok!(handle.close().await);
    }

    let second_id = loop {
        if let RelayEvent::Connected { id } = next_event(&mut events).await {
            break id;
        }
    };
    assert_ne!(first_id, second_id);
    assert_eq!(client.state().connection_count, 2);
}

#[tokio::test]
async fn test_catch_all_listener_sees_events_but_not_handshake() {
    let (url, _state) = spawn_relay().await;
    let client = client_for(&url);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    let _listener = client.attach_with(move |event, _data| {
        let _ = tx.send(event.to_string());
    });
    let (_events, _) = connect(&client).await;

    let first = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    let second = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(first, "message");
    assert_eq!(second, "notification");
}

#[tokio::test]
async fn test_malformed_frames_keep_connection_open() {
    let (url, _state) = spawn_relay().await;
    let (mut socket, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();

    assert_ok!(socket.send(Message::Text("not json".into())).await);
    assert_ok!(socket.send(Message::Binary(vec![1u8, 2, 3].into())).await);
    let valid = json!({"event": "message", "data": {"message": "still here"}}).to_string();
    assert_ok!(socket.send(Message::Text(valid.into())).await);

    let relayed = tokio::time::timeout(WAIT, async {
        while let Some(frame) = socket.next().await {
            if let Ok(Message::Text(text)) = frame {
                let envelope: Value = serde_json::from_str(text.as_str()).unwrap();
                if envelope["data"]["message"] == "still here" {
                    return envelope;
                }
            }
        }
        panic!("socket closed before the relay echoed");
    })
    .await
    .expect("echo within timeout");

    assert_eq!(relayed["event"], "message");
}

#[tokio::test]
async fn test_first_frame_is_handshake() {
    let (url, _state) = spawn_relay().await;
    let (mut socket, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();

    let frame = tokio::time::timeout(WAIT, socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = match frame {
        Message::Text(text) => text,
        other => panic!("expected a text frame, got {:?}", other),
    };
    let envelope: Value = serde_json::from_str(text.as_str()).unwrap();
    assert_eq!(envelope["event"], "connect");
    assert!(envelope["data"]["id"].is_string());
}

#[tokio::test]
async fn test_http_index_and_health() {
    let state = AppState::new(Settings::default());
    let app = create_app(state);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"Notification relay is running");

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["connections"], 0);
}
