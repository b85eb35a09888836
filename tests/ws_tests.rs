// End-to-end tests over a real HTTP listener: WebSocket protocol plus the
// JSON introspection endpoints

mod common;

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{capabilities, fast_config, MockCamera, RECV_TIMEOUT};
use futures::{SinkExt, StreamExt};
use gesture_stream::http::{create_router, AppState};
use gesture_stream::session::SessionManager;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

fn test_state(camera: Arc<MockCamera>) -> (AppState, Arc<SessionManager>) {
    let manager = Arc::new(SessionManager::new(capabilities(camera), fast_config()));
    let state = AppState::new(Arc::clone(&manager))
        .with_heartbeat(Duration::from_secs(5), Duration::from_secs(30));
    (state, manager)
}

async fn serve(state: AppState) -> Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = create_router(state, None);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(addr)
}

async fn connect(addr: SocketAddr) -> Result<WsStream> {
    let (stream, _response) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr)).await?;
    Ok(stream)
}

async fn send(ws: &mut WsStream, value: Value) -> Result<()> {
    ws.send(Message::Text(value.to_string())).await?;
    Ok(())
}

/// Next JSON text message with the given event name
async fn next_event(ws: &mut WsStream, event: &str) -> Result<Value> {
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match tokio::time::timeout(remaining, ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                let value: Value = serde_json::from_str(&text)?;
                if value["event"] == event {
                    return Ok(value["data"].clone());
                }
            }
            Ok(Some(Ok(_))) => {}
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(None) => anyhow::bail!("socket closed while waiting for {}", event),
            Err(_) => anyhow::bail!("timed out waiting for {}", event),
        }
    }
}

async fn wait_for_sessions(manager: &SessionManager, count: usize) -> bool {
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if manager.len().await == count {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread")]
async fn test_websocket_session_end_to_end() -> Result<()> {
    let camera = Arc::new(MockCamera::new());
    let (state, manager) = test_state(Arc::clone(&camera));
    let addr = serve(state).await?;

    let mut ws = connect(addr).await?;
    assert!(wait_for_sessions(&manager, 1).await);

    send(&mut ws, json!({"id": 1, "event": "toggle_effect", "data": {}})).await?;
    let ack = next_event(&mut ws, "ack").await?;
    assert_eq!(ack["id"], 1);
    assert_eq!(ack["status"], "success");
    assert_eq!(ack["enabled"], true);

    send(&mut ws, json!({"id": 2, "event": "start_camera", "data": {}})).await?;
    let ack = next_event(&mut ws, "ack").await?;
    assert_eq!(ack["id"], 2);
    assert_eq!(ack["status"], "success");

    let frame = next_event(&mut ws, "frame").await?;
    assert!(frame["image"].as_str().unwrap_or_default().starts_with("data:image/jpeg;base64,"));
    assert_eq!(frame["gestures"], json!(["fist"]));
    assert_eq!(frame["expressions"], json!([]));
    assert!(camera.is_in_use());

    ws.close(None).await?;
    assert!(wait_for_sessions(&manager, 0).await);
    assert!(!camera.is_in_use(), "disconnect must release the camera");

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_websocket_rejects_bad_messages() -> Result<()> {
    let camera = Arc::new(MockCamera::new());
    let (state, _manager) = test_state(camera);
    let addr = serve(state).await?;
    let mut ws = connect(addr).await?;

    send(&mut ws, json!({"id": 7, "event": "self_destruct", "data": {}})).await?;
    let ack = next_event(&mut ws, "ack").await?;
    assert_eq!(ack["id"], 7);
    assert_eq!(ack["status"], "error");
    assert_eq!(ack["error"], "unknown_command");

    ws.send(Message::Text("not json".to_string())).await?;
    let ack = next_event(&mut ws, "ack").await?;
    assert_eq!(ack["error"], "bad_request");

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_commands_are_handled_in_arrival_order() -> Result<()> {
    const TOGGLES: u64 = 200;

    let camera = Arc::new(MockCamera::new());
    let (state, manager) = test_state(camera);
    let addr = serve(state).await?;
    let mut ws = connect(addr).await?;
    assert!(wait_for_sessions(&manager, 1).await);

    for id in 1..=TOGGLES {
        send(&mut ws, json!({"id": id, "event": "toggle_effect", "data": {}})).await?;
    }

    for id in 1..=TOGGLES {
        let ack = next_event(&mut ws, "ack").await?;
        assert_eq!(ack["id"], id, "acks must follow send order");
        assert_eq!(ack["enabled"], id % 2 == 1, "toggle {} saw a stale flag", id);
    }

    // Back-to-back commands of different kinds keep their order too
    send(&mut ws, json!({"id": 1000, "event": "reset_stats", "data": {}})).await?;
    send(&mut ws, json!({"id": 1001, "event": "get_stats", "data": {}})).await?;
    assert_eq!(next_event(&mut ws, "ack").await?["id"], 1000);
    let stats = next_event(&mut ws, "ack").await?;
    assert_eq!(stats["id"], 1001);
    assert_eq!(stats["status"], "success");

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_zero_heartbeat_interval_does_not_kill_the_writer() -> Result<()> {
    let camera = Arc::new(MockCamera::new());
    let manager = Arc::new(SessionManager::new(capabilities(camera), fast_config()));
    let state = AppState::new(Arc::clone(&manager))
        .with_heartbeat(Duration::ZERO, Duration::from_secs(30));
    let addr = serve(state).await?;
    let mut ws = connect(addr).await?;

    send(&mut ws, json!({"id": 1, "event": "toggle_effect", "data": {}})).await?;
    let ack = next_event(&mut ws, "ack").await?;
    assert_eq!(ack["id"], 1);
    assert_eq!(ack["enabled"], true);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_each_socket_has_its_own_flags() -> Result<()> {
    let camera = Arc::new(MockCamera::new());
    let (state, manager) = test_state(camera);
    let addr = serve(state).await?;

    let mut first = connect(addr).await?;
    let mut second = connect(addr).await?;
    assert!(wait_for_sessions(&manager, 2).await);

    send(&mut first, json!({"id": 1, "event": "toggle_face_recognition", "data": {}})).await?;
    assert_eq!(next_event(&mut first, "ack").await?["enabled"], true);

    send(&mut second, json!({"id": 1, "event": "toggle_face_recognition", "data": {}})).await?;
    assert_eq!(next_event(&mut second, "ack").await?["enabled"], true);

    Ok(())
}

#[tokio::test]
async fn test_health_endpoint() -> Result<()> {
    let (state, _manager) = test_state(Arc::new(MockCamera::new()));
    let app = create_router(state, None);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    assert_eq!(&body[..], b"OK");

    Ok(())
}

#[tokio::test]
async fn test_sessions_endpoint_lists_connected_clients() -> Result<()> {
    let (state, manager) = test_state(Arc::new(MockCamera::new()));
    let client = common::Client::new();
    let id = gesture_stream::session::ConnectionId::new();
    manager.on_connect(id, client.outbox.clone()).await?;

    let app = create_router(state, None);
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/sessions").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value =
        serde_json::from_slice(&axum::body::to_bytes(response.into_body(), usize::MAX).await?)?;
    assert_eq!(body["count"], 1);
    assert_eq!(body["sessions"][0]["id"], id.to_string());
    assert_eq!(body["sessions"][0]["state"], "idle");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/sessions/{}/stats", id))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/sessions/not-a-session/stats")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    Ok(())
}
