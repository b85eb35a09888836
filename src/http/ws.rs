//! WebSocket endpoint carrying the event protocol
//!
//! Each socket is one client: it gets a fresh `ConnectionId` and session on
//! upgrade and loses both when the socket closes, errors or goes silent.
//! Inbound commands are queued to a single task per connection and handled in
//! arrival order. Outbound messages are JSON text frames drained from the
//! session's outbox by a dedicated writer task, which also pings the client
//! periodically.

use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::state::AppState;
use crate::protocol::{self, Outbox, ServerMessage};
use crate::session::{ConnectionId, SessionManager};

/// Inbound commands buffered per connection while an earlier one is running
const COMMAND_QUEUE_CAPACITY: usize = 64;

/// Shortest ping period the writer will use
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(100);

/// GET /ws
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Serve one client connection until it goes away
pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = ConnectionId::new();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbox, outbox_rx) = Outbox::channel(state.manager.config().outbox_capacity);

    if let Err(e) = state.manager.on_connect(conn_id, outbox.clone()).await {
        warn!("Refusing WebSocket client: {}", e);
        let _ = ws_tx
            .send(Message::Close(Some(CloseFrame {
                code: close_code::AGAIN,
                reason: e.to_string().into(),
            })))
            .await;
        return;
    }

    info!("WebSocket client connected: {}", conn_id);

    let mut writer = tokio::spawn(write_loop(
        conn_id,
        ws_tx,
        outbox_rx,
        state.heartbeat_interval,
    ));

    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
    let commands = tokio::spawn(command_loop(
        Arc::clone(&state.manager),
        conn_id,
        outbox,
        command_rx,
    ));

    loop {
        let next = tokio::select! {
            _ = &mut writer => break,
            next = tokio::time::timeout(state.idle_timeout, ws_rx.next()) => next,
        };

        match next {
            Ok(Some(Ok(Message::Text(text)))) => {
                if command_tx.send(text).await.is_err() {
                    break;
                }
            }
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => break,
            Ok(Some(Ok(Message::Binary(_)))) => {
                debug!("Connection {}: ignoring binary message", conn_id);
            }
            Ok(Some(Ok(_))) => {} // ping/pong
            Ok(Some(Err(e))) => {
                debug!("Connection {}: socket error: {}", conn_id, e);
                break;
            }
            Err(_) => {
                warn!(
                    "Connection {}: no traffic for {:?}, dropping",
                    conn_id, state.idle_timeout
                );
                break;
            }
        }
    }

    // Without the writer every outbox send fails, so queued commands drain
    // quickly. Closing the session cancels a start in flight.
    drop(command_tx);
    writer.abort();
    state.manager.on_disconnect(conn_id).await;
    if let Err(e) = commands.await {
        error!("Connection {}: command task panicked: {}", conn_id, e);
    }

    info!("WebSocket client disconnected: {}", conn_id);
}

/// Handle one connection's commands strictly in arrival order
async fn command_loop(
    manager: Arc<SessionManager>,
    conn_id: ConnectionId,
    outbox: Outbox,
    mut commands: mpsc::Receiver<String>,
) {
    while let Some(text) = commands.recv().await {
        protocol::handle_text(&manager, conn_id, &outbox, &text).await;
    }
}

async fn write_loop(
    conn_id: ConnectionId,
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbox_rx: mpsc::Receiver<ServerMessage>,
    heartbeat_interval: Duration,
) {
    // `interval_at` rejects a zero period
    let heartbeat_interval = heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL);
    let mut heartbeat = tokio::time::interval_at(
        tokio::time::Instant::now() + heartbeat_interval,
        heartbeat_interval,
    );
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            msg = outbox_rx.recv() => {
                let Some(msg) = msg else { break };
                let text = match serde_json::to_string(&msg) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Connection {}: failed to serialize message: {}", conn_id, e);
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if ws_tx.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = ws_tx.close().await;
}
