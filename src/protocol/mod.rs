//! Event protocol
//!
//! JSON messages exchanged with a client:
//! - inbound: `{"id": 1, "event": "start_camera", "data": {}}`
//! - ack: `{"event": "ack", "data": {"id": 1, "command": "start_camera", "status": "success"}}`
//! - `{"event": "frame", "data": {"image", "gestures", "expressions", "stats"}}`
//! - `{"event": "camera_error", "data": {"message"}}`
//!
//! Every inbound message gets exactly one ack, including ones that cannot be
//! parsed or name an unknown command.

mod messages;
mod outbox;

pub use messages::{
    Ack, AckStatus, CameraErrorPayload, Command, Envelope, FramePayload, RejectedRequest, Request,
    ServerMessage,
};
pub use outbox::{Outbox, OutboxClosed};

use tracing::{debug, warn};

use crate::session::{ConnectionId, SessionManager};

/// Decode one inbound text message and route it to the client's session
///
/// Rejections (bad JSON, unknown command, unknown session) are acknowledged
/// here; everything else is acknowledged by the session.
pub async fn handle_text(manager: &SessionManager, conn_id: ConnectionId, outbox: &Outbox, text: &str) {
    let request = match Request::parse(text) {
        Ok(request) => request,
        Err(rejected) => {
            warn!("Connection {}: rejected message: {}", conn_id, rejected.error);
            reply(outbox, rejected.ack()).await;
            return;
        }
    };

    debug!("Connection {}: {} (id={:?})", conn_id, request.command, request.id);

    if let Err(e) = manager.dispatch(conn_id, request).await {
        warn!("Connection {}: {} failed: {}", conn_id, request.command, e);
        reply(outbox, Ack::failure(request.id, request.command.as_str(), &e)).await;
    }
}

async fn reply(outbox: &Outbox, ack: Ack) {
    if outbox.ack(ack).await.is_err() {
        debug!("Client went away before the ack was sent");
    }
}
