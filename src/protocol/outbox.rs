use thiserror::Error;
use tokio::sync::mpsc;

use super::messages::{Ack, ServerMessage};

#[derive(Debug, Error)]
#[error("client connection closed")]
pub struct OutboxClosed;

/// Outbound message queue of one client connection
///
/// Acks, frames and camera errors all go through the same FIFO, so the client
/// sees them in the order they were enqueued. The queue is bounded: a client
/// that stops reading makes senders wait instead of growing memory.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::Sender<ServerMessage>,
}

impl Outbox {
    /// Create an outbox and the receiver the transport drains
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub async fn send(&self, message: ServerMessage) -> Result<(), OutboxClosed> {
        self.tx.send(message).await.map_err(|_| OutboxClosed)
    }

    pub async fn ack(&self, ack: Ack) -> Result<(), OutboxClosed> {
        self.send(ServerMessage::Ack(ack)).await
    }
}
