use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::config::{Capabilities, SessionConfig};
use super::session::Session;
use super::state::{ConnectionId, SessionSummary};
use crate::error::StreamError;
use crate::protocol::{Ack, Outbox, Request};

/// Registry of live sessions, one per connected client
pub struct SessionManager {
    capabilities: Capabilities,
    config: SessionConfig,
    sessions: RwLock<HashMap<ConnectionId, Arc<Session>>>,
}

impl SessionManager {
    pub fn new(capabilities: Capabilities, config: SessionConfig) -> Self {
        Self {
            capabilities,
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Create a session for a newly connected client
    ///
    /// A session already registered under `id` is closed and replaced.
    pub async fn on_connect(
        &self,
        id: ConnectionId,
        outbox: Outbox,
    ) -> Result<Arc<Session>, StreamError> {
        let session = Arc::new(Session::new(
            id,
            outbox,
            self.capabilities.clone(),
            self.config.clone(),
        ));

        let replaced = {
            let mut sessions = self.sessions.write().await;
            if !sessions.contains_key(&id) && sessions.len() >= self.config.max_sessions {
                warn!(
                    "Rejecting connection {}: {} sessions active",
                    id,
                    sessions.len()
                );
                return Err(StreamError::TooManySessions(self.config.max_sessions));
            }
            sessions.insert(id, Arc::clone(&session))
        };

        if let Some(old) = replaced {
            warn!("Connection {} reconnected, closing previous session", id);
            old.close().await;
        }

        info!("Client connected: {}", id);

        Ok(session)
    }

    /// Destroy a client's session, releasing its camera
    ///
    /// Unknown ids are ignored so repeated disconnects are harmless.
    pub async fn on_disconnect(&self, id: ConnectionId) {
        let session = self.sessions.write().await.remove(&id);

        match session {
            Some(session) => {
                session.close().await;
                info!("Client disconnected: {}", id);
            }
            None => info!("Disconnect for unknown connection {} ignored", id),
        }
    }

    /// Route a command to the client's session
    ///
    /// The session sends the acknowledgement itself; only a missing session
    /// is reported back to the caller.
    pub async fn dispatch(&self, id: ConnectionId, request: Request) -> Result<Ack, StreamError> {
        let session = self
            .get(id)
            .await
            .ok_or(StreamError::UnknownSession(id))?;

        Ok(session.handle(request).await)
    }

    pub async fn get(&self, id: ConnectionId) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn list(&self) -> Vec<SessionSummary> {
        let sessions: Vec<Arc<Session>> = self.sessions.read().await.values().cloned().collect();

        let mut summaries = Vec::with_capacity(sessions.len());
        for session in sessions {
            summaries.push(session.summary().await);
        }
        summaries.sort_by_key(|s| s.created_at);
        summaries
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Close every session (server shutdown)
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<Session>> = self.sessions.write().await.drain().map(|(_, s)| s).collect();

        if sessions.is_empty() {
            return;
        }

        info!("Closing {} active session(s)", sessions.len());
        futures::future::join_all(sessions.iter().map(|s| s.close())).await;
    }
}
