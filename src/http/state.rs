use crate::session::SessionManager;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state for HTTP and WebSocket handlers
#[derive(Clone)]
pub struct AppState {
    /// Live sessions (connection id → session)
    pub manager: Arc<SessionManager>,

    /// How often the server pings each socket
    /// Default: 15 seconds
    pub heartbeat_interval: Duration,

    /// A socket silent for this long is treated as disconnected
    /// Default: 60 seconds
    pub idle_timeout: Duration,
}

impl AppState {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self {
            manager,
            heartbeat_interval: Duration::from_secs(15),
            idle_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_heartbeat(mut self, interval: Duration, idle_timeout: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.idle_timeout = idle_timeout;
        self
    }
}
