use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of one client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle state of a session's camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Starting,
    Streaming,
    Stopping,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Streaming => "streaming",
            SessionState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Per-session feature toggles, both off by default
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Apply the visual effect to emitted frames
    pub effect: bool,

    /// Run expression detection
    pub face_recognition: bool,
}

/// Session overview for the HTTP API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: ConnectionId,
    pub state: SessionState,
    pub effect_enabled: bool,
    pub face_recognition_enabled: bool,
    pub created_at: DateTime<Utc>,
    /// When the camera entered Streaming, if it is streaming
    pub started_at: Option<DateTime<Utc>>,
}
