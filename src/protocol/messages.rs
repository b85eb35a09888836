use serde::{Deserialize, Serialize};
use std::fmt;

use crate::detection::{Expression, Gesture};
use crate::error::{ErrorCode, StreamError};
use crate::stats::StatsView;

/// Client → server command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    StartCamera,
    StopCamera,
    RequestFrames,
    ToggleEffect,
    ToggleFaceRecognition,
    GetStats,
    ResetStats,
    SaveStats,
}

impl Command {
    pub const ALL: [Command; 8] = [
        Command::StartCamera,
        Command::StopCamera,
        Command::RequestFrames,
        Command::ToggleEffect,
        Command::ToggleFaceRecognition,
        Command::GetStats,
        Command::ResetStats,
        Command::SaveStats,
    ];

    /// Event name on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::StartCamera => "start_camera",
            Command::StopCamera => "stop_camera",
            Command::RequestFrames => "request_frames",
            Command::ToggleEffect => "toggle_effect",
            Command::ToggleFaceRecognition => "toggle_face_recognition",
            Command::GetStats => "get_stats",
            Command::ResetStats => "reset_stats",
            Command::SaveStats => "save_stats",
        }
    }

    pub fn from_event(event: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == event)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound message as it appears on the wire
///
/// `{"id": 7, "event": "toggle_effect", "data": {}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Correlation id echoed in the acknowledgement
    #[serde(default)]
    pub id: Option<u64>,

    pub event: String,

    /// Command payload (every current command takes `{}`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// A decoded command with its correlation id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub id: Option<u64>,
    pub command: Command,
}

impl Request {
    pub fn new(id: u64, command: Command) -> Self {
        Self {
            id: Some(id),
            command,
        }
    }

    /// Decode a text frame
    pub fn parse(text: &str) -> Result<Self, RejectedRequest> {
        let envelope: Envelope = serde_json::from_str(text).map_err(|e| RejectedRequest {
            id: None,
            event: String::new(),
            error: StreamError::MalformedRequest(e.to_string()),
        })?;

        match Command::from_event(&envelope.event) {
            Some(command) => Ok(Self {
                id: envelope.id,
                command,
            }),
            None => Err(RejectedRequest {
                id: envelope.id,
                error: StreamError::UnknownCommand(envelope.event.clone()),
                event: envelope.event,
            }),
        }
    }
}

/// Inbound message that could not be turned into a `Request`
///
/// Carries whatever correlation id could be read so the rejection can still
/// be acknowledged.
#[derive(Debug)]
pub struct RejectedRequest {
    pub id: Option<u64>,
    pub event: String,
    pub error: StreamError,
}

impl RejectedRequest {
    pub fn ack(&self) -> Ack {
        Ack::failure(self.id, self.event.clone(), &self.error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    Success,
    Error,
}

/// Acknowledgement sent for every inbound message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    /// Correlation id of the request
    pub id: Option<u64>,

    /// Event name of the request
    pub command: String,

    pub status: AckStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,

    /// New flag value (toggle commands)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Statistics (`get_stats`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<StatsView>,

    /// Where statistics were written (`save_stats`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Ack {
    pub fn success(id: Option<u64>, command: impl Into<String>) -> Self {
        Self {
            id,
            command: command.into(),
            status: AckStatus::Success,
            message: None,
            error: None,
            enabled: None,
            stats: None,
            path: None,
        }
    }

    pub fn failure(id: Option<u64>, command: impl Into<String>, err: &StreamError) -> Self {
        Self {
            status: AckStatus::Error,
            message: Some(err.to_string()),
            error: Some(err.code()),
            ..Self::success(id, command)
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn with_stats(mut self, stats: StatsView) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == AckStatus::Success
    }
}

/// Payload of a `frame` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramePayload {
    /// Encoded frame (data URL)
    pub image: String,
    pub gestures: Vec<Gesture>,
    pub expressions: Vec<Expression>,
    pub stats: StatsView,
}

/// Payload of a `camera_error` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraErrorPayload {
    pub message: String,
}

/// Server → client message
///
/// Serialized as `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    Ack(Ack),
    Frame(FramePayload),
    CameraError(CameraErrorPayload),
}

impl ServerMessage {
    pub fn camera_error(message: impl Into<String>) -> Self {
        ServerMessage::CameraError(CameraErrorPayload {
            message: message.into(),
        })
    }
}
