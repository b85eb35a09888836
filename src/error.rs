use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::CaptureError;
use crate::session::{ConnectionId, SessionState};

/// Errors that can surface to a client as an error acknowledgement
#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Camera(#[from] CaptureError),

    #[error("camera is not running")]
    NotStreaming,

    #[error("session is busy ({0})")]
    SessionBusy(SessionState),

    #[error("unknown session {0}")]
    UnknownSession(ConnectionId),

    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("failed to save statistics: {0:#}")]
    Persist(anyhow::Error),

    #[error("too many sessions (limit {0})")]
    TooManySessions(usize),

    #[error("session closed")]
    SessionClosed,
}

impl StreamError {
    /// Wire code sent in the `error` field of an error acknowledgement
    pub fn code(&self) -> ErrorCode {
        match self {
            StreamError::Camera(_) | StreamError::NotStreaming | StreamError::SessionClosed => {
                ErrorCode::CameraError
            }
            StreamError::SessionBusy(_) => ErrorCode::SessionBusy,
            StreamError::UnknownSession(_) => ErrorCode::UnknownSession,
            StreamError::UnknownCommand(_) => ErrorCode::UnknownCommand,
            StreamError::MalformedRequest(_) => ErrorCode::BadRequest,
            StreamError::Persist(_) => ErrorCode::PersistError,
            StreamError::TooManySessions(_) => ErrorCode::TooManySessions,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    CameraError,
    SessionBusy,
    UnknownSession,
    UnknownCommand,
    BadRequest,
    PersistError,
    TooManySessions,
}
