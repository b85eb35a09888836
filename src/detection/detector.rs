use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::labels::{Expression, Gesture};
use crate::capture::VideoFrame;

/// Labels detected in a single frame
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionEvent {
    /// Gestures seen in the frame (one entry per hand)
    pub gestures: Vec<Gesture>,

    /// Expressions seen in the frame, empty unless face recognition is on
    pub expressions: Vec<Expression>,
}

impl DetectionEvent {
    pub fn is_empty(&self) -> bool {
        self.gestures.is_empty() && self.expressions.is_empty()
    }
}

/// Which detector categories to run for a frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectOptions {
    /// Run expression detection in addition to gestures
    pub expressions: bool,
}

/// Gesture/expression detection capability
///
/// Implementations wrap an inference backend. A single instance is shared by
/// every session, so implementations must not keep per-session state.
#[async_trait::async_trait]
pub trait Detector: Send + Sync {
    /// Detect labels in a frame
    async fn detect(&self, frame: &VideoFrame, options: DetectOptions) -> Result<DetectionEvent>;

    /// Get detector name for logging
    fn name(&self) -> &str;
}

/// Detector that never reports anything
///
/// Used when no inference backend is wired in, so frames still stream.
#[derive(Debug, Default)]
pub struct NoopDetector;

#[async_trait::async_trait]
impl Detector for NoopDetector {
    async fn detect(&self, _frame: &VideoFrame, _options: DetectOptions) -> Result<DetectionEvent> {
        Ok(DetectionEvent::default())
    }

    fn name(&self) -> &str {
        "noop"
    }
}
