use std::sync::Arc;
use std::time::Duration;

use crate::capture::CaptureSource;
use crate::detection::{Detector, NoopDetector};
use crate::render::{DataUrlEncoder, FrameEffect, FrameEncoder, MatrixEffect};
use crate::stats::StatsStore;

/// Tunables shared by every session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How many times `start_camera` tries to open the device
    /// Default: 3
    pub start_attempts: u32,

    /// Pause between open attempts
    /// Default: 1 second
    pub retry_delay: Duration,

    /// How long stop/disconnect waits for the pipeline before aborting it
    /// Default: 2 seconds
    pub stop_timeout: Duration,

    /// Consecutive frame read failures tolerated before the camera is
    /// considered lost
    /// Default: 10
    pub max_consecutive_failures: u32,

    /// Save statistics every N emitted frames (0 disables)
    /// Default: 100
    pub autosave_every_frames: u64,

    /// Outbound queue size per connection
    /// Default: 16
    pub outbox_capacity: usize,

    /// Maximum number of concurrent sessions
    /// Default: 64
    pub max_sessions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            start_attempts: 3,
            retry_delay: Duration::from_secs(1),
            stop_timeout: Duration::from_secs(2),
            max_consecutive_failures: 10,
            autosave_every_frames: 100,
            outbox_capacity: 16,
            max_sessions: 64,
        }
    }
}

/// Pluggable collaborators every session uses
#[derive(Clone)]
pub struct Capabilities {
    /// Where capture devices come from
    pub camera: Arc<dyn CaptureSource>,

    /// Gesture/expression detection
    pub detector: Arc<dyn Detector>,

    /// Transform applied when a session enables the effect
    pub effect: Arc<dyn FrameEffect>,

    /// Frame encoding for transport
    pub encoder: Arc<dyn FrameEncoder>,

    /// Statistics persistence (`save_stats` fails without one)
    pub stats_store: Option<Arc<dyn StatsStore>>,
}

impl Capabilities {
    /// Built-in detector, effect and encoder around the given camera
    pub fn new(camera: Arc<dyn CaptureSource>) -> Self {
        Self {
            camera,
            detector: Arc::new(NoopDetector),
            effect: Arc::new(MatrixEffect::default()),
            encoder: Arc::new(DataUrlEncoder::default()),
            stats_store: None,
        }
    }

    pub fn with_detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_effect(mut self, effect: Arc<dyn FrameEffect>) -> Self {
        self.effect = effect;
        self
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn FrameEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_stats_store(mut self, store: Arc<dyn StatsStore>) -> Self {
        self.stats_store = Some(store);
        self
    }
}
