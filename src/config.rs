use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::capture::CaptureConfig;
use crate::session::SessionConfig;

/// Prefix for environment overrides, e.g. `GESTURE_STREAM__SERVICE__HTTP__PORT=9000`
pub const ENV_PREFIX: &str = "GESTURE_STREAM";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub camera: CameraConfig,
    pub session: SessionSettings,
    pub stats: StatsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "gesture-stream".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,

    /// Directory with a browser UI served at `/`
    pub static_dir: Option<PathBuf>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 5000,
            static_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fps: u32,
    pub width: u32,
    pub height: u32,

    /// Flip frames horizontally (selfie view)
    pub mirror: bool,

    pub start_attempts: u32,
    pub retry_delay_ms: u64,
    pub max_consecutive_failures: u32,

    /// JPEG quality of emitted frames (1-100)
    pub jpeg_quality: u8,
}

impl Default for CameraConfig {
    fn default() -> Self {
        let capture = CaptureConfig::default();
        let session = SessionConfig::default();
        Self {
            fps: capture.fps,
            width: capture.width,
            height: capture.height,
            mirror: capture.mirror,
            start_attempts: session.start_attempts,
            retry_delay_ms: session.retry_delay.as_millis() as u64,
            max_consecutive_failures: session.max_consecutive_failures,
            jpeg_quality: 70,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub max_sessions: usize,
    pub outbox_capacity: usize,
    pub stop_timeout_ms: u64,
    pub heartbeat_interval_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            max_sessions: session.max_sessions,
            outbox_capacity: session.outbox_capacity,
            stop_timeout_ms: session.stop_timeout.as_millis() as u64,
            heartbeat_interval_secs: 15,
            idle_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Where `save_stats` writes snapshots
    pub dir: PathBuf,

    /// Autosave every N emitted frames (0 disables)
    pub autosave_every_frames: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("stats"),
            autosave_every_frames: SessionConfig::default().autosave_every_frames,
        }
    }
}

impl Config {
    /// Load `path` (extension optional) overlaid with `GESTURE_STREAM__*` variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .with_context(|| format!("Failed to read config {}", path))?;

        let cfg: Self = settings
            .try_deserialize()
            .with_context(|| format!("Invalid config {}", path))?;
        cfg.validate()
            .with_context(|| format!("Invalid config {}", path))?;

        Ok(cfg)
    }

    /// Reject values that would stall or crash the server at runtime
    pub fn validate(&self) -> Result<()> {
        ensure!(self.camera.fps > 0, "camera.fps must be at least 1");
        ensure!(
            (1..=100).contains(&self.camera.jpeg_quality),
            "camera.jpeg_quality must be between 1 and 100"
        );
        ensure!(
            self.session.heartbeat_interval_secs > 0,
            "session.heartbeat_interval_secs must be at least 1"
        );
        ensure!(
            self.session.idle_timeout_secs > self.session.heartbeat_interval_secs,
            "session.idle_timeout_secs must be longer than the heartbeat interval"
        );
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            start_attempts: self.camera.start_attempts,
            retry_delay: Duration::from_millis(self.camera.retry_delay_ms),
            stop_timeout: Duration::from_millis(self.session.stop_timeout_ms),
            max_consecutive_failures: self.camera.max_consecutive_failures,
            autosave_every_frames: self.stats.autosave_every_frames,
            outbox_capacity: self.session.outbox_capacity,
            max_sessions: self.session.max_sessions,
        }
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            width: self.camera.width,
            height: self.camera.height,
            fps: self.camera.fps,
            mirror: self.camera.mirror,
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.session.heartbeat_interval_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session.idle_timeout_secs)
    }
}
