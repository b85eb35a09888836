pub mod capture;
pub mod config;
pub mod detection;
pub mod error;
pub mod http;
pub mod protocol;
pub mod render;
pub mod session;
pub mod stats;

pub use capture::{CaptureConfig, CaptureDevice, CaptureError, CaptureSource, SyntheticCamera, VideoFrame};
pub use config::Config;
pub use detection::{DetectOptions, DetectionEvent, Detector, Expression, Gesture, NoopDetector};
pub use error::{ErrorCode, StreamError};
pub use http::{create_router, AppState};
pub use protocol::{Ack, AckStatus, Command, Outbox, Request, ServerMessage};
pub use render::{DataUrlEncoder, FrameEffect, FrameEncoder, MatrixEffect};
pub use session::{Capabilities, ConnectionId, FeatureFlags, Session, SessionConfig, SessionManager, SessionState};
pub use stats::{JsonFileStore, StatsAggregator, StatsStore, StatsView};
