//! Streaming sessions
//!
//! One `Session` per connected client. A session owns:
//! - the camera lifecycle (Idle → Starting → Streaming → Stopping → Idle)
//! - the client's feature flags (effect, face recognition)
//! - the client's statistics
//! - while streaming, the frame pipeline feeding the client's outbox
//!
//! `SessionManager` creates and destroys sessions as clients come and go and
//! routes commands to them.

mod config;
mod manager;
mod pipeline;
mod session;
mod state;

pub use config::{Capabilities, SessionConfig};
pub use manager::SessionManager;
pub use pipeline::{FramePipeline, PipelineContext, PipelineExit, PipelineHandle};
pub use session::Session;
pub use state::{ConnectionId, FeatureFlags, SessionState, SessionSummary};
