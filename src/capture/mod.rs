pub mod backend;
pub mod synthetic;

pub use backend::{CaptureConfig, CaptureDevice, CaptureError, CaptureSource, VideoFrame};
pub use synthetic::SyntheticCamera;
