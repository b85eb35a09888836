pub mod detector;
pub mod labels;

pub use detector::{DetectOptions, DetectionEvent, Detector, NoopDetector};
pub use labels::{Expression, Gesture};
