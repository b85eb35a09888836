pub mod effect;
pub mod encode;

pub use effect::{FrameEffect, MatrixEffect};
pub use encode::{DataUrlEncoder, FrameEncoder};
