use anyhow::Result;
use thiserror::Error;

/// Raw video frame (BGR8, row-major, no padding)
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Pixel data, 3 bytes per pixel in B, G, R order
    pub data: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Monotonic capture sequence number (starts at 0 per device)
    pub sequence: u64,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl VideoFrame {
    pub const BYTES_PER_PIXEL: usize = 3;

    /// Create a black frame of the given size
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            data: vec![0; width as usize * height as usize * Self::BYTES_PER_PIXEL],
            width,
            height,
            sequence: 0,
            timestamp_ms: 0,
        }
    }

    /// Flip the frame horizontally so it reads like a mirror
    pub fn mirror_horizontal(&mut self) {
        let row_len = self.width as usize * Self::BYTES_PER_PIXEL;
        if row_len == 0 {
            return;
        }

        for row in self.data.chunks_exact_mut(row_len) {
            let width = self.width as usize;
            for x in 0..width / 2 {
                let left = x * Self::BYTES_PER_PIXEL;
                let right = (width - 1 - x) * Self::BYTES_PER_PIXEL;
                for c in 0..Self::BYTES_PER_PIXEL {
                    row.swap(left + c, right + c);
                }
            }
        }
    }
}

/// Configuration for capture devices
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Natural frame rate of the device
    pub fps: u32,
    /// Flip frames horizontally before handing them out
    pub mirror: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
            mirror: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture device {device} is already in use")]
    Busy { device: String },

    #[error("failed to open capture device {device}: {reason}")]
    Open { device: String, reason: String },

    #[error("capture device disconnected: {0}")]
    Disconnected(String),

    #[error("permission to use the capture device was revoked")]
    PermissionDenied,

    #[error("failed to read frame: {0}")]
    Read(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CaptureError {
    /// Whether the device is gone for good (as opposed to a single bad read)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CaptureError::Disconnected(_) | CaptureError::PermissionDenied
        )
    }
}

/// An opened capture device
///
/// The device is exclusively owned by whoever opened it until `release` is
/// called (or the device is dropped).
#[async_trait::async_trait]
pub trait CaptureDevice: Send {
    /// Wait for the next frame at the device's natural rate
    async fn next_frame(&mut self) -> Result<VideoFrame, CaptureError>;

    /// Release the device so it can be opened again
    async fn release(&mut self) -> Result<()>;

    /// Get device name for logging
    fn name(&self) -> &str;
}

/// Source of capture devices
///
/// Implementations:
/// - Synthetic: moving test pattern (built in)
/// - Platform cameras: provided by the embedding application
#[async_trait::async_trait]
pub trait CaptureSource: Send + Sync {
    /// Open the device, failing with `CaptureError::Busy` if someone else holds it
    async fn open(&self) -> Result<Box<dyn CaptureDevice>, CaptureError>;

    /// Get source name for logging
    fn name(&self) -> &str;
}
