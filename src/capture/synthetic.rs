// Synthetic camera producing a moving test pattern

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, Interval, MissedTickBehavior};
use tracing::info;

use super::backend::{CaptureConfig, CaptureDevice, CaptureError, CaptureSource, VideoFrame};

/// Capture source backed by a generated test pattern
///
/// Behaves like a single physical camera: only one device can be open at a
/// time, and it becomes available again once released.
pub struct SyntheticCamera {
    config: CaptureConfig,
    in_use: Arc<AtomicBool>,
}

impl SyntheticCamera {
    pub fn new(config: CaptureConfig) -> Self {
        info!(
            "Synthetic camera initialized ({}x{} @ {} fps)",
            config.width, config.height, config.fps
        );

        Self {
            config,
            in_use: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a device from this source is currently open
    pub fn is_in_use(&self) -> bool {
        self.in_use.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CaptureSource for SyntheticCamera {
    async fn open(&self) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        if self
            .in_use
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CaptureError::Busy {
                device: self.name().to_string(),
            });
        }

        let period = Duration::from_secs_f64(1.0 / self.config.fps.max(1) as f64);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Synthetic camera opened");

        Ok(Box::new(SyntheticDevice {
            config: self.config.clone(),
            in_use: Arc::clone(&self.in_use),
            held: true,
            ticker,
            started: Instant::now(),
            sequence: 0,
        }))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

struct SyntheticDevice {
    config: CaptureConfig,
    in_use: Arc<AtomicBool>,
    held: bool,
    ticker: Interval,
    started: Instant,
    sequence: u64,
}

impl SyntheticDevice {
    fn render(&self) -> VideoFrame {
        let mut frame = VideoFrame::blank(self.config.width, self.config.height);
        let width = self.config.width as usize;
        let height = self.config.height.max(1) as usize;

        // Diagonal gradient that scrolls one pixel per frame, plus a bar on
        // the left third so mirroring is visible.
        let shift = self.sequence as usize;
        for (i, px) in frame
            .data
            .chunks_exact_mut(VideoFrame::BYTES_PER_PIXEL)
            .enumerate()
        {
            let x = i % width.max(1);
            let y = i / width.max(1);
            px[0] = ((x + shift) % 256) as u8;
            px[1] = ((y * 255) / height) as u8;
            px[2] = if x < width / 3 { 200 } else { 40 };
        }

        frame.sequence = self.sequence;
        frame.timestamp_ms = self.started.elapsed().as_millis() as u64;

        if self.config.mirror {
            frame.mirror_horizontal();
        }

        frame
    }
}

#[async_trait::async_trait]
impl CaptureDevice for SyntheticDevice {
    async fn next_frame(&mut self) -> Result<VideoFrame, CaptureError> {
        if !self.held {
            return Err(CaptureError::Disconnected("device was released".to_string()));
        }

        self.ticker.tick().await;
        let frame = self.render();
        self.sequence += 1;
        Ok(frame)
    }

    async fn release(&mut self) -> Result<()> {
        if self.held {
            self.held = false;
            self.in_use.store(false, Ordering::SeqCst);
            info!("Synthetic camera released after {} frames", self.sequence);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

impl Drop for SyntheticDevice {
    fn drop(&mut self) {
        if self.held {
            self.in_use.store(false, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> CaptureConfig {
        CaptureConfig {
            width: 8,
            height: 4,
            fps: 200,
            mirror: false,
        }
    }

    #[tokio::test]
    async fn second_open_is_rejected_until_release() {
        let camera = SyntheticCamera::new(small_config());

        let mut device = camera.open().await.unwrap();
        assert!(camera.is_in_use());
        assert!(matches!(
            camera.open().await,
            Err(CaptureError::Busy { .. })
        ));

        device.release().await.unwrap();
        assert!(!camera.is_in_use());
        assert!(camera.open().await.is_ok());
    }

    #[tokio::test]
    async fn dropping_device_frees_camera() {
        let camera = SyntheticCamera::new(small_config());
        let device = camera.open().await.unwrap();
        drop(device);
        assert!(!camera.is_in_use());
    }

    #[tokio::test]
    async fn frames_are_sequenced() {
        let camera = SyntheticCamera::new(small_config());
        let mut device = camera.open().await.unwrap();

        let first = device.next_frame().await.unwrap();
        let second = device.next_frame().await.unwrap();

        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
        assert_eq!(first.data.len(), 8 * 4 * 3);
    }
}
