// Shared fixtures for integration tests: a controllable camera, a scripted
// detector and helpers for reading a session's outbox.

#![allow(dead_code)]

use anyhow::Result;
use gesture_stream::capture::{CaptureDevice, CaptureError, CaptureSource, VideoFrame};
use gesture_stream::detection::{DetectOptions, DetectionEvent, Detector, Expression, Gesture};
use gesture_stream::protocol::{Ack, FramePayload, Outbox, ServerMessage};
use gesture_stream::session::{Capabilities, Session, SessionConfig, SessionState};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// How long tests wait for an expected message before failing
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Camera that behaves like exclusive hardware with scriptable faults
pub struct MockCamera {
    in_use: Arc<AtomicBool>,
    opens: AtomicU32,
    frame_interval: Duration,
    open_delay: Duration,
    /// How long releasing the device takes
    release_delay: Duration,
    /// Fail this many opens before succeeding
    failing_opens: AtomicU32,
    /// Disconnect after this many frames (per device)
    disconnect_after: Option<u64>,
    frames_served: Arc<AtomicU64>,
}

impl MockCamera {
    pub fn new() -> Self {
        Self {
            in_use: Arc::new(AtomicBool::new(false)),
            opens: AtomicU32::new(0),
            frame_interval: Duration::from_millis(10),
            open_delay: Duration::ZERO,
            release_delay: Duration::ZERO,
            failing_opens: AtomicU32::new(0),
            disconnect_after: None,
            frames_served: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn with_release_delay(mut self, delay: Duration) -> Self {
        self.release_delay = delay;
        self
    }

    pub fn with_failing_opens(self, count: u32) -> Self {
        self.failing_opens.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_disconnect_after(mut self, frames: u64) -> Self {
        self.disconnect_after = Some(frames);
        self
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use.load(Ordering::SeqCst)
    }

    pub fn open_count(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn frames_served(&self) -> u64 {
        self.frames_served.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CaptureSource for MockCamera {
    async fn open(&self) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.open_delay).await;

        if self
            .failing_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(CaptureError::Open {
                device: "mock".to_string(),
                reason: "scripted failure".to_string(),
            });
        }

        if self
            .in_use
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CaptureError::Busy {
                device: "mock".to_string(),
            });
        }

        Ok(Box::new(MockDevice {
            in_use: Arc::clone(&self.in_use),
            held: true,
            frame_interval: self.frame_interval,
            release_delay: self.release_delay,
            disconnect_after: self.disconnect_after,
            sequence: 0,
            frames_served: Arc::clone(&self.frames_served),
        }))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

struct MockDevice {
    in_use: Arc<AtomicBool>,
    held: bool,
    frame_interval: Duration,
    release_delay: Duration,
    disconnect_after: Option<u64>,
    sequence: u64,
    frames_served: Arc<AtomicU64>,
}

#[async_trait::async_trait]
impl CaptureDevice for MockDevice {
    async fn next_frame(&mut self) -> Result<VideoFrame, CaptureError> {
        tokio::time::sleep(self.frame_interval).await;

        if matches!(self.disconnect_after, Some(limit) if self.sequence >= limit) {
            return Err(CaptureError::Disconnected("mock unplugged".to_string()));
        }

        let mut frame = VideoFrame::blank(4, 4);
        frame.sequence = self.sequence;
        self.sequence += 1;
        self.frames_served.fetch_add(1, Ordering::SeqCst);
        Ok(frame)
    }

    async fn release(&mut self) -> Result<()> {
        tokio::time::sleep(self.release_delay).await;
        if self.held {
            self.held = false;
            self.in_use.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        if self.held {
            self.in_use.store(false, Ordering::SeqCst);
        }
    }
}

/// Detector returning the same labels for every frame
pub struct ScriptedDetector {
    gestures: Vec<Gesture>,
    expressions: Vec<Expression>,
    /// Fail every frame whose sequence number is a multiple of this
    fail_every: Option<u64>,
}

impl ScriptedDetector {
    pub fn new(gestures: &[&str], expressions: &[&str]) -> Self {
        Self {
            gestures: gestures.iter().map(|g| Gesture::from(*g)).collect(),
            expressions: expressions.iter().map(|e| Expression::from(*e)).collect(),
            fail_every: None,
        }
    }

    pub fn failing_every(mut self, n: u64) -> Self {
        self.fail_every = Some(n);
        self
    }
}

#[async_trait::async_trait]
impl Detector for ScriptedDetector {
    async fn detect(&self, frame: &VideoFrame, options: DetectOptions) -> Result<DetectionEvent> {
        if matches!(self.fail_every, Some(n) if n > 0 && frame.sequence % n == 0) {
            anyhow::bail!("scripted detection failure on frame {}", frame.sequence);
        }

        Ok(DetectionEvent {
            gestures: self.gestures.clone(),
            expressions: if options.expressions {
                self.expressions.clone()
            } else {
                Vec::new()
            },
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Session settings with short timeouts for tests
pub fn fast_config() -> SessionConfig {
    SessionConfig {
        start_attempts: 1,
        retry_delay: Duration::from_millis(10),
        stop_timeout: Duration::from_secs(2),
        max_consecutive_failures: 3,
        autosave_every_frames: 0,
        outbox_capacity: 64,
        max_sessions: 8,
    }
}

pub fn capabilities(camera: Arc<MockCamera>) -> Capabilities {
    Capabilities::new(camera).with_detector(Arc::new(ScriptedDetector::new(&["fist"], &["smile"])))
}

/// Client side of a session's outbox
pub struct Client {
    pub outbox: Outbox,
    pub rx: mpsc::Receiver<ServerMessage>,
}

impl Client {
    pub fn new() -> Self {
        let (outbox, rx) = Outbox::channel(1024);
        Self { outbox, rx }
    }

    pub async fn recv(&mut self) -> Result<ServerMessage> {
        tokio::time::timeout(RECV_TIMEOUT, self.rx.recv())
            .await
            .map_err(|_| anyhow::anyhow!("timed out waiting for a message"))?
            .ok_or_else(|| anyhow::anyhow!("outbox closed"))
    }

    /// Next ack, skipping frames
    pub async fn next_ack(&mut self) -> Result<Ack> {
        loop {
            if let ServerMessage::Ack(ack) = self.recv().await? {
                return Ok(ack);
            }
        }
    }

    /// Next frame, skipping acks
    pub async fn next_frame(&mut self) -> Result<FramePayload> {
        loop {
            match self.recv().await? {
                ServerMessage::Frame(frame) => return Ok(frame),
                ServerMessage::CameraError(e) => anyhow::bail!("camera error: {}", e.message),
                ServerMessage::Ack(_) => {}
            }
        }
    }

    /// Next camera error message, skipping everything else
    pub async fn next_camera_error(&mut self) -> Result<String> {
        loop {
            if let ServerMessage::CameraError(e) = self.recv().await? {
                return Ok(e.message);
            }
        }
    }

    /// Drop everything currently queued
    pub fn drain(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}

/// Poll the session until it reaches `state` or the timeout expires
pub async fn wait_for_state(session: &Session, state: SessionState) -> bool {
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if session.state().await == state {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
