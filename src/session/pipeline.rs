use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::state::{ConnectionId, FeatureFlags};
use crate::capture::{CaptureDevice, CaptureError, VideoFrame};
use crate::detection::{DetectOptions, DetectionEvent, Detector};
use crate::protocol::{FramePayload, Outbox, OutboxClosed, ServerMessage};
use crate::render::{FrameEffect, FrameEncoder};
use crate::stats::StatsAggregator;

/// Pause after a failed frame read before trying again
const READ_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Log progress every N emitted frames
const PROGRESS_LOG_INTERVAL: u64 = 100;

type CaptureResult = Result<VideoFrame, CaptureError>;

/// Why a pipeline run ended
#[derive(Debug)]
pub enum PipelineExit {
    /// Stop or disconnect
    Cancelled,
    /// The client's outbox was closed
    ClientGone,
    /// The capture device failed
    Failed(CaptureError),
}

/// Everything a pipeline needs from its session
pub struct PipelineContext {
    pub session_id: ConnectionId,
    pub flags: Arc<Mutex<FeatureFlags>>,
    pub stats: Arc<StatsAggregator>,
    pub outbox: Outbox,
    pub detector: Arc<dyn Detector>,
    pub effect: Arc<dyn FrameEffect>,
    pub encoder: Arc<dyn FrameEncoder>,
    pub max_consecutive_failures: u32,
    /// Save statistics every N emitted frames (0 disables)
    pub autosave_every_frames: u64,
}

/// Producer loop turning captured frames into `frame` events
///
/// Capture runs in its own task at the device's natural rate and hands frames
/// over through a single-slot channel. A frame that arrives while the slot is
/// still occupied is dropped, so a slow detector or client only ever sees the
/// freshest frame.
pub struct FramePipeline {
    ctx: PipelineContext,
    frames_emitted: u64,
    frames_dropped: Arc<AtomicU64>,
}

impl FramePipeline {
    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            ctx,
            frames_emitted: 0,
            frames_dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Run until cancelled, the client goes away, or the camera fails
    ///
    /// The device is released before this returns.
    pub async fn run(mut self, device: Box<dyn CaptureDevice>, cancel: CancellationToken) -> PipelineExit {
        let session_id = self.ctx.session_id;
        info!(
            "Session {}: frame pipeline started ({}, detector {})",
            session_id,
            device.name(),
            self.ctx.detector.name()
        );

        let (slot_tx, mut slot_rx) = mpsc::channel::<CaptureResult>(1);
        let capture_task = tokio::spawn(capture_loop(
            device,
            slot_tx,
            cancel.clone(),
            Arc::clone(&self.frames_dropped),
            self.ctx.max_consecutive_failures,
        ));

        let exit = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break PipelineExit::Cancelled,
                next = slot_rx.recv() => next,
            };

            let frame = match next {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => break PipelineExit::Failed(e),
                None => {
                    break PipelineExit::Failed(CaptureError::Disconnected(
                        "capture stopped unexpectedly".to_string(),
                    ))
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break PipelineExit::Cancelled,
                result = self.process(frame) => {
                    if result.is_err() {
                        break PipelineExit::ClientGone;
                    }
                }
            }
        };

        // Stop capture (no-op if already cancelled) and wait for the device
        // to be released.
        cancel.cancel();
        drop(slot_rx);
        if let Err(e) = capture_task.await {
            error!("Session {}: capture task panicked: {}", session_id, e);
        }

        info!(
            "Session {}: frame pipeline stopped ({:?}, {} frames emitted, {} dropped)",
            session_id,
            exit,
            self.frames_emitted,
            self.frames_dropped.load(Ordering::Relaxed)
        );

        exit
    }

    /// Detect, annotate, record and emit one frame
    async fn process(&mut self, frame: VideoFrame) -> Result<(), OutboxClosed> {
        // Flags are read once per frame; toggles land on the next frame.
        let flags = *self.ctx.flags.lock().await;
        let sequence = frame.sequence;

        let options = DetectOptions {
            expressions: flags.face_recognition,
        };
        let mut detection = match self.ctx.detector.detect(&frame, options).await {
            Ok(detection) => detection,
            Err(e) => {
                warn!(
                    "Session {}: detection failed on frame {}: {:#}",
                    self.ctx.session_id, sequence, e
                );
                DetectionEvent::default()
            }
        };
        if !flags.face_recognition {
            detection.expressions.clear();
        }

        let effect = flags.effect.then(|| Arc::clone(&self.ctx.effect));
        let encoder = Arc::clone(&self.ctx.encoder);
        let encoded = tokio::task::spawn_blocking(move || {
            let mut frame = frame;
            if let Some(effect) = effect {
                effect.apply(&mut frame);
            }
            encoder.encode(&frame)
        })
        .await;

        let image = match encoded {
            Ok(Ok(image)) => image,
            Ok(Err(e)) => {
                warn!(
                    "Session {}: failed to encode frame {}: {:#}",
                    self.ctx.session_id, sequence, e
                );
                return Ok(());
            }
            Err(e) => {
                error!("Session {}: encoder task panicked: {}", self.ctx.session_id, e);
                return Ok(());
            }
        };

        self.ctx.stats.record(&detection).await;
        let stats = self.ctx.stats.snapshot().await;

        self.ctx
            .outbox
            .send(ServerMessage::Frame(FramePayload {
                image,
                gestures: detection.gestures,
                expressions: detection.expressions,
                stats,
            }))
            .await?;

        self.frames_emitted += 1;

        if self.frames_emitted % PROGRESS_LOG_INTERVAL == 0 {
            info!(
                "Session {}: {} frames emitted ({} dropped)",
                self.ctx.session_id,
                self.frames_emitted,
                self.frames_dropped.load(Ordering::Relaxed)
            );
        }

        let autosave = self.ctx.autosave_every_frames;
        if autosave > 0 && self.frames_emitted % autosave == 0 {
            if let Err(e) = self.ctx.stats.persist().await {
                warn!("Session {}: autosave failed: {}", self.ctx.session_id, e);
            }
        }

        Ok(())
    }
}

/// Pull frames from the device and offer them to the pipeline
///
/// Owns the device for its whole lifetime and always releases it on exit. A
/// fatal failure is forwarded to the pipeline after the release.
async fn capture_loop(
    mut device: Box<dyn CaptureDevice>,
    slot: mpsc::Sender<CaptureResult>,
    cancel: CancellationToken,
    dropped: Arc<AtomicU64>,
    max_consecutive_failures: u32,
) {
    let max_failures = max_consecutive_failures.max(1);
    let mut failures = 0u32;

    let failure = loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break None,
            result = device.next_frame() => result,
        };

        match result {
            Ok(frame) => {
                failures = 0;
                match slot.try_send(Ok(frame)) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        dropped.fetch_add(1, Ordering::Relaxed);
                        debug!("Pipeline busy, dropping captured frame");
                    }
                    Err(TrySendError::Closed(_)) => break None,
                }
            }
            Err(e) if e.is_fatal() => break Some(e),
            Err(e) => {
                failures += 1;
                warn!(
                    "Failed to read frame from {} ({}/{}): {}",
                    device.name(),
                    failures,
                    max_failures,
                    e
                );
                if failures >= max_failures {
                    break Some(e);
                }

                tokio::select! {
                    _ = cancel.cancelled() => break None,
                    _ = tokio::time::sleep(READ_RETRY_DELAY) => {}
                }
            }
        }
    };

    if let Err(e) = device.release().await {
        warn!("Failed to release capture device {}: {:#}", device.name(), e);
    }

    if let Some(e) = failure {
        error!("Capture device {} failed: {}", device.name(), e);
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = slot.send(Err(e)) => {}
        }
    }
}

/// Running pipeline owned by a session
pub struct PipelineHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PipelineHandle {
    pub fn new(cancel: CancellationToken, task: JoinHandle<()>) -> Self {
        Self { cancel, task }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Cancel the pipeline and wait for it, aborting after `timeout`
    pub async fn shutdown(mut self, timeout: Duration) {
        self.cancel.cancel();

        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_cancelled() => {}
            Ok(Err(e)) => error!("Frame pipeline task panicked: {}", e),
            Err(_) => {
                warn!("Frame pipeline did not stop within {:?}, aborting", timeout);
                self.task.abort();
            }
        }
    }
}
