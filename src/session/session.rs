use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::{Capabilities, SessionConfig};
use super::pipeline::{FramePipeline, PipelineContext, PipelineExit, PipelineHandle};
use super::state::{ConnectionId, FeatureFlags, SessionState, SessionSummary};
use crate::capture::{CaptureDevice, CaptureError};
use crate::error::StreamError;
use crate::protocol::{Ack, Command, Outbox, Request, ServerMessage};
use crate::stats::StatsAggregator;

/// Camera lifecycle of a session
struct Lifecycle {
    state: SessionState,

    /// Present while Streaming; a stop in flight holds it while Stopping
    pipeline: Option<PipelineHandle>,

    /// When the camera entered Streaming
    started_at: Option<DateTime<Utc>>,

    /// Bumped on every start so a failure report from an old pipeline is ignored
    generation: u64,
}

/// One client's streaming session
///
/// Owns the client's feature flags, statistics and (while streaming) the frame
/// pipeline. Every command handled here is acknowledged exactly once through
/// the client's outbox.
pub struct Session {
    id: ConnectionId,
    config: SessionConfig,
    capabilities: Capabilities,
    created_at: DateTime<Utc>,
    lifecycle: Arc<Mutex<Lifecycle>>,
    flags: Arc<Mutex<FeatureFlags>>,
    stats: Arc<StatsAggregator>,
    outbox: Outbox,

    /// Cancelled when the session is destroyed; parent of every pipeline token
    closed: CancellationToken,

    /// Signalled whenever a start or stop leaves Starting/Stopping
    settled: Notify,
}

impl Session {
    pub fn new(
        id: ConnectionId,
        outbox: Outbox,
        capabilities: Capabilities,
        config: SessionConfig,
    ) -> Self {
        info!("Creating session: {}", id);

        let stats = Arc::new(StatsAggregator::new(
            id.to_string(),
            capabilities.stats_store.clone(),
        ));

        Self {
            id,
            config,
            capabilities,
            created_at: Utc::now(),
            lifecycle: Arc::new(Mutex::new(Lifecycle {
                state: SessionState::Idle,
                pipeline: None,
                started_at: None,
                generation: 0,
            })),
            flags: Arc::new(Mutex::new(FeatureFlags::default())),
            stats,
            outbox,
            closed: CancellationToken::new(),
            settled: Notify::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub async fn state(&self) -> SessionState {
        self.lifecycle.lock().await.state
    }

    pub async fn flags(&self) -> FeatureFlags {
        *self.flags.lock().await
    }

    pub fn stats(&self) -> &Arc<StatsAggregator> {
        &self.stats
    }

    pub async fn summary(&self) -> SessionSummary {
        let (state, started_at) = {
            let lifecycle = self.lifecycle.lock().await;
            (lifecycle.state, lifecycle.started_at)
        };
        let flags = self.flags().await;

        SessionSummary {
            id: self.id,
            state,
            effect_enabled: flags.effect,
            face_recognition_enabled: flags.face_recognition,
            created_at: self.created_at,
            started_at,
        }
    }

    /// Run a command and send its acknowledgement
    pub async fn handle(&self, request: Request) -> Ack {
        let Request { id, command } = request;

        let result = match command {
            Command::ToggleEffect | Command::ToggleFaceRecognition => {
                return self.toggle(id, command).await;
            }
            Command::StartCamera => self.start_camera().await.map(|started| {
                let message = if started {
                    "camera started"
                } else {
                    "camera already running"
                };
                Ack::success(id, command.as_str()).with_message(message)
            }),
            Command::StopCamera => self
                .stop_camera()
                .await
                .map(|()| Ack::success(id, command.as_str())),
            Command::RequestFrames => self
                .request_frames()
                .await
                .map(|()| Ack::success(id, command.as_str())),
            Command::GetStats => {
                Ok(Ack::success(id, command.as_str()).with_stats(self.stats.snapshot().await))
            }
            Command::ResetStats => {
                self.stats.reset().await;
                Ok(Ack::success(id, command.as_str()))
            }
            Command::SaveStats => self
                .stats
                .persist()
                .await
                .map(|path| Ack::success(id, command.as_str()).with_path(path.display().to_string())),
        };

        let ack = result.unwrap_or_else(|e| {
            warn!("Session {}: {} failed: {}", self.id, command, e);
            Ack::failure(id, command.as_str(), &e)
        });

        self.deliver(ack.clone()).await;
        ack
    }

    /// Flip a feature flag and acknowledge the new value
    async fn toggle(&self, id: Option<u64>, command: Command) -> Ack {
        let mut flags = self.flags.lock().await;
        let enabled = match command {
            Command::ToggleEffect => {
                flags.effect = !flags.effect;
                flags.effect
            }
            _ => {
                flags.face_recognition = !flags.face_recognition;
                flags.face_recognition
            }
        };

        info!(
            "Session {}: {} -> {}",
            self.id,
            command,
            if enabled { "on" } else { "off" }
        );

        // The ack is queued before the flags are released: the pipeline reads
        // flags under the same lock, so no frame using the new value can be
        // queued ahead of it.
        let ack = Ack::success(id, command.as_str()).with_enabled(enabled);
        self.deliver(ack.clone()).await;
        drop(flags);

        ack
    }

    /// Open the camera and start streaming
    ///
    /// Returns `false` if the session was already streaming.
    pub async fn start_camera(&self) -> Result<bool, StreamError> {
        {
            let mut lifecycle = self.lifecycle.lock().await;
            match lifecycle.state {
                SessionState::Idle => lifecycle.state = SessionState::Starting,
                SessionState::Streaming => return Ok(false),
                busy => return Err(StreamError::SessionBusy(busy)),
            }
        }

        info!("Session {}: starting camera", self.id);

        let mut device = match self.acquire_device().await {
            Ok(device) => device,
            Err(e) => {
                self.settle_idle().await;
                return Err(e);
            }
        };

        if self.closed.is_cancelled() {
            if let Err(e) = device.release().await {
                warn!("Session {}: failed to release camera: {:#}", self.id, e);
            }
            self.settle_idle().await;
            return Err(StreamError::SessionClosed);
        }

        {
            let mut lifecycle = self.lifecycle.lock().await;
            lifecycle.generation += 1;
            let generation = lifecycle.generation;
            // A close racing this point waits for Streaming, then shuts this
            // pipeline down.
            lifecycle.pipeline = Some(self.spawn_pipeline(device, generation));
            lifecycle.state = SessionState::Streaming;
            lifecycle.started_at = Some(Utc::now());
        }
        self.settled.notify_waiters();

        info!("Session {}: camera streaming", self.id);

        Ok(true)
    }

    /// Stop streaming and release the camera; a no-op when idle
    pub async fn stop_camera(&self) -> Result<(), StreamError> {
        let pipeline = {
            let mut lifecycle = self.lifecycle.lock().await;
            match lifecycle.state {
                SessionState::Idle => return Ok(()),
                SessionState::Streaming => {
                    lifecycle.state = SessionState::Stopping;
                    lifecycle.pipeline.take()
                }
                busy => return Err(StreamError::SessionBusy(busy)),
            }
        };

        info!("Session {}: stopping camera", self.id);

        if let Some(pipeline) = pipeline {
            pipeline.shutdown(self.config.stop_timeout).await;
        }
        self.settle_idle().await;

        info!("Session {}: camera stopped", self.id);

        Ok(())
    }

    /// Confirm frames are flowing
    pub async fn request_frames(&self) -> Result<(), StreamError> {
        let lifecycle = self.lifecycle.lock().await;
        match lifecycle.state {
            SessionState::Streaming => match &lifecycle.pipeline {
                Some(pipeline) if pipeline.is_running() => Ok(()),
                _ => Err(StreamError::NotStreaming),
            },
            SessionState::Idle => Err(StreamError::NotStreaming),
            busy => Err(StreamError::SessionBusy(busy)),
        }
    }

    /// Tear the session down: cancel any start in flight, stop the pipeline
    /// and release the camera
    ///
    /// Returns only once no device is held, including when a start or stop
    /// issued by another task is still in progress.
    pub async fn close(&self) {
        self.closed.cancel();

        let pipeline = loop {
            let settled = self.settled.notified();
            tokio::pin!(settled);

            {
                let mut lifecycle = self.lifecycle.lock().await;
                match lifecycle.state {
                    SessionState::Starting | SessionState::Stopping => {
                        // Register before unlocking so the transition's
                        // notification cannot be missed.
                        settled.as_mut().enable();
                    }
                    _ => {
                        lifecycle.state = SessionState::Idle;
                        lifecycle.started_at = None;
                        break lifecycle.pipeline.take();
                    }
                }
            }

            debug!("Session {}: waiting for camera transition before closing", self.id);
            settled.await;
        };

        if let Some(pipeline) = pipeline {
            pipeline.shutdown(self.config.stop_timeout).await;
        }

        info!("Session {} closed", self.id);
    }

    /// Leave Starting/Stopping for Idle and wake anyone waiting on it
    async fn settle_idle(&self) {
        {
            let mut lifecycle = self.lifecycle.lock().await;
            lifecycle.state = SessionState::Idle;
            lifecycle.started_at = None;
        }
        self.settled.notify_waiters();
    }

    async fn acquire_device(&self) -> Result<Box<dyn CaptureDevice>, StreamError> {
        let camera = &self.capabilities.camera;
        let attempts = self.config.start_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            info!(
                "Session {}: opening camera {} (attempt {}/{})",
                self.id,
                camera.name(),
                attempt,
                attempts
            );

            let opened = tokio::select! {
                _ = self.closed.cancelled() => return Err(StreamError::SessionClosed),
                opened = camera.open() => opened,
            };

            match opened {
                Ok(device) => return Ok(device),
                Err(e) => {
                    warn!("Session {}: failed to open camera: {}", self.id, e);
                    last_error = Some(e);
                }
            }

            if attempt < attempts {
                tokio::select! {
                    _ = self.closed.cancelled() => return Err(StreamError::SessionClosed),
                    _ = tokio::time::sleep(self.config.retry_delay) => {}
                }
            }
        }

        Err(StreamError::Camera(last_error.unwrap_or_else(|| {
            CaptureError::Open {
                device: camera.name().to_string(),
                reason: "no attempts made".to_string(),
            }
        })))
    }

    fn spawn_pipeline(&self, device: Box<dyn CaptureDevice>, generation: u64) -> PipelineHandle {
        let autosave_every_frames = if self.capabilities.stats_store.is_some() {
            self.config.autosave_every_frames
        } else {
            0
        };

        let pipeline = FramePipeline::new(PipelineContext {
            session_id: self.id,
            flags: Arc::clone(&self.flags),
            stats: Arc::clone(&self.stats),
            outbox: self.outbox.clone(),
            detector: Arc::clone(&self.capabilities.detector),
            effect: Arc::clone(&self.capabilities.effect),
            encoder: Arc::clone(&self.capabilities.encoder),
            max_consecutive_failures: self.config.max_consecutive_failures,
            autosave_every_frames,
        });

        let cancel = self.closed.child_token();
        let token = cancel.clone();
        let id = self.id;
        let lifecycle = Arc::clone(&self.lifecycle);
        let flags = Arc::clone(&self.flags);
        let outbox = self.outbox.clone();

        let task = tokio::spawn(async move {
            if let PipelineExit::Failed(err) = pipeline.run(device, token).await {
                on_capture_failure(id, lifecycle, flags, outbox, generation, err).await;
            }
        });

        PipelineHandle::new(cancel, task)
    }

    async fn deliver(&self, ack: Ack) {
        if self.outbox.ack(ack).await.is_err() {
            debug!("Session {}: client gone, ack dropped", self.id);
        }
    }
}

/// Return the session to Idle after its camera failed and tell the client
async fn on_capture_failure(
    id: ConnectionId,
    lifecycle: Arc<Mutex<Lifecycle>>,
    flags: Arc<Mutex<FeatureFlags>>,
    outbox: Outbox,
    generation: u64,
    err: CaptureError,
) {
    {
        let mut lifecycle = lifecycle.lock().await;
        if lifecycle.generation != generation || lifecycle.state != SessionState::Streaming {
            info!("Session {}: camera failed during teardown: {}", id, err);
            return;
        }

        lifecycle.state = SessionState::Idle;
        lifecycle.pipeline = None;
        lifecycle.started_at = None;
    }

    // A fatal error puts the client back to its baseline with every toggle off
    *flags.lock().await = FeatureFlags::default();

    error!("Session {}: camera error: {}", id, err);

    if outbox
        .send(ServerMessage::camera_error(err.to_string()))
        .await
        .is_err()
    {
        debug!("Session {}: client gone, camera error dropped", id);
    }
}
