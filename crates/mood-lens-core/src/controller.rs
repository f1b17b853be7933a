//! The frame loop: startup, per-frame processing and teardown.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::camera::CameraSource;
use crate::domain::{DisplaySize, EmotionLabel, EmotionState, FaceDetection, VideoFrame};
use crate::driver::InferenceDriver;
use crate::error::LensError;
use crate::lifecycle::{Lifecycle, LifecycleState, LoopHandle};
use crate::models::{ModelGate, ModelSet};
use crate::overlay;
use crate::ports::{
    CameraDevice, DetectorOptions, EventSink, LifecycleEvent, ModelLocation, OverlaySurface,
    TracingEventSink, VisionBackend,
};

/// Default display refresh rate.
pub const DEFAULT_FPS: u32 = 60;
/// Default minimum score for an expression bar to be drawn.
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.1;

/// Settings for one [`EmotionController`].
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Where the four model units are loaded from.
    pub models: ModelLocation,
    /// Detector configuration used for every frame.
    pub detector: DetectorOptions,
    /// Overlay size. Defaults to the stream's native size.
    pub display_size: Option<DisplaySize>,
    /// Upper bound on waiting for camera metadata.
    pub camera_timeout: Option<Duration>,
    /// Upper bound on each model unit's load.
    pub model_timeout: Option<Duration>,
    /// Minimum time between two inference calls.
    pub refresh_interval: Duration,
    /// Stop after this many processed frames.
    pub max_frames: Option<u64>,
    /// Keep the last label when no face is detected.
    pub retain_label_on_empty: bool,
    /// Minimum score for an expression bar to be drawn.
    pub min_expression_confidence: f32,
}

impl ControllerConfig {
    /// Refresh interval for a display running at `fps` frames per second.
    #[must_use]
    pub fn interval_for_fps(fps: u32) -> Duration {
        Duration::from_secs(1) / fps.max(1)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            models: ModelLocation::parse("models"),
            detector: DetectorOptions::default(),
            display_size: None,
            camera_timeout: None,
            model_timeout: None,
            refresh_interval: Self::interval_for_fps(DEFAULT_FPS),
            max_frames: None,
            retain_label_on_empty: true,
            min_expression_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Frames that went through inference.
    pub frames_processed: u64,
    /// Frames whose capture or inference failed.
    pub frame_errors: u64,
    /// Label shown when the loop stopped.
    pub last_label: EmotionLabel,
    /// Lifecycle state after the run.
    pub state: LifecycleState,
}

/// Drives camera acquisition, model loading, the frame loop and teardown.
///
/// Everything runs on the caller's task. The camera is released on every
/// exit path, and a stopped controller never restarts.
pub struct EmotionController<D, B, S>
where
    D: CameraDevice,
    B: VisionBackend,
    S: OverlaySurface,
{
    config: ControllerConfig,
    device: Option<D>,
    camera: Option<CameraSource<D>>,
    backend: Arc<B>,
    gate: Arc<ModelGate<B>>,
    surface: S,
    events: Arc<dyn EventSink>,
    lifecycle: Lifecycle,
    handle: LoopHandle,
    emotion: EmotionState,
    label: watch::Sender<EmotionLabel>,
    frames_processed: u64,
    frame_errors: u64,
}

impl<D, B, S> EmotionController<D, B, S>
where
    D: CameraDevice,
    B: VisionBackend,
    S: OverlaySurface,
{
    pub fn new(config: ControllerConfig, device: D, backend: Arc<B>, surface: S) -> Self {
        let (label, _) = watch::channel(EmotionLabel::empty());
        let emotion = EmotionState::with_policy(config.retain_label_on_empty);
        Self {
            config,
            device: Some(device),
            camera: None,
            backend,
            gate: Arc::new(ModelGate::new()),
            surface,
            events: Arc::new(TracingEventSink),
            lifecycle: Lifecycle::new(),
            handle: LoopHandle::new(),
            emotion,
            label,
            frames_processed: 0,
            frame_errors: 0,
        }
    }

    /// Replaces the default tracing event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Shares a model gate with other controllers so models load once.
    #[must_use]
    pub fn with_model_gate(mut self, gate: Arc<ModelGate<B>>) -> Self {
        self.gate = gate;
        self
    }

    /// Handle that cancels the loop from outside.
    #[must_use]
    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Observable label, updated only by the loop.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<EmotionLabel> {
        self.label.subscribe()
    }

    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    #[must_use]
    pub const fn surface(&self) -> &S {
        &self.surface
    }

    /// Acquires the camera and the models, then processes frames until
    /// cancelled or `max_frames` is reached.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::CameraUnavailable`] or [`LensError::ModelLoad`]
    /// when startup fails. Per-frame failures are reported as events and do
    /// not end the run.
    pub async fn run(&mut self) -> Result<RunSummary, LensError> {
        let Some(device) = self.device.take() else {
            debug!("controller already ran");
            return Ok(self.summary());
        };

        let started = match self.start_up(device).await {
            Ok(started) => started,
            Err(error) => {
                self.events.on_event(LifecycleEvent::StartupFailed {
                    error: error.clone(),
                });
                return Err(error);
            }
        };

        if let Some((camera, models)) = started {
            self.camera = Some(camera);
            self.frame_loop(&models).await;
        } else {
            debug!("cancelled during startup");
        }

        self.teardown();
        Ok(self.summary())
    }

    /// Stops the loop and releases the camera.
    ///
    /// Returns true only for the call that performed the teardown.
    pub fn teardown(&mut self) -> bool {
        self.handle.cancel();
        if !self.lifecycle.stop() {
            return false;
        }
        if let Some(mut camera) = self.camera.take() {
            camera.release();
        }
        self.device = None;
        self.events.on_event(LifecycleEvent::Stopped {
            frames: self.frames_processed,
        });
        true
    }

    fn summary(&self) -> RunSummary {
        RunSummary {
            frames_processed: self.frames_processed,
            frame_errors: self.frame_errors,
            last_label: self.emotion.current().clone(),
            state: self.lifecycle.state(),
        }
    }

    async fn start_up(
        &mut self,
        device: D,
    ) -> Result<Option<(CameraSource<D>, Arc<ModelSet<B>>)>, LensError> {
        let gate = Arc::clone(&self.gate);
        let backend = Arc::clone(&self.backend);
        let location = self.config.models.clone();
        let model_timeout = self.config.model_timeout;
        let handle = self.handle.clone();

        let acquire = CameraSource::acquire(device, self.config.camera_timeout);
        let load = async move { gate.ensure_loaded(&backend, &location, model_timeout).await };
        tokio::pin!(acquire);
        tokio::pin!(load);

        let mut camera: Option<CameraSource<D>> = None;
        let mut models: Option<Arc<ModelSet<B>>> = None;

        loop {
            if let (Some(_), Some(_)) = (&camera, &models) {
                break;
            }
            tokio::select! {
                biased;
                () = handle.cancelled() => {
                    self.camera = camera;
                    return Ok(None);
                }
                acquired = &mut acquire, if camera.is_none() => {
                    let source = acquired?;
                    let metadata = source.metadata();
                    self.lifecycle.mark_camera_ready();
                    self.events.on_event(LifecycleEvent::CameraReady { metadata });
                    camera = Some(source);
                }
                loaded = &mut load, if models.is_none() => {
                    match loaded {
                        Ok(set) => {
                            self.lifecycle.mark_models_ready();
                            self.events.on_event(LifecycleEvent::ModelsReady);
                            models = Some(set);
                        }
                        Err(error) => {
                            if let Some(mut source) = camera.take() {
                                source.release();
                            }
                            return Err(error);
                        }
                    }
                }
            }
        }

        match (camera, models) {
            (Some(camera), Some(models)) => Ok(Some((camera, models))),
            _ => Ok(None),
        }
    }

    async fn frame_loop(&mut self, models: &ModelSet<B>) {
        let Some(source_meta) = self.camera.as_ref().map(CameraSource::metadata) else {
            return;
        };
        let source = DisplaySize::from(source_meta);
        let display = self.config.display_size.unwrap_or(source);
        self.surface.match_dimensions(display);

        if !self.lifecycle.start() {
            return;
        }
        let display_size = display;
        info!(display = %display_size, "frame loop running");
        self.events.on_event(LifecycleEvent::Started { display });

        let mut driver = InferenceDriver::new(Arc::clone(&self.backend), self.config.detector);
        let mut ticker = tokio::time::interval(self.config.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let handle = self.handle.clone();

        loop {
            if handle.is_cancelled() {
                break;
            }
            if self
                .config
                .max_frames
                .is_some_and(|max| self.frames_processed >= max)
            {
                debug!(frames = self.frames_processed, "frame limit reached");
                break;
            }

            tokio::select! {
                biased;
                () = handle.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(camera) = self.camera.as_mut() else {
                break;
            };
            let frame = match camera.current_frame().await {
                Ok(frame) => frame,
                Err(LensError::FrameNotReady) => {
                    trace!("no decoded frame yet");
                    continue;
                }
                Err(error) => {
                    self.frame_failed(error);
                    continue;
                }
            };
            if handle.is_cancelled() {
                debug!(frame = frame.sequence, "cancelled during capture");
                break;
            }

            let result = driver.run_once(&frame, models).await;
            if handle.is_cancelled() {
                debug!(frame = frame.sequence, "discarding results after cancellation");
                break;
            }

            self.frames_processed += 1;
            match result {
                Ok(detections) => self.apply(&frame, &detections, source, display),
                Err(error) => self.frame_failed(error),
            }
        }
    }

    fn apply(
        &mut self,
        frame: &VideoFrame,
        detections: &[FaceDetection],
        source: DisplaySize,
        display: DisplaySize,
    ) {
        overlay::render(
            &mut self.surface,
            detections,
            source,
            display,
            self.config.min_expression_confidence,
        );
        if let Err(e) = self.surface.present(frame) {
            warn!(frame = frame.sequence, "failed to present overlay: {e:#}");
        }

        if let Some(label) = self.emotion.observe(detections) {
            let label = label.clone();
            self.label.send_replace(label.clone());
            self.events.on_event(LifecycleEvent::EmotionChanged {
                label,
                frame: self.frames_processed,
            });
        }
    }

    fn frame_failed(&mut self, error: LensError) {
        self.frame_errors += 1;
        self.events.on_event(LifecycleEvent::FrameFailed {
            frame: self.frames_processed,
            error,
        });
    }
}
