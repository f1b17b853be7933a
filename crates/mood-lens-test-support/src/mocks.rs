//! Mock implementations of core port traits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use mood_lens_core::domain::{
    BoundingBox, DisplaySize, EmotionLabel, Expression, ExpressionScores, FaceLandmarks,
    StreamMetadata, VideoFrame,
};
use mood_lens_core::ports::{
    CameraDevice, CameraError, DetectorOptions, EventSink, LifecycleEvent, ModelLocation,
    ModelUnit, OverlaySurface, VisionBackend,
};

use crate::builders::{landmarks_in, FrameBuilder};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenOutcome {
    Granted,
    Denied,
    NoDevice,
}

#[derive(Debug, Default)]
struct CameraCounters {
    opens: usize,
    stops: usize,
    frame_calls: u64,
    sequence: u64,
}

/// Mock implementation of `CameraDevice` for testing.
///
/// Clones share their counters, so a test can keep one clone as an observer
/// after handing the other to the code under test.
#[derive(Debug, Clone)]
pub struct MockCamera {
    outcome: OpenOutcome,
    width: u32,
    height: u32,
    open_delay: Option<Duration>,
    frame_delay: Option<Duration>,
    ready_after: u64,
    failing_calls: Vec<u64>,
    counters: Arc<Mutex<CameraCounters>>,
}

impl MockCamera {
    fn with_outcome(outcome: OpenOutcome, width: u32, height: u32) -> Self {
        Self {
            outcome,
            width,
            height,
            open_delay: None,
            frame_delay: None,
            ready_after: 0,
            failing_calls: Vec::new(),
            counters: Arc::default(),
        }
    }

    /// A camera that grants access and streams `width` x `height` frames.
    #[must_use]
    pub fn granted(width: u32, height: u32) -> Self {
        Self::with_outcome(OpenOutcome::Granted, width, height)
    }

    /// A camera whose permission request is refused.
    #[must_use]
    pub fn denied() -> Self {
        Self::with_outcome(OpenOutcome::Denied, 0, 0)
    }

    /// A host with no video device.
    #[must_use]
    pub fn no_device() -> Self {
        Self::with_outcome(OpenOutcome::NoDevice, 0, 0)
    }

    /// Delays metadata by `delay` after `open` is called.
    #[must_use]
    pub const fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    /// Every frame request takes `delay` before it answers.
    #[must_use]
    pub const fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = Some(delay);
        self
    }

    /// The first `calls` frame requests return no decoded frame.
    #[must_use]
    pub const fn with_frames_ready_after(mut self, calls: u64) -> Self {
        self.ready_after = calls;
        self
    }

    /// Frame request number `call` (0-based) fails.
    #[must_use]
    pub fn with_failing_frame(mut self, call: u64) -> Self {
        self.failing_calls.push(call);
        self
    }

    #[must_use]
    pub fn open_count(&self) -> usize {
        lock(&self.counters).opens
    }

    /// Number of times the stream was stopped.
    #[must_use]
    pub fn stop_count(&self) -> usize {
        lock(&self.counters).stops
    }

    #[must_use]
    pub fn frame_calls(&self) -> u64 {
        lock(&self.counters).frame_calls
    }
}

impl CameraDevice for MockCamera {
    async fn open(&mut self) -> Result<StreamMetadata, CameraError> {
        lock(&self.counters).opens += 1;
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        match self.outcome {
            OpenOutcome::Granted => Ok(StreamMetadata::new(self.width, self.height)),
            OpenOutcome::Denied => Err(CameraError::PermissionDenied("user refused".into())),
            OpenOutcome::NoDevice => Err(CameraError::NoDevice("no video input".into())),
        }
    }

    async fn frame(&mut self) -> anyhow::Result<Option<VideoFrame>> {
        if let Some(delay) = self.frame_delay {
            tokio::time::sleep(delay).await;
        }
        let sequence = {
            let mut counters = lock(&self.counters);
            let call = counters.frame_calls;
            counters.frame_calls += 1;
            if call < self.ready_after {
                return Ok(None);
            }
            if self.failing_calls.contains(&call) {
                anyhow::bail!("device read failed on call {call}");
            }
            counters.sequence += 1;
            counters.sequence
        };
        tokio::task::yield_now().await;
        Ok(Some(
            FrameBuilder::new(self.width, self.height)
                .sequence(sequence)
                .build(),
        ))
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        lock(&self.counters).stops += 1;
        Ok(())
    }
}

/// Placeholder weights returned by [`MockBackend`] loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockModel {
    pub unit: ModelUnit,
}

#[derive(Debug, Default)]
struct BackendCounters {
    loads: HashMap<ModelUnit, usize>,
    detect_calls: usize,
    in_flight: usize,
    max_in_flight: usize,
}

#[derive(Debug, Clone)]
struct BackendScript {
    faces_per_frame: usize,
    script: Vec<Option<ExpressionScores>>,
    failing_unit: Option<ModelUnit>,
    load_delay: Option<Duration>,
    detect_delay: Option<Duration>,
    failing_detect_calls: Vec<usize>,
}

impl Default for BackendScript {
    fn default() -> Self {
        Self {
            faces_per_frame: 1,
            script: vec![Some(ExpressionScores::from_pairs(&[(Expression::Happy, 0.9)]))],
            failing_unit: None,
            load_delay: None,
            detect_delay: None,
            failing_detect_calls: Vec::new(),
        }
    }
}

/// Mock implementation of `VisionBackend` for testing.
///
/// By default every frame contains one face scored as happy. Every backend
/// call yields to the scheduler while it is counted as in flight, so
/// overlapping inference would show up in [`max_in_flight`](Self::max_in_flight).
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    script: Arc<BackendScript>,
    counters: Arc<Mutex<BackendCounters>>,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn scripted(mut self, edit: impl FnOnce(&mut BackendScript)) -> Self {
        let mut script = (*self.script).clone();
        edit(&mut script);
        self.script = Arc::new(script);
        self
    }

    /// Number of faces detected in every frame with scores.
    #[must_use]
    pub fn with_faces(self, count: usize) -> Self {
        self.scripted(|s| s.faces_per_frame = count)
    }

    /// Per-frame expression scores. `None` means no face in that frame.
    /// The last entry repeats once the script runs out.
    #[must_use]
    pub fn with_script(self, frames: Vec<Option<ExpressionScores>>) -> Self {
        self.scripted(|s| s.script = frames)
    }

    /// Loading `unit` fails.
    #[must_use]
    pub fn failing_load(self, unit: ModelUnit) -> Self {
        self.scripted(|s| s.failing_unit = Some(unit))
    }

    /// Every model load takes `delay`.
    #[must_use]
    pub fn with_load_delay(self, delay: Duration) -> Self {
        self.scripted(|s| s.load_delay = Some(delay))
    }

    /// Every `detect_faces` call takes `delay` while counted as in flight.
    #[must_use]
    pub fn with_detect_delay(self, delay: Duration) -> Self {
        self.scripted(|s| s.detect_delay = Some(delay))
    }

    /// Detection call number `call` (0-based) fails.
    #[must_use]
    pub fn failing_detection(self, call: usize) -> Self {
        self.scripted(|s| s.failing_detect_calls.push(call))
    }

    #[must_use]
    pub fn load_count(&self, unit: ModelUnit) -> usize {
        lock(&self.counters).loads.get(&unit).copied().unwrap_or(0)
    }

    /// Loads issued across all units.
    #[must_use]
    pub fn total_loads(&self) -> usize {
        lock(&self.counters).loads.values().sum()
    }

    /// Number of `detect_faces` calls, i.e. inference passes started.
    #[must_use]
    pub fn detect_calls(&self) -> usize {
        lock(&self.counters).detect_calls
    }

    /// Highest number of backend calls observed running at once.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        lock(&self.counters).max_in_flight
    }

    async fn load(&self, unit: ModelUnit) -> anyhow::Result<MockModel> {
        *lock(&self.counters).loads.entry(unit).or_default() += 1;
        if let Some(delay) = self.script.load_delay {
            tokio::time::sleep(delay).await;
        }
        if self.script.failing_unit == Some(unit) {
            anyhow::bail!("{unit} weights not found");
        }
        Ok(MockModel { unit })
    }

    async fn in_flight<T>(&self, delay: Option<Duration>, work: impl FnOnce() -> T) -> T {
        {
            let mut counters = lock(&self.counters);
            counters.in_flight += 1;
            counters.max_in_flight = counters.max_in_flight.max(counters.in_flight);
        }
        match delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
        let out = work();
        lock(&self.counters).in_flight -= 1;
        out
    }

    fn frame_scores(&self, call: usize) -> Option<ExpressionScores> {
        let script = &self.script.script;
        script.get(call).or_else(|| script.last()).copied().flatten()
    }
}

impl VisionBackend for MockBackend {
    type Detector = MockModel;
    type Landmarker = MockModel;
    type Recognizer = MockModel;
    type Classifier = MockModel;

    async fn load_detector(&self, _: &ModelLocation) -> anyhow::Result<MockModel> {
        self.load(ModelUnit::Detector).await
    }

    async fn load_landmarker(&self, _: &ModelLocation) -> anyhow::Result<MockModel> {
        self.load(ModelUnit::Landmarks).await
    }

    async fn load_recognizer(&self, _: &ModelLocation) -> anyhow::Result<MockModel> {
        self.load(ModelUnit::Recognition).await
    }

    async fn load_classifier(&self, _: &ModelLocation) -> anyhow::Result<MockModel> {
        self.load(ModelUnit::Expression).await
    }

    #[allow(clippy::cast_precision_loss)]
    async fn detect_faces(
        &self,
        _: &MockModel,
        frame: &VideoFrame,
        _: &DetectorOptions,
    ) -> anyhow::Result<Vec<BoundingBox>> {
        let call = {
            let mut counters = lock(&self.counters);
            counters.detect_calls += 1;
            counters.detect_calls - 1
        };
        let fails = self.script.failing_detect_calls.contains(&call);
        let faces = if self.frame_scores(call).is_some() {
            self.script.faces_per_frame
        } else {
            0
        };
        let (w, h) = (frame.width() as f32, frame.height() as f32);
        self.in_flight(self.script.detect_delay, || {
            if fails {
                anyhow::bail!("detector failed on call {call}");
            }
            Ok((0..faces)
                .map(|i| {
                    let offset = i as f32 * w / 4.0;
                    BoundingBox::new(offset, h / 4.0, w / 4.0, h / 2.0, 0.9)
                })
                .collect())
        })
        .await
    }

    async fn detect_landmarks(
        &self,
        _: &MockModel,
        _: &VideoFrame,
        face: &BoundingBox,
    ) -> anyhow::Result<FaceLandmarks> {
        let face = *face;
        self.in_flight(None, || Ok(landmarks_in(&face))).await
    }

    async fn recognize_expressions(
        &self,
        _: &MockModel,
        _: &VideoFrame,
        _: &BoundingBox,
        _: &FaceLandmarks,
    ) -> anyhow::Result<ExpressionScores> {
        let call = lock(&self.counters).detect_calls.saturating_sub(1);
        let scores = self.frame_scores(call).unwrap_or_default();
        self.in_flight(None, || Ok(scores)).await
    }
}

/// One recorded drawing call.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceOp {
    Resize(DisplaySize),
    Clear,
    Detection(BoundingBox),
    Landmarks(usize),
    Expressions {
        anchor: BoundingBox,
        drawn: usize,
    },
    Present(u64),
}

/// Mock implementation of `OverlaySurface` that records every call.
#[derive(Debug, Clone)]
pub struct RecordingSurface {
    size: DisplaySize,
    ops: Arc<Mutex<Vec<SurfaceOp>>>,
}

impl RecordingSurface {
    #[must_use]
    pub fn new() -> Self {
        Self {
            size: DisplaySize::new(0, 0),
            ops: Arc::default(),
        }
    }

    #[must_use]
    pub fn ops(&self) -> Vec<SurfaceOp> {
        lock(&self.ops).clone()
    }

    /// Number of frames presented.
    #[must_use]
    pub fn presented(&self) -> usize {
        lock(&self.ops)
            .iter()
            .filter(|op| matches!(op, SurfaceOp::Present(_)))
            .count()
    }

    fn push(&self, op: SurfaceOp) {
        lock(&self.ops).push(op);
    }
}

impl Default for RecordingSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlaySurface for RecordingSurface {
    fn match_dimensions(&mut self, size: DisplaySize) {
        self.size = size;
        self.push(SurfaceOp::Resize(size));
    }

    fn dimensions(&self) -> DisplaySize {
        self.size
    }

    fn clear(&mut self) {
        self.push(SurfaceOp::Clear);
    }

    fn draw_detection(&mut self, bbox: &BoundingBox) {
        self.push(SurfaceOp::Detection(*bbox));
    }

    fn draw_landmarks(&mut self, landmarks: &FaceLandmarks) {
        self.push(SurfaceOp::Landmarks(landmarks.points().len()));
    }

    fn draw_expressions(&mut self, anchor: &BoundingBox, scores: &ExpressionScores, min_confidence: f32) {
        let drawn = scores.iter().filter(|(_, s)| *s >= min_confidence).count();
        self.push(SurfaceOp::Expressions {
            anchor: *anchor,
            drawn,
        });
    }

    fn present(&mut self, frame: &VideoFrame) -> anyhow::Result<()> {
        self.push(SurfaceOp::Present(frame.sequence));
        Ok(())
    }
}

/// Mock implementation of `EventSink` for testing.
///
/// Captures events for later assertions.
#[derive(Debug, Clone, Default)]
pub struct MockEventSink {
    events: Arc<Mutex<Vec<LifecycleEvent>>>,
}

impl MockEventSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<LifecycleEvent> {
        lock(&self.events).clone()
    }

    /// Labels from `EmotionChanged` events, in order.
    #[must_use]
    pub fn labels(&self) -> Vec<EmotionLabel> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                LifecycleEvent::EmotionChanged { label, .. } => Some(label.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of events matching `predicate`.
    #[must_use]
    pub fn count(&self, predicate: impl Fn(&LifecycleEvent) -> bool) -> usize {
        lock(&self.events).iter().filter(|e| predicate(e)).count()
    }
}

impl EventSink for MockEventSink {
    fn on_event(&self, event: LifecycleEvent) {
        lock(&self.events).push(event);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_camera_counts_shared_between_clones() {
        let mut camera = MockCamera::granted(8, 8).with_frames_ready_after(1);
        let observer = camera.clone();
        assert!(camera.open().await.is_ok());
        assert!(camera.frame().await.unwrap().is_none());
        assert_eq!(camera.frame().await.unwrap().unwrap().sequence, 1);
        camera.stop().unwrap();
        assert_eq!((observer.open_count(), observer.stop_count(), observer.frame_calls()), (1, 1, 2));
    }

    #[tokio::test]
    async fn test_mock_backend_script_repeats_last_entry() {
        let backend = MockBackend::new().with_script(vec![
            Some(ExpressionScores::from_pairs(&[(Expression::Sad, 1.0)])),
            None,
        ]);
        let model = MockModel {
            unit: ModelUnit::Detector,
        };
        let frame = FrameBuilder::new(100, 100).build();
        let options = DetectorOptions::default();
        assert_eq!(backend.detect_faces(&model, &frame, &options).await.unwrap().len(), 1);
        assert!(backend.detect_faces(&model, &frame, &options).await.unwrap().is_empty());
        assert!(backend.detect_faces(&model, &frame, &options).await.unwrap().is_empty());
        assert_eq!(backend.detect_calls(), 3);
        assert_eq!(backend.max_in_flight(), 1);
    }
}
