//! [`VisionBackend`] implementation on candle.

use anyhow::{Context, Result};
use candle_core::Device;
use tracing::debug;

use super::detector::FaceDetector;
use super::device::{device_name, select_device};
use super::expression::ExpressionNet;
use super::landmarks::LandmarkNet;
use super::loader::load_unit;
use super::recognition::FaceDescriptorNet;
use crate::domain::{BoundingBox, ExpressionScores, FaceLandmarks, VideoFrame};
use crate::ports::{DetectorOptions, ModelLocation, ModelUnit, VisionBackend};

/// Runs the four networks on the best available device.
///
/// Weights are read and parsed on tokio's blocking pool, so unit loads run
/// side by side and a load timeout can fire while a read is stuck.
#[derive(Debug, Clone)]
pub struct CandleBackend {
    device: Device,
}

impl CandleBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::with_device(select_device())
    }

    #[must_use]
    pub const fn with_device(device: Device) -> Self {
        Self { device }
    }

    /// Name of the device inference runs on.
    #[must_use]
    pub const fn device_name(&self) -> &'static str {
        device_name(&self.device)
    }

    async fn load<T: Send + 'static>(
        &self,
        location: &ModelLocation,
        unit: ModelUnit,
        build: impl FnOnce(candle_nn::VarBuilder<'static>) -> Result<T> + Send + 'static,
    ) -> Result<T> {
        debug!(%unit, %location, "loading model unit");
        let location = location.clone();
        let device = self.device.clone();
        tokio::task::spawn_blocking(move || build(load_unit(&location, unit, &device)?))
            .await
            .with_context(|| format!("{unit} loader task failed"))?
    }
}

impl Default for CandleBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl VisionBackend for CandleBackend {
    type Detector = FaceDetector;
    type Landmarker = LandmarkNet;
    type Recognizer = FaceDescriptorNet;
    type Classifier = ExpressionNet;

    async fn load_detector(&self, location: &ModelLocation) -> Result<FaceDetector> {
        self.load(location, ModelUnit::Detector, FaceDetector::new).await
    }

    async fn load_landmarker(&self, location: &ModelLocation) -> Result<LandmarkNet> {
        self.load(location, ModelUnit::Landmarks, LandmarkNet::new).await
    }

    async fn load_recognizer(&self, location: &ModelLocation) -> Result<FaceDescriptorNet> {
        self.load(location, ModelUnit::Recognition, FaceDescriptorNet::new).await
    }

    async fn load_classifier(&self, location: &ModelLocation) -> Result<ExpressionNet> {
        self.load(location, ModelUnit::Expression, ExpressionNet::new).await
    }

    async fn detect_faces(
        &self,
        detector: &FaceDetector,
        frame: &VideoFrame,
        options: &DetectorOptions,
    ) -> Result<Vec<BoundingBox>> {
        detector.detect(&frame.image, options)
    }

    async fn detect_landmarks(
        &self,
        landmarker: &LandmarkNet,
        frame: &VideoFrame,
        face: &BoundingBox,
    ) -> Result<FaceLandmarks> {
        landmarker.detect(&frame.image, face)
    }

    async fn recognize_expressions(
        &self,
        classifier: &ExpressionNet,
        frame: &VideoFrame,
        face: &BoundingBox,
        landmarks: &FaceLandmarks,
    ) -> Result<ExpressionScores> {
        classifier.classify(&frame.image, face, landmarks)
    }
}
