//! Per-frame inference: detection, then landmarks and expressions per face.

use std::sync::Arc;

use anyhow::Context;
use tracing::trace;

use crate::domain::{FaceDetection, VideoFrame};
use crate::error::LensError;
use crate::models::ModelSet;
use crate::ports::{DetectorOptions, VisionBackend};

/// Runs one inference pass at a time against a loaded [`ModelSet`].
///
/// `run_once` takes `&mut self`, so a second call cannot start until the
/// first one's results have been handed back.
pub struct InferenceDriver<B: VisionBackend> {
    backend: Arc<B>,
    options: DetectorOptions,
    calls: u64,
}

impl<B: VisionBackend> InferenceDriver<B> {
    #[must_use]
    pub const fn new(backend: Arc<B>, options: DetectorOptions) -> Self {
        Self {
            backend,
            options,
            calls: 0,
        }
    }

    /// Number of completed or failed `run_once` calls.
    #[must_use]
    pub const fn calls(&self) -> u64 {
        self.calls
    }

    #[must_use]
    pub const fn options(&self) -> &DetectorOptions {
        &self.options
    }

    /// Detects all faces in `frame` and derives landmarks and expression
    /// scores for each, in detection order.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::Inference`] if any stage fails. No partial
    /// results are returned.
    pub async fn run_once(
        &mut self,
        frame: &VideoFrame,
        models: &ModelSet<B>,
    ) -> Result<Vec<FaceDetection>, LensError> {
        self.calls += 1;
        let backend = self.backend.as_ref();

        let boxes = backend
            .detect_faces(&models.detector, frame, &self.options)
            .await
            .context("face detection")
            .map_err(|e| LensError::inference(&e))?;
        trace!(frame = frame.sequence, faces = boxes.len(), "faces detected");

        let mut detections = Vec::with_capacity(boxes.len());
        for (index, bbox) in boxes.into_iter().enumerate() {
            let landmarks = backend
                .detect_landmarks(&models.landmarks, frame, &bbox)
                .await
                .with_context(|| format!("landmarks for face {index}"))
                .map_err(|e| LensError::inference(&e))?;
            let expressions = backend
                .recognize_expressions(&models.expression, frame, &bbox, &landmarks)
                .await
                .with_context(|| format!("expressions for face {index}"))
                .map_err(|e| LensError::inference(&e))?;
            detections.push(FaceDetection {
                detection: bbox,
                landmarks,
                expressions,
            });
        }

        Ok(detections)
    }
}
