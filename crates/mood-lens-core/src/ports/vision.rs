//! Inference backend port: model units, their location, and per-face inference.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::{BoundingBox, ExpressionScores, FaceLandmarks, VideoFrame};

/// One independently loadable sub-model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelUnit {
    /// Single-pass face detector.
    Detector,
    /// 68-point landmark regressor.
    Landmarks,
    /// Face descriptor network.
    Recognition,
    /// Expression classifier.
    Expression,
}

impl ModelUnit {
    /// All units in load order.
    pub const ALL: [Self; 4] = [
        Self::Detector,
        Self::Landmarks,
        Self::Recognition,
        Self::Expression,
    ];

    /// Stable identifier, also the weights file stem.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Detector => "tiny_face_detector",
            Self::Landmarks => "face_landmark_68",
            Self::Recognition => "face_recognition",
            Self::Expression => "face_expression",
        }
    }

    /// Weights file name within a model location.
    #[must_use]
    pub fn file_name(self) -> String {
        format!("{}.safetensors", self.name())
    }
}

impl std::fmt::Display for ModelUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Base location the four model units are loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelLocation {
    /// A local directory holding the weights files.
    Directory(PathBuf),
    /// A URL prefix the weights files can be fetched from.
    Url(String),
}

impl ModelLocation {
    /// Interprets `http://` and `https://` prefixes as URLs, anything else as a path.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            Self::Url(raw.trim_end_matches('/').to_string())
        } else {
            Self::Directory(PathBuf::from(raw))
        }
    }

    /// Full location of one unit's weights, as a path or URL string.
    #[must_use]
    pub fn resolve(&self, unit: ModelUnit) -> String {
        match self {
            Self::Directory(dir) => dir.join(unit.file_name()).display().to_string(),
            Self::Url(base) => format!("{base}/{}", unit.file_name()),
        }
    }
}

impl std::fmt::Display for ModelLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Directory(dir) => write!(f, "{}", dir.display()),
            Self::Url(base) => f.write_str(base),
        }
    }
}

/// Default minimum detector confidence.
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.75;
/// Default non-maximum suppression overlap threshold.
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.3;

/// Configuration of the fast single-pass face detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorOptions {
    /// Minimum confidence for a face to be kept (0.0-1.0).
    pub score_threshold: f32,
    /// Overlap above which weaker boxes are suppressed (0.0-1.0).
    pub iou_threshold: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        }
    }
}

/// Port for the external vision library.
///
/// Each unit loads independently. Per-frame work is split into detection,
/// landmarking and expression classification so the driver controls ordering.
/// Boxes and points are in source-frame pixel coordinates.
///
/// Loads must not block the calling thread. Blocking reads belong on a
/// worker, otherwise the gate's load timeout never gets a chance to fire.
#[allow(async_fn_in_trait)]
pub trait VisionBackend {
    /// Loaded detector weights.
    type Detector;
    /// Loaded landmark weights.
    type Landmarker;
    /// Loaded recognition weights.
    type Recognizer;
    /// Loaded expression weights.
    type Classifier;

    /// Loads the face detector.
    ///
    /// # Errors
    ///
    /// Returns an error if the weights cannot be read or are invalid.
    async fn load_detector(&self, location: &ModelLocation) -> anyhow::Result<Self::Detector>;

    /// Loads the landmark model.
    ///
    /// # Errors
    ///
    /// Returns an error if the weights cannot be read or are invalid.
    async fn load_landmarker(&self, location: &ModelLocation) -> anyhow::Result<Self::Landmarker>;

    /// Loads the recognition model.
    ///
    /// # Errors
    ///
    /// Returns an error if the weights cannot be read or are invalid.
    async fn load_recognizer(&self, location: &ModelLocation) -> anyhow::Result<Self::Recognizer>;

    /// Loads the expression model.
    ///
    /// # Errors
    ///
    /// Returns an error if the weights cannot be read or are invalid.
    async fn load_classifier(&self, location: &ModelLocation) -> anyhow::Result<Self::Classifier>;

    /// Finds every face in `frame`.
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails.
    async fn detect_faces(
        &self,
        detector: &Self::Detector,
        frame: &VideoFrame,
        options: &DetectorOptions,
    ) -> anyhow::Result<Vec<BoundingBox>>;

    /// Computes 68 landmarks for one detected face.
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails.
    async fn detect_landmarks(
        &self,
        landmarker: &Self::Landmarker,
        frame: &VideoFrame,
        face: &BoundingBox,
    ) -> anyhow::Result<FaceLandmarks>;

    /// Scores every expression category for one face.
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails.
    async fn recognize_expressions(
        &self,
        classifier: &Self::Classifier,
        frame: &VideoFrame,
        face: &BoundingBox,
        landmarks: &FaceLandmarks,
    ) -> anyhow::Result<ExpressionScores>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_parse() {
        assert_eq!(
            ModelLocation::parse("https://example.com/models/"),
            ModelLocation::Url("https://example.com/models".into())
        );
        assert_eq!(
            ModelLocation::parse("/srv/models"),
            ModelLocation::Directory(PathBuf::from("/srv/models"))
        );
    }

    #[test]
    fn test_location_resolve() {
        let url = ModelLocation::parse("http://localhost:8080/models");
        assert_eq!(
            url.resolve(ModelUnit::Landmarks),
            "http://localhost:8080/models/face_landmark_68.safetensors"
        );
        let dir = ModelLocation::parse("models");
        assert!(dir
            .resolve(ModelUnit::Detector)
            .ends_with("tiny_face_detector.safetensors"));
    }

    #[test]
    fn test_unit_names_unique() {
        let mut names: Vec<_> = ModelUnit::ALL.iter().map(|u| u.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 4);
    }
}
