//! Error taxonomy for the frame loop.

use thiserror::Error;

use crate::ports::ModelUnit;

/// Errors raised by camera acquisition, model loading and per-frame inference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LensError {
    /// Permission denied, no device present, or the device failed to start.
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),

    /// One of the four model units failed to load.
    #[error("failed to load {unit} model: {reason}")]
    ModelLoad {
        /// The unit whose load failed.
        unit: ModelUnit,
        /// Backend error message.
        reason: String,
    },

    /// No decoded frame exists yet.
    #[error("no decoded frame available")]
    FrameNotReady,

    /// The camera failed to deliver a frame.
    #[error("frame capture failed: {0}")]
    Frame(String),

    /// Detection, landmarking or expression classification failed.
    #[error("inference failed: {0}")]
    Inference(String),
}

impl LensError {
    #[must_use]
    pub fn camera_unavailable(reason: impl Into<String>) -> Self {
        Self::CameraUnavailable(reason.into())
    }

    #[must_use]
    pub fn model_load(unit: ModelUnit, reason: impl std::fmt::Display) -> Self {
        Self::ModelLoad {
            unit,
            reason: reason.to_string(),
        }
    }

    /// Wraps an `anyhow` error, keeping its context chain in the message.
    #[must_use]
    pub fn inference(err: &anyhow::Error) -> Self {
        Self::Inference(format!("{err:#}"))
    }

    /// Returns true for errors that end startup.
    #[must_use]
    pub const fn is_startup(&self) -> bool {
        matches!(self, Self::CameraUnavailable(_) | Self::ModelLoad { .. })
    }
}
