//! Core domain types for the emotion display.

mod detection;
mod emotion;
mod frame;

pub use detection::{
    BoundingBox, Expression, ExpressionScores, FaceDetection, FaceLandmarks, Point, LANDMARK_COUNT,
};
pub use emotion::{dominant, EmotionLabel, EmotionState};
pub use frame::{DisplaySize, StreamMetadata, VideoFrame};
