//! Mood Lens Core - frame loop and emotion selection
//!
//! This crate contains the domain types, the ports the frame loop talks to,
//! and the loop itself: camera acquisition, model readiness gating,
//! per-frame inference, overlay rendering and label selection.

pub mod boundary;
pub mod camera;
pub mod controller;
pub mod domain;
pub mod driver;
pub mod error;
pub mod inference;
pub mod lifecycle;
pub mod models;
pub mod overlay;
pub mod ports;

pub use camera::CameraSource;
pub use controller::{ControllerConfig, EmotionController, RunSummary};
pub use domain::{
    dominant, BoundingBox, DisplaySize, EmotionLabel, EmotionState, Expression, ExpressionScores,
    FaceDetection, FaceLandmarks, Point, StreamMetadata, VideoFrame, LANDMARK_COUNT,
};
pub use driver::InferenceDriver;
pub use error::LensError;
pub use lifecycle::{Lifecycle, LifecycleState, LoopHandle};
pub use models::{GateStatus, ModelGate, ModelSet};
pub use ports::{
    CameraDevice, CameraError, DetectorOptions, EventSink, LifecycleEvent, ModelLocation,
    ModelUnit, OverlaySurface, TracingEventSink, VisionBackend,
};
