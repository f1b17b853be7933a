//! Port definitions for hexagonal architecture.
//!
//! These traits define the boundaries between the frame loop and the camera,
//! the vision library, the drawing surface and the status reporter.

mod camera;
mod events;
mod overlay;
mod vision;

pub use camera::{CameraDevice, CameraError};
pub use events::{EventSink, LifecycleEvent, TracingEventSink};
pub use overlay::OverlaySurface;
pub use vision::{
    DetectorOptions, ModelLocation, ModelUnit, VisionBackend, DEFAULT_IOU_THRESHOLD,
    DEFAULT_SCORE_THRESHOLD,
};
