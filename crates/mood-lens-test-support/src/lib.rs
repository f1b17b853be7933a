//! Test support utilities for mood-lens.
//!
//! Provides scripted camera, backend, surface and event-sink mocks plus
//! frame and detection builders for testing the frame loop.
//!
//! # Example
//!
//! ```
//! use mood_lens_test_support::{FrameBuilder, MockBackend, MockCamera};
//!
//! let camera = MockCamera::granted(640, 480).with_frames_ready_after(2);
//! let backend = MockBackend::new().with_faces(2);
//! let frame = FrameBuilder::new(640, 480).sequence(3).build();
//! assert_eq!(frame.width(), 640);
//! ```

mod builders;
mod mocks;

pub use builders::{landmarks_in, DetectionBuilder, FrameBuilder};
pub use mocks::{
    MockBackend, MockCamera, MockEventSink, MockModel, RecordingSurface, SurfaceOp,
};
