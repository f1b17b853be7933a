//! Camera device port.

use thiserror::Error;

use crate::domain::{StreamMetadata, VideoFrame};

/// Why a camera stream could not be opened.
#[derive(Debug, Clone, Error)]
pub enum CameraError {
    /// The user or the platform refused access.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// No matching video device exists.
    #[error("no camera device: {0}")]
    NoDevice(String),
    /// The device exists but failed to start streaming.
    #[error("camera backend error: {0}")]
    Backend(String),
}

/// Port for a live, video-only camera stream.
///
/// Implementations run on the controller's single thread of control, so the
/// returned futures need not be `Send`. They must not block that thread
/// either: platform calls that wait on the device go to a capture thread.
#[allow(async_fn_in_trait)]
pub trait CameraDevice {
    /// Requests access and starts the stream.
    ///
    /// Resolves only once the stream's native dimensions are known.
    ///
    /// # Errors
    ///
    /// Returns a [`CameraError`] when access is denied, no device exists, or
    /// the stream fails to start.
    async fn open(&mut self) -> Result<StreamMetadata, CameraError>;

    /// Returns the most recently decoded frame, or `None` before the first one.
    ///
    /// # Errors
    ///
    /// Returns an error if the device fails while delivering a frame.
    async fn frame(&mut self) -> anyhow::Result<Option<VideoFrame>>;

    /// Stops every track of the stream and releases the device.
    ///
    /// # Errors
    ///
    /// Returns an error if the device could not be released cleanly.
    fn stop(&mut self) -> anyhow::Result<()>;
}
