//! Camera source: acquisition, frame access and idempotent release.

use std::time::Duration;

use tracing::{debug, warn};

use crate::domain::{StreamMetadata, VideoFrame};
use crate::error::LensError;
use crate::ports::CameraDevice;

/// An acquired camera stream.
///
/// Exists only after the device reported its native dimensions. Releasing
/// happens at most once, either explicitly or on drop.
pub struct CameraSource<D: CameraDevice> {
    device: D,
    metadata: StreamMetadata,
    released: bool,
}

impl<D: CameraDevice> CameraSource<D> {
    /// Requests the camera and waits for stream metadata.
    ///
    /// With a `timeout`, a device that never reports metadata is stopped and
    /// treated as unavailable.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::CameraUnavailable`] on denial, missing device,
    /// backend failure or timeout.
    pub async fn acquire(mut device: D, timeout: Option<Duration>) -> Result<Self, LensError> {
        let opened = match timeout {
            Some(limit) => match tokio::time::timeout(limit, device.open()).await {
                Ok(result) => result,
                Err(_) => {
                    if let Err(e) = device.stop() {
                        debug!("stop after open timeout failed: {e:#}");
                    }
                    return Err(LensError::camera_unavailable(format!(
                        "no stream metadata after {}s",
                        limit.as_secs_f32()
                    )));
                }
            },
            None => device.open().await,
        };

        let metadata = opened.map_err(|e| LensError::camera_unavailable(e.to_string()))?;
        debug!(
            width = metadata.width,
            height = metadata.height,
            "camera stream opened"
        );

        Ok(Self {
            device,
            metadata,
            released: false,
        })
    }

    /// Native stream dimensions.
    #[must_use]
    pub const fn metadata(&self) -> StreamMetadata {
        self.metadata
    }

    /// Returns true once the stream has been released.
    #[must_use]
    pub const fn is_released(&self) -> bool {
        self.released
    }

    /// Returns the most recent decoded frame.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::FrameNotReady`] before the first decoded frame and
    /// [`LensError::Frame`] if the device fails.
    pub async fn current_frame(&mut self) -> Result<VideoFrame, LensError> {
        if self.released {
            return Err(LensError::Frame("camera already released".into()));
        }
        match self.device.frame().await {
            Ok(Some(frame)) => Ok(frame),
            Ok(None) => Err(LensError::FrameNotReady),
            Err(e) => Err(LensError::Frame(format!("{e:#}"))),
        }
    }

    /// Stops every track of the stream.
    ///
    /// Returns true only for the call that actually released the device.
    /// Device errors are logged, never raised.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        if let Err(e) = self.device.stop() {
            warn!("failed to stop camera stream: {e:#}");
        }
        debug!("camera released");
        true
    }
}

impl<D: CameraDevice> Drop for CameraSource<D> {
    fn drop(&mut self) {
        self.release();
    }
}
