//! Camera device adapters.
//!
//! Live capture goes through `nokhwa` and is only compiled with the
//! `camera-nokhwa` feature. Builds without it get [`UnsupportedCamera`], which
//! reports every device as missing so the controller fails startup cleanly.
//!
//! Platform capture APIs block, so [`ThreadedCamera`] drives them from a
//! dedicated thread and hands frames back over channels.

use std::sync::mpsc;
use std::thread;

use anyhow::Context;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use mood_lens_core::{CameraDevice, CameraError, StreamMetadata, VideoFrame};

/// Placeholder device for builds without a capture backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedCamera {
    device: u32,
}

impl UnsupportedCamera {
    #[must_use]
    pub const fn new(device: u32) -> Self {
        Self { device }
    }
}

impl CameraDevice for UnsupportedCamera {
    async fn open(&mut self) -> Result<StreamMetadata, CameraError> {
        Err(CameraError::NoDevice(format!(
            "camera {} requested but this build has no capture backend \
             (rebuild with --features camera-nokhwa)",
            self.device
        )))
    }

    async fn frame(&mut self) -> anyhow::Result<Option<VideoFrame>> {
        Ok(None)
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A capture API whose calls block until the device answers.
///
/// Lives on the capture thread for its whole life, so it need not be `Send`.
pub trait BlockingCapture {
    /// Opens the device and starts streaming.
    ///
    /// # Errors
    ///
    /// Returns a [`CameraError`] when the stream cannot be started.
    fn open(&mut self) -> Result<StreamMetadata, CameraError>;

    /// Waits for and decodes the next frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the device fails while delivering a frame.
    fn frame(&mut self) -> anyhow::Result<Option<VideoFrame>>;

    /// Stops the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the device could not be released cleanly.
    fn stop(&mut self) -> anyhow::Result<()>;
}

type FrameReply = oneshot::Sender<anyhow::Result<Option<VideoFrame>>>;
type CaptureFactory<C> = Box<dyn FnOnce() -> C + Send>;

/// [`CameraDevice`] running a [`BlockingCapture`] on its own thread.
///
/// The capture is built on that thread by the factory given to [`new`](Self::new).
/// Dropping the request channel, which [`stop`](CameraDevice::stop) does, makes
/// the thread stop the stream and exit once its current call returns.
pub struct ThreadedCamera<C> {
    name: String,
    factory: Option<CaptureFactory<C>>,
    requests: Option<mpsc::Sender<FrameReply>>,
}

impl<C: BlockingCapture + 'static> ThreadedCamera<C> {
    #[must_use]
    pub fn new(name: impl Into<String>, factory: impl FnOnce() -> C + Send + 'static) -> Self {
        Self {
            name: name.into(),
            factory: Some(Box::new(factory)),
            requests: None,
        }
    }
}

impl<C: BlockingCapture + 'static> CameraDevice for ThreadedCamera<C> {
    async fn open(&mut self) -> Result<StreamMetadata, CameraError> {
        let factory = self
            .factory
            .take()
            .ok_or_else(|| CameraError::Backend(format!("{} was already opened", self.name)))?;
        let (ready_tx, ready_rx) = oneshot::channel();
        let (requests, pending) = mpsc::channel();

        thread::Builder::new()
            .name(format!("capture-{}", self.name))
            .spawn(move || capture_loop(factory(), ready_tx, &pending))
            .map_err(|e| CameraError::Backend(format!("failed to start capture thread: {e}")))?;
        self.requests = Some(requests);

        ready_rx.await.unwrap_or_else(|_| {
            Err(CameraError::Backend(format!(
                "capture thread for {} exited before the stream opened",
                self.name
            )))
        })
    }

    async fn frame(&mut self) -> anyhow::Result<Option<VideoFrame>> {
        let Some(requests) = &self.requests else {
            return Ok(None);
        };
        let (reply, answer) = oneshot::channel();
        requests
            .send(reply)
            .map_err(|_| anyhow::anyhow!("capture thread for {} has stopped", self.name))?;
        answer
            .await
            .with_context(|| format!("capture thread for {} dropped the request", self.name))?
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        if self.requests.take().is_some() {
            debug!(camera = %self.name, "capture thread asked to stop");
        }
        self.factory = None;
        Ok(())
    }
}

fn capture_loop<C: BlockingCapture>(
    mut capture: C,
    ready: oneshot::Sender<Result<StreamMetadata, CameraError>>,
    pending: &mpsc::Receiver<FrameReply>,
) {
    let opened = capture.open();
    let is_open = opened.is_ok();
    if ready.send(opened).is_err() {
        debug!("stream opened after its caller gave up");
    } else if is_open {
        while let Ok(reply) = pending.recv() {
            // The requester may have been dropped mid-wait.
            let _ = reply.send(capture.frame());
        }
    }

    if is_open {
        if let Err(e) = capture.stop() {
            warn!("failed to stop camera stream: {e:#}");
        }
    }
    debug!("capture thread finished");
}

/// Sorts a backend's open-stream failure into denied vs. broken.
#[cfg_attr(not(feature = "camera-nokhwa"), allow(dead_code))]
fn classify_open_error(message: String) -> CameraError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        CameraError::PermissionDenied(message)
    } else {
        CameraError::Backend(message)
    }
}

#[cfg(feature = "camera-nokhwa")]
pub use live::{list_cameras, nokhwa_camera, NokhwaCamera, NokhwaCapture};

#[cfg(feature = "camera-nokhwa")]
mod live {
    use anyhow::{Context, Result};
    use image::RgbImage;
    use nokhwa::pixel_format::RgbFormat;
    use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
    use nokhwa::Camera;
    use tracing::{debug, info};

    use super::{classify_open_error, BlockingCapture, ThreadedCamera};
    use mood_lens_core::{CameraError, StreamMetadata, VideoFrame};

    /// A native camera driven from its capture thread.
    pub type NokhwaCamera = ThreadedCamera<NokhwaCapture>;

    /// Video-only stream from camera `index`.
    #[must_use]
    pub fn nokhwa_camera(index: u32) -> NokhwaCamera {
        ThreadedCamera::new(format!("camera{index}"), move || NokhwaCapture::new(index))
    }

    /// Returns `(index, human name)` for every camera the platform reports.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform camera query fails.
    pub fn list_cameras() -> Result<Vec<(u32, String)>> {
        let cameras = nokhwa::query(ApiBackend::Auto).context("Failed to query cameras")?;
        Ok(cameras
            .iter()
            .filter_map(|cam| match cam.index() {
                CameraIndex::Index(i) => Some((*i, cam.human_name())),
                CameraIndex::String(_) => None,
            })
            .collect())
    }

    /// Blocking `nokhwa` stream.
    pub struct NokhwaCapture {
        index: u32,
        camera: Option<Camera>,
        sequence: u64,
    }

    impl NokhwaCapture {
        #[must_use]
        pub const fn new(index: u32) -> Self {
            Self {
                index,
                camera: None,
                sequence: 0,
            }
        }
    }

    impl BlockingCapture for NokhwaCapture {
        fn open(&mut self) -> Result<StreamMetadata, CameraError> {
            let format =
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
            let mut camera = Camera::new(CameraIndex::Index(self.index), format)
                .map_err(|e| CameraError::NoDevice(format!("camera {}: {e}", self.index)))?;
            camera
                .open_stream()
                .map_err(|e| classify_open_error(e.to_string()))?;

            let resolution = camera.resolution();
            info!(
                device = self.index,
                width = resolution.width(),
                height = resolution.height(),
                "Camera stream open"
            );
            self.camera = Some(camera);
            Ok(StreamMetadata::new(resolution.width(), resolution.height()))
        }

        fn frame(&mut self) -> Result<Option<VideoFrame>> {
            let Some(camera) = self.camera.as_mut() else {
                return Ok(None);
            };
            let buffer = camera.frame().context("Failed to read camera buffer")?;
            let decoded = buffer
                .decode_image::<RgbFormat>()
                .context("Failed to decode camera buffer")?;
            let (width, height) = (decoded.width(), decoded.height());
            let image = RgbImage::from_raw(width, height, decoded.into_raw())
                .context("Decoded buffer does not match its dimensions")?;

            self.sequence += 1;
            Ok(Some(VideoFrame::new(self.sequence, image)))
        }

        fn stop(&mut self) -> Result<()> {
            if let Some(mut camera) = self.camera.take() {
                camera.stop_stream().context("Failed to stop camera stream")?;
                debug!(device = self.index, "Camera stream stopped");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use image::RgbImage;
    use mood_lens_core::{CameraSource, LensError};

    use super::*;

    /// Capture whose calls sleep the calling thread.
    struct SleepyCapture {
        open_delay: Duration,
        frames: Arc<AtomicU64>,
        stopped: Arc<AtomicBool>,
    }

    impl SleepyCapture {
        fn camera(open_delay: Duration) -> (ThreadedCamera<Self>, Arc<AtomicU64>, Arc<AtomicBool>) {
            let frames = Arc::new(AtomicU64::new(0));
            let stopped = Arc::new(AtomicBool::new(false));
            let (f, s) = (Arc::clone(&frames), Arc::clone(&stopped));
            let camera = ThreadedCamera::new("sleepy", move || Self {
                open_delay,
                frames: f,
                stopped: s,
            });
            (camera, frames, stopped)
        }
    }

    impl BlockingCapture for SleepyCapture {
        fn open(&mut self) -> Result<StreamMetadata, CameraError> {
            std::thread::sleep(self.open_delay);
            Ok(StreamMetadata::new(64, 48))
        }

        fn frame(&mut self) -> anyhow::Result<Option<VideoFrame>> {
            std::thread::sleep(Duration::from_millis(5));
            let sequence = self.frames.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Some(VideoFrame::new(sequence, RgbImage::new(64, 48))))
        }

        fn stop(&mut self) -> anyhow::Result<()> {
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn wait_until(flag: &AtomicBool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if flag.load(Ordering::SeqCst) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_unsupported_camera_has_no_device() {
        let mut camera = UnsupportedCamera::new(2);
        let err = camera.open().await.unwrap_err();
        assert!(matches!(err, CameraError::NoDevice(ref msg) if msg.contains("camera 2")));
        assert!(camera.frame().await.unwrap().is_none());
        assert!(camera.stop().is_ok());
    }

    #[tokio::test]
    async fn test_threaded_camera_delivers_frames_and_stops() {
        let (mut camera, frames, stopped) = SleepyCapture::camera(Duration::ZERO);

        assert_eq!(camera.open().await.unwrap(), StreamMetadata::new(64, 48));
        let first = camera.frame().await.unwrap().unwrap();
        let second = camera.frame().await.unwrap().unwrap();
        assert_eq!((first.sequence, second.sequence), (1, 2));
        assert_eq!(frames.load(Ordering::SeqCst), 2);

        camera.stop().unwrap();
        assert!(camera.frame().await.unwrap().is_none());
        assert!(wait_until(&stopped).await);
    }

    #[tokio::test]
    async fn test_blocking_open_hits_the_acquire_timeout() {
        let (camera, _, stopped) = SleepyCapture::camera(Duration::from_millis(400));

        let started = Instant::now();
        let result = CameraSource::acquire(camera, Some(Duration::from_millis(50))).await;

        assert!(matches!(result, Err(LensError::CameraUnavailable(_))));
        assert!(started.elapsed() < Duration::from_millis(300));
        // The stream that opens late is stopped by its own thread.
        assert!(wait_until(&stopped).await);
    }

    #[tokio::test]
    async fn test_second_open_is_rejected() {
        let (mut camera, _, _) = SleepyCapture::camera(Duration::ZERO);
        camera.open().await.unwrap();
        assert!(matches!(camera.open().await, Err(CameraError::Backend(_))));
        camera.stop().unwrap();
    }

    #[test]
    fn test_classify_open_error() {
        assert!(matches!(
            classify_open_error("Permission denied (os error 13)".into()),
            CameraError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_open_error("AVFoundation: not authorized".into()),
            CameraError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_open_error("device busy".into()),
            CameraError::Backend(_)
        ));
    }
}
