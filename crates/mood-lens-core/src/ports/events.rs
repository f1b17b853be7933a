//! Lifecycle event port for status reporting.

use crate::domain::{DisplaySize, EmotionLabel, StreamMetadata};
use crate::error::LensError;

/// Events emitted while the controller starts, runs and stops.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// The camera stream is open and its dimensions are known.
    CameraReady {
        /// Native stream size.
        metadata: StreamMetadata,
    },
    /// All four model units are loaded.
    ModelsReady,
    /// The frame loop started.
    Started {
        /// Size the overlay was matched to.
        display: DisplaySize,
    },
    /// Startup stopped before the loop ran.
    StartupFailed {
        /// Camera or model error.
        error: LensError,
    },
    /// The displayed label changed.
    EmotionChanged {
        /// The new label.
        label: EmotionLabel,
        /// Index of the processed frame that produced it.
        frame: u64,
    },
    /// A single frame failed; the loop continues.
    FrameFailed {
        /// Index of the frame.
        frame: u64,
        /// Failure description.
        error: LensError,
    },
    /// The loop has stopped and the camera was released.
    Stopped {
        /// Frames processed while running.
        frames: u64,
    },
}

/// Port for receiving lifecycle events.
pub trait EventSink {
    /// Called when a lifecycle event occurs.
    fn on_event(&self, event: LifecycleEvent);
}

/// Sink that writes events to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn on_event(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::CameraReady { metadata } => {
                tracing::info!(width = metadata.width, height = metadata.height, "camera ready");
            }
            LifecycleEvent::ModelsReady => tracing::info!("models loaded"),
            LifecycleEvent::Started { display: size } => {
                tracing::info!(display = %size, "emotion detection started");
            }
            LifecycleEvent::StartupFailed { error } => tracing::error!("startup failed: {error}"),
            LifecycleEvent::EmotionChanged { label, frame } => {
                tracing::info!(frame, %label, "emotion changed");
            }
            LifecycleEvent::FrameFailed { frame, error } => {
                tracing::warn!(frame, "frame failed: {error}");
            }
            LifecycleEvent::Stopped { frames } => tracing::info!(frames, "stopped"),
        }
    }
}
