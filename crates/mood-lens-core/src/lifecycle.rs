//! Lifecycle state machine and the cancellation handle for the frame loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Notify;

/// Controller state, derived from the readiness flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    CameraReady,
    ModelsReady,
    Running,
    Stopped,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::CameraReady => "camera ready",
            Self::ModelsReady => "models ready",
            Self::Running => "running",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Tracks readiness of the camera and the models independently.
///
/// Either may become ready first. The loop can only start once both are.
/// Every transition returns `false` when it does not apply.
#[derive(Debug, Default, Clone)]
pub struct Lifecycle {
    camera_ready: bool,
    models_ready: bool,
    running: bool,
    stopped: bool,
}

impl Lifecycle {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            camera_ready: false,
            models_ready: false,
            running: false,
            stopped: false,
        }
    }

    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        if self.stopped {
            LifecycleState::Stopped
        } else if self.running {
            LifecycleState::Running
        } else if self.models_ready {
            LifecycleState::ModelsReady
        } else if self.camera_ready {
            LifecycleState::CameraReady
        } else {
            LifecycleState::Idle
        }
    }

    #[must_use]
    pub const fn is_camera_ready(&self) -> bool {
        self.camera_ready
    }

    #[must_use]
    pub const fn is_models_ready(&self) -> bool {
        self.models_ready
    }

    pub fn mark_camera_ready(&mut self) -> bool {
        if self.stopped || self.camera_ready {
            return false;
        }
        self.camera_ready = true;
        true
    }

    pub fn mark_models_ready(&mut self) -> bool {
        if self.stopped || self.models_ready {
            return false;
        }
        self.models_ready = true;
        true
    }

    /// Enters `Running` if both resources are ready.
    pub fn start(&mut self) -> bool {
        if self.stopped || self.running || !(self.camera_ready && self.models_ready) {
            return false;
        }
        self.running = true;
        true
    }

    /// Enters the terminal `Stopped` state. Only the first call returns true.
    pub fn stop(&mut self) -> bool {
        if self.stopped {
            return false;
        }
        self.stopped = true;
        true
    }
}

/// Cloneable cancellation token for a running frame loop.
#[derive(Debug, Clone, Default)]
pub struct LoopHandle {
    inner: Arc<HandleInner>,
}

#[derive(Debug, Default)]
struct HandleInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl LoopHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Returns true for the first call only.
    pub fn cancel(&self) -> bool {
        let first = !self.inner.cancelled.swap(true, Ordering::SeqCst);
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
