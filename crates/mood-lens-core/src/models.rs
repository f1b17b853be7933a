//! Model readiness gate.
//!
//! Loads the four model units exactly once and hands out the complete set.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::LensError;
use crate::ports::{ModelLocation, ModelUnit, VisionBackend};

/// All four loaded model units.
///
/// Only constructed when every load succeeded.
pub struct ModelSet<B: VisionBackend> {
    pub detector: B::Detector,
    pub landmarks: B::Landmarker,
    pub recognition: B::Recognizer,
    pub expression: B::Classifier,
}

/// Observable state of a [`ModelGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    NotLoaded,
    Loading,
    Ready,
    Failed,
}

enum GateState<B: VisionBackend> {
    NotLoaded,
    Ready(Arc<ModelSet<B>>),
    Failed(LensError),
}

/// Owns the single `NotLoaded | Loading | Ready | Failed` model state.
///
/// Callers serialise on an async mutex, so a call that arrives while a load
/// is in flight waits for that load instead of starting another.
pub struct ModelGate<B: VisionBackend> {
    state: Mutex<GateState<B>>,
}

impl<B: VisionBackend> ModelGate<B> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState::NotLoaded),
        }
    }

    /// Current state. `Loading` while a call holds the gate.
    #[must_use]
    pub fn status(&self) -> GateStatus {
        match self.state.try_lock() {
            Err(_) => GateStatus::Loading,
            Ok(state) => match &*state {
                GateState::NotLoaded => GateStatus::NotLoaded,
                GateState::Ready(_) => GateStatus::Ready,
                GateState::Failed(_) => GateStatus::Failed,
            },
        }
    }

    /// Returns the loaded set, loading it first if needed.
    ///
    /// The four units load concurrently. Each is bounded by `timeout` when
    /// given. A failure of any unit fails the gate for good.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::ModelLoad`] naming the first unit that failed.
    pub async fn ensure_loaded(
        &self,
        backend: &B,
        location: &ModelLocation,
        timeout: Option<Duration>,
    ) -> Result<Arc<ModelSet<B>>, LensError> {
        let mut state = self.state.lock().await;
        match &*state {
            GateState::Ready(set) => return Ok(Arc::clone(set)),
            GateState::Failed(err) => return Err(err.clone()),
            GateState::NotLoaded => {}
        }

        info!(%location, "loading models");
        let loaded = tokio::try_join!(
            load_unit(ModelUnit::Detector, timeout, backend.load_detector(location)),
            load_unit(ModelUnit::Landmarks, timeout, backend.load_landmarker(location)),
            load_unit(ModelUnit::Recognition, timeout, backend.load_recognizer(location)),
            load_unit(ModelUnit::Expression, timeout, backend.load_classifier(location)),
        );

        match loaded {
            Ok((detector, landmarks, recognition, expression)) => {
                let set = Arc::new(ModelSet {
                    detector,
                    landmarks,
                    recognition,
                    expression,
                });
                *state = GateState::Ready(Arc::clone(&set));
                info!("models ready");
                Ok(set)
            }
            Err(err) => {
                warn!("{err}");
                *state = GateState::Failed(err.clone());
                Err(err)
            }
        }
    }
}

impl<B: VisionBackend> Default for ModelGate<B> {
    fn default() -> Self {
        Self::new()
    }
}

async fn load_unit<T>(
    unit: ModelUnit,
    timeout: Option<Duration>,
    load: impl Future<Output = anyhow::Result<T>>,
) -> Result<T, LensError> {
    let result = match timeout {
        Some(limit) => tokio::time::timeout(limit, load).await.unwrap_or_else(|_| {
            Err(anyhow::anyhow!(
                "timed out after {}s",
                limit.as_secs_f32()
            ))
        }),
        None => load.await,
    };
    match result {
        Ok(model) => {
            debug!(%unit, "model unit loaded");
            Ok(model)
        }
        Err(e) => Err(LensError::model_load(unit, format!("{e:#}"))),
    }
}
