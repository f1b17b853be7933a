//! Mood Lens Adapters - concrete devices and stores for mood-lens.
//!
//! This crate provides adapters for:
//! - Camera capture on a dedicated thread (`nokhwa`, behind the `camera-nokhwa` feature)
//! - A raster overlay surface with optional PNG preview
//! - Model downloading and caching

pub mod camera;
pub mod models;
pub mod overlay;

#[cfg(feature = "camera-nokhwa")]
pub use camera::{list_cameras, nokhwa_camera, NokhwaCamera};
pub use camera::{BlockingCapture, ThreadedCamera, UnsupportedCamera};
pub use models::{
    all_models_installed, ensure_models_from, list_models, model_path, models_dir,
    parse_checksums, resolve_location, ProgressCallback, CHECKSUMS_FILE,
};
pub use overlay::RasterOverlay;
