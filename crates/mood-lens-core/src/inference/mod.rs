//! ML inference engine using Candle.
//!
//! Provides model loading and inference for:
//! - `BlazeFace` (face detection)
//! - 68-point facial landmarks
//! - 128-d face descriptors
//! - 7-way expression classification

mod backend;
mod detector;
mod device;
mod expression;
mod landmarks;
mod loader;
mod recognition;
mod utils;

pub use backend::CandleBackend;
pub use detector::FaceDetector;
pub use device::{device_name, select_device};
pub use expression::ExpressionNet;
pub use landmarks::LandmarkNet;
pub use loader::{load_safetensors, load_unit};
pub use recognition::{FaceDescriptorNet, DESCRIPTOR_LEN};
