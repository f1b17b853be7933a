//! Shared inference utilities.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use candle_nn::{conv2d, Conv2d, Conv2dConfig, VarBuilder};
use image::{GrayImage, RgbImage};

use crate::domain::BoundingBox;

/// Sigmoid activation function.
#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Numerically stable softmax over a slice.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|v| v / sum).collect()
}

/// Scales `values` to unit length. A zero vector is returned unchanged.
pub fn l2_normalize(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        values.iter_mut().for_each(|v| *v /= norm);
    }
}

/// 3x3 convolution with same padding.
pub fn conv3x3(in_ch: usize, out_ch: usize, vb: VarBuilder) -> candle_core::Result<Conv2d> {
    conv2d(
        in_ch,
        out_ch,
        3,
        Conv2dConfig {
            padding: 1,
            ..Conv2dConfig::default()
        },
        vb,
    )
}

/// Converts an RGB image to a `(1, 3, H, W)` tensor, mapping each channel
/// value (0-255) through `normalize`.
pub fn rgb_tensor(image: &RgbImage, device: &Device, normalize: impl Fn(f32) -> f32) -> Result<Tensor> {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let data: Vec<f32> = image
        .pixels()
        .flat_map(|p| p.0.map(|c| normalize(f32::from(c))))
        .collect();
    Tensor::from_vec(data, (1, h, w, 3), device)?
        .permute((0, 3, 1, 2))?
        .contiguous()
        .context("failed to build RGB tensor")
}

/// Converts a grayscale image to a `(1, 1, H, W)` tensor in `[0, 1]`.
pub fn gray_tensor(image: &GrayImage, device: &Device) -> Result<Tensor> {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let data: Vec<f32> = image.pixels().map(|p| f32::from(p[0]) / 255.0).collect();
    Tensor::from_vec(data, (1, 1, h, w), device).context("failed to build gray tensor")
}

/// Pixel rectangle a face crop was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Crops the square region around `face`, clamped to the image.
///
/// The square's side is the longer box side so the face keeps its aspect
/// ratio when the crop is resized.
pub fn face_crop(image: &RgbImage, face: &BoundingBox) -> (RgbImage, CropRegion) {
    let side = face.width.max(face.height).max(1.0);
    let cx = face.x + face.width / 2.0;
    let cy = face.y + face.height / 2.0;

    let (img_w, img_h) = (image.width(), image.height());
    let x = ((cx - side / 2.0).max(0.0) as u32).min(img_w.saturating_sub(1));
    let y = ((cy - side / 2.0).max(0.0) as u32).min(img_h.saturating_sub(1));
    let width = (side as u32).clamp(1, img_w.saturating_sub(x).max(1));
    let height = (side as u32).clamp(1, img_h.saturating_sub(y).max(1));

    let region = CropRegion {
        x,
        y,
        width,
        height,
    };
    let crop = image::imageops::crop_imm(image, x, y, width, height).to_image();
    (crop, region)
}
