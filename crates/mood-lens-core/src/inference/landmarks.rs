//! 68-point facial landmark regressor.

#![allow(clippy::cast_precision_loss)]

use anyhow::{Context, Result};
use candle_core::{Device, Module, Tensor};
use candle_nn::{linear, Conv2d, Linear, VarBuilder};
use image::imageops::{self, FilterType};
use image::RgbImage;

use super::utils::{conv3x3, face_crop, rgb_tensor, sigmoid};
use crate::domain::{BoundingBox, FaceLandmarks, Point, LANDMARK_COUNT};

/// Square crop side fed to the network.
pub const INPUT_SIZE: u32 = 112;

/// Channel widths of the four conv stages; each stage halves the resolution.
const STAGES: [(usize, usize); 4] = [(3, 32), (32, 64), (64, 128), (128, 128)];
/// 112 -> 56 -> 28 -> 14 -> 7
const FEATURES: usize = 128 * 7 * 7;

/// Regresses 68 (x, y) pairs relative to the face crop.
///
/// Architecture: four 3x3 conv + ReLU + 2x2 max-pool stages, then two
/// fully-connected layers. Outputs pass through a sigmoid so points stay
/// inside the crop.
pub struct LandmarkNet {
    convs: Vec<Conv2d>,
    fc1: Linear,
    fc2: Linear,
    device: Device,
}

impl LandmarkNet {
    /// # Errors
    ///
    /// Returns an error if a tensor is missing or has the wrong shape.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(vb: VarBuilder) -> Result<Self> {
        let convs = STAGES
            .iter()
            .enumerate()
            .map(|(i, &(c_in, c_out))| conv3x3(c_in, c_out, vb.pp(format!("conv{}", i + 1))))
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(Self {
            convs,
            fc1: linear(FEATURES, 512, vb.pp("fc1"))?,
            fc2: linear(512, LANDMARK_COUNT * 2, vb.pp("fc2"))?,
            device: vb.device().clone(),
        })
    }

    /// Locates the landmarks of `face` in `image` pixel coordinates.
    ///
    /// # Errors
    ///
    /// Returns an error if the forward pass fails.
    pub fn detect(&self, image: &RgbImage, face: &BoundingBox) -> Result<FaceLandmarks> {
        let (crop, region) = face_crop(image, face);
        let resized = imageops::resize(&crop, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
        let input = rgb_tensor(&resized, &self.device, |v| v / 255.0)?;

        let raw = self
            .forward(&input)
            .context("landmark forward pass")?
            .flatten_all()?
            .to_vec1::<f32>()?;

        let points = raw
            .chunks_exact(2)
            .map(|xy| {
                Point::new(
                    region.x as f32 + sigmoid(xy[0]) * region.width as f32,
                    region.y as f32 + sigmoid(xy[1]) * region.height as f32,
                )
            })
            .collect();

        FaceLandmarks::new(points).context("landmark model returned the wrong number of points")
    }

    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let mut h = x.clone();
        for conv in &self.convs {
            h = conv.forward(&h)?.relu()?.max_pool2d(2)?;
        }
        let h = h.flatten_from(1)?;
        let h = self.fc1.forward(&h)?.relu()?;
        self.fc2.forward(&h)
    }
}
