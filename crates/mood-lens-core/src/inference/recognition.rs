//! Face descriptor network.
//!
//! Produces a 128-dimensional unit-length embedding per face. The frame loop
//! loads it as part of the model set; only [`describe`](FaceDescriptorNet::describe)
//! callers consume its output.

use anyhow::{Context, Result};
use candle_core::{Device, Module, Tensor};
use candle_nn::{linear, Conv2d, Linear, VarBuilder};
use image::imageops::{self, FilterType};
use image::RgbImage;

use super::utils::{conv3x3, face_crop, l2_normalize, rgb_tensor};
use crate::domain::BoundingBox;

/// Square crop side fed to the network.
pub const INPUT_SIZE: u32 = 112;
/// Embedding length.
pub const DESCRIPTOR_LEN: usize = 128;

const STAGES: [(usize, usize); 4] = [(3, 32), (32, 64), (64, 128), (128, 256)];

pub struct FaceDescriptorNet {
    convs: Vec<Conv2d>,
    projection: Linear,
    device: Device,
}

impl FaceDescriptorNet {
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
            projection: linear(256, DESCRIPTOR_LEN, vb.pp("projection"))?,
            device: vb.device().clone(),
        })
    }

    /// Computes the descriptor of `face`.
    ///
    /// # Errors
    ///
    /// Returns an error if the forward pass fails.
    pub fn describe(&self, image: &RgbImage, face: &BoundingBox) -> Result<Vec<f32>> {
        let (crop, _) = face_crop(image, face);
        let resized = imageops::resize(&crop, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
        let input = rgb_tensor(&resized, &self.device, |v| (v - 127.5) / 128.0)?;

        let mut descriptor = self
            .forward(&input)
            .context("descriptor forward pass")?
            .flatten_all()?
            .to_vec1::<f32>()?;
        l2_normalize(&mut descriptor);
        Ok(descriptor)
    }

    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let mut h = x.clone();
        for conv in &self.convs {
            h = conv.forward(&h)?.relu()?.max_pool2d(2)?;
        }
        // Global average pool over the remaining 7x7 map.
        let pooled = h.mean(3)?.mean(2)?;
        self.projection.forward(&pooled)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use candle_core::DType;

    #[test]
    fn test_descriptor_length() {
        let net = FaceDescriptorNet::new(VarBuilder::zeros(DType::F32, &Device::Cpu)).unwrap();
        let image = RgbImage::new(64, 64);
        let descriptor = net
            .describe(&image, &BoundingBox::new(8.0, 8.0, 48.0, 48.0, 0.9))
            .unwrap();
        assert_eq!(descriptor.len(), DESCRIPTOR_LEN);
        assert!(descriptor.iter().all(|v| *v == 0.0));
    }
}
