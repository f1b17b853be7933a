//! Seven-way facial expression classifier.
//!
//! A small CNN over a 48x48 grayscale face crop, in the FER layout:
//! three conv + max-pool stages (48 -> 24 -> 12 -> 6) and two fully
//! connected layers, with a softmax over the categories.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

use anyhow::{Context, Result};
use candle_core::{Device, Module, Tensor};
use candle_nn::{linear, Conv2d, Linear, VarBuilder};
use image::imageops::{self, FilterType};
use image::RgbImage;

use super::utils::{conv3x3, face_crop, gray_tensor, softmax};
use crate::domain::{BoundingBox, Expression, ExpressionScores, FaceLandmarks};

/// Square grayscale input side.
pub const INPUT_SIZE: u32 = 48;

const FEATURES: usize = 128 * 6 * 6;

pub struct ExpressionNet {
    conv1: Conv2d,
    conv2: Conv2d,
    conv3: Conv2d,
    fc1: Linear,
    fc2: Linear,
    device: Device,
}

impl ExpressionNet {
    /// # Errors
    ///
    /// Returns an error if a tensor is missing or has the wrong shape.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            conv1: conv3x3(1, 32, vb.pp("conv1"))?,
            conv2: conv3x3(32, 64, vb.pp("conv2"))?,
            conv3: conv3x3(64, 128, vb.pp("conv3"))?,
            fc1: linear(FEATURES, 256, vb.pp("fc1"))?,
            fc2: linear(256, Expression::COUNT, vb.pp("fc2"))?,
            device: vb.device().clone(),
        })
    }

    /// Scores every expression for one face.
    ///
    /// The crop is centred on the landmarks' bounding box, which tracks the
    /// face more tightly than the detector box.
    ///
    /// # Errors
    ///
    /// Returns an error if the forward pass fails.
    pub fn classify(
        &self,
        image: &RgbImage,
        face: &BoundingBox,
        landmarks: &FaceLandmarks,
    ) -> Result<ExpressionScores> {
        let region = landmark_box(landmarks).unwrap_or(*face);
        let (crop, _) = face_crop(image, &region);
        let gray = imageops::grayscale(&imageops::resize(
            &crop,
            INPUT_SIZE,
            INPUT_SIZE,
            FilterType::Triangle,
        ));
        let input = gray_tensor(&gray, &self.device)?;

        let logits = self
            .forward(&input)
            .context("expression forward pass")?
            .flatten_all()?
            .to_vec1::<f32>()?;
        let probs: [f32; Expression::COUNT] = softmax(&logits)
            .try_into()
            .map_err(|v: Vec<f32>| anyhow::anyhow!("expected {} scores, got {}", Expression::COUNT, v.len()))?;
        Ok(ExpressionScores::from_array(probs))
    }

    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let h = self.conv1.forward(x)?.relu()?.max_pool2d(2)?;
        let h = self.conv2.forward(&h)?.relu()?.max_pool2d(2)?;
        let h = self.conv3.forward(&h)?.relu()?.max_pool2d(2)?;
        let h = h.flatten_from(1)?;
        let h = self.fc1.forward(&h)?.relu()?;
        self.fc2.forward(&h)
    }
}

/// Bounding box of the landmark points, or `None` if degenerate.
fn landmark_box(landmarks: &FaceLandmarks) -> Option<BoundingBox> {
    let points = landmarks.points();
    let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
    let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    (max_x - min_x >= 1.0 && max_y - min_y >= 1.0)
        .then(|| BoundingBox::from_corners(min_x, min_y, max_x, max_y, 1.0))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::domain::{dominant, Point, LANDMARK_COUNT};
    use candle_core::DType;

    fn flat_landmarks() -> FaceLandmarks {
        FaceLandmarks::new(vec![Point::new(10.0, 10.0); LANDMARK_COUNT]).unwrap()
    }

    #[test]
    fn test_zero_weights_give_uniform_scores() {
        let net = ExpressionNet::new(VarBuilder::zeros(DType::F32, &Device::Cpu)).unwrap();
        let image = RgbImage::new(96, 96);
        let scores = net
            .classify(&image, &BoundingBox::new(16.0, 16.0, 64.0, 64.0, 0.9), &flat_landmarks())
            .unwrap();
        assert!(scores.iter().all(|(_, s)| (s - 1.0 / 7.0).abs() < 1e-6));
        assert_eq!(dominant(&scores).as_str().split(", ").count(), Expression::COUNT);
    }

    #[test]
    fn test_landmark_box() {
        assert!(landmark_box(&flat_landmarks()).is_none());
        let mut points = vec![Point::new(5.0, 5.0); LANDMARK_COUNT];
        points[0] = Point::new(25.0, 35.0);
        let bbox = landmark_box(&FaceLandmarks::new(points).unwrap()).unwrap();
        assert_eq!((bbox.x, bbox.y, bbox.width, bbox.height), (5.0, 5.0, 20.0, 30.0));
    }
}
