//! Single-pass face detector.
//!
//! `BlazeFace` front-camera architecture: a 128x128 input, two feature maps
//! (16x16 and 8x8) and 896 anchors. Weights follow the
//! hollance/BlazeFace-PyTorch layout with BatchNorm folded into conv biases.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

use std::collections::VecDeque;

use anyhow::{Context, Result};
use candle_core::{Device, Module, Tensor};
use candle_nn::{conv2d, Conv2d, Conv2dConfig, VarBuilder};
use image::imageops::{self, FilterType};
use image::RgbImage;

use super::utils::{rgb_tensor, sigmoid};
use crate::domain::BoundingBox;
use crate::ports::DetectorOptions;

/// Square input side length.
pub const INPUT_SIZE: u32 = 128;

const ANCHORS_16: usize = 16 * 16 * 2;
const ANCHORS_8: usize = 8 * 8 * 6;
const NUM_ANCHORS: usize = ANCHORS_16 + ANCHORS_8;

/// `(in, out, stride)` for each block; all kernels are 3x3.
const BACKBONE_16: [(usize, usize, usize); 11] = [
    (24, 24, 1),
    (24, 28, 1),
    (28, 32, 2),
    (32, 36, 1),
    (36, 42, 1),
    (42, 48, 2),
    (48, 56, 1),
    (56, 64, 1),
    (64, 72, 1),
    (72, 80, 1),
    (80, 88, 1),
];

const BACKBONE_8: [(usize, usize, usize); 5] = [
    (88, 96, 2),
    (96, 96, 1),
    (96, 96, 1),
    (96, 96, 1),
    (96, 96, 1),
];

/// Depthwise-separable residual block.
struct DetectorBlock {
    depthwise: Conv2d,
    pointwise: Conv2d,
    extra_channels: usize,
    downsample: bool,
}

impl DetectorBlock {
    fn load(in_ch: usize, out_ch: usize, stride: usize, vb: &VarBuilder) -> Result<Self> {
        let downsample = stride == 2;
        let depthwise = conv2d(
            in_ch,
            in_ch,
            3,
            Conv2dConfig {
                stride,
                padding: usize::from(!downsample),
                groups: in_ch,
                dilation: 1,
            },
            vb.pp("depthwise"),
        )?;
        let pointwise = conv2d(in_ch, out_ch, 1, Conv2dConfig::default(), vb.pp("pointwise"))?;
        Ok(Self {
            depthwise,
            pointwise,
            extra_channels: out_ch.saturating_sub(in_ch),
            downsample,
        })
    }
}

impl Module for DetectorBlock {
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let (branch_in, shortcut) = if self.downsample {
            (
                x.pad_with_zeros(2, 0, 2)?.pad_with_zeros(3, 0, 2)?,
                x.max_pool2d(2)?,
            )
        } else {
            (x.clone(), x.clone())
        };

        let branch = self.depthwise.forward(&branch_in)?.relu()?;
        let branch = self.pointwise.forward(&branch)?;

        let shortcut = if self.extra_channels > 0 {
            shortcut.pad_with_zeros(1, 0, self.extra_channels)?
        } else {
            shortcut
        };
        (branch + shortcut)?.relu()
    }
}

/// Loaded detector network.
pub struct FaceDetector {
    stem: Conv2d,
    backbone_16: Vec<DetectorBlock>,
    backbone_8: Vec<DetectorBlock>,
    classifier_16: Conv2d,
    regressor_16: Conv2d,
    classifier_8: Conv2d,
    regressor_8: Conv2d,
    anchors: Vec<[f32; 2]>,
    device: Device,
}

impl FaceDetector {
    /// Builds the detector from a weights map.
    ///
    /// # Errors
    ///
    /// Returns an error if a tensor is missing or has the wrong shape.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(vb: VarBuilder) -> Result<Self> {
        let stem = conv2d(
            3,
            24,
            5,
            Conv2dConfig {
                stride: 2,
                ..Conv2dConfig::default()
            },
            vb.pp("conv0"),
        )?;

        let backbone_16 = BACKBONE_16
            .iter()
            .enumerate()
            .map(|(i, &(c_in, c_out, s))| {
                DetectorBlock::load(c_in, c_out, s, &vb.pp(format!("backbone1.{i}")))
            })
            .collect::<Result<Vec<_>>>()?;
        let backbone_8 = BACKBONE_8
            .iter()
            .enumerate()
            .map(|(i, &(c_in, c_out, s))| {
                DetectorBlock::load(c_in, c_out, s, &vb.pp(format!("backbone2.{i}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let head = |c_in, c_out, name: &str| {
            conv2d(c_in, c_out, 1, Conv2dConfig::default(), vb.pp(name))
        };

        Ok(Self {
            stem,
            backbone_16,
            backbone_8,
            classifier_16: head(88, 2, "classifier_16")?,
            regressor_16: head(88, 32, "regressor_16")?,
            classifier_8: head(96, 6, "classifier_8")?,
            regressor_8: head(96, 96, "regressor_8")?,
            anchors: anchor_centers(),
            device: vb.device().clone(),
        })
    }

    /// Finds faces in `image` and returns boxes in its pixel coordinates,
    /// strongest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the forward pass fails.
    pub fn detect(&self, image: &RgbImage, options: &DetectorOptions) -> Result<Vec<BoundingBox>> {
        let resized = imageops::resize(image, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
        let input = rgb_tensor(&resized, &self.device, |v| v / 127.5 - 1.0)?;
        let (scores, regressions) = self.forward(&input).context("detector forward pass")?;

        let scores = scores.flatten_all()?.to_vec1::<f32>()?;
        let regressions = regressions.squeeze(0)?.to_vec2::<f32>()?;

        let (width, height) = (image.width() as f32, image.height() as f32);
        let input = INPUT_SIZE as f32;
        let candidates = scores
            .iter()
            .zip(&regressions)
            .zip(&self.anchors)
            .filter_map(|((&logit, reg), anchor)| {
                let score = sigmoid(logit);
                if score < options.score_threshold {
                    return None;
                }
                let cx = anchor[0] + reg[0] / input;
                let cy = anchor[1] + reg[1] / input;
                let (half_w, half_h) = (reg[2] / input / 2.0, reg[3] / input / 2.0);
                Some(BoundingBox::from_corners(
                    (cx - half_w).clamp(0.0, 1.0) * width,
                    (cy - half_h).clamp(0.0, 1.0) * height,
                    (cx + half_w).clamp(0.0, 1.0) * width,
                    (cy + half_h).clamp(0.0, 1.0) * height,
                    score,
                ))
            })
            .collect();

        Ok(suppress(candidates, options.iou_threshold))
    }

    fn forward(&self, x: &Tensor) -> Result<(Tensor, Tensor)> {
        let x = x.pad_with_zeros(2, 1, 2)?.pad_with_zeros(3, 1, 2)?;
        let mut h = self.stem.forward(&x)?.relu()?;
        for block in &self.backbone_16 {
            h = block.forward(&h)?;
        }
        let map_16 = h.clone();
        for block in &self.backbone_8 {
            h = block.forward(&h)?;
        }
        let map_8 = h;

        let flat = |head: &Conv2d, map: &Tensor, anchors: usize, width: usize| {
            head.forward(map)?
                .permute((0, 2, 3, 1))?
                .reshape((1, anchors, width))
        };

        let scores = Tensor::cat(
            &[
                flat(&self.classifier_16, &map_16, ANCHORS_16, 1)?,
                flat(&self.classifier_8, &map_8, ANCHORS_8, 1)?,
            ],
            1,
        )?;
        let regressions = Tensor::cat(
            &[
                flat(&self.regressor_16, &map_16, ANCHORS_16, 16)?,
                flat(&self.regressor_8, &map_8, ANCHORS_8, 16)?,
            ],
            1,
        )?;
        Ok((scores, regressions))
    }
}

/// Normalised anchor centres for both feature maps.
fn anchor_centers() -> Vec<[f32; 2]> {
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);
    for (grid, per_cell) in [(16_u8, 2), (8_u8, 6)] {
        let size = f32::from(grid);
        for y in 0..grid {
            for x in 0..grid {
                let center = [(f32::from(x) + 0.5) / size, (f32::from(y) + 0.5) / size];
                anchors.extend(std::iter::repeat(center).take(per_cell));
            }
        }
    }
    anchors
}

/// Greedy non-maximum suppression, strongest box first.
fn suppress(mut boxes: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    boxes.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut queue = VecDeque::from(boxes);
    let mut kept = Vec::new();
    while let Some(best) = queue.pop_front() {
        queue.retain(|other| iou(&best, other) < iou_threshold);
        kept.push(best);
    }
    kept
}

/// Intersection over union of two boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let overlap_w = (a.right().min(b.right()) - a.x.max(b.x)).max(0.0);
    let overlap_h = (a.bottom().min(b.bottom()) - a.y.max(b.y)).max(0.0);
    let intersection = overlap_w * overlap_h;
    let union = a.width * a.height + b.width * b.height - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use candle_core::DType;

    #[test]
    fn test_anchor_count() {
        let anchors = anchor_centers();
        assert_eq!(anchors.len(), NUM_ANCHORS);
        assert!((anchors[0][0] - 1.0 / 32.0).abs() < 1e-6);
        assert!((anchors[NUM_ANCHORS - 1][1] - 15.0 / 16.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou() {
        let a = BoundingBox::new(0.0, 0.0, 50.0, 50.0, 0.9);
        let b = BoundingBox::new(25.0, 25.0, 50.0, 50.0, 0.8);
        let far = BoundingBox::new(100.0, 100.0, 10.0, 10.0, 0.8);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert!((iou(&a, &b) - 625.0 / 4375.0).abs() < 1e-6);
        assert!(iou(&a, &far).abs() < 1e-6);
    }

    #[test]
    fn test_suppress_keeps_strongest() {
        let boxes = vec![
            BoundingBox::new(2.0, 2.0, 50.0, 50.0, 0.8),
            BoundingBox::new(0.0, 0.0, 50.0, 50.0, 0.95),
            BoundingBox::new(200.0, 200.0, 40.0, 40.0, 0.9),
        ];
        let kept = suppress(boxes, 0.3);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].score - 0.95).abs() < 1e-6);
        assert!((kept[1].score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_zero_weights_detect_nothing() {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        let detector = FaceDetector::new(vb).unwrap();
        let image = RgbImage::from_pixel(64, 48, image::Rgb([128, 128, 128]));
        let faces = detector.detect(&image, &DetectorOptions::default()).unwrap();
        assert!(faces.is_empty());
    }
}
