//! Builders for frames and detections.

#![allow(clippy::cast_precision_loss)]

use image::{Rgb, RgbImage};
use mood_lens_core::domain::{
    BoundingBox, Expression, ExpressionScores, FaceDetection, FaceLandmarks, Point, VideoFrame,
    LANDMARK_COUNT,
};

/// Builder for synthetic camera frames.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    width: u32,
    height: u32,
    sequence: u64,
    fill: Rgb<u8>,
}

impl FrameBuilder {
    /// A mid-gray `width` x `height` frame with sequence 0.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            sequence: 0,
            fill: Rgb([128, 128, 128]),
        }
    }

    #[must_use]
    pub const fn sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    #[must_use]
    pub const fn fill(mut self, color: [u8; 3]) -> Self {
        self.fill = Rgb(color);
        self
    }

    #[must_use]
    pub fn build(self) -> VideoFrame {
        VideoFrame::new(
            self.sequence,
            RgbImage::from_pixel(self.width, self.height, self.fill),
        )
    }
}

/// Places 68 points on a regular grid inside `face`.
#[must_use]
pub fn landmarks_in(face: &BoundingBox) -> FaceLandmarks {
    let points: Vec<Point> = (0..LANDMARK_COUNT)
        .map(|i| {
            let col = (i % 17) as f32;
            let row = (i / 17) as f32;
            Point::new(
                face.x + face.width * (col + 0.5) / 17.0,
                face.y + face.height * (row + 0.5) / 4.0,
            )
        })
        .collect();
    // 68 = 17 * 4, so the grid always has the right count.
    FaceLandmarks::new(points).unwrap_or_else(|| unreachable!("grid yields {LANDMARK_COUNT} points"))
}

/// Builder for a single [`FaceDetection`].
#[derive(Debug, Clone)]
pub struct DetectionBuilder {
    bbox: BoundingBox,
    scores: ExpressionScores,
}

impl DetectionBuilder {
    /// A neutral face in a 100x100 box at the origin.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bbox: BoundingBox::new(0.0, 0.0, 100.0, 100.0, 0.9),
            scores: ExpressionScores::from_pairs(&[(Expression::Neutral, 1.0)]),
        }
    }

    #[must_use]
    pub const fn bbox(mut self, x: f32, y: f32, width: f32, height: f32) -> Self {
        self.bbox = BoundingBox::new(x, y, width, height, self.bbox.score);
        self
    }

    #[must_use]
    pub fn score(mut self, expression: Expression, score: f32) -> Self {
        let mut scores = *self.scores.as_array();
        scores[Expression::ALL.iter().position(|e| *e == expression).unwrap_or(0)] = score;
        self.scores = ExpressionScores::from_array(scores);
        self
    }

    #[must_use]
    pub const fn scores(mut self, scores: ExpressionScores) -> Self {
        self.scores = scores;
        self
    }

    #[must_use]
    pub fn build(self) -> FaceDetection {
        FaceDetection {
            detection: self.bbox,
            landmarks: landmarks_in(&self.bbox),
            expressions: self.scores,
        }
    }
}

impl Default for DetectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
