//! Raster overlay surface drawn with `imageproc`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
};
use imageproc::rect::Rect;
use tracing::debug;

use mood_lens_core::{
    BoundingBox, DisplaySize, Expression, ExpressionScores, FaceLandmarks, OverlaySurface,
    Point, VideoFrame,
};

const BOX_COLOR: Rgba<u8> = Rgba([0, 200, 255, 255]);
const LANDMARK_COLOR: Rgba<u8> = Rgba([0, 255, 120, 255]);
const BAR_HEIGHT: u32 = 6;
const BAR_GAP: u32 = 2;
const LANDMARK_RADIUS: i32 = 1;

/// Fill colour of an expression's score bar.
#[must_use]
pub const fn expression_color(expression: Expression) -> Rgba<u8> {
    match expression {
        Expression::Neutral => Rgba([200, 200, 200, 255]),
        Expression::Happy => Rgba([255, 210, 0, 255]),
        Expression::Sad => Rgba([60, 110, 255, 255]),
        Expression::Angry => Rgba([230, 40, 40, 255]),
        Expression::Fearful => Rgba([150, 60, 200, 255]),
        Expression::Disgusted => Rgba([60, 160, 60, 255]),
        Expression::Surprised => Rgba([255, 120, 0, 255]),
    }
}

/// Transparent RGBA canvas kept at the displayed video size.
///
/// With [`RasterOverlay::with_preview`] the canvas is composited over the
/// frame and written to a PNG every `every` presented frames. The file is
/// overwritten in place.
#[derive(Debug, Clone)]
pub struct RasterOverlay {
    canvas: RgbaImage,
    preview: Option<PathBuf>,
    every: u64,
    presented: u64,
}

impl RasterOverlay {
    #[must_use]
    pub fn new(size: DisplaySize) -> Self {
        Self {
            canvas: RgbaImage::new(size.width, size.height),
            preview: None,
            every: 1,
            presented: 0,
        }
    }

    /// Writes a composited preview to `path` every `every` frames.
    #[must_use]
    pub fn with_preview(mut self, path: impl Into<PathBuf>, every: u64) -> Self {
        self.preview = Some(path.into());
        self.every = every.max(1);
        self
    }

    /// The drawn overlay, without the video underneath.
    #[must_use]
    pub const fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    /// Frames presented so far.
    #[must_use]
    pub const fn presented(&self) -> u64 {
        self.presented
    }

    /// Blends the canvas over `frame` scaled to the canvas size.
    #[must_use]
    pub fn compose(&self, frame: &VideoFrame) -> RgbaImage {
        let (width, height) = self.canvas.dimensions();
        let video = DynamicImage::ImageRgb8(frame.image.clone()).to_rgba8();
        let mut base = if video.dimensions() == (width, height) {
            video
        } else {
            imageops::resize(&video, width, height, FilterType::Triangle)
        };
        imageops::overlay(&mut base, &self.canvas, 0, 0);
        base
    }

    fn write_preview(&self, frame: &VideoFrame, path: &Path) -> Result<()> {
        self.compose(frame)
            .save(path)
            .with_context(|| format!("Failed to write preview {}", path.display()))?;
        debug!(frame = frame.sequence, path = %path.display(), "Wrote overlay preview");
        Ok(())
    }

    /// Clips a float rectangle to the canvas. `None` when nothing is visible.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    fn clip(&self, x: f32, y: f32, width: f32, height: f32) -> Option<Rect> {
        let (cw, ch) = self.canvas.dimensions();
        let x0 = x.max(0.0).floor();
        let y0 = y.max(0.0).floor();
        let x1 = (x + width).min(cw as f32).ceil();
        let y1 = (y + height).min(ch as f32).ceil();
        if x1 - x0 < 1.0 || y1 - y0 < 1.0 {
            return None;
        }
        Some(Rect::at(x0 as i32, y0 as i32).of_size((x1 - x0) as u32, (y1 - y0) as u32))
    }
}

#[allow(clippy::cast_possible_truncation)]
fn pixel(point: Point) -> (i32, i32) {
    (point.x.round() as i32, point.y.round() as i32)
}

#[allow(clippy::cast_precision_loss)]
impl OverlaySurface for RasterOverlay {
    fn match_dimensions(&mut self, size: DisplaySize) {
        if self.canvas.dimensions() != (size.width, size.height) {
            self.canvas = RgbaImage::new(size.width, size.height);
        }
    }

    fn dimensions(&self) -> DisplaySize {
        let (width, height) = self.canvas.dimensions();
        DisplaySize::new(width, height)
    }

    fn clear(&mut self) {
        self.canvas.pixels_mut().for_each(|p| *p = Rgba([0, 0, 0, 0]));
    }

    fn draw_detection(&mut self, bbox: &BoundingBox) {
        let Some(rect) = self.clip(bbox.x, bbox.y, bbox.width, bbox.height) else {
            return;
        };
        draw_hollow_rect_mut(&mut self.canvas, rect, BOX_COLOR);

        // Confidence bar along the top edge.
        let filled = bbox.width * bbox.score.clamp(0.0, 1.0);
        let top = bbox.y - (BAR_HEIGHT + BAR_GAP) as f32;
        if let Some(bar) = self.clip(bbox.x, top, filled, BAR_HEIGHT as f32) {
            draw_filled_rect_mut(&mut self.canvas, bar, BOX_COLOR);
        }
    }

    fn draw_landmarks(&mut self, landmarks: &FaceLandmarks) {
        for outline in [landmarks.jaw_outline(), landmarks.mouth()] {
            for pair in outline.windows(2) {
                draw_line_segment_mut(
                    &mut self.canvas,
                    (pair[0].x, pair[0].y),
                    (pair[1].x, pair[1].y),
                    LANDMARK_COLOR,
                );
            }
        }
        for point in landmarks.points() {
            draw_filled_circle_mut(&mut self.canvas, pixel(*point), LANDMARK_RADIUS, LANDMARK_COLOR);
        }
    }

    fn draw_expressions(
        &mut self,
        anchor: &BoundingBox,
        scores: &ExpressionScores,
        min_confidence: f32,
    ) {
        let mut row = 0u32;
        for (expression, score) in scores.iter() {
            if score < min_confidence {
                continue;
            }
            let y = anchor.bottom() + (BAR_GAP + row * (BAR_HEIGHT + BAR_GAP)) as f32;
            let width = anchor.width * score.clamp(0.0, 1.0);
            if let Some(bar) = self.clip(anchor.x, y, width, BAR_HEIGHT as f32) {
                draw_filled_rect_mut(&mut self.canvas, bar, expression_color(expression));
            }
            row += 1;
        }
    }

    fn present(&mut self, frame: &VideoFrame) -> Result<()> {
        self.presented += 1;
        match self.preview.as_deref() {
            Some(path) if self.presented % self.every == 0 => self.write_preview(frame, path),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn transparent(canvas: &RgbaImage) -> bool {
        canvas.pixels().all(|p| p.0[3] == 0)
    }

    #[test]
    fn test_match_dimensions_resizes_canvas() {
        let mut overlay = RasterOverlay::new(DisplaySize::new(10, 10));
        overlay.match_dimensions(DisplaySize::new(64, 48));
        assert_eq!(overlay.dimensions(), DisplaySize::new(64, 48));
        assert_eq!(overlay.canvas().dimensions(), (64, 48));
    }

    #[test]
    fn test_detection_box_outline() {
        let mut overlay = RasterOverlay::new(DisplaySize::new(100, 100));
        overlay.draw_detection(&BoundingBox::new(20.0, 30.0, 40.0, 40.0, 1.0));
        let canvas = overlay.canvas();
        assert_eq!(*canvas.get_pixel(20, 30), BOX_COLOR);
        assert_eq!(*canvas.get_pixel(59, 69), BOX_COLOR);
        assert_eq!(canvas.get_pixel(40, 50).0[3], 0);
        // Full-confidence bar sits just above the box.
        assert_eq!(*canvas.get_pixel(55, 23), BOX_COLOR);
    }

    #[test]
    fn test_offscreen_box_is_ignored() {
        let mut overlay = RasterOverlay::new(DisplaySize::new(50, 50));
        overlay.draw_detection(&BoundingBox::new(80.0, 80.0, 10.0, 10.0, 0.9));
        overlay.draw_detection(&BoundingBox::new(10.0, 10.0, 0.0, 0.0, 0.9));
        assert!(transparent(overlay.canvas()));
    }

    #[test]
    fn test_clear_erases_everything() {
        let mut overlay = RasterOverlay::new(DisplaySize::new(40, 40));
        overlay.draw_detection(&BoundingBox::new(5.0, 10.0, 20.0, 20.0, 0.5));
        assert!(!transparent(overlay.canvas()));
        overlay.clear();
        assert!(transparent(overlay.canvas()));
    }

    #[test]
    fn test_expression_bars_respect_min_confidence() {
        let mut overlay = RasterOverlay::new(DisplaySize::new(100, 100));
        let anchor = BoundingBox::new(0.0, 0.0, 50.0, 50.0, 0.9);
        let scores =
            ExpressionScores::from_pairs(&[(Expression::Happy, 0.8), (Expression::Sad, 0.05)]);
        overlay.draw_expressions(&anchor, &scores, 0.1);

        let canvas = overlay.canvas();
        let happy = expression_color(Expression::Happy);
        let sad = expression_color(Expression::Sad);
        assert_eq!(*canvas.get_pixel(10, 53), happy);
        assert!(canvas.pixels().all(|p| *p != sad));
        // The bar is proportional to the score: 0.8 * 50 = 40 px.
        assert_eq!(canvas.get_pixel(45, 53).0[3], 0);
    }

    #[test]
    fn test_preview_is_written_every_n_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.png");
        let mut overlay = RasterOverlay::new(DisplaySize::new(32, 24)).with_preview(&path, 2);
        let frame = VideoFrame::new(1, image::RgbImage::new(16, 12));

        overlay.present(&frame).unwrap();
        assert!(!path.exists());
        overlay.present(&frame).unwrap();
        assert!(path.exists());
        assert_eq!(overlay.presented(), 2);

        let written = image::open(&path).unwrap();
        assert_eq!((written.width(), written.height()), (32, 24));
    }
}
