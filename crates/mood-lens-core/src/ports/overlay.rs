//! Drawing surface port for the detection overlay.

use crate::domain::{BoundingBox, DisplaySize, ExpressionScores, FaceLandmarks, VideoFrame};

/// A 2-D surface stacked over the video at the same on-screen size.
///
/// The overlay renderer decides what to draw and in which order; the surface
/// only provides the pixel-level primitives.
pub trait OverlaySurface {
    /// Resizes the surface to match the displayed video.
    fn match_dimensions(&mut self, size: DisplaySize);

    /// Current surface size.
    fn dimensions(&self) -> DisplaySize;

    /// Erases everything drawn so far.
    fn clear(&mut self);

    /// Draws a face box with its confidence.
    fn draw_detection(&mut self, bbox: &BoundingBox);

    /// Draws the 68 landmark points of one face.
    fn draw_landmarks(&mut self, landmarks: &FaceLandmarks);

    /// Draws one bar per expression whose score reaches `min_confidence`,
    /// anchored at the face box.
    fn draw_expressions(&mut self, anchor: &BoundingBox, scores: &ExpressionScores, min_confidence: f32);

    /// Called once per frame after drawing finishes.
    ///
    /// # Errors
    ///
    /// Returns an error if presenting the composed frame fails. The frame
    /// loop logs it and carries on.
    fn present(&mut self, frame: &VideoFrame) -> anyhow::Result<()> {
        let _ = frame;
        Ok(())
    }
}
