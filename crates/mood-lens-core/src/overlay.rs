//! Overlay renderer: rescales detections and draws them in a fixed order.

use crate::domain::{DisplaySize, FaceDetection};
use crate::ports::OverlaySurface;

/// Maps detections from source-frame pixels to display pixels.
///
/// Box corners and landmark points go through the same per-axis scale.
/// An empty source size leaves detections untouched.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn resize_detections(
    detections: &[FaceDetection],
    source: DisplaySize,
    display: DisplaySize,
) -> Vec<FaceDetection> {
    if source.is_empty() || source == display {
        return detections.to_vec();
    }
    let sx = display.width as f32 / source.width as f32;
    let sy = display.height as f32 / source.height as f32;
    detections.iter().map(|d| d.scaled(sx, sy)).collect()
}

/// Clears `surface` and draws every box, then every landmark set, then
/// every expression bar group.
///
/// The surface is first matched to `display`.
pub fn render<S: OverlaySurface + ?Sized>(
    surface: &mut S,
    detections: &[FaceDetection],
    source: DisplaySize,
    display: DisplaySize,
    min_confidence: f32,
) {
    if surface.dimensions() != display {
        surface.match_dimensions(display);
    }
    surface.clear();

    let resized = resize_detections(detections, source, display);
    for face in &resized {
        surface.draw_detection(&face.detection);
    }
    for face in &resized {
        surface.draw_landmarks(&face.landmarks);
    }
    for face in &resized {
        surface.draw_expressions(&face.detection, &face.expressions, min_confidence);
    }
}
