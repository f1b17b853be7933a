//! Video frame and display geometry types.

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// A single decoded camera frame.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Monotonic frame counter assigned by the camera device.
    pub sequence: u64,
    /// Packed RGB24 pixels at the stream's native resolution.
    pub image: RgbImage,
}

impl VideoFrame {
    /// Creates a frame from decoded pixels.
    #[must_use]
    pub const fn new(sequence: u64, image: RgbImage) -> Self {
        Self { sequence, image }
    }

    /// Frame width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Frame height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Native size of this frame.
    #[must_use]
    pub fn size(&self) -> DisplaySize {
        DisplaySize::new(self.width(), self.height())
    }
}

/// Stream properties known once the camera has delivered its metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetadata {
    /// Native frame width in pixels.
    pub width: u32,
    /// Native frame height in pixels.
    pub height: u32,
}

impl StreamMetadata {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Pixel dimensions the overlay is scaled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl DisplaySize {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns true if either dimension is zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<StreamMetadata> for DisplaySize {
    fn from(meta: StreamMetadata) -> Self {
        Self::new(meta.width, meta.height)
    }
}

impl std::fmt::Display for DisplaySize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_matches_image() {
        let frame = VideoFrame::new(7, RgbImage::new(320, 240));
        assert_eq!(frame.size(), DisplaySize::new(320, 240));
        assert_eq!(frame.sequence, 7);
    }

    #[test]
    fn test_display_size_from_metadata() {
        let size: DisplaySize = StreamMetadata::new(640, 480).into();
        assert_eq!(size.to_string(), "640x480");
        assert!(!size.is_empty());
        assert!(DisplaySize::new(0, 480).is_empty());
    }
}
