//! Captured frame data.

use image::{ImageBuffer, Luma, RgbImage};

/// 16-bit depth map aligned with the colour frame.
pub type DepthImage = ImageBuffer<Luma<u16>, Vec<u16>>;

/// One decoded frame from a camera device.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Unique ID of the device that produced the frame.
    pub device_id: String,
    /// Monotonic per-device sequence number.
    pub seq: u64,
    /// Decoded colour image.
    pub color: RgbImage,
    /// Depth map, if the device provides one.
    pub depth: Option<DepthImage>,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.color.width()
    }

    pub fn height(&self) -> u32 {
        self.color.height()
    }
}
