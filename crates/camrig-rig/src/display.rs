//! Display collaborator.

use image::RgbImage;

/// On-screen (or otherwise) image presentation. Pure side effect; the rig
/// never reads anything back.
pub trait Display {
    fn show(&mut self, window: &str, image: &RgbImage);
}

/// Discards everything. Useful headless and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDisplay;

impl Display for NullDisplay {
    fn show(&mut self, _window: &str, _image: &RgbImage) {}
}
