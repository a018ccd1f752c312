use std::path::Path;

use crate::shared::pixel_buffer::PixelBuffer;

/// Decodes still images into RGBA frames using the `image` crate.
pub struct ImageFileReader;

impl ImageFileReader {
    pub fn new() -> Self {
        Self
    }

    pub fn read(&self, path: &Path) -> Result<PixelBuffer, Box<dyn std::error::Error>> {
        let img = image::open(path)?.to_rgba8();
        let (width, height) = img.dimensions();
        Ok(PixelBuffer::new(img.into_raw(), width, height))
    }
}

impl Default for ImageFileReader {
    fn default() -> Self {
        Self::new()
    }
}
