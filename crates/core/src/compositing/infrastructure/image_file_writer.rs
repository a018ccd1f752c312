use std::path::Path;

use crate::shared::pixel_buffer::PixelBuffer;

/// Writes RGBA frames to image files using the `image` crate.
///
/// Formats without an alpha channel (e.g. JPEG) get the alpha dropped.
pub struct ImageFileWriter;

impl ImageFileWriter {
    pub fn new() -> Self {
        Self
    }

    pub fn write(
        &self,
        path: &Path,
        frame: &PixelBuffer,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let img = image::RgbaImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
            .ok_or("Failed to create image from frame data")?;

        let is_jpeg = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| matches!(e.to_lowercase().as_str(), "jpg" | "jpeg"));
        if is_jpeg {
            image::DynamicImage::ImageRgba8(img).to_rgb8().save(path)?;
        } else {
            img.save(path)?;
        }
        Ok(())
    }
}

impl Default for ImageFileWriter {
    fn default() -> Self {
        Self::new()
    }
}
