/// Domain interface for blurring a standalone RGBA rectangle.
///
/// The input is treated as an image of its own: edge handling depends only
/// on the rectangle's bounds, never on where it sat in the larger frame.
pub trait RegionBlurrer: Send {
    /// Blurs `pixels` (`width * height * 4` bytes) into `out`, reusing its
    /// allocation.
    fn blur_into(
        &self,
        pixels: &[u8],
        width: usize,
        height: usize,
        intensity: u8,
        out: &mut Vec<u8>,
    ) -> Result<(), Box<dyn std::error::Error>>;

    /// Convenience form returning a freshly allocated buffer.
    fn blur(
        &self,
        pixels: &[u8],
        width: usize,
        height: usize,
        intensity: u8,
    ) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let mut out = Vec::new();
        self.blur_into(pixels, width, height, intensity, &mut out)?;
        Ok(out)
    }
}
