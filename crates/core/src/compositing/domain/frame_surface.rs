use crate::shared::blur_region::RoiRect;
use crate::shared::pixel_buffer::PixelBuffer;

/// Read-only view of the externally rendered video frame.
///
/// The host may replace the frame contents between calls, so the
/// compositor re-reads pixels on every render and never caches them.
pub trait FrameSurface: Send {
    /// Current `(width, height)`; `(0, 0)` when no frame is available.
    fn dimensions(&self) -> (u32, u32);

    /// Copies the RGBA pixels of `rect` into `out` (`rect.w * rect.h * 4`
    /// bytes), reusing its allocation.
    fn read_rect(&self, rect: RoiRect, out: &mut Vec<u8>)
        -> Result<(), Box<dyn std::error::Error>>;

    /// Copy of the whole current frame.
    fn read_frame(&self) -> Result<PixelBuffer, Box<dyn std::error::Error>>;
}
