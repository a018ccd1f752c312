use ndarray::{Axis, Zip};

use crate::blurring::infrastructure::box_blur::{self, BlurError};
use crate::shared::blur_region::RoiRect;
use crate::shared::pixel_buffer::PixelBuffer;

/// Transparent RGBA layer drawn above the video frame, carrying only the
/// blurred region pixels.
#[derive(Debug)]
pub struct OverlaySurface {
    buffer: PixelBuffer,
}

impl OverlaySurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buffer: PixelBuffer::transparent(width, height),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    /// Recreates the buffer when the size differs. Returns whether it did.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if self.buffer.dimensions() == (width, height) {
            return false;
        }
        self.buffer = PixelBuffer::transparent(width, height);
        true
    }

    pub fn clear(&mut self) {
        self.buffer.data_mut().fill(0);
    }

    /// Copies `pixels` into the overlay at `rect`.
    pub fn blit(&mut self, rect: RoiRect, pixels: &[u8]) -> Result<(), BlurError> {
        let (w, h) = self.buffer.dimensions();
        box_blur::write_roi_back(
            self.buffer.data_mut(),
            pixels,
            w as usize,
            h as usize,
            rect,
        )
    }

    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    #[cfg(test)]
    pub fn is_transparent(&self) -> bool {
        self.buffer.data().chunks_exact(4).all(|px| px[3] == 0)
    }

    /// Source-over blend of the overlay onto `frame`.
    ///
    /// Does nothing when the sizes differ; the overlay is stale until the
    /// next render in that case.
    pub fn composite_onto(&self, frame: &mut PixelBuffer) {
        if frame.dimensions() != self.buffer.dimensions() {
            log::debug!(
                "Overlay {:?} does not match frame {:?}, not compositing",
                self.buffer.dimensions(),
                frame.dimensions()
            );
            return;
        }
        let (mut dst, src) = match (frame.as_ndarray_mut(), self.buffer.as_ndarray()) {
            (Ok(dst), Ok(src)) => (dst, src),
            (Err(e), _) | (_, Err(e)) => {
                log::warn!("Not compositing, malformed pixel buffer: {e}");
                return;
            }
        };
        Zip::from(dst.lanes_mut(Axis(2)))
            .and(src.lanes(Axis(2)))
            .for_each(|mut dst, src| {
                let a = src[3] as u32;
                if a == 0 {
                    return;
                }
                let inv = 255 - a;
                for c in 0..3 {
                    dst[c] = ((src[c] as u32 * a + dst[c] as u32 * inv + 127) / 255) as u8;
                }
                dst[3] = (a + (dst[3] as u32 * inv + 127) / 255) as u8;
            });
    }
}
