use std::sync::{Arc, Mutex, MutexGuard};

use crate::blurring::infrastructure::box_blur;
use crate::compositing::domain::frame_surface::FrameSurface;
use crate::shared::blur_region::RoiRect;
use crate::shared::pixel_buffer::PixelBuffer;

/// In-memory frame surface the host can keep writing to after attaching.
///
/// Clones share the same frame: the host keeps one handle and replaces the
/// frame as the video advances, the compositor reads through another.
#[derive(Clone, Debug)]
pub struct SharedFrameSurface {
    frame: Arc<Mutex<PixelBuffer>>,
}

impl SharedFrameSurface {
    pub fn new(frame: PixelBuffer) -> Self {
        Self {
            frame: Arc::new(Mutex::new(frame)),
        }
    }

    /// Surface with no frame yet (zero dimensions).
    pub fn empty() -> Self {
        Self::new(PixelBuffer::transparent(0, 0))
    }

    /// Swaps in a new frame, possibly of a different size.
    pub fn replace(&self, frame: PixelBuffer) {
        *self.lock() = frame;
    }

    fn lock(&self) -> MutexGuard<'_, PixelBuffer> {
        // replace() is a single assignment, so a poisoned frame is still whole.
        self.frame.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SharedFrameSurface {
    fn default() -> Self {
        Self::empty()
    }
}

impl FrameSurface for SharedFrameSurface {
    fn dimensions(&self) -> (u32, u32) {
        self.lock().dimensions()
    }

    fn read_rect(
        &self,
        rect: RoiRect,
        out: &mut Vec<u8>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let frame = self.lock();
        box_blur::extract_roi(
            frame.data(),
            frame.width() as usize,
            frame.height() as usize,
            rect,
            out,
        )?;
        Ok(())
    }

    fn read_frame(&self) -> Result<PixelBuffer, Box<dyn std::error::Error>> {
        Ok(self.lock().clone())
    }
}
