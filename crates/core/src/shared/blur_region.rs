use serde::{Deserialize, Serialize};

use super::constants::clamp_intensity;

/// Identifier assigned to a region when it is added. Never reused within
/// one compositor.
pub type RegionId = u64;

/// ROI rectangle within a frame, already clamped to the frame bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoiRect {
    pub x: usize,
    pub y: usize,
    pub w: usize,
    pub h: usize,
}

/// A rectangle of the source frame to be blurred.
///
/// Stored exactly as added; geometry is only clamped against the frame at
/// render time, so a region survives a temporary frame shrink.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlurRegion {
    pub id: RegionId,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub intensity: u8,
}

impl BlurRegion {
    /// Builds a region from raw user input: origin clamped to >= 0,
    /// extents to >= 1, intensity to `[1, 20]`.
    pub fn new(id: RegionId, x: i64, y: i64, width: i64, height: i64, intensity: i64) -> Self {
        Self {
            id,
            x: x.clamp(0, u32::MAX as i64) as u32,
            y: y.clamp(0, u32::MAX as i64) as u32,
            width: width.clamp(1, u32::MAX as i64) as u32,
            height: height.clamp(1, u32::MAX as i64) as u32,
            intensity: clamp_intensity(intensity),
        }
    }

    /// Intersection with a `frame_width` x `frame_height` frame.
    ///
    /// Returns `None` when nothing of the region is left inside the frame.
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> Option<RoiRect> {
        let x0 = self.x.min(frame_width) as u64;
        let y0 = self.y.min(frame_height) as u64;
        let x1 = (self.x as u64 + self.width as u64).min(frame_width as u64);
        let y1 = (self.y as u64 + self.height as u64).min(frame_height as u64);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(RoiRect {
            x: x0 as usize,
            y: y0 as usize,
            w: (x1 - x0) as usize,
            h: (y1 - y0) as usize,
        })
    }

    pub fn contains(&self, px: u32, py: u32) -> bool {
        let (px, py) = (px as u64, py as u64);
        px >= self.x as u64
            && py >= self.y as u64
            && px < self.x as u64 + self.width as u64
            && py < self.y as u64 + self.height as u64
    }
}
