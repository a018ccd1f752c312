use std::cell::RefCell;

use crate::blurring::domain::region_blurrer::RegionBlurrer;

use super::box_blur;

/// CPU separable box blurrer.
///
/// Keeps the horizontal-pass buffer between calls so steady-state
/// rendering does not allocate.
#[derive(Default)]
pub struct CpuBoxBlurrer {
    blur_temp: RefCell<Vec<u8>>,
}

impl CpuBoxBlurrer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegionBlurrer for CpuBoxBlurrer {
    fn blur_into(
        &self,
        pixels: &[u8],
        width: usize,
        height: usize,
        intensity: u8,
        out: &mut Vec<u8>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let mut temp = self.blur_temp.borrow_mut();
        box_blur::box_blur_into(pixels, width, height, intensity, &mut temp, out)?;
        Ok(())
    }
}
