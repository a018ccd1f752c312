use ndarray::{ArrayView3, ArrayViewMut3, ShapeError};

use super::constants::CHANNELS;

/// A contiguous RGBA pixel buffer in row-major order.
///
/// Used both for decoded video frames and for the compositor overlay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl PixelBuffer {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * CHANNELS,
            "data length must equal width * height * 4"
        );
        Self {
            data,
            width,
            height,
        }
    }

    /// Fully transparent buffer (every byte zero).
    pub fn transparent(width: u32, height: u32) -> Self {
        Self::new(
            vec![0; (width as usize) * (height as usize) * CHANNELS],
            width,
            height,
        )
    }

    /// Buffer filled with a single RGBA colour.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(pixels * CHANNELS);
        for _ in 0..pixels {
            data.extend_from_slice(&rgba);
        }
        Self::new(data, width, height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// RGBA value at `(x, y)`, or `None` when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y as usize) * (self.width as usize) + x as usize) * CHANNELS;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.data[idx..idx + CHANNELS]);
        Some(px)
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = ((y as usize) * (self.width as usize) + x as usize) * CHANNELS;
        self.data[idx..idx + CHANNELS].copy_from_slice(&rgba);
    }

    /// `(height, width, channel)` view. Fails only when the data length
    /// does not match the dimensions.
    pub fn as_ndarray(&self) -> Result<ArrayView3<'_, u8>, ShapeError> {
        ArrayView3::from_shape(self.shape(), &self.data)
    }

    pub fn as_ndarray_mut(&mut self) -> Result<ArrayViewMut3<'_, u8>, ShapeError> {
        ArrayViewMut3::from_shape(self.shape(), &mut self.data)
    }

    fn shape(&self) -> (usize, usize, usize) {
        (self.height as usize, self.width as usize, CHANNELS)
    }
}
