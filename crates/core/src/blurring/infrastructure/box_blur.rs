use thiserror::Error;

use crate::shared::blur_region::RoiRect;
use crate::shared::constants::{blur_radius, CHANNELS};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BlurError {
    #[error("buffer holds {actual} bytes, expected {expected} for {width}x{height} RGBA")]
    BufferSize {
        expected: usize,
        actual: usize,
        width: usize,
        height: usize,
    },
    #[error("blur dimensions must be non-zero, got {width}x{height}")]
    ZeroDimensions { width: usize, height: usize },
    #[error("ROI {rect:?} does not fit a {width}x{height} buffer")]
    RoiOutOfBounds {
        rect: RoiRect,
        width: usize,
        height: usize,
    },
}

/// Convenience wrapper that allocates its own buffers.
pub fn box_blur(
    pixels: &[u8],
    width: usize,
    height: usize,
    intensity: u8,
) -> Result<Vec<u8>, BlurError> {
    let mut temp = Vec::new();
    let mut out = Vec::new();
    box_blur_into(pixels, width, height, intensity, &mut temp, &mut out)?;
    Ok(out)
}

/// Two-pass separable box blur of an RGBA buffer, reusing `temp` and `out`.
///
/// Each pass averages R, G and B over the in-range neighbours within
/// `blur_radius(intensity)`; offsets falling outside the buffer are left
/// out of both the sum and the divisor, so edge pixels average fewer
/// samples than interior ones. Alpha is copied from the source pixel.
pub fn box_blur_into(
    pixels: &[u8],
    width: usize,
    height: usize,
    intensity: u8,
    temp: &mut Vec<u8>,
    out: &mut Vec<u8>,
) -> Result<(), BlurError> {
    if width == 0 || height == 0 {
        return Err(BlurError::ZeroDimensions { width, height });
    }
    let needed = width * height * CHANNELS;
    if pixels.len() != needed {
        return Err(BlurError::BufferSize {
            expected: needed,
            actual: pixels.len(),
            width,
            height,
        });
    }

    let radius = blur_radius(intensity);
    if radius == 0 {
        out.clear();
        out.extend_from_slice(pixels);
        return Ok(());
    }

    temp.resize(needed, 0);
    out.resize(needed, 0);

    // Horizontal pass: pixels → temp
    let row_stride = width * CHANNELS;
    for y in 0..height {
        blur_line(pixels, temp, y * row_stride, CHANNELS, width, radius);
    }

    // Vertical pass: temp → out
    for x in 0..width {
        blur_line(temp, out, x * CHANNELS, row_stride, height, radius);
    }

    Ok(())
}

/// Running-sum box filter along one row or column.
///
/// Pixel `i` of the line starts at byte `start + i * stride`.
fn blur_line(src: &[u8], dst: &mut [u8], start: usize, stride: usize, len: usize, radius: usize) {
    let mut sums = [0u32; 3];
    let mut count = 0u32;

    for i in 0..=radius.min(len - 1) {
        let p = start + i * stride;
        for c in 0..3 {
            sums[c] += src[p + c] as u32;
        }
        count += 1;
    }

    for i in 0..len {
        let p = start + i * stride;
        for c in 0..3 {
            dst[p + c] = (sums[c] / count).min(255) as u8;
        }
        dst[p + 3] = src[p + 3];

        let incoming = i + radius + 1;
        if incoming < len {
            let q = start + incoming * stride;
            for c in 0..3 {
                sums[c] += src[q + c] as u32;
            }
            count += 1;
        }
        if i >= radius {
            let q = start + (i - radius) * stride;
            for c in 0..3 {
                sums[c] -= src[q + c] as u32;
            }
            count -= 1;
        }
    }
}

/// Extract a rectangular ROI from frame data into a reusable buffer.
pub fn extract_roi(
    data: &[u8],
    frame_width: usize,
    frame_height: usize,
    rect: RoiRect,
    roi: &mut Vec<u8>,
) -> Result<(), BlurError> {
    check_roi(data, frame_width, frame_height, rect)?;
    roi.resize(rect.w * rect.h * CHANNELS, 0);
    for row in 0..rect.h {
        let src_offset = ((rect.y + row) * frame_width + rect.x) * CHANNELS;
        let dst_offset = row * rect.w * CHANNELS;
        roi[dst_offset..dst_offset + rect.w * CHANNELS]
            .copy_from_slice(&data[src_offset..src_offset + rect.w * CHANNELS]);
    }
    Ok(())
}

/// Write a blurred ROI buffer back into frame data.
pub fn write_roi_back(
    data: &mut [u8],
    roi: &[u8],
    frame_width: usize,
    frame_height: usize,
    rect: RoiRect,
) -> Result<(), BlurError> {
    check_roi(data, frame_width, frame_height, rect)?;
    let needed = rect.w * rect.h * CHANNELS;
    if roi.len() != needed {
        return Err(BlurError::BufferSize {
            expected: needed,
            actual: roi.len(),
            width: rect.w,
            height: rect.h,
        });
    }
    for row in 0..rect.h {
        let dst_offset = ((rect.y + row) * frame_width + rect.x) * CHANNELS;
        let src_offset = row * rect.w * CHANNELS;
        data[dst_offset..dst_offset + rect.w * CHANNELS]
            .copy_from_slice(&roi[src_offset..src_offset + rect.w * CHANNELS]);
    }
    Ok(())
}

fn check_roi(
    data: &[u8],
    frame_width: usize,
    frame_height: usize,
    rect: RoiRect,
) -> Result<(), BlurError> {
    let fits = rect.w > 0
        && rect.h > 0
        && rect.x + rect.w <= frame_width
        && rect.y + rect.h <= frame_height
        && data.len() >= frame_width * frame_height * CHANNELS;
    if fits {
        Ok(())
    } else {
        Err(BlurError::RoiOutOfBounds {
            rect,
            width: frame_width,
            height: frame_height,
        })
    }
}
