/// Bytes per pixel for every buffer the compositor touches (RGBA).
pub const CHANNELS: usize = 4;

pub const MIN_INTENSITY: u8 = 1;
pub const MAX_INTENSITY: u8 = 20;
pub const DEFAULT_INTENSITY: u8 = 8;

/// Frame rate assumed for image sequences that carry no timing metadata.
pub const DEFAULT_FRAME_RATE: f64 = 30.0;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

pub const SETTINGS_DIR_NAME: &str = "RegionBlur";
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Clamps a user-facing intensity into `[MIN_INTENSITY, MAX_INTENSITY]`.
pub fn clamp_intensity(intensity: i64) -> u8 {
    intensity.clamp(MIN_INTENSITY as i64, MAX_INTENSITY as i64) as u8
}

/// Sample radius for a given intensity.
///
/// Intensities 1 and 2 map to radius 0 (no-op blur); from 3 upward the
/// radius is `intensity / 2`.
pub fn blur_radius(intensity: u8) -> usize {
    let intensity = intensity.clamp(MIN_INTENSITY, MAX_INTENSITY);
    if intensity <= 2 {
        0
    } else {
        (intensity / 2) as usize
    }
}
