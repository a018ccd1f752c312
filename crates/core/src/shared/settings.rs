use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::constants::{
    clamp_intensity, DEFAULT_FRAME_RATE, DEFAULT_INTENSITY, SETTINGS_DIR_NAME, SETTINGS_FILE_NAME,
};

/// When mutating operations re-render the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderPolicy {
    /// Every mutation renders before returning.
    Immediate,
    /// Mutations only mark the compositor dirty; the host redraws.
    Deferred,
}

impl std::fmt::Display for RenderPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderPolicy::Immediate => write!(f, "immediate"),
            RenderPolicy::Deferred => write!(f, "deferred"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositorSettings {
    #[serde(default = "default_intensity")]
    pub default_intensity: u8,
    #[serde(default = "default_render_policy")]
    pub render_policy: RenderPolicy,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,
}

fn default_intensity() -> u8 {
    DEFAULT_INTENSITY
}

fn default_render_policy() -> RenderPolicy {
    RenderPolicy::Immediate
}

fn default_frame_rate() -> f64 {
    DEFAULT_FRAME_RATE
}

impl Default for CompositorSettings {
    fn default() -> Self {
        Self {
            default_intensity: default_intensity(),
            render_policy: default_render_policy(),
            frame_rate: default_frame_rate(),
        }
    }
}

impl CompositorSettings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(SETTINGS_DIR_NAME).join(SETTINGS_FILE_NAME))
    }

    /// Loads from the user config directory, falling back to defaults.
    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Loads from `path`, falling back to defaults on any read or parse
    /// failure. Out-of-range values are clamped.
    pub fn load_from(path: &Path) -> Self {
        let settings: Self = fs::read_to_string(path)
            .ok()
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default();
        settings.sanitized()
    }

    pub fn save(&self) {
        if let Some(path) = Self::config_path() {
            self.save_to(&path);
        }
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                log::warn!("Failed to create settings directory {}: {e}", parent.display());
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    log::warn!("Failed to save settings to {}: {e}", path.display());
                }
            }
            Err(e) => log::warn!("Failed to serialise settings: {e}"),
        }
    }

    fn sanitized(mut self) -> Self {
        self.default_intensity = clamp_intensity(self.default_intensity as i64);
        if !(self.frame_rate.is_finite() && self.frame_rate > 0.0) {
            self.frame_rate = DEFAULT_FRAME_RATE;
        }
        self
    }
}
