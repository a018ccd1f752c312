use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::blur_region::BlurRegion;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("snapshot has no array-typed `regions` field")]
    MissingRegions,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

/// Persisted form of a compositor's regions.
///
/// Serialises as `{ regions, timestamp, canvasSize: { width, height } }`
/// with regions in insertion order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSnapshot {
    pub regions: Vec<BlurRegion>,
    /// Milliseconds since the Unix epoch at export time.
    #[serde(default)]
    pub timestamp: u64,
    #[serde(rename = "canvasSize", default)]
    pub canvas_size: CanvasSize,
}

impl RegionSnapshot {
    pub fn new(regions: Vec<BlurRegion>, frame_width: u32, frame_height: u32) -> Self {
        Self {
            regions,
            timestamp: now_millis(),
            canvas_size: CanvasSize {
                width: frame_width,
                height: frame_height,
            },
        }
    }

    pub fn frame_width(&self) -> u32 {
        self.canvas_size.width
    }

    pub fn frame_height(&self) -> u32 {
        self.canvas_size.height
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses a snapshot, rejecting payloads whose `regions` field is
    /// missing or not an array before looking at anything else.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if !value.get("regions").is_some_and(|r| r.is_array()) {
            return Err(SnapshotError::MissingRegions);
        }
        Ok(serde_json::from_value(value)?)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
