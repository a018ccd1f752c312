use std::path::{Path, PathBuf};

use crate::compositing::domain::frame_navigator::FrameNavigator;
use crate::shared::constants::IMAGE_EXTENSIONS;

use super::image_file_reader::ImageFileReader;
use super::shared_frame_surface::SharedFrameSurface;

/// Treats a directory of numbered still images as a video.
///
/// Seeking decodes the requested file and swaps it into the shared frame
/// surface; the host then tells the compositor the frame changed.
pub struct ImageSequenceNavigator {
    paths: Vec<PathBuf>,
    surface: SharedFrameSurface,
    reader: ImageFileReader,
    frame_rate: f64,
    current: Option<usize>,
}

impl ImageSequenceNavigator {
    /// Collects every image file in `dir`, ordered by file name.
    pub fn open(
        dir: &Path,
        surface: SharedFrameSurface,
        frame_rate: f64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image(p))
            .collect();
        paths.sort();
        if paths.is_empty() {
            return Err(format!("No image frames found in {}", dir.display()).into());
        }
        log::debug!("Found {} frames in {}", paths.len(), dir.display());
        Ok(Self::from_paths(paths, surface, frame_rate))
    }

    pub fn from_paths(paths: Vec<PathBuf>, surface: SharedFrameSurface, frame_rate: f64) -> Self {
        Self {
            paths,
            surface,
            reader: ImageFileReader::new(),
            frame_rate,
            current: None,
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn current_frame(&self) -> Option<usize> {
        self.current
    }
}

impl FrameNavigator for ImageSequenceNavigator {
    fn seek_to_frame(&mut self, frame_number: usize) -> Result<(), Box<dyn std::error::Error>> {
        let path = self.paths.get(frame_number).ok_or_else(|| {
            format!(
                "Frame {frame_number} out of range (sequence has {} frames)",
                self.paths.len()
            )
        })?;
        let frame = self.reader.read(path)?;
        self.surface.replace(frame);
        self.current = Some(frame_number);
        Ok(())
    }

    fn total_frames(&self) -> usize {
        self.paths.len()
    }

    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
