use std::time::Instant;

use thiserror::Error;

use crate::blurring::domain::region_blurrer::RegionBlurrer;
use crate::blurring::infrastructure::cpu_box_blurrer::CpuBoxBlurrer;
use crate::compositing::domain::frame_surface::FrameSurface;
use crate::compositing::domain::render_logger::{NullRenderLogger, RenderLogger};
use crate::compositing::overlay::OverlaySurface;
use crate::shared::blur_region::{BlurRegion, RegionId, RoiRect};
use crate::shared::constants::{clamp_intensity, MAX_INTENSITY, MIN_INTENSITY};
use crate::shared::pixel_buffer::PixelBuffer;
use crate::shared::settings::{CompositorSettings, RenderPolicy};
use crate::shared::snapshot::RegionSnapshot;

#[derive(Error, Debug)]
pub enum CompositorError {
    #[error("no frame surface attached")]
    NotAttached,
    #[error("failed to read frame pixels for region {region}: {message}")]
    SurfaceRead { region: RegionId, message: String },
    #[error("failed to blur region {region}: {message}")]
    Blur { region: RegionId, message: String },
    #[error("failed to write region {region} to the overlay: {source}")]
    Blit {
        region: RegionId,
        #[source]
        source: crate::blurring::infrastructure::box_blur::BlurError,
    },
    #[error("failed to read frame: {0}")]
    FrameRead(String),
}

/// Overlay lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Ready,
    TornDown,
}

/// Outcome of one render pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderReport {
    pub rendered: usize,
    /// Regions left with no area after clamping to the frame.
    pub skipped: usize,
    pub failed: usize,
}

/// Owns the blur regions and the overlay, and re-renders the overlay from
/// the attached frame surface.
///
/// Single-threaded: the host never runs two operations at once. Every
/// mutation and every frame-change notification marks the compositor
/// dirty; under [`RenderPolicy::Immediate`] the mutation also redraws
/// before returning, under [`RenderPolicy::Deferred`] the host calls
/// [`redraw_if_dirty`](Self::redraw_if_dirty).
pub struct RegionCompositor {
    blurrer: Box<dyn RegionBlurrer>,
    logger: Box<dyn RenderLogger>,
    settings: CompositorSettings,
    surface: Option<Box<dyn FrameSurface>>,
    overlay: Option<OverlaySurface>,
    regions: Vec<BlurRegion>,
    next_id: RegionId,
    visible: bool,
    dirty: bool,
    state: LifecycleState,
    roi_buf: Vec<u8>,
    blur_buf: Vec<u8>,
}

impl RegionCompositor {
    pub fn new(blurrer: Box<dyn RegionBlurrer>, settings: CompositorSettings) -> Self {
        Self {
            blurrer,
            logger: Box::new(NullRenderLogger),
            settings,
            surface: None,
            overlay: None,
            regions: Vec::new(),
            next_id: 1,
            visible: true,
            dirty: false,
            state: LifecycleState::Uninitialized,
            roi_buf: Vec::new(),
            blur_buf: Vec::new(),
        }
    }

    pub fn with_logger(mut self, logger: Box<dyn RenderLogger>) -> Self {
        self.logger = logger;
        self
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Attaches the frame surface and creates the overlay at its size.
    ///
    /// Also revives a torn-down compositor.
    pub fn attach(&mut self, surface: Box<dyn FrameSurface>) {
        let (w, h) = surface.dimensions();
        if self.state == LifecycleState::TornDown {
            log::debug!("Re-initialising torn-down compositor");
        }
        log::debug!("Attached frame surface {w}x{h}");
        self.surface = Some(surface);
        self.overlay = Some(OverlaySurface::new(w, h));
        self.state = LifecycleState::Ready;
        self.mark_changed();
    }

    /// Releases the overlay and the surface and drops every region.
    /// Calling it again is a no-op.
    pub fn teardown(&mut self) {
        if self.state == LifecycleState::TornDown {
            return;
        }
        self.surface = None;
        self.overlay = None;
        self.regions.clear();
        self.roi_buf = Vec::new();
        self.blur_buf = Vec::new();
        self.dirty = false;
        self.state = LifecycleState::TornDown;
        log::debug!("Compositor torn down");
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn settings(&self) -> &CompositorSettings {
        &self.settings
    }

    pub fn logger(&self) -> &dyn RenderLogger {
        self.logger.as_ref()
    }

    pub fn logger_mut(&mut self) -> &mut dyn RenderLogger {
        self.logger.as_mut()
    }

    // ── Region collection ────────────────────────────────────────────

    /// Adds a region, clamping origin to >= 0, extents to >= 1 and
    /// intensity to `[1, 20]`. Returns the new id.
    pub fn add_region(&mut self, x: i64, y: i64, width: i64, height: i64, intensity: i64) -> RegionId {
        let id = self.next_id;
        self.next_id += 1;
        let region = BlurRegion::new(id, x, y, width, height, intensity);
        log::debug!(
            "Added region {id} at ({}, {}) {}x{} intensity {}",
            region.x,
            region.y,
            region.width,
            region.height,
            region.intensity
        );
        self.regions.push(region);
        self.mark_changed();
        id
    }

    /// [`add_region`](Self::add_region) with the configured default
    /// intensity.
    pub fn add_region_default(&mut self, x: i64, y: i64, width: i64, height: i64) -> RegionId {
        let intensity = self.settings.default_intensity as i64;
        self.add_region(x, y, width, height, intensity)
    }

    /// Removes the first region with `id` and re-renders. Unknown ids are
    /// not an error; the overlay is still redrawn from the current frame.
    pub fn remove_region(&mut self, id: RegionId) -> bool {
        let removed = match self.regions.iter().position(|r| r.id == id) {
            Some(idx) => {
                self.regions.remove(idx);
                true
            }
            None => false,
        };
        self.mark_changed();
        removed
    }

    pub fn clear_regions(&mut self) {
        self.regions.clear();
        self.mark_changed();
    }

    /// Sets every region's intensity to `intensity` clamped to `[1, 20]`.
    pub fn update_intensity(&mut self, intensity: i64) {
        let intensity = clamp_intensity(intensity);
        for region in &mut self.regions {
            region.intensity = intensity;
        }
        self.mark_changed();
    }

    pub fn regions(&self) -> &[BlurRegion] {
        &self.regions
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Topmost (most recently added) region covering the point.
    pub fn region_at(&self, x: u32, y: u32) -> Option<&BlurRegion> {
        self.regions.iter().rev().find(|r| r.contains(x, y))
    }

    // ── Visibility ───────────────────────────────────────────────────

    /// Flips overlay visibility without touching regions or re-rendering.
    pub fn toggle_visibility(&mut self) -> bool {
        self.visible = !self.visible;
        self.visible
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    // ── Snapshots ────────────────────────────────────────────────────

    pub fn export_snapshot(&self) -> RegionSnapshot {
        let (w, h) = self.frame_dimensions();
        RegionSnapshot::new(self.regions.clone(), w, h)
    }

    /// Replaces the region collection with the snapshot's.
    ///
    /// Rejects, without touching current state, snapshots with duplicate
    /// ids, zero-sized regions or intensities outside `[1, 20]`.
    pub fn import_snapshot(&mut self, snapshot: RegionSnapshot) -> bool {
        if let Err(reason) = validate_regions(&snapshot.regions) {
            log::warn!("Rejected snapshot: {reason}");
            return false;
        }
        let max_id = snapshot.regions.iter().map(|r| r.id).max().unwrap_or(0);
        self.next_id = self.next_id.max(max_id.saturating_add(1));
        self.regions = snapshot.regions;
        log::debug!("Imported {} regions", self.regions.len());
        self.mark_changed();
        true
    }

    /// Parses and imports a JSON snapshot. Payloads without an array-typed
    /// `regions` field are rejected.
    pub fn import_snapshot_json(&mut self, json: &str) -> bool {
        match RegionSnapshot::from_json(json) {
            Ok(snapshot) => self.import_snapshot(snapshot),
            Err(e) => {
                log::warn!("Rejected snapshot: {e}");
                false
            }
        }
    }

    // ── Render triggers ──────────────────────────────────────────────

    /// The displayed video frame changed (seek or playback tick).
    pub fn notify_frame_changed(&mut self) {
        self.mark_changed();
    }

    /// The frame surface changed size.
    pub fn notify_surface_resized(&mut self) {
        self.mark_changed();
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Renders if anything changed since the last render.
    pub fn redraw_if_dirty(&mut self) -> Option<RenderReport> {
        if self.dirty {
            Some(self.render())
        } else {
            None
        }
    }

    /// Periodic scheduler entry point; same as [`redraw_if_dirty`](Self::redraw_if_dirty).
    pub fn tick(&mut self) -> Option<RenderReport> {
        self.redraw_if_dirty()
    }

    fn mark_changed(&mut self) {
        self.dirty = true;
        if self.settings.render_policy == RenderPolicy::Immediate {
            self.redraw_if_dirty();
        }
    }

    // ── Rendering ────────────────────────────────────────────────────

    /// Redraws the overlay from the current frame.
    ///
    /// Resizes the overlay to the frame, clears it, then blurs each region
    /// in insertion order. Regions with no area inside the frame are
    /// skipped; a region that fails is logged and the rest still render.
    /// A no-op before attach, after teardown, or while the frame is empty.
    pub fn render(&mut self) -> RenderReport {
        self.dirty = false;
        let mut report = RenderReport::default();

        if self.state != LifecycleState::Ready {
            log::debug!("Render skipped: compositor is {:?}", self.state);
            return report;
        }
        let Some(surface) = self.surface.as_deref() else {
            return report;
        };
        let (fw, fh) = surface.dimensions();
        if fw == 0 || fh == 0 {
            log::debug!("Render skipped: frame surface is empty");
            return report;
        }

        let start = Instant::now();
        let overlay = self
            .overlay
            .get_or_insert_with(|| OverlaySurface::new(fw, fh));
        if overlay.resize(fw, fh) {
            log::debug!("Overlay resized to {fw}x{fh}");
        } else {
            overlay.clear();
        }

        if self.regions.is_empty() {
            return report;
        }

        for region in &self.regions {
            let Some(rect) = region.clamp_to(fw, fh) else {
                log::debug!("Region {} lies outside the {fw}x{fh} frame, skipping", region.id);
                report.skipped += 1;
                continue;
            };

            let region_start = Instant::now();
            let result = render_region(
                surface,
                self.blurrer.as_ref(),
                overlay,
                region,
                rect,
                &mut self.roi_buf,
                &mut self.blur_buf,
            );
            self.logger
                .timing("blur", region_start.elapsed().as_secs_f64() * 1000.0);

            match result {
                Ok(()) => report.rendered += 1,
                Err(e) => {
                    log::warn!("{e}");
                    self.logger.info(&e.to_string());
                    report.failed += 1;
                }
            }
        }

        self.logger
            .timing("render", start.elapsed().as_secs_f64() * 1000.0);
        self.logger.metric("regions", self.regions.len() as f64);
        self.logger.metric("skipped", report.skipped as f64);
        self.logger.metric("failed", report.failed as f64);
        report
    }

    /// Current overlay, if one exists.
    pub fn overlay(&self) -> Option<&PixelBuffer> {
        self.overlay.as_ref().map(|o| o.buffer())
    }

    /// The current frame with the overlay blended on top when visible.
    pub fn composite(&self) -> Result<PixelBuffer, CompositorError> {
        let surface = self.surface.as_deref().ok_or(CompositorError::NotAttached)?;
        let mut frame = surface
            .read_frame()
            .map_err(|e| CompositorError::FrameRead(e.to_string()))?;
        if self.visible {
            if let Some(overlay) = &self.overlay {
                overlay.composite_onto(&mut frame);
            }
        }
        Ok(frame)
    }

    fn frame_dimensions(&self) -> (u32, u32) {
        self.surface
            .as_deref()
            .map(|s| s.dimensions())
            .or_else(|| self.overlay.as_ref().map(|o| o.dimensions()))
            .unwrap_or((0, 0))
    }
}

impl Default for RegionCompositor {
    fn default() -> Self {
        Self::new(Box::new(CpuBoxBlurrer::new()), CompositorSettings::default())
    }
}

fn render_region(
    surface: &dyn FrameSurface,
    blurrer: &dyn RegionBlurrer,
    overlay: &mut OverlaySurface,
    region: &BlurRegion,
    rect: RoiRect,
    roi: &mut Vec<u8>,
    blurred: &mut Vec<u8>,
) -> Result<(), CompositorError> {
    surface
        .read_rect(rect, roi)
        .map_err(|e| CompositorError::SurfaceRead {
            region: region.id,
            message: e.to_string(),
        })?;
    blurrer
        .blur_into(roi, rect.w, rect.h, region.intensity, blurred)
        .map_err(|e| CompositorError::Blur {
            region: region.id,
            message: e.to_string(),
        })?;
    overlay
        .blit(rect, blurred)
        .map_err(|source| CompositorError::Blit {
            region: region.id,
            source,
        })
}

fn validate_regions(regions: &[BlurRegion]) -> Result<(), String> {
    let mut seen = std::collections::HashSet::with_capacity(regions.len());
    for r in regions {
        if !seen.insert(r.id) {
            return Err(format!("duplicate region id {}", r.id));
        }
        if r.width == 0 || r.height == 0 {
            return Err(format!("region {} has zero size", r.id));
        }
        if !(MIN_INTENSITY..=MAX_INTENSITY).contains(&r.intensity) {
            return Err(format!(
                "region {} intensity {} outside [{MIN_INTENSITY}, {MAX_INTENSITY}]",
                r.id, r.intensity
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositing::infrastructure::shared_frame_surface::SharedFrameSurface;
    use std::sync::{Arc, Mutex};

    // --- Stubs ---

    /// Blurrer that fails for one intensity and otherwise copies input.
    struct FlakyBlurrer {
        fail_intensity: u8,
        calls: Arc<Mutex<Vec<(usize, usize, u8)>>>,
    }

    impl RegionBlurrer for FlakyBlurrer {
        fn blur_into(
            &self,
            pixels: &[u8],
            width: usize,
            height: usize,
            intensity: u8,
            out: &mut Vec<u8>,
        ) -> Result<(), Box<dyn std::error::Error>> {
            self.calls.lock().unwrap().push((width, height, intensity));
            if intensity == self.fail_intensity {
                return Err("injected failure".into());
            }
            out.clear();
            out.extend_from_slice(pixels);
            Ok(())
        }
    }

    /// Logger that shares what it records with the test.
    #[derive(Clone, Default)]
    struct RecordingLogger {
        messages: Arc<Mutex<Vec<String>>>,
        metrics: Arc<Mutex<Vec<(String, f64)>>>,
    }

    impl RenderLogger for RecordingLogger {
        fn progress(&mut self, _current: usize, _total: usize) {}
        fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
        fn metric(&mut self, name: &str, value: f64) {
            self.metrics.lock().unwrap().push((name.to_string(), value));
        }
        fn info(&mut self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }

    // --- Helpers ---

    fn checkerboard(w: u32, h: u32) -> PixelBuffer {
        let mut frame = PixelBuffer::transparent(w, h);
        for y in 0..h {
            for x in 0..w {
                let v = if (x + y) % 2 == 0 { 255 } else { 0 };
                frame.set_pixel(x, y, [v, v / 2, 255 - v, 255]);
            }
        }
        frame
    }

    fn attached(frame: PixelBuffer) -> (RegionCompositor, SharedFrameSurface) {
        let surface = SharedFrameSurface::new(frame);
        let mut compositor = RegionCompositor::default();
        compositor.attach(Box::new(surface.clone()));
        (compositor, surface)
    }

    fn deferred() -> RegionCompositor {
        let settings = CompositorSettings {
            render_policy: RenderPolicy::Deferred,
            ..CompositorSettings::default()
        };
        RegionCompositor::new(Box::new(CpuBoxBlurrer::new()), settings)
    }

    fn alpha_at(compositor: &RegionCompositor, x: u32, y: u32) -> u8 {
        compositor.overlay().unwrap().pixel(x, y).unwrap()[3]
    }

    fn inside(x: u32, y: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> bool {
        x >= x0 && x < x1 && y >= y0 && y < y1
    }

    // --- Lifecycle ---

    #[test]
    fn test_starts_uninitialized() {
        let compositor = RegionCompositor::default();
        assert_eq!(compositor.state(), LifecycleState::Uninitialized);
        assert!(compositor.overlay().is_none());
        assert!(compositor.is_visible());
    }

    #[test]
    fn test_attach_creates_overlay_at_frame_size() {
        let (compositor, _) = attached(checkerboard(40, 30));
        assert_eq!(compositor.state(), LifecycleState::Ready);
        assert_eq!(compositor.overlay().unwrap().dimensions(), (40, 30));
    }

    #[test]
    fn test_render_before_attach_is_noop() {
        let mut compositor = RegionCompositor::default();
        compositor.add_region(0, 0, 10, 10, 8);
        assert_eq!(compositor.render(), RenderReport::default());
        assert!(compositor.overlay().is_none());
        assert_eq!(compositor.region_count(), 1);
    }

    #[test]
    fn test_render_with_empty_frame_is_noop() {
        let (mut compositor, _) = attached(PixelBuffer::transparent(0, 0));
        compositor.add_region(0, 0, 10, 10, 8);
        assert_eq!(compositor.render(), RenderReport::default());
    }

    #[test]
    fn test_teardown_is_idempotent_and_render_is_noop_after() {
        let (mut compositor, _) = attached(checkerboard(20, 20));
        compositor.add_region(0, 0, 5, 5, 8);
        compositor.teardown();
        compositor.teardown();
        assert_eq!(compositor.state(), LifecycleState::TornDown);
        assert!(compositor.overlay().is_none());
        assert_eq!(compositor.region_count(), 0);
        assert_eq!(compositor.render(), RenderReport::default());
        assert!(matches!(compositor.composite(), Err(CompositorError::NotAttached)));
    }

    #[test]
    fn test_attach_after_teardown_reinitialises() {
        let (mut compositor, surface) = attached(checkerboard(20, 20));
        compositor.teardown();
        compositor.attach(Box::new(surface));
        assert_eq!(compositor.state(), LifecycleState::Ready);
        let id = compositor.add_region(0, 0, 5, 5, 8);
        assert_eq!(compositor.regions()[0].id, id);
        assert_eq!(alpha_at(&compositor, 2, 2), 255);
    }

    // --- Region collection ---

    #[test]
    fn test_add_region_clamps_input_and_assigns_unique_ids() {
        let mut compositor = RegionCompositor::default();
        let a = compositor.add_region(-4, -2, 0, -1, 99);
        let b = compositor.add_region(1, 1, 2, 2, 0);
        assert_ne!(a, b);
        let r = &compositor.regions()[0];
        assert_eq!((r.x, r.y, r.width, r.height, r.intensity), (0, 0, 1, 1, 20));
        assert_eq!(compositor.regions()[1].intensity, 1);
    }

    #[test]
    fn test_add_region_default_uses_configured_intensity() {
        let mut compositor = RegionCompositor::default();
        compositor.add_region_default(0, 0, 4, 4);
        assert_eq!(compositor.regions()[0].intensity, 8);
    }

    #[test]
    fn test_regions_keep_insertion_order() {
        let mut compositor = RegionCompositor::default();
        let ids: Vec<_> = (0..4).map(|i| compositor.add_region(i, i, 3, 3, 8)).collect();
        let stored: Vec<_> = compositor.regions().iter().map(|r| r.id).collect();
        assert_eq!(stored, ids);
    }

    #[test]
    fn test_add_then_remove_restores_collection_and_clears_overlay() {
        let (mut compositor, _) = attached(checkerboard(50, 50));
        let keep = compositor.add_region(0, 0, 5, 5, 8);
        compositor.remove_region(keep);
        let before: Vec<_> = compositor.regions().to_vec();

        let id = compositor.add_region(10, 10, 20, 20, 8);
        assert!(compositor.remove_region(id));

        assert_eq!(compositor.regions(), &before[..]);
        assert!(compositor.overlay().unwrap().data().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_remove_unknown_id_returns_false() {
        let mut compositor = RegionCompositor::default();
        compositor.add_region(0, 0, 5, 5, 8);
        assert!(!compositor.remove_region(999));
        assert_eq!(compositor.region_count(), 1);
    }

    #[test]
    fn test_remove_unknown_id_still_redraws_from_current_frame() {
        let (mut compositor, surface) = attached(PixelBuffer::filled(20, 20, [10, 10, 10, 255]));
        compositor.add_region(0, 0, 5, 5, 8);
        surface.replace(PixelBuffer::filled(20, 20, [200, 200, 200, 255]));

        assert!(!compositor.remove_region(999));
        assert_eq!(compositor.overlay().unwrap().pixel(2, 2), Some([200, 200, 200, 255]));
        assert!(!compositor.is_dirty());
    }

    #[test]
    fn test_remove_unknown_id_marks_dirty_when_deferred() {
        let mut compositor = deferred();
        compositor.attach(Box::new(SharedFrameSurface::new(checkerboard(10, 10))));
        compositor.render();
        assert!(!compositor.remove_region(7));
        assert!(compositor.is_dirty());
    }

    #[test]
    fn test_ids_are_not_reused_after_removal() {
        let mut compositor = RegionCompositor::default();
        let a = compositor.add_region(0, 0, 5, 5, 8);
        compositor.remove_region(a);
        let b = compositor.add_region(0, 0, 5, 5, 8);
        assert_ne!(a, b);
    }

    #[test]
    fn test_clear_regions_yields_transparent_overlay() {
        let (mut compositor, _) = attached(checkerboard(30, 30));
        compositor.add_region(0, 0, 10, 10, 8);
        compositor.add_region(15, 15, 10, 10, 8);
        compositor.clear_regions();
        assert_eq!(compositor.region_count(), 0);
        assert!(compositor.overlay().unwrap().data().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_update_intensity_applies_clamped_value_to_all() {
        let mut compositor = RegionCompositor::default();
        for i in 0..5 {
            compositor.add_region(i, i, 4, 4, (i + 1) * 3);
        }
        compositor.update_intensity(42);
        assert!(compositor.regions().iter().all(|r| r.intensity == 20));
        compositor.update_intensity(-3);
        assert!(compositor.regions().iter().all(|r| r.intensity == 1));
    }

    #[test]
    fn test_update_intensity_rerenders_overlay() {
        let (mut compositor, _) = attached(checkerboard(40, 40));
        compositor.add_region(0, 0, 20, 20, 3);
        let light = compositor.overlay().unwrap().pixel(10, 10).unwrap();

        compositor.update_intensity(20);

        let heavy = compositor.overlay().unwrap().pixel(10, 10).unwrap();
        assert_ne!(light, heavy);
        assert_eq!(heavy[3], 255);
        assert!(!compositor.is_dirty());
    }

    #[test]
    fn test_region_at_prefers_latest() {
        let mut compositor = RegionCompositor::default();
        compositor.add_region(0, 0, 20, 20, 8);
        let top = compositor.add_region(5, 5, 5, 5, 8);
        assert_eq!(compositor.region_at(6, 6).unwrap().id, top);
        assert_ne!(compositor.region_at(1, 1).unwrap().id, top);
        assert!(compositor.region_at(50, 50).is_none());
    }

    // --- Rendering ---

    #[test]
    fn test_render_blurs_only_inside_region() {
        let source = checkerboard(100, 100);
        let (mut compositor, _) = attached(source.clone());
        compositor.add_region(10, 10, 20, 20, 8);
        let report = compositor.render();
        assert_eq!(report, RenderReport { rendered: 1, skipped: 0, failed: 0 });

        let overlay = compositor.overlay().unwrap();
        for y in 0..100 {
            for x in 0..100 {
                if !inside(x, y, 10, 10, 30, 30) {
                    assert_eq!(overlay.pixel(x, y).unwrap()[3], 0, "({x}, {y}) not transparent");
                }
            }
        }

        let centre = overlay.pixel(20, 20).unwrap();
        let corner = overlay.pixel(10, 10).unwrap();
        assert_ne!(centre, source.pixel(20, 20).unwrap());
        assert_ne!(corner, source.pixel(10, 10).unwrap());
        assert_ne!(centre, corner);
        assert_eq!(centre[3], 255);
    }

    #[test]
    fn test_render_is_idempotent() {
        let (mut compositor, _) = attached(checkerboard(40, 40));
        compositor.add_region(5, 5, 20, 20, 10);
        compositor.render();
        let first = compositor.overlay().unwrap().clone();
        compositor.render();
        assert_eq!(compositor.overlay().unwrap(), &first);
    }

    #[test]
    fn test_render_rereads_replaced_frame() {
        let (mut compositor, surface) = attached(checkerboard(20, 20));
        compositor.add_region(0, 0, 10, 10, 8);
        surface.replace(PixelBuffer::filled(20, 20, [9, 8, 7, 255]));
        compositor.notify_frame_changed();
        assert_eq!(compositor.overlay().unwrap().pixel(4, 4), Some([9, 8, 7, 255]));
    }

    #[test]
    fn test_frame_shrink_skips_region_without_removing_it() {
        let (mut compositor, surface) = attached(checkerboard(100, 100));
        compositor.add_region(60, 60, 20, 20, 8);

        surface.replace(checkerboard(50, 50));
        let report = compositor.render();

        assert_eq!(report, RenderReport { rendered: 0, skipped: 1, failed: 0 });
        assert_eq!(compositor.overlay().unwrap().dimensions(), (50, 50));
        assert!(compositor.overlay().unwrap().data().iter().all(|&v| v == 0));
        assert_eq!(compositor.region_count(), 1);
    }

    #[test]
    fn test_frame_shrink_clamps_partially_visible_region() {
        let (mut compositor, surface) = attached(checkerboard(100, 100));
        compositor.add_region(40, 40, 20, 20, 8);
        surface.replace(checkerboard(50, 50));
        compositor.notify_surface_resized();

        assert_eq!(alpha_at(&compositor, 45, 45), 255);
        assert_eq!(alpha_at(&compositor, 39, 39), 0);
    }

    #[test]
    fn test_region_failure_is_isolated() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let blurrer = FlakyBlurrer {
            fail_intensity: 5,
            calls: calls.clone(),
        };
        let logger = RecordingLogger::default();
        let messages = logger.messages.clone();
        let settings = CompositorSettings {
            render_policy: RenderPolicy::Deferred,
            ..CompositorSettings::default()
        };
        let mut compositor =
            RegionCompositor::new(Box::new(blurrer), settings).with_logger(Box::new(logger));
        compositor.attach(Box::new(SharedFrameSurface::new(checkerboard(30, 30))));
        compositor.add_region(0, 0, 5, 5, 8);
        let failing = compositor.add_region(10, 10, 5, 5, 5);
        compositor.add_region(20, 20, 5, 5, 8);

        let report = compositor.render();

        assert_eq!(report, RenderReport { rendered: 2, skipped: 0, failed: 1 });
        assert_eq!(calls.lock().unwrap().len(), 3);
        assert_eq!(alpha_at(&compositor, 22, 22), 255);
        assert_eq!(alpha_at(&compositor, 12, 12), 0);
        assert_eq!(compositor.region_count(), 3);
        let messages = messages.lock().unwrap();
        assert!(messages[0].contains(&format!("region {failing}")));
    }

    #[test]
    fn test_empty_collection_skips_blurring() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let blurrer = FlakyBlurrer {
            fail_intensity: 0,
            calls: calls.clone(),
        };
        let mut compositor = RegionCompositor::new(Box::new(blurrer), CompositorSettings::default());
        compositor.attach(Box::new(SharedFrameSurface::new(checkerboard(10, 10))));
        compositor.render();
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_render_reports_region_metric() {
        let logger = RecordingLogger::default();
        let metrics = logger.metrics.clone();
        let mut compositor = deferred().with_logger(Box::new(logger));
        compositor.attach(Box::new(SharedFrameSurface::new(checkerboard(10, 10))));
        compositor.add_region(0, 0, 4, 4, 8);
        compositor.add_region(4, 4, 4, 4, 8);
        compositor.render();
        let metrics = metrics.lock().unwrap();
        assert!(metrics.contains(&("regions".to_string(), 2.0)));
        assert!(metrics.contains(&("skipped".to_string(), 0.0)));
        assert!(metrics.contains(&("failed".to_string(), 0.0)));
    }

    #[test]
    fn test_render_reports_skipped_and_failed_metrics() {
        let logger = RecordingLogger::default();
        let metrics = logger.metrics.clone();
        let blurrer = FlakyBlurrer {
            fail_intensity: 5,
            calls: Arc::new(Mutex::new(Vec::new())),
        };
        let settings = CompositorSettings {
            render_policy: RenderPolicy::Deferred,
            ..CompositorSettings::default()
        };
        let mut compositor =
            RegionCompositor::new(Box::new(blurrer), settings).with_logger(Box::new(logger));
        compositor.attach(Box::new(SharedFrameSurface::new(checkerboard(10, 10))));
        compositor.add_region(0, 0, 4, 4, 5);
        compositor.add_region(50, 50, 4, 4, 8);
        compositor.render();

        let metrics = metrics.lock().unwrap();
        assert!(metrics.contains(&("skipped".to_string(), 1.0)));
        assert!(metrics.contains(&("failed".to_string(), 1.0)));
    }

    // --- Dirty flag ---

    #[test]
    fn test_deferred_policy_waits_for_redraw() {
        let mut compositor = deferred();
        compositor.attach(Box::new(SharedFrameSurface::new(checkerboard(20, 20))));
        compositor.redraw_if_dirty();
        compositor.add_region(0, 0, 5, 5, 8);

        assert!(compositor.is_dirty());
        assert_eq!(alpha_at(&compositor, 2, 2), 0);

        let report = compositor.tick().unwrap();
        assert_eq!(report.rendered, 1);
        assert!(!compositor.is_dirty());
        assert_eq!(alpha_at(&compositor, 2, 2), 255);
        assert!(compositor.redraw_if_dirty().is_none());
    }

    #[test]
    fn test_frame_change_marks_dirty() {
        let mut compositor = deferred();
        compositor.attach(Box::new(SharedFrameSurface::new(checkerboard(20, 20))));
        compositor.render();
        assert!(!compositor.is_dirty());
        compositor.notify_frame_changed();
        assert!(compositor.is_dirty());
    }

    #[test]
    fn test_immediate_policy_never_left_dirty() {
        let (mut compositor, _) = attached(checkerboard(20, 20));
        compositor.add_region(0, 0, 5, 5, 8);
        assert!(!compositor.is_dirty());
        assert_eq!(alpha_at(&compositor, 2, 2), 255);
    }

    // --- Visibility and compositing ---

    #[test]
    fn test_toggle_visibility_leaves_regions_and_overlay() {
        let (mut compositor, _) = attached(checkerboard(20, 20));
        compositor.add_region(0, 0, 5, 5, 8);
        let overlay = compositor.overlay().unwrap().clone();

        assert!(!compositor.toggle_visibility());
        assert!(!compositor.is_visible());
        assert_eq!(compositor.overlay().unwrap(), &overlay);
        assert_eq!(compositor.region_count(), 1);
        assert!(compositor.toggle_visibility());
    }

    #[test]
    fn test_composite_respects_visibility() {
        let source = checkerboard(20, 20);
        let (mut compositor, _) = attached(source.clone());
        compositor.add_region(0, 0, 10, 10, 8);

        let shown = compositor.composite().unwrap();
        assert_ne!(shown.pixel(5, 5), source.pixel(5, 5));
        assert_eq!(shown.pixel(15, 15), source.pixel(15, 15));

        compositor.toggle_visibility();
        assert_eq!(compositor.composite().unwrap(), source);
    }

    // --- Snapshots ---

    #[test]
    fn test_snapshot_round_trip_into_fresh_compositor() {
        let (mut compositor, _) = attached(checkerboard(64, 48));
        compositor.add_region(1, 2, 3, 4, 5);
        compositor.add_region(10, 10, 20, 20, 17);
        compositor.add_region(30, 5, 8, 8, 2);
        let snapshot = compositor.export_snapshot();
        assert_eq!(snapshot.frame_width(), 64);
        assert_eq!(snapshot.frame_height(), 48);

        let mut fresh = RegionCompositor::default();
        assert!(fresh.import_snapshot(snapshot.clone()));
        assert_eq!(fresh.regions(), compositor.regions());
    }

    #[test]
    fn test_snapshot_json_round_trip() {
        let mut compositor = RegionCompositor::default();
        compositor.add_region(1, 2, 3, 4, 5);
        compositor.add_region(6, 7, 8, 9, 10);
        let json = compositor.export_snapshot().to_json().unwrap();

        let mut fresh = RegionCompositor::default();
        assert!(fresh.import_snapshot_json(&json));
        assert_eq!(fresh.regions(), compositor.regions());
    }

    #[test]
    fn test_import_advances_id_counter() {
        let mut compositor = RegionCompositor::default();
        let snapshot = RegionSnapshot::new(vec![BlurRegion::new(41, 0, 0, 5, 5, 8)], 10, 10);
        assert!(compositor.import_snapshot(snapshot));
        let id = compositor.add_region(0, 0, 5, 5, 8);
        assert!(id > 41);
    }

    #[test]
    fn test_malformed_json_leaves_state_untouched() {
        let mut compositor = RegionCompositor::default();
        compositor.add_region(1, 1, 5, 5, 8);
        let before = compositor.regions().to_vec();

        assert!(!compositor.import_snapshot_json(r#"{"regions": "nope"}"#));
        assert!(!compositor.import_snapshot_json(r#"{"timestamp": 3}"#));
        assert!(!compositor.import_snapshot_json("]["));
        assert_eq!(compositor.regions(), &before[..]);
    }

    #[test]
    fn test_invalid_regions_rejected() {
        let mut compositor = RegionCompositor::default();
        let dup = RegionSnapshot::new(
            vec![BlurRegion::new(1, 0, 0, 5, 5, 8), BlurRegion::new(1, 3, 3, 5, 5, 8)],
            10,
            10,
        );
        assert!(!compositor.import_snapshot(dup));

        let mut zero = BlurRegion::new(2, 0, 0, 5, 5, 8);
        zero.width = 0;
        assert!(!compositor.import_snapshot(RegionSnapshot::new(vec![zero], 10, 10)));

        let mut hot = BlurRegion::new(3, 0, 0, 5, 5, 8);
        hot.intensity = 21;
        assert!(!compositor.import_snapshot(RegionSnapshot::new(vec![hot], 10, 10)));
        assert_eq!(compositor.region_count(), 0);
    }

    #[test]
    fn test_import_renders_immediately() {
        let (mut compositor, _) = attached(checkerboard(20, 20));
        let snapshot = RegionSnapshot::new(vec![BlurRegion::new(1, 0, 0, 5, 5, 8)], 20, 20);
        assert!(compositor.import_snapshot(snapshot));
        assert_eq!(alpha_at(&compositor, 1, 1), 255);
    }
}
