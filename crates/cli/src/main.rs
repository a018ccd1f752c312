use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use region_blur_core::blurring::infrastructure::cpu_box_blurrer::CpuBoxBlurrer;
use region_blur_core::compositing::domain::frame_navigator::FrameNavigator;
use region_blur_core::compositing::domain::render_logger::StdoutRenderLogger;
use region_blur_core::compositing::infrastructure::image_file_reader::ImageFileReader;
use region_blur_core::compositing::infrastructure::image_file_writer::ImageFileWriter;
use region_blur_core::compositing::infrastructure::image_sequence_navigator::{
    is_image, ImageSequenceNavigator,
};
use region_blur_core::compositing::infrastructure::shared_frame_surface::SharedFrameSurface;
use region_blur_core::compositing::region_compositor::{RegionCompositor, RenderReport};
use region_blur_core::shared::constants::{clamp_intensity, MAX_INTENSITY, MIN_INTENSITY};
use region_blur_core::shared::settings::{CompositorSettings, RenderPolicy};

/// Blur rectangular regions of an image or an image sequence.
#[derive(Parser)]
#[command(name = "region-blur")]
struct Cli {
    /// Input image, or a directory of frames treated as a video.
    input: PathBuf,

    /// Output image, or output directory for a frame sequence.
    output: PathBuf,

    /// Region to blur as x,y,width,height (repeatable).
    #[arg(long = "region", value_parser = parse_rect, allow_hyphen_values = true)]
    regions: Vec<(i64, i64, i64, i64)>,

    /// Load regions from a snapshot JSON file.
    #[arg(long = "regions")]
    snapshot: Option<PathBuf>,

    /// Blur intensity (1-20) for regions given with --region.
    #[arg(long)]
    intensity: Option<i64>,

    /// Apply this intensity (1-20) to every region, including loaded ones.
    #[arg(long)]
    override_intensity: Option<i64>,

    /// Write the final region snapshot to this JSON file.
    #[arg(long)]
    export: Option<PathBuf>,

    /// Write frames with the blur overlay hidden.
    #[arg(long)]
    hidden: bool,

    /// Frame rate reported for image sequences.
    #[arg(long)]
    frame_rate: Option<f64>,

    /// Settings file (defaults to the user config directory).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Store --intensity and --frame-rate as the new defaults.
    #[arg(long)]
    save_settings: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let mut settings = match &cli.settings {
        Some(path) => CompositorSettings::load_from(path),
        None => CompositorSettings::load(),
    };
    apply_overrides(&cli, &mut settings);
    if cli.save_settings {
        match &cli.settings {
            Some(path) => settings.save_to(path),
            None => settings.save(),
        }
        log::info!("Settings saved");
    }
    // One redraw per frame, driven below.
    settings.render_policy = RenderPolicy::Deferred;

    let surface = SharedFrameSurface::empty();
    let mut compositor = RegionCompositor::new(Box::new(CpuBoxBlurrer::new()), settings)
        .with_logger(Box::new(StdoutRenderLogger::default()));
    compositor.attach(Box::new(surface.clone()));

    load_regions(&cli, &mut compositor)?;
    if cli.hidden {
        compositor.toggle_visibility();
    }
    log::info!("Blurring {} regions", compositor.region_count());

    if cli.input.is_dir() {
        run_sequence(&cli.input, &cli.output, &surface, &mut compositor)?;
    } else {
        run_image(&cli.input, &cli.output, &surface, &mut compositor)?;
    }

    if let Some(path) = &cli.export {
        fs::write(path, compositor.export_snapshot().to_json()?)?;
        log::info!("Snapshot written to {}", path.display());
    }

    compositor.logger().summary();
    compositor.teardown();
    Ok(())
}

fn apply_overrides(cli: &Cli, settings: &mut CompositorSettings) {
    if let Some(intensity) = cli.intensity {
        settings.default_intensity = clamp_intensity(intensity);
    }
    if let Some(rate) = cli.frame_rate {
        settings.frame_rate = rate;
    }
}

fn load_regions(
    cli: &Cli,
    compositor: &mut RegionCompositor,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = &cli.snapshot {
        let json = fs::read_to_string(path)?;
        if !compositor.import_snapshot_json(&json) {
            return Err(format!("Invalid region snapshot: {}", path.display()).into());
        }
    }

    for &(x, y, w, h) in &cli.regions {
        compositor.add_region_default(x, y, w, h);
    }

    if let Some(intensity) = cli.override_intensity {
        compositor.update_intensity(intensity);
    }
    Ok(())
}

fn run_image(
    input: &Path,
    output: &Path,
    surface: &SharedFrameSurface,
    compositor: &mut RegionCompositor,
) -> Result<(), Box<dyn std::error::Error>> {
    surface.replace(ImageFileReader::new().read(input)?);
    compositor.notify_surface_resized();
    report_failures(compositor.redraw_if_dirty());

    ImageFileWriter::new().write(output, &compositor.composite()?)?;
    log::info!("Output written to {}", output.display());
    Ok(())
}

fn run_sequence(
    input: &Path,
    output: &Path,
    surface: &SharedFrameSurface,
    compositor: &mut RegionCompositor,
) -> Result<(), Box<dyn std::error::Error>> {
    let frame_rate = compositor.settings().frame_rate;
    let mut navigator = ImageSequenceNavigator::open(input, surface.clone(), frame_rate)?;
    let total = navigator.total_frames();
    log::info!("Rendering {total} frames at {frame_rate} fps");

    let writer = ImageFileWriter::new();
    for index in 0..total {
        navigator.seek_to_frame(index)?;
        compositor.notify_frame_changed();
        report_failures(compositor.redraw_if_dirty());

        let name = navigator.paths()[index]
            .file_name()
            .ok_or("Frame path has no file name")?;
        writer.write(&output.join(name), &compositor.composite()?)?;
        compositor.logger_mut().progress(index + 1, total);
    }
    log::info!("Output written to {}", output.display());
    Ok(())
}

fn report_failures(report: Option<RenderReport>) {
    if let Some(report) = report {
        if report.failed > 0 {
            log::warn!("{} regions failed to render", report.failed);
        }
        if report.skipped > 0 {
            log::debug!("{} regions outside the frame", report.skipped);
        }
    }
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.input.exists() {
        return Err(format!("Input not found: {}", cli.input.display()).into());
    }
    if cli.input.is_file() && !is_image(&cli.input) {
        return Err(format!("Unsupported input image: {}", cli.input.display()).into());
    }
    if cli.input.is_dir() && cli.output.is_file() {
        return Err("Output must be a directory when the input is a directory".into());
    }
    if cli.regions.is_empty() && cli.snapshot.is_none() {
        log::warn!("No regions given; output will match the input");
    }
    for (name, value) in [
        ("Intensity", cli.intensity),
        ("Override intensity", cli.override_intensity),
    ] {
        if let Some(v) = value {
            if !(MIN_INTENSITY as i64..=MAX_INTENSITY as i64).contains(&v) {
                return Err(format!(
                    "{name} must be between {MIN_INTENSITY} and {MAX_INTENSITY}, got {v}"
                )
                .into());
            }
        }
    }
    if let Some(rate) = cli.frame_rate {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(format!("Frame rate must be positive, got {rate}").into());
        }
    }
    Ok(())
}

fn parse_rect(s: &str) -> Result<(i64, i64, i64, i64), String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(format!("expected x,y,width,height, got '{s}'"));
    }
    let mut values = [0i64; 4];
    for (slot, part) in values.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|_| format!("'{part}' is not an integer"))?;
    }
    Ok((values[0], values[1], values[2], values[3]))
}
