// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Listing available cameras and their depth formats
//! - Running the live depth preview
//! - Rendering depth photo bundles

use depthcam::backends::camera::types::{DeviceKind, Facing, VideoFrame};
use depthcam::backends::camera::{
    CameraSelector, CaptureBackend, CaptureCoordinator, SynchronizedFrameTuple, SyntheticBackend,
};
use depthcam::config::Config;
use depthcam::constants::MAX_BUFFERS_IN_FLIGHT;
use depthcam::pipelines::depth::visualization::bgra_to_rgba;
use depthcam::pipelines::depth::{Colormap, DepthRepresentationConverter, HistogramEqualization};
use depthcam::pipelines::photo::{DepthPhotoBundle, DepthPhotoViewer, DisplayMode, export};
use depthcam::pipelines::processing::{DrawableSize, FrameProcessingStage, RenderableSlot};
use depthcam::render::{
    DisplayLink, DisplaySurface, GpuRenderer, InFlightBudget, OffscreenSurface, RenderStats,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Simulated GPU latency of the offscreen surface
const OFFSCREEN_LATENCY: Duration = Duration::from_millis(4);

/// When a live run stops on its own
pub struct LiveLimits {
    pub frames: Option<u64>,
    pub duration: Option<u64>,
    pub switch_after: Option<u64>,
}

/// List all available cameras
pub fn list_cameras() -> Result<(), Box<dyn std::error::Error>> {
    let backend = SyntheticBackend::new();
    let kinds = [
        DeviceKind::TrueDepth,
        DeviceKind::DualCamera,
        DeviceKind::WideAngle,
        DeviceKind::Telephoto,
    ];

    let default = backend.default_video_device();
    let devices: Vec<_> = [Facing::Front, Facing::Back]
        .into_iter()
        .flat_map(|facing| backend.discover_devices(facing, &kinds))
        .collect();

    if devices.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras ({}):", backend.name());
    println!();
    for (index, device) in devices.iter().enumerate() {
        let marker = if default.as_ref() == Some(device) {
            " (default)"
        } else {
            ""
        };
        let depth = if device.kind.supports_depth() {
            ", depth"
        } else {
            ""
        };
        println!(
            "  [{}] {} - {} {}{}{}",
            index, device.name, device.facing, device.kind, depth, marker
        );

        let depth_formats = CameraSelector::describe_depth_formats(&backend, device);
        if depth_formats.is_empty() {
            println!("      No depth formats");
        } else {
            for line in depth_formats {
                println!("      {}", line);
            }
        }

        match CameraSelector::select_formats(&backend, device) {
            Ok((format, depth)) => println!("      Selected: {} + {}", format, depth),
            Err(e) => println!("      Selected: none ({})", e),
        }
        println!();
    }

    Ok(())
}

/// Run the live preview on the synthetic camera
pub fn run_live(
    config: &Config,
    limits: LiveLimits,
    gpu: bool,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let size = config.display.size();

    if gpu {
        #[cfg(feature = "gpu")]
        {
            let surface = pollster::block_on(depthcam::gpu::TextureSurface::new(size))?;
            return run_live_on(surface, config, limits, output);
        }
        #[cfg(not(feature = "gpu"))]
        return Err("depthcam was built without the `gpu` feature".into());
    }

    let surface = OffscreenSurface::new(size, OFFSCREEN_LATENCY);
    run_live_on(surface, config, limits, output)
}

fn run_live_on<S: DisplaySurface + 'static>(
    surface: S,
    config: &Config,
    limits: LiveLimits,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut backend = SyntheticBackend::new();
    if let Some(frames) = limits.frames {
        backend = backend.with_max_frames(frames);
    }
    let coordinator = CaptureCoordinator::new(Arc::new(backend));

    let toggles = Arc::new(config.toggles());
    let slot = Arc::new(RenderableSlot::new());
    let drawable = Arc::new(DrawableSize::default());
    let stage = FrameProcessingStage::new(
        Arc::clone(&toggles),
        Arc::clone(&slot),
        Arc::clone(&drawable),
        Arc::new(HistogramEqualization),
        config.colormap,
    );

    // Keep the latest tuple around for the bundle written at exit
    let last_tuple: Arc<Mutex<Option<SynchronizedFrameTuple>>> = Arc::new(Mutex::new(None));
    let mut forward = stage.handler();
    let keep = Arc::clone(&last_tuple);
    coordinator.set_handler(Box::new(move |tuple| {
        *keep.lock().unwrap_or_else(PoisonError::into_inner) = Some(tuple.clone());
        forward(tuple);
    }));

    let camera_type = config.camera_type();
    coordinator.configure_camera(camera_type, None)?;
    coordinator.set_depth_filter_enabled(toggles.depth_filter_enabled());
    coordinator.start()?;

    if let Some(session) = coordinator.current_config() {
        println!("Using camera: {}", session.device.name);
        println!(
            "Capture format: {} + {}",
            session.format, session.depth_format
        );
    }

    let budget = InFlightBudget::new(MAX_BUFFERS_IN_FLIGHT);
    let mut renderer = GpuRenderer::new(surface, Arc::clone(&slot), drawable, budget.clone());
    let render_stats: Arc<RenderStats> = Arc::clone(renderer.stats());
    let mut display_link = DisplayLink::start(config.display.fps, move || {
        renderer.present_tick();
    });

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = Arc::clone(&stop_flag);
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    println!("Running... (press Ctrl+C to stop)");

    let start = Instant::now();
    let mut switched = false;
    let stats = Arc::clone(coordinator.stats());
    loop {
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Stopping early...");
            break;
        }
        if limits
            .duration
            .is_some_and(|secs| start.elapsed() >= Duration::from_secs(secs))
        {
            break;
        }
        if limits.frames.is_some_and(|frames| stats.tuples() >= frames) {
            break;
        }

        if !switched
            && limits
                .switch_after
                .is_some_and(|secs| start.elapsed() >= Duration::from_secs(secs))
        {
            switched = true;
            match coordinator.change_camera(camera_type.toggled()) {
                Ok(()) => {
                    if let Some(session) = coordinator.current_config() {
                        println!();
                        println!("Switched to: {}", session.device.name);
                    }
                }
                Err(e) => println!("\nCamera switch failed, keeping current camera: {}", e),
            }
        }

        print!(
            "\rFrames: {} rendered: {} presented: {}",
            stats.tuples(),
            stage.stats().rendered(),
            render_stats.presented()
        );
        std::io::Write::flush(&mut std::io::stdout())?;

        std::thread::sleep(Duration::from_millis(50));
    }
    println!();

    coordinator.stop();
    coordinator.clear_handler();
    stage.shutdown();
    budget.close();
    display_link.stop();

    println!(
        "Tuples: {}, rendered: {}, skipped without depth: {}, presented: {}, completed: {}, peak in flight: {}",
        stats.tuples(),
        stage.stats().rendered(),
        stage.stats().skipped_without_depth(),
        render_stats.presented(),
        render_stats.completed(),
        budget.peak_in_flight()
    );

    let rt = tokio::runtime::Runtime::new()?;

    if let Some(image) = slot.latest() {
        let path = rt.block_on(async {
            match output {
                Some(path) => export::save_png_to(image.image.clone(), path).await,
                None => export::save_png(image.image.clone(), &config.output_dir(), "DEPTH").await,
            }
        })?;
        println!("Frame saved: {}", path.display());
    } else {
        println!("No frame was rendered.");
    }

    let last = last_tuple
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    if let Some(tuple) = last {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let dir = config.output_dir().join(format!("BUNDLE_{}", timestamp));
        if let Some(manifest) = write_bundle(&dir, &tuple)? {
            println!("Depth photo saved: {}", manifest.display());
        }
    }

    Ok(())
}

/// Write the tuple as a depth photo bundle, `None` when it has no depth
fn write_bundle(
    dir: &Path,
    tuple: &SynchronizedFrameTuple,
) -> Result<Option<PathBuf>, Box<dyn std::error::Error>> {
    let Some(depth) = tuple.depth.as_ref() else {
        return Ok(None);
    };
    let color = video_to_rgba(&tuple.video).ok_or("Video frame buffer is truncated")?;
    let depth_map = DepthRepresentationConverter::to_depth(depth);
    let disparity = DepthRepresentationConverter::to_disparity(depth);
    let manifest = DepthPhotoBundle::write(dir, &color, Some(&disparity), Some(&depth_map), None)?;
    Ok(Some(manifest))
}

fn video_to_rgba(frame: &VideoFrame) -> Option<image::RgbaImage> {
    bgra_to_rgba(&frame.data, frame.width, frame.height, frame.stride)
}

/// Render a depth photo bundle to PNG
pub fn render_photo(
    config: &Config,
    manifest: &Path,
    mode: DisplayMode,
    colormap: Colormap,
    equalize: bool,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let bundle = DepthPhotoBundle::open(manifest)?;
    let viewer = DepthPhotoViewer::load(&bundle)?
        .with_colormap(colormap)
        .with_equalization(equalize);

    if !viewer.has_depth() && mode != DisplayMode::Color {
        return Err(format!("{} has no depth data", manifest.display()).into());
    }

    let image = viewer
        .render(mode)
        .ok_or_else(|| format!("{} has no {} image", manifest.display(), mode))?;
    println!("Rendering {} ({}x{})", mode, image.width(), image.height());

    let rt = tokio::runtime::Runtime::new()?;
    let path = rt.block_on(async {
        match output {
            Some(path) => export::save_png_to(image, path).await,
            None => {
                let prefix = mode.to_string().to_uppercase();
                export::save_png(image, &config.output_dir(), &prefix).await
            }
        }
    })?;

    println!("Image saved: {}", path.display());
    Ok(())
}
