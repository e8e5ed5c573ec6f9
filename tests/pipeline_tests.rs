// SPDX-License-Identifier: GPL-3.0-only

//! End-to-end tests: capture, processing, budgeted rendering and depth photos

use depthcam::backends::camera::types::{
    CameraType, DepthData, DepthMap, DepthRepresentation, DepthValues, PixelFormat, Size,
    VideoFrame,
};
use depthcam::backends::camera::{CaptureCoordinator, SynchronizedFrameTuple, SyntheticBackend};
use depthcam::pipelines::depth::{Colormap, DepthRepresentationConverter, HistogramEqualization};
use depthcam::pipelines::photo::{DepthPhotoBundle, DepthPhotoViewer, DisplayMode};
use depthcam::pipelines::processing::{
    DrawableSize, FrameProcessingStage, RenderableSlot, UiToggles,
};
use depthcam::render::{
    DisplayLink, GpuRenderer, InFlightBudget, OffscreenSurface, TickOutcome,
};
use half::f16;
use image::{Rgba, RgbaImage};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

fn video(timestamp: Duration) -> VideoFrame {
    VideoFrame {
        width: 2,
        height: 2,
        data: Arc::from(vec![0u8; 16]),
        format: PixelFormat::BGRA,
        stride: 8,
        timestamp,
    }
}

fn depth(values: Vec<f32>, timestamp: Duration) -> Arc<DepthData> {
    Arc::new(DepthData::new(
        DepthMap::new(2, 2, DepthValues::Float32(values)).unwrap(),
        DepthRepresentation::Depth,
        timestamp,
    ))
}

fn tuple(millis: u64, with_depth: bool) -> SynchronizedFrameTuple {
    let timestamp = Duration::from_millis(millis);
    SynchronizedFrameTuple {
        video: video(timestamp),
        depth: with_depth.then(|| depth(vec![0.5, 1.0, 2.0, 4.0], timestamp)),
        face: None,
        timestamp,
    }
}

fn stage(toggles: Arc<UiToggles>, slot: Arc<RenderableSlot>) -> FrameProcessingStage {
    FrameProcessingStage::new(
        toggles,
        slot,
        Arc::new(DrawableSize::new(Size::new(4, 4))),
        Arc::new(HistogramEqualization),
        Colormap::Grayscale,
    )
}

#[test]
fn test_conversion_identity() {
    let data = depth(vec![0.25, 1.0, 3.0, 0.0], Duration::ZERO);

    let same = DepthRepresentationConverter::to_depth(&data);
    assert!(Arc::ptr_eq(&same, &data));

    let disparity = DepthRepresentationConverter::to_disparity(&data);
    assert_eq!(disparity.representation, DepthRepresentation::Disparity);
    let back = DepthRepresentationConverter::to_depth(&disparity);

    let original = data.map.values().to_f32_vec();
    let round_trip = back.map.values().to_f32_vec();
    for (a, b) in original.iter().zip(&round_trip) {
        assert!((a - b).abs() < 1e-5, "{} != {}", a, b);
    }
    // Invalid samples stay invalid
    assert_eq!(round_trip[3], 0.0);
}

#[test]
fn test_disparity_toggle_only_affects_later_frames() {
    let toggles = Arc::new(UiToggles::new(false, false, true));
    let slot = Arc::new(RenderableSlot::new());
    let stage = stage(Arc::clone(&toggles), Arc::clone(&slot));
    let mut handler = stage.handler();

    handler(tuple(0, true));
    toggles.set_use_disparity(true);
    handler(tuple(33, true));

    let stats = Arc::clone(stage.stats());
    assert!(wait_until(|| stats.rendered() == 2));

    let latest = slot.latest().unwrap();
    assert_eq!(latest.representation, DepthRepresentation::Disparity);
    assert_eq!(latest.timestamp, Duration::from_millis(33));
    assert_eq!(latest.sequence, 2);
    stage.shutdown();
}

#[test]
fn test_toggle_after_arrival_does_not_change_queued_frame() {
    let toggles = Arc::new(UiToggles::new(false, false, true));
    let slot = Arc::new(RenderableSlot::new());
    let stage = stage(Arc::clone(&toggles), Arc::clone(&slot));
    let mut handler = stage.handler();

    handler(tuple(0, true));
    toggles.set_use_disparity(true);

    let stats = Arc::clone(stage.stats());
    assert!(wait_until(|| stats.rendered() == 1));
    assert_eq!(
        slot.latest().unwrap().representation,
        DepthRepresentation::Depth
    );
    stage.shutdown();
}

#[test]
fn test_dropped_depth_leaves_slot_unchanged() {
    let toggles = Arc::new(UiToggles::new(false, false, true));
    let slot = Arc::new(RenderableSlot::new());
    let stage = stage(toggles, Arc::clone(&slot));
    let mut handler = stage.handler();

    handler(tuple(0, true));
    let stats = Arc::clone(stage.stats());
    assert!(wait_until(|| stats.rendered() == 1));
    let before = slot.latest().unwrap();

    handler(tuple(33, false));
    assert!(wait_until(|| stats.skipped_without_depth() == 1));

    let after = slot.latest().unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(after.timestamp, Duration::ZERO);
    stage.shutdown();
}

#[test]
fn test_budget_never_exceeds_one_and_releases_every_permit() {
    let slot = Arc::new(RenderableSlot::new());
    let drawable = Arc::new(DrawableSize::default());
    let budget = InFlightBudget::new(1);
    let surface = OffscreenSurface::new(Size::new(8, 8), Duration::from_millis(3));
    let handle = surface.handle();
    let mut renderer = GpuRenderer::new(surface, Arc::clone(&slot), drawable, budget.clone());

    assert_eq!(renderer.present_tick(), TickOutcome::NoImage);

    slot.store(depthcam::pipelines::processing::RenderableImage {
        image: RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255])),
        sequence: 0,
        timestamp: Duration::ZERO,
        representation: DepthRepresentation::Depth,
        face: None,
    });

    for _ in 0..10 {
        assert_eq!(renderer.present_tick(), TickOutcome::Presented(1));
        assert!(budget.in_flight() <= 1);
    }

    // Surface without drawables: the permit comes straight back
    handle.set_ready(false);
    assert_eq!(renderer.present_tick(), TickOutcome::SurfaceNotReady);

    assert!(wait_until(|| budget.in_flight() == 0));
    assert_eq!(budget.peak_in_flight(), 1);
    assert!(wait_until(|| renderer.stats().completed() == 10));
    assert_eq!(handle.completed_frames(), 10);
}

#[test]
fn test_live_pipeline_end_to_end() {
    let backend = SyntheticBackend::new().with_fps(120);
    let coordinator = CaptureCoordinator::new(Arc::new(backend));

    let toggles = Arc::new(UiToggles::new(false, true, true));
    let slot = Arc::new(RenderableSlot::new());
    let drawable = Arc::new(DrawableSize::default());
    let stage = FrameProcessingStage::new(
        Arc::clone(&toggles),
        Arc::clone(&slot),
        Arc::clone(&drawable),
        Arc::new(HistogramEqualization),
        Colormap::Turbo,
    );
    coordinator.set_handler(stage.handler());

    let budget = InFlightBudget::new(1);
    let surface = OffscreenSurface::new(Size::new(36, 64), Duration::from_millis(2));
    let handle = surface.handle();
    let mut renderer = GpuRenderer::new(surface, Arc::clone(&slot), drawable, budget.clone());
    let render_stats = Arc::clone(renderer.stats());
    let mut link = DisplayLink::start(120, move || {
        renderer.present_tick();
    });

    coordinator
        .configure_camera(CameraType::front(true), None)
        .unwrap();
    coordinator.start().unwrap();

    assert!(wait_until(|| render_stats.completed() >= 5));

    coordinator.change_camera(CameraType::back(true)).unwrap();
    let presented = render_stats.presented();
    assert!(wait_until(|| render_stats.presented() > presented + 3));

    coordinator.stop();
    stage.shutdown();
    budget.close();
    link.stop();

    assert_eq!(budget.peak_in_flight(), 1);
    assert!(wait_until(|| budget.in_flight() == 0));
    let front = handle.front_buffer().unwrap();
    assert_eq!(front.dimensions(), (36, 64));
    assert_eq!(slot.latest().unwrap().size(), Size::new(36, 64));
}

#[test]
fn test_photo_bundle_renders_depth_from_stored_disparity() {
    let dir = tempfile::tempdir().unwrap();
    let color = RgbaImage::from_pixel(4, 2, Rgba([200, 100, 50, 255]));
    let values = [0.5f32, 1.0, 2.0, 0.0, 4.0, 1.0, 0.5, 2.0]
        .iter()
        .map(|v| f16::from_f32(*v))
        .collect();
    let disparity = DepthData::new(
        DepthMap::new(4, 2, DepthValues::Float16(values)).unwrap(),
        DepthRepresentation::Disparity,
        Duration::ZERO,
    );

    let manifest = DepthPhotoBundle::write(dir.path(), &color, Some(&disparity), None, None).unwrap();
    let bundle = DepthPhotoBundle::open(&manifest).unwrap();
    let viewer = DepthPhotoViewer::load(&bundle)
        .unwrap()
        .with_colormap(Colormap::Grayscale);

    assert!(viewer.has_depth());
    assert!(viewer.matte().is_none());
    assert_eq!(viewer.render(DisplayMode::Color).unwrap(), color);

    let depth = viewer.render(DisplayMode::Depth).unwrap();
    assert_eq!(depth.dimensions(), (4, 2));
    // The invalid sample renders black
    assert_eq!(depth.get_pixel(3, 0).0, [0, 0, 0, 255]);

    let derived = viewer.depth().unwrap();
    assert_eq!(derived.representation, DepthRepresentation::Depth);
    assert_eq!(derived.map.value_at(0, 0), Some(2.0));
}

#[test]
fn test_equalization_toggle_applies_to_later_frames() {
    let toggles = Arc::new(UiToggles::new(false, false, true));
    let slot = Arc::new(RenderableSlot::new());
    let stage = stage(Arc::clone(&toggles), Arc::clone(&slot));
    let mut handler = stage.handler();
    let stats = Arc::clone(stage.stats());

    // Skewed map: equalization spreads the three near values apart
    let skewed = |millis| {
        let timestamp = Duration::from_millis(millis);
        SynchronizedFrameTuple {
            video: video(timestamp),
            depth: Some(depth(vec![1.0, 1.1, 1.2, 4.0], timestamp)),
            face: None,
            timestamp,
        }
    };

    handler(skewed(0));
    assert!(wait_until(|| stats.rendered() == 1));
    let plain = slot.latest().unwrap();

    toggles.set_apply_equalization(true);
    handler(skewed(33));
    assert!(wait_until(|| stats.rendered() == 2));
    let equalized = slot.latest().unwrap();

    assert_eq!(plain.size(), equalized.size());
    assert_ne!(plain.image, equalized.image);
    stage.shutdown();
}
