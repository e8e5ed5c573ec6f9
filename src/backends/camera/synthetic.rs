// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic depth camera backend
//!
//! A virtual capture backend that renders a moving sphere in front of a
//! back wall. It offers a small device catalog (front TrueDepth, back dual
//! camera, back wide angle without depth) and streams BGRA video, depth in
//! the configured encoding and face metadata on its own thread.
//!
//! Failure injection hooks (rejected inputs, failing streams, missing
//! outputs, dropped data) let callers exercise every error path of a
//! capture session without hardware.

use super::frame_loop::{LoopAction, LoopController};
use super::synchronizer::{Delivery, DropReason, OutputEvent, OutputKind, OutputSink};
use super::types::*;
use super::{CaptureBackend, CaptureStream, SessionConfig};
use crate::constants::synthetic::{DEFAULT_FPS, FAR_M, NEAR_M};
use half::f16;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

struct DeviceEntry {
    device: CaptureDevice,
    formats: Vec<CaptureFormat>,
    metadata_kinds: Vec<MetadataKind>,
}

/// Drop injection and stream limits
#[derive(Debug, Clone, Copy)]
pub struct SyntheticOptions {
    pub fps: u32,
    /// Mark every n-th depth datum dropped
    pub drop_depth_every: Option<u64>,
    /// Mark every n-th video frame dropped
    pub drop_video_every: Option<u64>,
    /// End the stream after this many frames
    pub max_frames: Option<u64>,
}

impl Default for SyntheticOptions {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            drop_depth_every: None,
            drop_video_every: None,
            max_frames: None,
        }
    }
}

/// Virtual capture hardware
pub struct SyntheticBackend {
    devices: Vec<DeviceEntry>,
    default_device: Option<String>,
    options: SyntheticOptions,
    missing_outputs: Vec<OutputKind>,
    rejected_inputs: Mutex<HashSet<String>>,
    failing_streams: Mutex<HashSet<String>>,
    streams_started: AtomicU64,
}

fn depth_format(width: u32, height: u32, data_type: DepthDataType) -> DepthFormat {
    DepthFormat {
        size: Size::new(width, height),
        data_type,
    }
}

fn video_format(width: u32, height: u32, depth_formats: Vec<DepthFormat>) -> CaptureFormat {
    CaptureFormat {
        size: Size::new(width, height),
        pixel_format: PixelFormat::NV12,
        framerate: Framerate::from_int(DEFAULT_FPS),
        depth_formats,
    }
}

/// Formats of a depth-capable synthetic module
pub fn depth_capable_formats() -> Vec<CaptureFormat> {
    vec![
        video_format(
            320,
            240,
            vec![depth_format(160, 120, DepthDataType::DepthFloat32)],
        ),
        video_format(
            640,
            480,
            vec![
                depth_format(320, 240, DepthDataType::DisparityFloat16),
                depth_format(160, 120, DepthDataType::DepthFloat32),
                depth_format(320, 240, DepthDataType::DepthFloat32),
            ],
        ),
        video_format(1280, 720, Vec::new()),
    ]
}

/// Formats of a plain synthetic module (no depth companions)
pub fn plain_formats() -> Vec<CaptureFormat> {
    vec![video_format(640, 480, Vec::new()), video_format(1280, 720, Vec::new())]
}

impl SyntheticBackend {
    /// Backend with the standard three-device catalog
    pub fn new() -> Self {
        let depth_metadata = vec![MetadataKind::Face, MetadataKind::HumanBody];
        let front = CaptureDevice {
            id: "synthetic-front-truedepth".to_string(),
            name: "Synthetic Front TrueDepth Camera".to_string(),
            facing: Facing::Front,
            kind: DeviceKind::TrueDepth,
        };
        let back = CaptureDevice {
            id: "synthetic-back-dual".to_string(),
            name: "Synthetic Back Dual Camera".to_string(),
            facing: Facing::Back,
            kind: DeviceKind::DualCamera,
        };
        let wide = CaptureDevice {
            id: "synthetic-back-wide".to_string(),
            name: "Synthetic Back Wide Angle Camera".to_string(),
            facing: Facing::Back,
            kind: DeviceKind::WideAngle,
        };

        Self::empty()
            .with_device(front, depth_capable_formats(), depth_metadata.clone())
            .with_device(back, depth_capable_formats(), depth_metadata)
            .with_device(wide.clone(), plain_formats(), vec![MetadataKind::Barcode])
            .with_default_device(&wide.id)
    }

    /// Backend without any device
    pub fn empty() -> Self {
        Self {
            devices: Vec::new(),
            default_device: None,
            options: SyntheticOptions::default(),
            missing_outputs: Vec::new(),
            rejected_inputs: Mutex::new(HashSet::new()),
            failing_streams: Mutex::new(HashSet::new()),
            streams_started: AtomicU64::new(0),
        }
    }

    pub fn with_device(
        mut self,
        device: CaptureDevice,
        formats: Vec<CaptureFormat>,
        metadata_kinds: Vec<MetadataKind>,
    ) -> Self {
        self.devices.push(DeviceEntry {
            device,
            formats,
            metadata_kinds,
        });
        self
    }

    pub fn with_default_device(mut self, id: &str) -> Self {
        self.default_device = Some(id.to_string());
        self
    }

    pub fn with_options(mut self, options: SyntheticOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.options.fps = fps.max(1);
        self
    }

    pub fn with_max_frames(mut self, max_frames: u64) -> Self {
        self.options.max_frames = Some(max_frames);
        self
    }

    /// Report `output` as impossible to attach
    pub fn without_output(mut self, output: OutputKind) -> Self {
        self.missing_outputs.push(output);
        self
    }

    /// Make `can_add_input` fail for the device with this id
    pub fn set_input_rejected(&self, id: &str, rejected: bool) {
        let mut rejected_inputs = self
            .rejected_inputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if rejected {
            rejected_inputs.insert(id.to_string());
        } else {
            rejected_inputs.remove(id);
        }
    }

    /// Make `start_stream` fail for the device with this id
    pub fn set_stream_failure(&self, id: &str, failing: bool) {
        let mut failing_streams = self
            .failing_streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if failing {
            failing_streams.insert(id.to_string());
        } else {
            failing_streams.remove(id);
        }
    }

    /// Number of streams successfully started so far
    pub fn streams_started(&self) -> u64 {
        self.streams_started.load(Ordering::SeqCst)
    }

    fn entry(&self, device: &CaptureDevice) -> Option<&DeviceEntry> {
        self.devices.iter().find(|e| e.device.id == device.id)
    }
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn discover_devices(&self, facing: Facing, kinds: &[DeviceKind]) -> Vec<CaptureDevice> {
        kinds
            .iter()
            .flat_map(|kind| {
                self.devices
                    .iter()
                    .filter(move |e| e.device.facing == facing && e.device.kind == *kind)
                    .map(|e| e.device.clone())
            })
            .collect()
    }

    fn default_video_device(&self) -> Option<CaptureDevice> {
        let id = self.default_device.as_ref()?;
        self.devices
            .iter()
            .find(|e| &e.device.id == id)
            .map(|e| e.device.clone())
    }

    fn supported_formats(&self, device: &CaptureDevice) -> Vec<CaptureFormat> {
        self.entry(device)
            .map(|e| e.formats.clone())
            .unwrap_or_default()
    }

    fn available_metadata_kinds(&self, device: &CaptureDevice) -> Vec<MetadataKind> {
        self.entry(device)
            .map(|e| e.metadata_kinds.clone())
            .unwrap_or_default()
    }

    fn can_add_input(&self, device: &CaptureDevice) -> BackendResult<()> {
        if self.entry(device).is_none() {
            return Err(BackendError::DeviceNotFound(device.id.clone()));
        }
        let rejected = self
            .rejected_inputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&device.id);
        if rejected {
            return Err(BackendError::InputRejected(format!(
                "{} is in use",
                device.name
            )));
        }
        Ok(())
    }

    fn can_add_output(&self, output: OutputKind) -> bool {
        !self.missing_outputs.contains(&output)
    }

    fn start_stream(
        &self,
        config: &SessionConfig,
        sink: OutputSink,
    ) -> BackendResult<Box<dyn CaptureStream>> {
        let failing = self
            .failing_streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&config.device.id);
        if failing {
            return Err(BackendError::StreamFailed(format!(
                "{} failed to start",
                config.device.name
            )));
        }

        let stream = SyntheticStream::start(config, sink, self.options);
        self.streams_started.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(stream))
    }
}

/// A running synthetic stream
pub struct SyntheticStream {
    controller: LoopController,
    filtering: Arc<AtomicBool>,
}

struct StreamState {
    scene: Scene,
    sink: OutputSink,
    frame_index: u64,
}

/// Capture time of frame `index`, saturating instead of wrapping
fn frame_timestamp(frame_duration: Duration, index: u64) -> Duration {
    let nanos = u64::try_from(frame_duration.as_nanos()).unwrap_or(u64::MAX);
    Duration::from_nanos(nanos.saturating_mul(index))
}

impl SyntheticStream {
    fn start(config: &SessionConfig, sink: OutputSink, options: SyntheticOptions) -> Self {
        let filtering = Arc::new(AtomicBool::new(config.depth.filtering));
        let thread_filtering = Arc::clone(&filtering);
        let frame_duration = Framerate::from_int(options.fps.max(1)).frame_duration();
        let scene = Scene::new(config);

        info!(
            device = %config.device.name,
            format = %config.format,
            depth_format = %config.depth_format,
            fps = options.fps,
            "Starting synthetic stream"
        );

        let controller = LoopController::start_with_init(
            "synthetic-stream",
            move || {
                Ok(StreamState {
                    scene,
                    sink,
                    frame_index: 0,
                })
            },
            move |state: &mut StreamState| {
                if options
                    .max_frames
                    .is_some_and(|max| state.frame_index >= max)
                {
                    debug!(frames = state.frame_index, "Synthetic stream reached its frame limit");
                    return LoopAction::Stop;
                }

                std::thread::sleep(frame_duration);

                let index = state.frame_index;
                let timestamp = frame_timestamp(frame_duration, index);
                let filtered = thread_filtering.load(Ordering::SeqCst);
                let events = state.scene.frame_events(index, timestamp, filtered, &options);
                state.frame_index += 1;

                for event in events {
                    if !state.sink.send(event) {
                        debug!("Synchronizer gone, ending synthetic stream");
                        return LoopAction::Stop;
                    }
                }
                LoopAction::Continue
            },
        );

        Self {
            controller,
            filtering,
        }
    }
}

impl CaptureStream for SyntheticStream {
    fn set_depth_filtering(&mut self, enabled: bool) {
        self.filtering.store(enabled, Ordering::SeqCst);
    }

    fn stop(&mut self) {
        self.controller.stop();
    }
}

fn every(n: Option<u64>, index: u64) -> bool {
    n.is_some_and(|n| n > 0 && (index + 1) % n == 0)
}

/// The rendered scene: a sphere drifting across a wall
struct Scene {
    video_size: Size,
    depth_size: Size,
    data_type: DepthDataType,
    faces: bool,
    facing: Facing,
}

impl Scene {
    fn new(config: &SessionConfig) -> Self {
        Self {
            video_size: config.format.size,
            depth_size: config.depth_format.size,
            data_type: config.depth_format.data_type,
            faces: config.metadata.kinds.contains(&MetadataKind::Face),
            facing: config.device.facing,
        }
    }

    /// Sphere center (normalized) and radius for a frame
    fn sphere(&self, index: u64) -> (f32, f32, f32) {
        let phase = index as f32 * 0.05;
        (0.5 + 0.25 * phase.sin(), 0.5 + 0.15 * phase.cos(), 0.2)
    }

    fn frame_events(
        &self,
        index: u64,
        timestamp: Duration,
        filtered: bool,
        options: &SyntheticOptions,
    ) -> Vec<OutputEvent> {
        let depth = if every(options.drop_depth_every, index) {
            Delivery::Dropped(DropReason::LateData)
        } else {
            match self.depth_data(index, timestamp, filtered) {
                Ok(data) => Delivery::Delivered(Arc::new(data)),
                Err(e) => {
                    debug!(error = %e, "Synthetic depth generation failed");
                    Delivery::Dropped(DropReason::Discontinuity)
                }
            }
        };

        let video = if every(options.drop_video_every, index) {
            Delivery::Dropped(DropReason::LateData)
        } else {
            Delivery::Delivered(self.video_frame(index, timestamp))
        };

        vec![
            OutputEvent::Depth {
                timestamp,
                data: depth,
            },
            OutputEvent::Metadata {
                timestamp,
                objects: self.metadata(index),
            },
            OutputEvent::Video {
                timestamp,
                data: video,
            },
        ]
    }

    /// Distance in meters at a normalized position, 0 for a hole
    fn distance_at(&self, index: u64, u: f32, v: f32) -> f32 {
        let (cx, cy, r) = self.sphere(index);
        let dx = u - cx;
        let dy = v - cy;
        let dist2 = dx * dx + dy * dy;
        if dist2 < r * r {
            let bulge = (1.0 - dist2 / (r * r)).sqrt();
            NEAR_M + (1.0 - bulge) * (FAR_M - NEAR_M) * 0.3
        } else {
            // Wall slopes away toward the top
            FAR_M - 0.3 * v
        }
    }

    fn depth_data(&self, index: u64, timestamp: Duration, filtered: bool) -> BackendResult<DepthData> {
        let Size { width, height } = self.depth_size;
        let representation = self.data_type.representation();
        let mut samples = Vec::with_capacity(self.depth_size.pixel_count());

        for y in 0..height {
            for x in 0..width {
                let u = (x as f32 + 0.5) / width as f32;
                let v = (y as f32 + 0.5) / height as f32;
                // Sparse holes where the sensor got no return
                let hole = (x + y * 3 + index as u32) % 29 == 0;
                let meters = if hole && !filtered {
                    0.0
                } else {
                    self.distance_at(index, u, v)
                };
                let value = match representation {
                    DepthRepresentation::Depth => meters,
                    DepthRepresentation::Disparity if meters > 0.0 => 1.0 / meters,
                    DepthRepresentation::Disparity => 0.0,
                };
                samples.push(value);
            }
        }

        let values = match self.data_type.precision() {
            DepthPrecision::Float16 => {
                DepthValues::Float16(samples.iter().map(|v| f16::from_f32(*v)).collect())
            }
            DepthPrecision::Float32 => DepthValues::Float32(samples),
        };

        let mut data = DepthData::new(
            DepthMap::new(width, height, values)?,
            representation,
            timestamp,
        );
        data.filtered = filtered;
        Ok(data)
    }

    fn video_frame(&self, index: u64, timestamp: Duration) -> VideoFrame {
        let Size { width, height } = self.video_size;
        let stride = width * 4;
        let (cx, cy, r) = self.sphere(index);
        let mut data = vec![0u8; (stride * height) as usize];

        for y in 0..height {
            let v = y as f32 / height as f32;
            for x in 0..width {
                let u = x as f32 / width as f32;
                let offset = (y * stride + x * 4) as usize;
                let inside = (u - cx).powi(2) + (v - cy).powi(2) < r * r;
                let (b, g, r) = if inside {
                    (40, 90, 220)
                } else {
                    ((u * 255.0) as u8, (v * 255.0) as u8, 96)
                };
                data[offset] = b;
                data[offset + 1] = g;
                data[offset + 2] = r;
                data[offset + 3] = 255;
            }
        }

        VideoFrame {
            width,
            height,
            data: Arc::from(data),
            format: PixelFormat::BGRA,
            stride,
            timestamp,
        }
    }

    fn metadata(&self, index: u64) -> Vec<MetadataObject> {
        if !self.faces || self.facing != Facing::Front {
            return Vec::new();
        }
        let (cx, cy, r) = self.sphere(index);
        vec![MetadataObject {
            kind: MetadataKind::Face,
            bounds: FaceRegion {
                x: (cx - r).max(0.0),
                y: (cy - r).max(0.0),
                width: 2.0 * r,
                height: 2.0 * r,
            },
        }]
    }
}
