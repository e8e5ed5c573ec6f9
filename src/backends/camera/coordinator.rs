// SPDX-License-Identifier: GPL-3.0-only

//! Capture session lifecycle and synchronized delivery
//!
//! The coordinator owns one capture session: a single device input plus the
//! video, depth and metadata outputs. It builds an immutable [`SessionConfig`]
//! for the selected device, starts the backend stream, and runs the
//! synchronizer thread that turns per-timestamp collections into
//! [`SynchronizedFrameTuple`]s for the registered handler.
//!
//! Every session mutation is serialized under one mutex. A reconfiguration
//! validates the new device first and swaps the whole config in one step, so
//! the session always has exactly one input once configured.

use super::frame_loop::{LoopAction, LoopController};
use super::selector::CameraSelector;
use super::synchronizer::{
    OutputEvent, OutputKind, OutputSink, SynchronizedDataCollection, Synchronizer,
};
use super::types::*;
use super::{CaptureBackend, CaptureStream};
use crate::constants::sync::POLL_INTERVAL;
use crate::errors::{CaptureError, CaptureResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// One coherent sample of the capture outputs
#[derive(Debug, Clone)]
pub struct SynchronizedFrameTuple {
    pub video: VideoFrame,
    /// `None` when the depth output dropped its datum for this timestamp
    pub depth: Option<Arc<DepthData>>,
    /// First detected face, in the video connection's coordinate space
    pub face: Option<FaceRegion>,
    pub timestamp: Duration,
}

/// Consumer of synchronized tuples
pub type TupleHandler = Box<dyn FnMut(SynchronizedFrameTuple) + Send>;

/// Receiver of raw video frames for a live preview
pub trait PreviewSink: Send + Sync {
    fn show(&self, frame: &VideoFrame);
}

/// Video output settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoOutputSettings {
    pub pixel_format: PixelFormat,
    pub discard_late_frames: bool,
}

/// Depth output settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthOutputSettings {
    pub enabled: bool,
    pub filtering: bool,
}

/// Metadata output settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataOutputSettings {
    /// Detected object kinds; empty when the device offers none of the wanted kinds
    pub kinds: Vec<MetadataKind>,
}

/// Everything a backend needs to stream one session
///
/// Never mutated in place: any change produces a new config that replaces
/// the old one wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub device: CaptureDevice,
    pub format: CaptureFormat,
    pub depth_format: DepthFormat,
    pub video: VideoOutputSettings,
    pub depth: DepthOutputSettings,
    pub metadata: MetadataOutputSettings,
    pub video_connection: ConnectionSettings,
    pub depth_connection: ConnectionSettings,
}

impl SessionConfig {
    /// Copy of this config with a different depth filtering flag
    pub fn with_depth_filtering(&self, filtering: bool) -> Self {
        let mut next = self.clone();
        next.depth.filtering = filtering;
        next
    }
}

/// Lifecycle phase of the capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unconfigured,
    Configured,
    Running,
    Stopped,
    /// Transient, while the config is being swapped
    Reconfiguring,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Unconfigured => write!(f, "unconfigured"),
            SessionPhase::Configured => write!(f, "configured"),
            SessionPhase::Running => write!(f, "running"),
            SessionPhase::Stopped => write!(f, "stopped"),
            SessionPhase::Reconfiguring => write!(f, "reconfiguring"),
        }
    }
}

/// Delivery counters of the synchronizer thread
#[derive(Debug, Default)]
pub struct SyncStats {
    collections: AtomicU64,
    tuples: AtomicU64,
}

impl SyncStats {
    /// Collections emitted by the synchronizer
    pub fn collections(&self) -> u64 {
        self.collections.load(Ordering::SeqCst)
    }

    /// Tuples handed to the handler slot
    pub fn tuples(&self) -> u64 {
        self.tuples.load(Ordering::SeqCst)
    }
}

struct RunningSession {
    stream: Box<dyn CaptureStream>,
    sync_loop: LoopController,
}

struct SessionState {
    phase: SessionPhase,
    config: Option<Arc<SessionConfig>>,
    preview: Option<Arc<dyn PreviewSink>>,
    depth_filtering: bool,
    running: Option<RunningSession>,
}

type HandlerSlot = Arc<Mutex<Option<TupleHandler>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Capture session coordinator
pub struct CaptureCoordinator {
    backend: Arc<dyn CaptureBackend>,
    state: Mutex<SessionState>,
    handler: HandlerSlot,
    stats: Arc<SyncStats>,
}

impl CaptureCoordinator {
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        info!(backend = %backend.name(), "Creating capture coordinator");
        Self {
            backend,
            state: Mutex::new(SessionState {
                phase: SessionPhase::Unconfigured,
                config: None,
                preview: None,
                depth_filtering: false,
                running: None,
            }),
            handler: Arc::new(Mutex::new(None)),
            stats: Arc::new(SyncStats::default()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn CaptureBackend> {
        &self.backend
    }

    pub fn phase(&self) -> SessionPhase {
        lock(&self.state).phase
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state).running.is_some()
    }

    /// The config currently attached to the session
    pub fn current_config(&self) -> Option<Arc<SessionConfig>> {
        lock(&self.state).config.clone()
    }

    /// Number of device inputs attached to the session (0 or 1)
    pub fn active_input_count(&self) -> usize {
        usize::from(lock(&self.state).config.is_some())
    }

    pub fn stats(&self) -> &Arc<SyncStats> {
        &self.stats
    }

    // ===== Handler =====

    /// Register the single consumer of synchronized tuples
    pub fn set_handler(&self, handler: TupleHandler) {
        *lock(&self.handler) = Some(handler);
    }

    pub fn clear_handler(&self) {
        *lock(&self.handler) = None;
    }

    // ===== Configuration =====

    /// Configure the session for `camera_type`, selecting device and formats
    pub fn configure_camera(
        &self,
        camera_type: CameraType,
        preview: Option<Arc<dyn PreviewSink>>,
    ) -> CaptureResult<()> {
        let device = CameraSelector::select_device(self.backend.as_ref(), camera_type)?;
        let formats = CameraSelector::select_formats(self.backend.as_ref(), &device)?;
        self.configure(device, formats, preview)
    }

    /// Configure the session with an explicit device and format pair
    ///
    /// Only valid before the session runs; a running session is switched
    /// with [`CaptureCoordinator::change_camera`].
    pub fn configure(
        &self,
        device: CaptureDevice,
        formats: (CaptureFormat, DepthFormat),
        preview: Option<Arc<dyn PreviewSink>>,
    ) -> CaptureResult<()> {
        let mut state = lock(&self.state);
        if state.running.is_some() {
            return Err(CaptureError::InvalidState(
                "cannot configure a running session".to_string(),
            ));
        }

        self.validate_input(&device)?;
        let config = self.build_config(device, formats, state.depth_filtering)?;

        info!(
            device = %config.device.name,
            format = %config.format,
            depth_format = %config.depth_format,
            mirrored = config.video_connection.mirrored,
            "Capture session configured"
        );

        state.config = Some(Arc::new(config));
        state.preview = preview;
        state.phase = SessionPhase::Configured;
        Ok(())
    }

    fn validate_input(&self, device: &CaptureDevice) -> CaptureResult<()> {
        self.backend
            .can_add_input(device)
            .map_err(|e| CaptureError::CannotAddInput(e.to_string()))
    }

    fn build_config(
        &self,
        device: CaptureDevice,
        (format, depth_format): (CaptureFormat, DepthFormat),
        depth_filtering: bool,
    ) -> CaptureResult<SessionConfig> {
        for output in OutputKind::ALL {
            if !self.backend.can_add_output(output) {
                return Err(CaptureError::CannotAddOutput(output.to_string()));
            }
        }

        let kinds: Vec<MetadataKind> = self
            .backend
            .available_metadata_kinds(&device)
            .into_iter()
            .filter(|k| *k == MetadataKind::Face)
            .collect();
        if kinds.is_empty() {
            debug!(device = %device.name, "Device offers no face detection");
        }

        let connection = ConnectionSettings::for_facing(device.facing);

        Ok(SessionConfig {
            device,
            format,
            depth_format,
            video: VideoOutputSettings {
                pixel_format: PixelFormat::BGRA,
                discard_late_frames: true,
            },
            depth: DepthOutputSettings {
                enabled: true,
                filtering: depth_filtering,
            },
            metadata: MetadataOutputSettings { kinds },
            video_connection: connection,
            depth_connection: connection,
        })
    }

    // ===== Lifecycle =====

    /// Start streaming; no-op if already running
    pub fn start(&self) -> CaptureResult<()> {
        let mut state = lock(&self.state);
        if state.running.is_some() {
            debug!("Capture session already running");
            return Ok(());
        }
        self.start_locked(&mut state)?;
        state.phase = SessionPhase::Running;
        Ok(())
    }

    /// Stop streaming; no-op if not running
    pub fn stop(&self) {
        let mut state = lock(&self.state);
        if state.running.is_none() {
            debug!("Capture session not running");
            return;
        }
        Self::stop_locked(&mut state);
        state.phase = SessionPhase::Stopped;
    }

    fn start_locked(&self, state: &mut SessionState) -> CaptureResult<()> {
        let config = state.config.clone().ok_or(CaptureError::NotConfigured)?;

        let (sender, receiver) = mpsc::channel();
        let stream = self
            .backend
            .start_stream(&config, OutputSink::new(sender))?;

        let sync_loop = spawn_synchronizer(
            receiver,
            config.video_connection,
            state.preview.clone(),
            Arc::clone(&self.handler),
            Arc::clone(&self.stats),
        );

        info!(device = %config.device.name, "Capture session started");
        state.running = Some(RunningSession { stream, sync_loop });
        Ok(())
    }

    fn stop_locked(state: &mut SessionState) {
        if let Some(mut running) = state.running.take() {
            // Stopping the stream drops its sinks; the synchronizer then
            // drains the channel, flushes and exits on its own.
            running.stream.stop();
            running.sync_loop.join();
            info!("Capture session stopped");
        }
    }

    /// Switch to the camera matching `camera_type`
    ///
    /// The new device and formats are selected and validated before the
    /// session is touched. If the new config fails to start, the previous
    /// config is restored (and restarted if it was running) and the error is
    /// returned.
    pub fn change_camera(&self, camera_type: CameraType) -> CaptureResult<()> {
        let device = CameraSelector::select_device(self.backend.as_ref(), camera_type)?;
        let formats = CameraSelector::select_formats(self.backend.as_ref(), &device)?;
        self.validate_input(&device)?;

        let mut state = lock(&self.state);
        let config = Arc::new(self.build_config(device, formats, state.depth_filtering)?);

        let previous_config = state.config.clone();
        let previous_phase = state.phase;
        let was_running = state.running.is_some();

        info!(
            facing = %camera_type.facing,
            device = %config.device.name,
            was_running,
            "Switching camera"
        );

        state.phase = SessionPhase::Reconfiguring;
        if was_running {
            Self::stop_locked(&mut state);
        }
        state.config = Some(config);

        if !was_running {
            state.phase = match previous_phase {
                SessionPhase::Stopped => SessionPhase::Stopped,
                _ => SessionPhase::Configured,
            };
            return Ok(());
        }

        match self.start_locked(&mut state) {
            Ok(()) => {
                state.phase = SessionPhase::Running;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "New camera failed to start, restoring previous configuration");
                state.config = previous_config;
                state.phase = SessionPhase::Stopped;
                if state.config.is_some() {
                    match self.start_locked(&mut state) {
                        Ok(()) => state.phase = SessionPhase::Running,
                        Err(restore_err) => {
                            warn!(error = %restore_err, "Previous configuration failed to restart")
                        }
                    }
                }
                Err(e)
            }
        }
    }

    /// Enable or disable the depth output's smoothing filter
    pub fn set_depth_filter_enabled(&self, enabled: bool) {
        let mut state = lock(&self.state);
        state.depth_filtering = enabled;

        if let Some(config) = state.config.as_ref() {
            let next = Arc::new(config.with_depth_filtering(enabled));
            state.config = Some(next);
        }
        if let Some(running) = state.running.as_mut() {
            running.stream.set_depth_filtering(enabled);
        }
        debug!(enabled, "Depth filtering updated");
    }
}

impl Drop for CaptureCoordinator {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        Self::stop_locked(state);
    }
}

fn spawn_synchronizer(
    receiver: mpsc::Receiver<OutputEvent>,
    video_connection: ConnectionSettings,
    preview: Option<Arc<dyn PreviewSink>>,
    handler: HandlerSlot,
    stats: Arc<SyncStats>,
) -> LoopController {
    let mut synchronizer = Synchronizer::new(&OutputKind::ALL);

    let deliver = move |collections: Vec<SynchronizedDataCollection>| {
        for collection in collections {
            stats.collections.fetch_add(1, Ordering::SeqCst);
            let Some(tuple) = synchronized_tuple(collection, &video_connection) else {
                continue;
            };
            if let Some(preview) = preview.as_ref() {
                preview.show(&tuple.video);
            }
            stats.tuples.fetch_add(1, Ordering::SeqCst);
            if let Some(handler) = lock(&handler).as_mut() {
                handler(tuple);
            }
        }
    };

    LoopController::start("synchronizer", move || {
        match receiver.recv_timeout(POLL_INTERVAL) {
            Ok(event) => {
                deliver(synchronizer.push(event));
                LoopAction::Continue
            }
            Err(RecvTimeoutError::Timeout) => LoopAction::Continue,
            Err(RecvTimeoutError::Disconnected) => {
                deliver(synchronizer.flush());
                LoopAction::Stop
            }
        }
    })
}

/// Build the tuple for one synchronizer collection
///
/// Returns `None` when the video datum is missing or dropped. A dropped depth
/// datum becomes `None`; the first face object is mapped into the video
/// connection's coordinate space.
pub fn synchronized_tuple(
    collection: SynchronizedDataCollection,
    video_connection: &ConnectionSettings,
) -> Option<SynchronizedFrameTuple> {
    let timestamp = collection.timestamp;

    let video = match collection.video {
        Some(delivery) => match delivery.into_delivered() {
            Some(frame) => frame,
            None => {
                debug!(timestamp_us = timestamp.as_micros() as u64, "Video frame dropped");
                return None;
            }
        },
        None => {
            debug!(timestamp_us = timestamp.as_micros() as u64, "Collection without video");
            return None;
        }
    };

    let depth = collection.depth.and_then(|d| d.into_delivered());
    if depth.is_none() {
        debug!(timestamp_us = timestamp.as_micros() as u64, "Depth data dropped");
    }

    let face = collection
        .metadata
        .unwrap_or_default()
        .into_iter()
        .find(|object| object.kind == MetadataKind::Face)
        .map(|object| video_connection.transform_rect(&object.bounds));

    Some(SynchronizedFrameTuple {
        video,
        depth,
        face,
        timestamp,
    })
}
