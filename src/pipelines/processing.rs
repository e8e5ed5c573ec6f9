// SPDX-License-Identifier: GPL-3.0-only

//! Frame processing stage
//!
//! Sits between the capture coordinator and the renderer:
//!
//! ```text
//! synchronizer thread          processing worker              display link
//! ───────────────────          ─────────────────              ────────────
//! tuple ─▶ snapshot toggles ─▶ convert ─▶ visualize ─▶ eq ─▶ RenderableSlot ─▶ present
//!          (at arrival)        (FIFO, one job at a time)      (latest wins)
//! ```
//!
//! Toggles are read when a tuple arrives, so flipping a toggle only affects
//! tuples delivered afterwards. The job queue is bounded: a tuple arriving
//! while it is full is dropped and counted. The renderable slot holds one
//! image; each store replaces the previous one.

use crate::backends::camera::coordinator::{SynchronizedFrameTuple, TupleHandler};
use crate::backends::camera::frame_loop::{LoopAction, LoopController};
use crate::backends::camera::types::{DepthRepresentation, FaceRegion, Size};
use crate::constants::processing::{POLL_INTERVAL, QUEUE_DEPTH};
use crate::pipelines::depth::convert::DepthRepresentationConverter;
use crate::pipelines::depth::equalize::ImageFilter;
use crate::pipelines::depth::visualization::{Colormap, transformed_image};
use image::RgbaImage;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A processed image ready for display
#[derive(Debug, Clone)]
pub struct RenderableImage {
    pub image: RgbaImage,
    /// Assigned by the slot on store, strictly increasing
    pub sequence: u64,
    pub timestamp: Duration,
    pub representation: DepthRepresentation,
    pub face: Option<FaceRegion>,
}

impl RenderableImage {
    pub fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }
}

/// Single-image mailbox shared by the processing worker and the renderer
#[derive(Debug, Default)]
pub struct RenderableSlot {
    inner: Mutex<Option<Arc<RenderableImage>>>,
    next_sequence: AtomicU64,
}

impl RenderableSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the slot content, returning the sequence number assigned
    pub fn store(&self, mut image: RenderableImage) -> u64 {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        image.sequence = sequence;
        *lock(&self.inner) = Some(Arc::new(image));
        sequence
    }

    /// The most recently stored image
    pub fn latest(&self) -> Option<Arc<RenderableImage>> {
        lock(&self.inner).clone()
    }
}

/// Current drawable size, written by the renderer and read by processing
#[derive(Debug, Default)]
pub struct DrawableSize {
    inner: Mutex<Size>,
}

impl DrawableSize {
    pub fn new(size: Size) -> Self {
        Self {
            inner: Mutex::new(size),
        }
    }

    pub fn get(&self) -> Size {
        *lock(&self.inner)
    }

    pub fn set(&self, size: Size) {
        *lock(&self.inner) = size;
    }
}

/// User toggles read by the pipeline
#[derive(Debug, Default)]
pub struct UiToggles {
    use_disparity: AtomicBool,
    apply_equalization: AtomicBool,
    depth_filter_enabled: AtomicBool,
}

/// Options captured from [`UiToggles`] when a tuple arrives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessingOptions {
    pub use_disparity: bool,
    pub apply_equalization: bool,
}

impl UiToggles {
    pub fn new(use_disparity: bool, apply_equalization: bool, depth_filter_enabled: bool) -> Self {
        Self {
            use_disparity: AtomicBool::new(use_disparity),
            apply_equalization: AtomicBool::new(apply_equalization),
            depth_filter_enabled: AtomicBool::new(depth_filter_enabled),
        }
    }

    pub fn snapshot(&self) -> ProcessingOptions {
        ProcessingOptions {
            use_disparity: self.use_disparity.load(Ordering::SeqCst),
            apply_equalization: self.apply_equalization.load(Ordering::SeqCst),
        }
    }

    pub fn set_use_disparity(&self, enabled: bool) {
        self.use_disparity.store(enabled, Ordering::SeqCst);
    }

    pub fn set_apply_equalization(&self, enabled: bool) {
        self.apply_equalization.store(enabled, Ordering::SeqCst);
    }

    /// Stored for the caller to forward to the capture coordinator
    pub fn set_depth_filter_enabled(&self, enabled: bool) {
        self.depth_filter_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn depth_filter_enabled(&self) -> bool {
        self.depth_filter_enabled.load(Ordering::SeqCst)
    }
}

/// Counters of the processing stage
#[derive(Debug, Default)]
pub struct ProcessingStats {
    submitted: AtomicU64,
    dropped_busy: AtomicU64,
    rendered: AtomicU64,
    skipped_without_depth: AtomicU64,
    skipped_no_surface: AtomicU64,
}

impl ProcessingStats {
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Tuples dropped because the worker queue was full
    pub fn dropped_busy(&self) -> u64 {
        self.dropped_busy.load(Ordering::SeqCst)
    }

    pub fn rendered(&self) -> u64 {
        self.rendered.load(Ordering::SeqCst)
    }

    pub fn skipped_without_depth(&self) -> u64 {
        self.skipped_without_depth.load(Ordering::SeqCst)
    }

    pub fn skipped_no_surface(&self) -> u64 {
        self.skipped_no_surface.load(Ordering::SeqCst)
    }

    /// Jobs the worker has finished, whatever their outcome
    pub fn completed(&self) -> u64 {
        self.rendered() + self.skipped_without_depth() + self.skipped_no_surface()
    }
}

/// Convert, visualize and optionally equalize one tuple
///
/// Returns `None` when the tuple carries no depth or the target is empty.
/// The returned image has sequence 0; the slot assigns the real one.
pub fn process(
    tuple: &SynchronizedFrameTuple,
    options: ProcessingOptions,
    target_size: Size,
    filter: &dyn ImageFilter,
    colormap: Colormap,
) -> Option<RenderableImage> {
    let depth = tuple.depth.as_ref()?;
    let converted = if options.use_disparity {
        DepthRepresentationConverter::to_disparity(depth)
    } else {
        DepthRepresentationConverter::to_depth(depth)
    };

    let image = transformed_image(&converted, target_size, 0, colormap)?;
    let image = if options.apply_equalization {
        filter.apply(&image)
    } else {
        image
    };

    Some(RenderableImage {
        image,
        sequence: 0,
        timestamp: tuple.timestamp,
        representation: converted.representation,
        face: tuple.face.clone(),
    })
}

type Job = (SynchronizedFrameTuple, ProcessingOptions);

/// Runs [`process`] on a dedicated worker thread and feeds the slot
pub struct FrameProcessingStage {
    toggles: Arc<UiToggles>,
    slot: Arc<RenderableSlot>,
    drawable: Arc<DrawableSize>,
    stats: Arc<ProcessingStats>,
    sender: mpsc::SyncSender<Job>,
    worker: Mutex<LoopController>,
}

impl FrameProcessingStage {
    pub fn new(
        toggles: Arc<UiToggles>,
        slot: Arc<RenderableSlot>,
        drawable: Arc<DrawableSize>,
        filter: Arc<dyn ImageFilter>,
        colormap: Colormap,
    ) -> Self {
        let (sender, receiver) = mpsc::sync_channel::<Job>(QUEUE_DEPTH);
        let stats = Arc::new(ProcessingStats::default());

        info!(filter = filter.name(), colormap = ?colormap, "Starting frame processing stage");

        let worker_slot = Arc::clone(&slot);
        let worker_drawable = Arc::clone(&drawable);
        let worker_stats = Arc::clone(&stats);
        let worker = LoopController::start("processing", move || {
            match receiver.recv_timeout(POLL_INTERVAL) {
                Ok((tuple, options)) => {
                    run_job(
                        &tuple,
                        options,
                        worker_drawable.get(),
                        filter.as_ref(),
                        colormap,
                        &worker_slot,
                        &worker_stats,
                    );
                    LoopAction::Continue
                }
                Err(RecvTimeoutError::Timeout) => LoopAction::Continue,
                Err(RecvTimeoutError::Disconnected) => LoopAction::Stop,
            }
        });

        Self {
            toggles,
            slot,
            drawable,
            stats,
            sender,
            worker: Mutex::new(worker),
        }
    }

    pub fn toggles(&self) -> &Arc<UiToggles> {
        &self.toggles
    }

    pub fn slot(&self) -> &Arc<RenderableSlot> {
        &self.slot
    }

    pub fn drawable(&self) -> &Arc<DrawableSize> {
        &self.drawable
    }

    pub fn stats(&self) -> &Arc<ProcessingStats> {
        &self.stats
    }

    /// Tuple consumer to register with the capture coordinator
    pub fn handler(&self) -> TupleHandler {
        let sender = self.sender.clone();
        let toggles = Arc::clone(&self.toggles);
        let stats = Arc::clone(&self.stats);

        Box::new(move |tuple: SynchronizedFrameTuple| {
            let options = toggles.snapshot();
            trace!(
                timestamp_us = tuple.timestamp.as_micros() as u64,
                use_disparity = options.use_disparity,
                apply_equalization = options.apply_equalization,
                "Tuple queued for processing"
            );
            match sender.try_send((tuple, options)) {
                Ok(()) => {
                    stats.submitted.fetch_add(1, Ordering::SeqCst);
                }
                Err(TrySendError::Full((tuple, _))) => {
                    debug!(
                        timestamp_us = tuple.timestamp.as_micros() as u64,
                        "Processing queue full, tuple dropped"
                    );
                    stats.dropped_busy.fetch_add(1, Ordering::SeqCst);
                }
                Err(TrySendError::Disconnected(_)) => {
                    warn!("Processing worker gone, tuple discarded");
                }
            }
        })
    }

    /// Stop the worker thread; queued tuples are discarded
    pub fn shutdown(&self) {
        lock(&self.worker).stop();
    }
}

fn run_job(
    tuple: &SynchronizedFrameTuple,
    options: ProcessingOptions,
    target: Size,
    filter: &dyn ImageFilter,
    colormap: Colormap,
    slot: &RenderableSlot,
    stats: &ProcessingStats,
) {
    if tuple.depth.is_none() {
        debug!(
            timestamp_us = tuple.timestamp.as_micros() as u64,
            "No depth for tuple, keeping previous image"
        );
        stats.skipped_without_depth.fetch_add(1, Ordering::SeqCst);
        return;
    }

    match process(tuple, options, target, filter, colormap) {
        Some(image) => {
            let sequence = slot.store(image);
            stats.rendered.fetch_add(1, Ordering::SeqCst);
            trace!(sequence, "Renderable image stored");
        }
        None => {
            debug!(target = %target, "Drawable not ready, skipping tuple");
            stats.skipped_no_surface.fetch_add(1, Ordering::SeqCst);
        }
    }
}
