// SPDX-License-Identifier: GPL-3.0-only

//! Offscreen display surface
//!
//! A CPU canvas standing in for a window. Presented frames are queued to a
//! dedicated "gpu" thread that waits a configurable latency, copies the frame
//! to the front buffer and then runs the completion handler, like a GPU queue
//! signalling finished work.

use super::{CompletionHandler, DisplaySurface, RenderTarget};
use crate::backends::camera::frame_loop::{LoopAction, LoopController};
use crate::backends::camera::types::Size;
use crate::constants::processing::POLL_INTERVAL;
use image::RgbaImage;
use image::imageops::{self, FilterType};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Submission {
    frame: RgbaImage,
    on_complete: CompletionHandler,
}

#[derive(Debug, Default)]
struct Shared {
    size: Mutex<Size>,
    ready: AtomicBool,
    front: Mutex<Option<RgbaImage>>,
    completed: AtomicU64,
    discard_completions: AtomicBool,
}

/// Test and inspection handle onto an [`OffscreenSurface`]
#[derive(Debug, Clone)]
pub struct OffscreenHandle {
    shared: Arc<Shared>,
}

impl OffscreenHandle {
    /// Change the drawable size (a zero size makes the surface not ready)
    pub fn set_drawable_size(&self, size: Size) {
        *lock(&self.shared.size) = size;
    }

    /// Simulate a surface without drawables
    pub fn set_ready(&self, ready: bool) {
        self.shared.ready.store(ready, Ordering::SeqCst);
    }

    /// Drop completion handlers instead of calling them
    pub fn set_discard_completions(&self, discard: bool) {
        self.shared.discard_completions.store(discard, Ordering::SeqCst);
    }

    /// The last frame the "gpu" finished
    pub fn front_buffer(&self) -> Option<RgbaImage> {
        lock(&self.shared.front).clone()
    }

    /// Frames the "gpu" finished
    pub fn completed_frames(&self) -> u64 {
        self.shared.completed.load(Ordering::SeqCst)
    }
}

/// CPU-backed display surface with asynchronous completion
pub struct OffscreenSurface {
    shared: Arc<Shared>,
    queue: mpsc::Sender<Submission>,
    _gpu: LoopController,
}

impl OffscreenSurface {
    /// Surface of `size` whose frames complete after `latency`
    pub fn new(size: Size, latency: Duration) -> Self {
        let shared = Arc::new(Shared {
            size: Mutex::new(size),
            ready: AtomicBool::new(true),
            ..Default::default()
        });
        let (queue, submissions) = mpsc::channel::<Submission>();

        info!(size = %size, latency_ms = latency.as_millis() as u64, "Creating offscreen surface");

        let gpu_shared = Arc::clone(&shared);
        let gpu = LoopController::start("offscreen-gpu", move || {
            match submissions.recv_timeout(POLL_INTERVAL) {
                Ok(submission) => {
                    if !latency.is_zero() {
                        std::thread::sleep(latency);
                    }
                    *lock(&gpu_shared.front) = Some(submission.frame);
                    gpu_shared.completed.fetch_add(1, Ordering::SeqCst);
                    if gpu_shared.discard_completions.load(Ordering::SeqCst) {
                        debug!("Discarding completion handler");
                        drop(submission.on_complete);
                    } else {
                        (submission.on_complete)();
                    }
                    LoopAction::Continue
                }
                Err(RecvTimeoutError::Timeout) => LoopAction::Continue,
                Err(RecvTimeoutError::Disconnected) => LoopAction::Stop,
            }
        });

        Self {
            shared,
            queue,
            _gpu: gpu,
        }
    }

    pub fn handle(&self) -> OffscreenHandle {
        OffscreenHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl DisplaySurface for OffscreenSurface {
    fn drawable_size(&self) -> Size {
        *lock(&self.shared.size)
    }

    fn next_target(&mut self) -> Option<Box<dyn RenderTarget>> {
        let size = self.drawable_size();
        if size.is_empty() || !self.shared.ready.load(Ordering::SeqCst) {
            return None;
        }
        Some(Box::new(OffscreenTarget {
            canvas: RgbaImage::new(size.width, size.height),
            queue: self.queue.clone(),
        }))
    }
}

struct OffscreenTarget {
    canvas: RgbaImage,
    queue: mpsc::Sender<Submission>,
}

impl RenderTarget for OffscreenTarget {
    fn size(&self) -> Size {
        Size::new(self.canvas.width(), self.canvas.height())
    }

    fn draw(&mut self, image: &RgbaImage) {
        if image.dimensions() == self.canvas.dimensions() {
            self.canvas.copy_from_slice(image.as_raw());
        } else {
            self.canvas = imageops::resize(
                image,
                self.canvas.width(),
                self.canvas.height(),
                FilterType::Nearest,
            );
        }
    }

    fn present(self: Box<Self>, on_complete: CompletionHandler) {
        let OffscreenTarget { canvas, queue } = *self;
        let submission = Submission {
            frame: canvas,
            on_complete,
        };
        if queue.send(submission).is_err() {
            debug!("Offscreen gpu thread gone, frame discarded");
        }
    }
}
