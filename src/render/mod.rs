// SPDX-License-Identifier: GPL-3.0-only

//! Budgeted presentation of processed depth images
//!
//! The renderer presents the latest [`RenderableImage`] once per display
//! refresh. Each presentation holds one [`InFlightBudget`] permit until the
//! surface reports that the GPU finished with the frame, so the CPU never
//! runs more than the budget ahead of the GPU.
//!
//! ```text
//! DisplayLink tick
//!   └─▶ present_tick()
//!         ├─ slot empty ─────────────▶ NoImage
//!         ├─ acquire permit (blocks)
//!         ├─ surface.next_target()
//!         │     └─ none ─▶ drop permit ─▶ SurfaceNotReady
//!         ├─ target.draw(image)
//!         └─ target.present(completion owns permit) ─▶ Presented
//! ```

pub mod budget;
pub mod display_link;
pub mod offscreen;

pub use budget::{InFlightBudget, InFlightPermit};
pub use display_link::DisplayLink;
pub use offscreen::{OffscreenHandle, OffscreenSurface};

use crate::backends::camera::types::Size;
use crate::pipelines::processing::{DrawableSize, RenderableImage, RenderableSlot};
use image::RgbaImage;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Called once when the GPU finished with a presented frame
pub type CompletionHandler = Box<dyn FnOnce() + Send>;

/// One drawable acquired from a surface
pub trait RenderTarget: Send {
    fn size(&self) -> Size;

    /// Draw `image` over the full extent of the target
    fn draw(&mut self, image: &RgbaImage);

    /// Submit the drawing; `on_complete` runs when the GPU work is done
    ///
    /// Dropping `on_complete` without calling it also releases whatever it
    /// owns.
    fn present(self: Box<Self>, on_complete: CompletionHandler);
}

/// A display surface handing out render targets
pub trait DisplaySurface: Send {
    fn drawable_size(&self) -> Size;

    /// Next drawable, `None` when the surface is not ready
    fn next_target(&mut self) -> Option<Box<dyn RenderTarget>>;
}

/// Result of one display tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The slot holds no image yet
    NoImage,
    /// The surface had no drawable; the permit was returned
    SurfaceNotReady,
    /// The image with this sequence number was submitted
    Presented(u64),
    /// The budget was closed while waiting
    BudgetClosed,
}

/// Presentation counters
#[derive(Debug, Default)]
pub struct RenderStats {
    presented: AtomicU64,
    completed: AtomicU64,
}

impl RenderStats {
    pub fn presented(&self) -> u64 {
        self.presented.load(Ordering::SeqCst)
    }

    /// Frames whose completion handler ran
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }
}

/// Presents the renderable slot on a display surface
pub struct GpuRenderer<S: DisplaySurface> {
    surface: S,
    slot: Arc<RenderableSlot>,
    drawable: Arc<DrawableSize>,
    budget: InFlightBudget,
    stats: Arc<RenderStats>,
}

impl<S: DisplaySurface> GpuRenderer<S> {
    pub fn new(
        surface: S,
        slot: Arc<RenderableSlot>,
        drawable: Arc<DrawableSize>,
        budget: InFlightBudget,
    ) -> Self {
        drawable.set(surface.drawable_size());
        Self {
            surface,
            slot,
            drawable,
            budget,
            stats: Arc::new(RenderStats::default()),
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn budget(&self) -> &InFlightBudget {
        &self.budget
    }

    pub fn stats(&self) -> &Arc<RenderStats> {
        &self.stats
    }

    /// Record the new drawable size for the processing stage
    pub fn on_surface_resize(&mut self, size: Size) {
        debug!(size = %size, "Drawable size changed");
        self.drawable.set(size);
    }

    /// Present the latest image if there is one
    pub fn present_tick(&mut self) -> TickOutcome {
        let Some(image) = self.slot.latest() else {
            return TickOutcome::NoImage;
        };
        self.present(&image)
    }

    fn present(&mut self, image: &RenderableImage) -> TickOutcome {
        let Some(permit) = self.budget.acquire() else {
            return TickOutcome::BudgetClosed;
        };

        let Some(mut target) = self.surface.next_target() else {
            trace!("No drawable available");
            drop(permit);
            return TickOutcome::SurfaceNotReady;
        };

        target.draw(&image.image);

        let stats = Arc::clone(&self.stats);
        target.present(Box::new(move || {
            stats.completed.fetch_add(1, Ordering::SeqCst);
            drop(permit);
        }));
        self.stats.presented.fetch_add(1, Ordering::SeqCst);

        trace!(sequence = image.sequence, "Frame presented");
        TickOutcome::Presented(image.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::DepthRepresentation;
    use std::time::Duration;

    struct NeverReady;

    impl DisplaySurface for NeverReady {
        fn drawable_size(&self) -> Size {
            Size::new(4, 4)
        }

        fn next_target(&mut self) -> Option<Box<dyn RenderTarget>> {
            None
        }
    }

    /// Surface whose targets drop the completion handler without calling it
    struct Forgetful;

    struct ForgetfulTarget;

    impl RenderTarget for ForgetfulTarget {
        fn size(&self) -> Size {
            Size::new(4, 4)
        }

        fn draw(&mut self, _image: &RgbaImage) {}

        fn present(self: Box<Self>, on_complete: CompletionHandler) {
            drop(on_complete);
        }
    }

    impl DisplaySurface for Forgetful {
        fn drawable_size(&self) -> Size {
            Size::new(4, 4)
        }

        fn next_target(&mut self) -> Option<Box<dyn RenderTarget>> {
            Some(Box::new(ForgetfulTarget))
        }
    }

    fn slot_with_image() -> Arc<RenderableSlot> {
        let slot = Arc::new(RenderableSlot::new());
        slot.store(RenderableImage {
            image: RgbaImage::new(4, 4),
            sequence: 0,
            timestamp: Duration::ZERO,
            representation: DepthRepresentation::Depth,
            face: None,
        });
        slot
    }

    #[test]
    fn test_empty_slot_does_not_touch_budget() {
        let budget = InFlightBudget::new(1);
        let mut renderer = GpuRenderer::new(
            NeverReady,
            Arc::new(RenderableSlot::new()),
            Arc::new(DrawableSize::default()),
            budget.clone(),
        );
        assert_eq!(renderer.present_tick(), TickOutcome::NoImage);
        assert_eq!(budget.peak_in_flight(), 0);
    }

    #[test]
    fn test_surface_not_ready_returns_permit() {
        let budget = InFlightBudget::new(1);
        let mut renderer = GpuRenderer::new(
            NeverReady,
            slot_with_image(),
            Arc::new(DrawableSize::default()),
            budget.clone(),
        );
        assert_eq!(renderer.present_tick(), TickOutcome::SurfaceNotReady);
        assert_eq!(renderer.present_tick(), TickOutcome::SurfaceNotReady);
        assert_eq!(budget.in_flight(), 0);
    }

    #[test]
    fn test_dropped_completion_releases_permit() {
        let budget = InFlightBudget::new(1);
        let mut renderer = GpuRenderer::new(
            Forgetful,
            slot_with_image(),
            Arc::new(DrawableSize::default()),
            budget.clone(),
        );
        assert_eq!(renderer.present_tick(), TickOutcome::Presented(1));
        assert_eq!(renderer.present_tick(), TickOutcome::Presented(1));
        assert_eq!(budget.in_flight(), 0);
        assert_eq!(renderer.stats().completed(), 0);
    }

    #[test]
    fn test_resize_updates_shared_drawable() {
        let drawable = Arc::new(DrawableSize::default());
        let mut renderer = GpuRenderer::new(
            NeverReady,
            Arc::new(RenderableSlot::new()),
            Arc::clone(&drawable),
            InFlightBudget::new(1),
        );
        assert_eq!(drawable.get(), Size::new(4, 4));
        renderer.on_surface_resize(Size::new(8, 2));
        assert_eq!(drawable.get(), Size::new(8, 2));
    }
}
