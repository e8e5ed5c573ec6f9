// SPDX-License-Identifier: GPL-3.0-only

//! Display refresh timer
//!
//! Calls a tick callback once per refresh interval on its own thread. Ticks
//! that overrun the interval delay the next one instead of queueing.

use crate::backends::camera::frame_loop::{LoopAction, LoopController};
use std::time::{Duration, Instant};
use tracing::info;

/// Fixed-rate tick driver
pub struct DisplayLink {
    controller: LoopController,
    interval: Duration,
}

impl DisplayLink {
    /// Start ticking at `fps` refreshes per second
    pub fn start<F>(fps: u32, mut on_tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let interval = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
        info!(fps, "Starting display link");

        let mut next_tick = Instant::now();
        let controller = LoopController::start("display-link", move || {
            let now = Instant::now();
            if now < next_tick {
                std::thread::sleep(next_tick - now);
            }
            on_tick();
            next_tick = (next_tick + interval).max(Instant::now());
            LoopAction::Continue
        });

        Self {
            controller,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.controller.is_running()
    }

    /// Signal the link to stop without waiting for the current tick
    pub fn request_stop(&self) {
        self.controller.request_stop();
    }

    pub fn stop(&mut self) {
        self.controller.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_ticks_at_rate() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ticks);
        let mut link = DisplayLink::start(200, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(link.interval(), Duration::from_millis(5));

        std::thread::sleep(Duration::from_millis(100));
        link.stop();
        let count = ticks.load(Ordering::SeqCst);
        assert!(count >= 5, "only {} ticks", count);
        assert!(count <= 25, "{} ticks", count);
        assert!(!link.is_running());
    }
}
