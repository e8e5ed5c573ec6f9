// SPDX-License-Identifier: GPL-3.0-only

//! In-flight frame budget
//!
//! A counting semaphore bounding the number of presented frames whose GPU
//! work has not completed yet. A permit is an RAII guard: it returns to the
//! budget when dropped, whichever path drops it.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

/// Counting semaphore over render submissions
#[derive(Debug, Clone)]
pub struct InFlightBudget {
    semaphore: Arc<Semaphore>,
    bound: usize,
    peak: Arc<AtomicUsize>,
}

/// One unit of the budget, released on drop
#[derive(Debug)]
pub struct InFlightPermit {
    _permit: OwnedSemaphorePermit,
}

impl InFlightBudget {
    pub fn new(bound: usize) -> Self {
        let bound = bound.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(bound)),
            bound,
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn bound(&self) -> usize {
        self.bound
    }

    /// Permits currently held
    pub fn in_flight(&self) -> usize {
        self.bound.saturating_sub(self.semaphore.available_permits())
    }

    /// Highest number of permits ever held at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn record(&self, permit: OwnedSemaphorePermit) -> InFlightPermit {
        self.peak.fetch_max(self.in_flight(), Ordering::SeqCst);
        InFlightPermit { _permit: permit }
    }

    /// Block until a permit is free
    ///
    /// Returns `None` once the budget has been closed.
    pub fn acquire(&self) -> Option<InFlightPermit> {
        match pollster::block_on(Arc::clone(&self.semaphore).acquire_owned()) {
            Ok(permit) => Some(self.record(permit)),
            Err(_) => {
                warn!("In-flight budget closed");
                None
            }
        }
    }

    /// Take a permit if one is free right now
    pub fn try_acquire(&self) -> Option<InFlightPermit> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| self.record(permit))
    }

    /// Wake every blocked and future `acquire` with `None`
    pub fn close(&self) {
        debug!("Closing in-flight budget");
        self.semaphore.close();
    }
}
