// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle management for pipeline stage loops
//!
//! The capture stream, the synchronizer, the processing worker and the
//! display link each run a loop on their own named thread. This module gives
//! them one way to start, signal and join those threads.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Action returned by a loop iteration to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Run another iteration
    Continue,
    /// Leave the loop
    Stop,
}

/// Controller for a stage loop running on a dedicated thread
///
/// Dropping the controller stops the loop and joins the thread.
///
/// ```ignore
/// let mut worker = LoopController::start("processing", move || {
///     match jobs.recv_timeout(POLL_INTERVAL) {
///         Ok(job) => { run(job); LoopAction::Continue }
///         Err(RecvTimeoutError::Timeout) => LoopAction::Continue,
///         Err(RecvTimeoutError::Disconnected) => LoopAction::Stop,
///     }
/// });
/// worker.stop();
/// ```
pub struct LoopController {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl LoopController {
    /// Spawn `depthcam-<name>` and call `loop_fn` until it returns
    /// [`LoopAction::Stop`] or the controller is stopped.
    pub fn start<F>(name: &str, mut loop_fn: F) -> Self
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        Self::start_with_init(name, || Ok(()), move |_: &mut ()| loop_fn())
    }

    /// Like [`LoopController::start`], with per-thread state built by `init_fn`
    ///
    /// If initialization fails the thread exits without running the loop.
    pub fn start_with_init<S, I, F>(name: &str, init_fn: I, mut loop_fn: F) -> Self
    where
        S: 'static,
        I: FnOnce() -> Result<S, String> + Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop_signal);
        let thread_name = name.to_string();

        info!(name = %name, "Starting stage loop");

        let spawned = thread::Builder::new()
            .name(format!("depthcam-{}", name))
            .spawn(move || {
                let mut state = match init_fn() {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(name = %thread_name, error = %e, "Stage loop initialization failed");
                        return;
                    }
                };

                while !thread_stop.load(Ordering::SeqCst) {
                    if loop_fn(&mut state) == LoopAction::Stop {
                        debug!(name = %thread_name, "Stage loop requested stop");
                        break;
                    }
                }

                debug!(name = %thread_name, "Stage loop thread exiting");
            });

        let thread_handle = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(name = %name, error = %e, "Failed to spawn stage loop thread");
                None
            }
        };

        Self {
            thread_handle,
            stop_signal,
            name: name.to_string(),
        }
    }

    /// Check if the loop thread is still alive
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop without waiting
    pub fn request_stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Signal the loop to stop and join its thread
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Join the thread without signalling (for loops that end themselves)
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            if handle.thread().id() == thread::current().id() {
                // A loop stopping itself from inside its own iteration
                return;
            }
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Stage loop thread panicked: {:?}", e);
            }
        }
    }
}

impl Drop for LoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_loop_ends_itself() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut controller = LoopController::start("test-self-stop", move || {
            if counter_clone.fetch_add(1, Ordering::SeqCst) >= 4 {
                LoopAction::Stop
            } else {
                LoopAction::Continue
            }
        });

        controller.join();
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_stop_joins_channel_consumer() {
        let (tx, rx) = mpsc::channel::<u32>();
        let received = Arc::new(AtomicU32::new(0));
        let received_clone = Arc::clone(&received);

        let mut controller = LoopController::start("test-consumer", move || {
            if let Ok(v) = rx.recv_timeout(Duration::from_millis(5)) {
                received_clone.fetch_add(v, Ordering::SeqCst);
            }
            LoopAction::Continue
        });

        tx.send(2).unwrap();
        tx.send(3).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        controller.stop();
        assert!(!controller.is_running());
        assert_eq!(received.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_failed_init_skips_loop() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);

        let mut controller = LoopController::start_with_init(
            "test-fail-init",
            || Err::<(), _>("no device".to_string()),
            move |_: &mut ()| {
                ran_clone.store(true, Ordering::SeqCst);
                LoopAction::Stop
            },
        );

        controller.join();
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_state_is_threaded_through_iterations() {
        let result = Arc::new(AtomicU32::new(0));
        let result_clone = Arc::clone(&result);

        let mut controller = LoopController::start_with_init(
            "test-state",
            || Ok(0u32),
            move |frames| {
                *frames += 1;
                if *frames == 3 {
                    result_clone.store(*frames, Ordering::SeqCst);
                    LoopAction::Stop
                } else {
                    LoopAction::Continue
                }
            },
        );

        controller.join();
        assert_eq!(result.load(Ordering::SeqCst), 3);
    }
}
