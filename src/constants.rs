// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use crate::backends::camera::types::DepthDataType;
use std::time::Duration;

/// Maximum number of render submissions outstanding with the GPU
pub const MAX_BUFFERS_IN_FLIGHT: usize = 1;

/// The only depth encoding format selection accepts
pub const TARGET_DEPTH_TYPE: DepthDataType = DepthDataType::DepthFloat32;

/// Synchronizer tuning
pub mod sync {
    use super::Duration;

    /// How long the synchronizer thread waits for an event before re-checking its stop signal
    pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

    /// Incomplete collections kept before the oldest is flushed as-is
    pub const MAX_PENDING: usize = 4;
}

/// Processing worker tuning
pub mod processing {
    use super::Duration;

    /// How long the processing worker waits for a job before re-checking its stop signal
    pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

    /// Tuples waiting for the worker; later arrivals are dropped while full
    pub const QUEUE_DEPTH: usize = 2;
}

/// Display refresh defaults
pub mod display {
    /// Default display refresh rate driving the render tick
    pub const DEFAULT_FPS: u32 = 60;

    /// Default drawable width (portrait)
    pub const DEFAULT_WIDTH: u32 = 360;

    /// Default drawable height (portrait)
    pub const DEFAULT_HEIGHT: u32 = 640;
}

/// Depth visualization ranges
pub mod depth {
    /// Number of histogram bins used by equalization
    pub const HISTOGRAM_BINS: usize = 256;

    /// Number of quantization bands for the banded colormap
    pub const COLORMAP_BANDS: f32 = 32.0;
}

/// Synthetic capture backend defaults
pub mod synthetic {
    /// Default frame rate of the synthetic camera
    pub const DEFAULT_FPS: u32 = 30;

    /// Nearest simulated surface distance in meters
    pub const NEAR_M: f32 = 0.3;

    /// Farthest simulated surface distance in meters
    pub const FAR_M: f32 = 2.5;
}
