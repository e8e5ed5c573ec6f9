// SPDX-License-Identifier: GPL-3.0-only

//! depthcam - synchronized video, depth and face capture with live depth rendering
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Capture backends, device selection, capture session and synchronization
//! - [`pipelines`]: Depth conversion, live frame processing and still depth photos
//! - [`render`]: Budgeted presentation driven by a display link
//! - [`config`]: User configuration handling
//! - `gpu` (feature `gpu`): wgpu texture surface for the renderer
//!
//! # Example
//!
//! ```ignore
//! // Live preview from the synthetic camera, writing the last frame as PNG:
//! // depthcam live --frames 90
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod pipelines;
pub mod render;

// Re-export commonly used types
pub use backends::camera::{CameraSelector, CaptureCoordinator, SessionConfig, SyntheticBackend};
pub use config::Config;
pub use errors::{AppError, AppResult, CaptureError, PhotoError};
pub use pipelines::depth::DepthRepresentationConverter;
pub use pipelines::processing::FrameProcessingStage;
pub use render::{GpuRenderer, InFlightBudget};
