// SPDX-License-Identifier: GPL-3.0-only

//! Capture backend abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  FrameProcessing    │  ← consumes SynchronizedFrameTuple
//! └──────────▲──────────┘
//!            │
//! ┌──────────┴──────────┐
//! │ CaptureCoordinator  │  ← session lifecycle, synchronizer thread
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │ CaptureBackend Trait│  ← devices, formats, output streams
//! └──────────┬──────────┘
//!            │
//!            ▼
//!      ┌───────────┐
//!      │ Synthetic │  ← virtual depth camera
//!      └───────────┘
//! ```

pub mod coordinator;
pub mod frame_loop;
pub mod selector;
pub mod synchronizer;
pub mod synthetic;
pub mod types;

pub use coordinator::{
    CaptureCoordinator, PreviewSink, SessionConfig, SessionPhase, SynchronizedFrameTuple,
    TupleHandler,
};
pub use selector::CameraSelector;
pub use synchronizer::{Delivery, DropReason, OutputEvent, OutputKind, OutputSink};
pub use synthetic::SyntheticBackend;
pub use types::*;

/// Capture hardware as seen by the coordinator
///
/// A backend enumerates devices and their formats, answers whether inputs
/// and outputs can be attached, and starts streams that push
/// [`OutputEvent`]s for the three outputs of a [`SessionConfig`].
pub trait CaptureBackend: Send + Sync {
    /// Short backend name for logging
    fn name(&self) -> &str;

    // ===== Enumeration =====

    /// Devices with the given facing whose kind is in `kinds`, in `kinds` order
    fn discover_devices(&self, facing: Facing, kinds: &[DeviceKind]) -> Vec<CaptureDevice>;

    /// The platform's default video device, if any
    fn default_video_device(&self) -> Option<CaptureDevice>;

    /// Video formats of `device`, each listing its companion depth formats
    fn supported_formats(&self, device: &CaptureDevice) -> Vec<CaptureFormat>;

    /// Metadata kinds the device's metadata output can detect
    fn available_metadata_kinds(&self, device: &CaptureDevice) -> Vec<MetadataKind>;

    // ===== Session validation =====

    /// Check that `device` can be attached as the session input
    fn can_add_input(&self, device: &CaptureDevice) -> BackendResult<()>;

    /// Check that an output of this kind can be attached to the session
    fn can_add_output(&self, output: OutputKind) -> bool;

    // ===== Streaming =====

    /// Start streaming `config`, pushing every output event into `sink`
    fn start_stream(
        &self,
        config: &SessionConfig,
        sink: OutputSink,
    ) -> BackendResult<Box<dyn CaptureStream>>;
}

/// A running capture stream
pub trait CaptureStream: Send {
    /// Toggle the depth output's smoothing filter on the live stream
    fn set_depth_filtering(&mut self, enabled: bool);

    /// Stop delivering events and release the device
    fn stop(&mut self);
}
