// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer for depth-capable capture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │        Coordinator / processing stage        │
//! └────────────────────┬────────────────────────┘
//!                      │ OutputSink events
//! ┌────────────────────┴────────────────────────┐
//! │          CaptureBackend (trait)              │
//! │  ┌──────────────────────────────────────┐   │
//! │  │  Synthetic (rendered scene + depth)  │   │
//! │  └──────────────────────────────────────┘   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: device selection, capture session and frame synchronization

pub mod camera;
