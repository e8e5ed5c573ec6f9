// SPDX-License-Identifier: GPL-3.0-only

//! Processing pipelines for live depth and still depth photos
//!
//! ```text
//! ┌────────────────┐     ┌────────────────────┐     ┌────────────────┐
//! │ Frame tuple    │ ──▶ │ Processing stage   │ ──▶ │ Renderable     │
//! │ (video, depth, │     │ - convert repr.    │     │ slot (latest)  │
//! │  face)         │     │ - colorize/rotate  │     │                │
//! │                │     │ - equalize         │     │                │
//! └────────────────┘     └────────────────────┘     └────────────────┘
//!
//! ┌────────────────┐     ┌────────────────────┐     ┌────────────────┐
//! │ Photo bundle   │ ──▶ │ Depth photo viewer │ ──▶ │ PNG file       │
//! └────────────────┘     └────────────────────┘     └────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`depth`]: depth/disparity conversion, visualization and equalization
//! - [`processing`]: the live frame processing stage
//! - [`photo`]: still depth photos and PNG export

pub mod depth;
pub mod photo;
pub mod processing;
