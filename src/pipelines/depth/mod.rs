// SPDX-License-Identifier: GPL-3.0-only

//! Depth map processing
//!
//! - [`convert`]: depth <-> disparity conversion at native precision
//! - [`visualization`]: depth map to RGBA rendering
//! - [`equalize`]: histogram equalization filter

pub mod convert;
pub mod equalize;
pub mod visualization;

pub use convert::DepthRepresentationConverter;
pub use equalize::{HistogramEqualization, ImageFilter};
pub use visualization::{Colormap, transformed_image};
