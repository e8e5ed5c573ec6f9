// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use depthcam::backends::camera::types::{DepthDataType, DepthPrecision, DepthRepresentation};
use depthcam::constants::{self, MAX_BUFFERS_IN_FLIGHT, TARGET_DEPTH_TYPE};

#[test]
fn test_single_buffer_in_flight() {
    assert_eq!(MAX_BUFFERS_IN_FLIGHT, 1);
}

#[test]
fn test_target_depth_type_is_full_precision_depth() {
    assert_eq!(TARGET_DEPTH_TYPE, DepthDataType::DepthFloat32);
    assert_eq!(TARGET_DEPTH_TYPE.representation(), DepthRepresentation::Depth);
    assert_eq!(TARGET_DEPTH_TYPE.precision(), DepthPrecision::Float32);
}

#[test]
fn test_synthetic_range_is_ordered() {
    assert!(constants::synthetic::NEAR_M > 0.0);
    assert!(constants::synthetic::NEAR_M < constants::synthetic::FAR_M);
}

#[test]
fn test_default_drawable_is_portrait() {
    assert!(constants::display::DEFAULT_HEIGHT > constants::display::DEFAULT_WIDTH);
    assert!(constants::display::DEFAULT_FPS > 0);
}
