// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use depthcam::Config;
use depthcam::backends::camera::types::Facing;
use depthcam::backends::camera::{CaptureCoordinator, SyntheticBackend};
use depthcam::pipelines::depth::Colormap;

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.facing, Facing::Front, "Front camera by default");
    assert!(config.require_depth, "Depth should be required by default");
    assert!(!config.depth_filter, "Depth should arrive unfiltered by default");
    assert!(!config.use_disparity);
    assert_eq!(config.colormap, Colormap::Grayscale);
}

#[test]
fn test_config_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let config = Config {
        facing: Facing::Back,
        use_disparity: true,
        colormap: Colormap::Banded,
        output_dir: Some(dir.path().join("out")),
        ..Config::default()
    };
    config.save_to(&path).unwrap();

    assert_eq!(Config::load_from(&path).unwrap(), config);
}

#[test]
fn test_missing_config_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load_or_default(&dir.path().join("absent.json"));
    assert_eq!(config, Config::default());
}

#[test]
fn test_config_toggles_and_camera_type() {
    let config = Config {
        facing: Facing::Back,
        use_disparity: true,
        depth_filter: true,
        ..Config::default()
    };

    let camera = config.camera_type();
    assert_eq!(camera.facing, Facing::Back);
    assert!(camera.require_depth);

    let toggles = config.toggles();
    assert!(toggles.snapshot().use_disparity);
    assert!(!toggles.snapshot().apply_equalization);
    assert!(toggles.depth_filter_enabled());
}

#[test]
fn test_explicit_output_dir_wins() {
    let config = Config {
        output_dir: Some("/tmp/depthcam-out".into()),
        ..Config::default()
    };
    assert_eq!(config.output_dir(), std::path::PathBuf::from("/tmp/depthcam-out"));
}

#[test]
fn test_default_config_streams_unfiltered_depth() {
    let config = Config::default();
    let coordinator = CaptureCoordinator::new(std::sync::Arc::new(SyntheticBackend::new()));

    coordinator
        .configure_camera(config.camera_type(), None)
        .unwrap();
    coordinator.set_depth_filter_enabled(config.toggles().depth_filter_enabled());

    let session = coordinator.current_config().unwrap();
    assert!(session.depth.enabled);
    assert!(!session.depth.filtering);
}
