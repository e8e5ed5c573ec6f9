// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::camera::types::{CameraType, Facing, Size};
use crate::constants::display;
use crate::errors::{AppError, AppResult};
use crate::pipelines::depth::Colormap;
use crate::pipelines::processing::UiToggles;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Application directory name under the platform config directory
const CONFIG_DIR: &str = "depthcam";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default folder name for exported images
const DEFAULT_SAVE_FOLDER: &str = "Depth";

/// Display refresh and drawable settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Render ticks per second
    pub fps: u32,
    /// Drawable width in pixels
    pub width: u32,
    /// Drawable height in pixels
    pub height: u32,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            fps: display::DEFAULT_FPS,
            width: display::DEFAULT_WIDTH,
            height: display::DEFAULT_HEIGHT,
        }
    }
}

impl DisplaySettings {
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Camera side used at startup
    pub facing: Facing,
    /// Only accept cameras that deliver depth
    pub require_depth: bool,
    /// Visualize disparity instead of depth
    pub use_disparity: bool,
    /// Histogram-equalize the visualization
    pub apply_equalization: bool,
    /// Ask the camera to fill depth holes
    pub depth_filter: bool,
    /// Color mapping for depth visualization
    pub colormap: Colormap,
    pub display: DisplaySettings,
    /// Where exported images go (default: ~/Pictures/Depth)
    pub output_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            facing: Facing::Front,
            require_depth: true,
            use_disparity: false,
            apply_equalization: false,
            depth_filter: false,
            colormap: Colormap::default(),
            display: DisplaySettings::default(),
            output_dir: None,
        }
    }
}

impl Config {
    /// Path of the config file in the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load the user config, falling back to defaults when missing or invalid
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_or_default(&path),
            None => {
                warn!("No config directory available, using defaults");
                Self::default()
            }
        }
    }

    /// Load `path`, falling back to defaults when missing or invalid
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Self::default();
        }
        match Self::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load config, using defaults");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> AppResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        let config = serde_json::from_str(&text)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Storage(e.to_string()))?;
        }
        let text =
            serde_json::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, text).map_err(|e| AppError::Storage(e.to_string()))?;
        debug!(path = %path.display(), "Saved config");
        Ok(())
    }

    pub fn camera_type(&self) -> CameraType {
        CameraType {
            facing: self.facing,
            require_depth: self.require_depth,
        }
    }

    /// Initial pipeline toggles
    pub fn toggles(&self) -> UiToggles {
        UiToggles::new(self.use_disparity, self.apply_equalization, self.depth_filter)
    }

    /// Export directory, `output_dir` or the pictures folder
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| {
            dirs::picture_dir()
                .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
                .join(DEFAULT_SAVE_FOLDER)
        })
    }
}
