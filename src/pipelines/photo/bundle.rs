// SPDX-License-Identifier: GPL-3.0-only

//! Depth photo bundle
//!
//! A directory holding a color image and its auxiliary images, described by a
//! JSON manifest:
//!
//! ```json
//! {
//!   "color": "photo.png",
//!   "disparity": { "path": "disparity.raw", "width": 160, "height": 120, "precision": "float16" },
//!   "depth": { "path": "depth.raw", "width": 160, "height": 120, "precision": "float32" },
//!   "matte": "matte.png"
//! }
//! ```
//!
//! Paths are relative to the manifest. Raw maps are tightly packed
//! native-endian floats in row-major order.

use super::{DepthImageSource, PhotoAsset};
use crate::backends::camera::types::{
    DepthData, DepthMap, DepthPrecision, DepthRepresentation, DepthValues,
};
use crate::errors::{PhotoError, PhotoResult};
use half::f16;
use image::{GrayImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// File name of the manifest inside a bundle directory
pub const MANIFEST_FILE: &str = "manifest.json";

/// A raw depth map entry of the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthMapEntry {
    pub path: String,
    pub width: u32,
    pub height: u32,
    pub precision: DepthPrecision,
}

/// Bundle manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disparity: Option<DepthMapEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<DepthMapEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matte: Option<String>,
}

/// A depth photo stored on disk
#[derive(Debug, Clone)]
pub struct DepthPhotoBundle {
    root: PathBuf,
    manifest: Manifest,
}

impl DepthPhotoBundle {
    /// Open a bundle from its manifest file or its directory
    pub fn open(path: &Path) -> PhotoResult<Self> {
        let manifest_path = if path.is_dir() {
            path.join(MANIFEST_FILE)
        } else {
            path.to_path_buf()
        };

        let text = std::fs::read_to_string(&manifest_path).map_err(|e| {
            PhotoError::InvalidManifest(format!("{}: {}", manifest_path.display(), e))
        })?;
        let manifest: Manifest = serde_json::from_str(&text)?;
        let root = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        info!(path = %manifest_path.display(), "Opened depth photo bundle");
        Ok(Self { root, manifest })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    fn load_map(
        &self,
        entry: &DepthMapEntry,
        representation: DepthRepresentation,
    ) -> PhotoResult<DepthData> {
        let path = self.resolve(&entry.path);
        let bytes = std::fs::read(&path)
            .map_err(|e| PhotoError::MissingResource(format!("{}: {}", path.display(), e)))?;

        let sample_size = match entry.precision {
            DepthPrecision::Float16 => std::mem::size_of::<f16>(),
            DepthPrecision::Float32 => std::mem::size_of::<f32>(),
        };
        let expected = (entry.width as usize)
            .checked_mul(entry.height as usize)
            .and_then(|count| count.checked_mul(sample_size))
            .ok_or_else(|| {
                PhotoError::InvalidDepthMap(format!(
                    "{} declares an oversized {}x{} map",
                    path.display(),
                    entry.width,
                    entry.height
                ))
            })?;
        if bytes.len() != expected {
            return Err(PhotoError::InvalidDepthMap(format!(
                "{} holds {} bytes, {}x{} {:?} needs {}",
                path.display(),
                bytes.len(),
                entry.width,
                entry.height,
                entry.precision,
                expected
            )));
        }

        let values = match entry.precision {
            DepthPrecision::Float16 => DepthValues::Float16(bytemuck::pod_collect_to_vec(&bytes)),
            DepthPrecision::Float32 => DepthValues::Float32(bytemuck::pod_collect_to_vec(&bytes)),
        };
        let map = DepthMap::new(entry.width, entry.height, values)
            .map_err(|e| PhotoError::InvalidDepthMap(e.to_string()))?;

        debug!(path = %path.display(), representation = %representation, "Loaded depth map");
        Ok(DepthData::new(map, representation, Duration::ZERO))
    }

    /// Write a bundle into `dir`, returning the manifest path
    pub fn write(
        dir: &Path,
        color: &RgbaImage,
        disparity: Option<&DepthData>,
        depth: Option<&DepthData>,
        matte: Option<&GrayImage>,
    ) -> PhotoResult<PathBuf> {
        std::fs::create_dir_all(dir).map_err(|e| PhotoError::SaveFailed(e.to_string()))?;

        let color_name = "color.png".to_string();
        color
            .save(dir.join(&color_name))
            .map_err(|e| PhotoError::SaveFailed(e.to_string()))?;

        let disparity = disparity
            .map(|d| write_map(dir, "disparity.raw", d))
            .transpose()?;
        let depth = depth.map(|d| write_map(dir, "depth.raw", d)).transpose()?;

        let matte = match matte {
            Some(m) => {
                let name = "matte.png".to_string();
                m.save(dir.join(&name))
                    .map_err(|e| PhotoError::SaveFailed(e.to_string()))?;
                Some(name)
            }
            None => None,
        };

        let manifest = Manifest {
            color: color_name,
            disparity,
            depth,
            matte,
        };
        let manifest_path = dir.join(MANIFEST_FILE);
        let text = serde_json::to_string_pretty(&manifest)
            .map_err(|e| PhotoError::SaveFailed(e.to_string()))?;
        std::fs::write(&manifest_path, text).map_err(|e| PhotoError::SaveFailed(e.to_string()))?;

        info!(path = %manifest_path.display(), "Depth photo bundle written");
        Ok(manifest_path)
    }
}

fn write_map(dir: &Path, name: &str, data: &DepthData) -> PhotoResult<DepthMapEntry> {
    let bytes: Vec<u8> = match data.map.values() {
        DepthValues::Float16(v) => bytemuck::cast_slice::<f16, u8>(v).to_vec(),
        DepthValues::Float32(v) => bytemuck::cast_slice::<f32, u8>(v).to_vec(),
    };
    std::fs::write(dir.join(name), bytes).map_err(|e| PhotoError::SaveFailed(e.to_string()))?;
    Ok(DepthMapEntry {
        path: name.to_string(),
        width: data.map.width(),
        height: data.map.height(),
        precision: data.map.precision(),
    })
}

impl DepthImageSource for DepthPhotoBundle {
    fn auxiliary_disparity(&self) -> PhotoResult<Option<DepthData>> {
        self.manifest
            .disparity
            .as_ref()
            .map(|entry| self.load_map(entry, DepthRepresentation::Disparity))
            .transpose()
    }

    fn auxiliary_depth(&self) -> PhotoResult<Option<DepthData>> {
        self.manifest
            .depth
            .as_ref()
            .map(|entry| self.load_map(entry, DepthRepresentation::Depth))
            .transpose()
    }

    fn portrait_matte(&self) -> PhotoResult<Option<GrayImage>> {
        let Some(name) = self.manifest.matte.as_ref() else {
            return Ok(None);
        };
        let path = self.resolve(name);
        let image = image::open(&path)
            .map_err(|e| PhotoError::DecodeFailed(format!("{}: {}", path.display(), e)))?;
        Ok(Some(image.to_luma8()))
    }
}

impl PhotoAsset for DepthPhotoBundle {
    fn request_color_image(&self) -> PhotoResult<RgbaImage> {
        let path = self.resolve(&self.manifest.color);
        if !path.exists() {
            return Err(PhotoError::MissingResource(path.display().to_string()));
        }
        Ok(image::open(&path)?.to_rgba8())
    }

    fn request_content_editing_input(&self) -> PhotoResult<Arc<dyn DepthImageSource>> {
        Ok(Arc::new(self.clone()))
    }

    fn has_portrait_matte(&self) -> bool {
        self.manifest.matte.is_some()
    }
}
