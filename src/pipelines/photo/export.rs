// SPDX-License-Identifier: GPL-3.0-only

//! PNG export of rendered images

use crate::errors::{PhotoError, PhotoResult};
use image::RgbaImage;
use std::path::{Path, PathBuf};
use tracing::info;

/// Timestamped file name, e.g. `DEPTH_20260101_120000.png`
pub fn timestamped_name(prefix: &str) -> String {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    format!("{}_{}.png", prefix, timestamp)
}

/// Encode `image` as PNG into `output_dir` under a timestamped name
pub async fn save_png(image: RgbaImage, output_dir: &Path, prefix: &str) -> PhotoResult<PathBuf> {
    let filepath = output_dir.join(timestamped_name(prefix));
    save_png_to(image, filepath).await
}

/// Encode `image` as PNG at `path`
pub async fn save_png_to(image: RgbaImage, path: PathBuf) -> PhotoResult<PathBuf> {
    info!(path = %path.display(), "Saving image");

    let target = path.clone();
    tokio::task::spawn_blocking(move || {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PhotoError::SaveFailed(e.to_string()))?;
        }
        image
            .save_with_format(&target, image::ImageFormat::Png)
            .map_err(|e| PhotoError::SaveFailed(e.to_string()))
    })
    .await
    .map_err(|e| PhotoError::SaveFailed(format!("Save task error: {}", e)))??;

    info!(path = %path.display(), "Image saved successfully");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamped_name_shape() {
        let name = timestamped_name("DEPTH");
        assert!(name.starts_with("DEPTH_"));
        assert!(name.ends_with(".png"));
        assert_eq!(name.len(), "DEPTH_20260101_120000.png".len());
    }

    #[tokio::test]
    async fn test_save_png_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_png(RgbaImage::new(2, 2), dir.path(), "TEST")
            .await
            .unwrap();
        assert!(path.exists());
        let loaded = image::open(&path).unwrap();
        assert_eq!((loaded.width(), loaded.height()), (2, 2));
    }
}
