// SPDX-License-Identifier: GPL-3.0-only

//! Still-photo depth
//!
//! A photo with depth carries up to three auxiliary images next to its color
//! image: a disparity map, a depth map and a portrait matte.
//!
//! ```text
//! PhotoAsset ──▶ color image
//!     │
//!     └──▶ DepthImageSource ──▶ disparity / depth / matte
//!                                     │
//!                                     ▼
//!                             DepthPhotoViewer::render(mode)
//! ```
//!
//! # Modules
//!
//! - [`bundle`]: on-disk depth photo bundle (JSON manifest + raw maps)
//! - [`export`]: timestamped PNG export

pub mod bundle;
pub mod export;

pub use bundle::DepthPhotoBundle;

use crate::backends::camera::types::DepthData;
use crate::errors::PhotoResult;
use crate::pipelines::depth::convert::DepthRepresentationConverter;
use crate::pipelines::depth::equalize::{HistogramEqualization, ImageFilter};
use crate::pipelines::depth::visualization::{Colormap, depth_to_rgba};
use image::{GrayImage, RgbaImage};
use std::sync::Arc;
use tracing::{debug, info};

/// Source of the auxiliary images stored with a photo
pub trait DepthImageSource: Send + Sync {
    fn auxiliary_disparity(&self) -> PhotoResult<Option<DepthData>>;

    fn auxiliary_depth(&self) -> PhotoResult<Option<DepthData>>;

    fn portrait_matte(&self) -> PhotoResult<Option<GrayImage>>;
}

/// A photo that may carry depth
pub trait PhotoAsset: Send + Sync {
    fn request_color_image(&self) -> PhotoResult<RgbaImage>;

    /// Full-size editing input exposing the auxiliary images
    fn request_content_editing_input(&self) -> PhotoResult<Arc<dyn DepthImageSource>>;

    fn has_portrait_matte(&self) -> bool {
        self.request_content_editing_input()
            .and_then(|input| input.portrait_matte())
            .map(|matte| matte.is_some())
            .unwrap_or(false)
    }
}

/// What the photo viewer shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DisplayMode {
    #[default]
    Color,
    Disparity,
    Depth,
}

impl std::fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisplayMode::Color => write!(f, "color"),
            DisplayMode::Disparity => write!(f, "disparity"),
            DisplayMode::Depth => write!(f, "depth"),
        }
    }
}

/// Color, disparity and depth of one photo, ready to render
pub struct DepthPhotoViewer {
    color: Option<RgbaImage>,
    disparity: Option<Arc<DepthData>>,
    depth: Option<Arc<DepthData>>,
    matte: Option<GrayImage>,
    colormap: Colormap,
    equalize: bool,
}

impl DepthPhotoViewer {
    /// Load everything an asset offers
    pub fn load(asset: &dyn PhotoAsset) -> PhotoResult<Self> {
        let color = asset.request_color_image()?;
        let input = asset.request_content_editing_input()?;
        Self::from_source(Some(color), input.as_ref())
    }

    /// Build from a color image and a depth source
    ///
    /// A missing depth map is derived from the disparity map and vice versa.
    pub fn from_source(
        color: Option<RgbaImage>,
        source: &dyn DepthImageSource,
    ) -> PhotoResult<Self> {
        let mut disparity = source.auxiliary_disparity()?.map(Arc::new);
        let mut depth = source.auxiliary_depth()?.map(Arc::new);
        let matte = source.portrait_matte()?;

        match (&disparity, &depth) {
            (Some(d), None) => {
                debug!("Deriving depth from stored disparity");
                depth = Some(DepthRepresentationConverter::to_depth(d));
            }
            (None, Some(d)) => {
                debug!("Deriving disparity from stored depth");
                disparity = Some(DepthRepresentationConverter::to_disparity(d));
            }
            _ => {}
        }

        info!(
            has_color = color.is_some(),
            has_depth = depth.is_some(),
            has_matte = matte.is_some(),
            "Depth photo loaded"
        );

        Ok(Self {
            color,
            disparity,
            depth,
            matte,
            colormap: Colormap::Grayscale,
            equalize: false,
        })
    }

    pub fn with_colormap(mut self, colormap: Colormap) -> Self {
        self.colormap = colormap;
        self
    }

    pub fn with_equalization(mut self, equalize: bool) -> Self {
        self.equalize = equalize;
        self
    }

    pub fn has_depth(&self) -> bool {
        self.depth.is_some()
    }

    pub fn matte(&self) -> Option<&GrayImage> {
        self.matte.as_ref()
    }

    pub fn disparity(&self) -> Option<&Arc<DepthData>> {
        self.disparity.as_ref()
    }

    pub fn depth(&self) -> Option<&Arc<DepthData>> {
        self.depth.as_ref()
    }

    /// Image for `mode`, `None` when the photo lacks that image
    pub fn render(&self, mode: DisplayMode) -> Option<RgbaImage> {
        let data = match mode {
            DisplayMode::Color => return self.color.clone(),
            DisplayMode::Disparity => self.disparity.as_ref()?,
            DisplayMode::Depth => self.depth.as_ref()?,
        };
        let image = depth_to_rgba(data, self.colormap);
        Some(if self.equalize {
            HistogramEqualization.apply(&image)
        } else {
            image
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::{DepthMap, DepthRepresentation, DepthValues};
    use crate::errors::PhotoError;
    use std::time::Duration;

    struct DisparityOnly;

    impl DepthImageSource for DisparityOnly {
        fn auxiliary_disparity(&self) -> PhotoResult<Option<DepthData>> {
            let map = DepthMap::new(2, 1, DepthValues::Float32(vec![0.5, 2.0]))
                .map_err(|e| PhotoError::InvalidDepthMap(e.to_string()))?;
            Ok(Some(DepthData::new(
                map,
                DepthRepresentation::Disparity,
                Duration::ZERO,
            )))
        }

        fn auxiliary_depth(&self) -> PhotoResult<Option<DepthData>> {
            Ok(None)
        }

        fn portrait_matte(&self) -> PhotoResult<Option<GrayImage>> {
            Ok(None)
        }
    }

    struct Asset;

    impl PhotoAsset for Asset {
        fn request_color_image(&self) -> PhotoResult<RgbaImage> {
            Ok(RgbaImage::new(3, 2))
        }

        fn request_content_editing_input(&self) -> PhotoResult<Arc<dyn DepthImageSource>> {
            Ok(Arc::new(DisparityOnly))
        }
    }

    #[test]
    fn test_depth_derived_from_disparity() {
        let viewer = DepthPhotoViewer::load(&Asset).unwrap();
        let depth = viewer.depth().unwrap();
        assert_eq!(depth.representation, DepthRepresentation::Depth);
        assert_eq!(depth.map.values().to_f32_vec(), vec![2.0, 0.5]);
    }

    #[test]
    fn test_render_modes() {
        let viewer = DepthPhotoViewer::load(&Asset).unwrap();
        assert_eq!(viewer.render(DisplayMode::Color).unwrap().dimensions(), (3, 2));
        assert_eq!(viewer.render(DisplayMode::Depth).unwrap().dimensions(), (2, 1));
        assert!(viewer.render(DisplayMode::Disparity).is_some());
    }

    #[test]
    fn test_no_matte_reported() {
        assert!(!Asset.has_portrait_matte());
    }
}
