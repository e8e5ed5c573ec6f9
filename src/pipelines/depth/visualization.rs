// SPDX-License-Identifier: GPL-3.0-only

//! Depth visualization helpers
//!
//! Turns a depth or disparity map into an RGBA image:
//! - Grayscale (larger sample = brighter)
//! - Turbo colormap (small = blue, large = red)
//!
//! Samples are normalized by the min/max of the valid samples in the map.
//! Samples without a measurement render black.

use crate::backends::camera::types::{DepthData, Size};
use crate::constants::depth::COLORMAP_BANDS;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// Color mapping applied to normalized depth samples
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Colormap {
    #[default]
    Grayscale,
    Turbo,
    /// Turbo quantized to bands
    Banded,
}

/// Turbo colormap: perceptually uniform rainbow
///
/// Based on: https://ai.googleblog.com/2019/08/turbo-improved-rainbow-colormap-for.html
/// Simplified version with polynomial approximation.
#[inline]
fn turbo(t: f32) -> [u8; 4] {
    let r = (0.13572138
        + t * (4.6153926 + t * (-42.66032 + t * (132.13108 + t * (-152.54825 + t * 59.28144)))))
        .clamp(0.0, 1.0);
    let g = (0.09140261
        + t * (2.19418 + t * (4.84296 + t * (-14.18503 + t * (4.27805 + t * 2.53377)))))
        .clamp(0.0, 1.0);
    let b = (0.1066733
        + t * (12.64194 + t * (-60.58204 + t * (109.99648 + t * (-82.52904 + t * 20.43388)))))
        .clamp(0.0, 1.0);
    [(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8, 255]
}

#[inline]
fn is_valid(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

/// Min and max of the valid samples, `None` if there are none
pub fn valid_range(values: &[f32]) -> Option<(f32, f32)> {
    values
        .iter()
        .copied()
        .filter(|v| is_valid(*v))
        .fold(None, |range, v| match range {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Map one normalized sample to a pixel
#[inline]
pub fn colorize(t: f32, colormap: Colormap) -> [u8; 4] {
    let t = t.clamp(0.0, 1.0);
    match colormap {
        Colormap::Grayscale => {
            let gray = (t * 255.0).round() as u8;
            [gray, gray, gray, 255]
        }
        Colormap::Turbo => turbo(t),
        Colormap::Banded => turbo((t * COLORMAP_BANDS).floor() / COLORMAP_BANDS),
    }
}

/// Render a depth map at its native resolution
pub fn depth_to_rgba(data: &DepthData, colormap: Colormap) -> RgbaImage {
    let width = data.map.width();
    let height = data.map.height();
    let values = data.map.values().to_f32_vec();
    let (lo, hi) = valid_range(&values).unwrap_or((0.0, 1.0));
    let span = if hi > lo { hi - lo } else { 1.0 };

    let mut rgba = Vec::with_capacity(values.len() * 4);
    for value in values {
        if is_valid(value) {
            rgba.extend_from_slice(&colorize((value - lo) / span, colormap));
        } else {
            rgba.extend_from_slice(&[0, 0, 0, 255]);
        }
    }

    RgbaImage::from_raw(width, height, rgba)
        .unwrap_or_else(|| RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255])))
}

/// Rotate an image clockwise by whole quarter turns
pub fn rotate_quarter_turns(image: RgbaImage, quarter_turns: u32) -> RgbaImage {
    match quarter_turns % 4 {
        1 => imageops::rotate90(&image),
        2 => imageops::rotate180(&image),
        3 => imageops::rotate270(&image),
        _ => image,
    }
}

/// Render a depth map rotated and scaled to `target`
///
/// Returns `None` for an empty target or an empty map.
pub fn transformed_image(
    data: &DepthData,
    target: Size,
    quarter_turns: u32,
    colormap: Colormap,
) -> Option<RgbaImage> {
    if target.is_empty() || data.map.size().is_empty() {
        return None;
    }

    let image = rotate_quarter_turns(depth_to_rgba(data, colormap), quarter_turns);
    if image.width() == target.width && image.height() == target.height {
        return Some(image);
    }
    Some(imageops::resize(
        &image,
        target.width,
        target.height,
        FilterType::Triangle,
    ))
}

/// Convert BGRA pixel data to an RGBA image
pub fn bgra_to_rgba(bgra: &[u8], width: u32, height: u32, stride: u32) -> Option<RgbaImage> {
    let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height as usize {
        let start = y * stride as usize;
        let row = bgra.get(start..start + width as usize * 4)?;
        for px in row.chunks_exact(4) {
            rgba.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
        }
    }
    RgbaImage::from_raw(width, height, rgba)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::{DepthMap, DepthRepresentation, DepthValues};
    use std::time::Duration;

    fn data(width: u32, height: u32, values: Vec<f32>) -> DepthData {
        DepthData::new(
            DepthMap::new(width, height, DepthValues::Float32(values)).unwrap(),
            DepthRepresentation::Depth,
            Duration::ZERO,
        )
    }

    #[test]
    fn test_invalid_samples_are_black() {
        let image = depth_to_rgba(&data(2, 2, vec![0.0, -1.0, f32::NAN, 1.0]), Colormap::Turbo);
        for x in 0..2 {
            assert_eq!(image.get_pixel(x, 0).0, [0, 0, 0, 255]);
        }
        assert_eq!(image.get_pixel(0, 1).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_grayscale_normalizes_range() {
        let image = depth_to_rgba(&data(3, 1, vec![1.0, 2.0, 3.0]), Colormap::Grayscale);
        assert_eq!(image.get_pixel(0, 0).0[0], 0);
        assert_eq!(image.get_pixel(1, 0).0[0], 128);
        assert_eq!(image.get_pixel(2, 0).0[0], 255);
    }

    #[test]
    fn test_transformed_image_matches_target() {
        let image = transformed_image(
            &data(4, 2, vec![1.0; 8]),
            Size::new(9, 16),
            1,
            Colormap::Grayscale,
        )
        .unwrap();
        assert_eq!(image.dimensions(), (9, 16));
        assert!(transformed_image(&data(4, 2, vec![1.0; 8]), Size::new(0, 16), 0, Colormap::Grayscale).is_none());
    }

    #[test]
    fn test_rotation_swaps_dimensions() {
        let image = RgbaImage::new(4, 2);
        assert_eq!(rotate_quarter_turns(image.clone(), 1).dimensions(), (2, 4));
        assert_eq!(rotate_quarter_turns(image, 2).dimensions(), (4, 2));
    }

    #[test]
    fn test_bgra_to_rgba_respects_stride() {
        // One pixel per row, stride padded to 8 bytes
        let bgra = vec![1, 2, 3, 4, 0, 0, 0, 0, 5, 6, 7, 8, 0, 0, 0, 0];
        let image = bgra_to_rgba(&bgra, 1, 2, 8).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [3, 2, 1, 4]);
        assert_eq!(image.get_pixel(0, 1).0, [7, 6, 5, 8]);
    }
}
