// SPDX-License-Identifier: GPL-3.0-only

//! Histogram equalization
//!
//! Spreads the intensity distribution of each color channel over the full
//! range. Applied to depth visualizations to bring out small depth steps.

use crate::constants::depth::HISTOGRAM_BINS;
use image::RgbaImage;

/// An image-to-image filter run by the processing stage
pub trait ImageFilter: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, image: &RgbaImage) -> RgbaImage;
}

/// Per-channel histogram equalization (alpha untouched)
#[derive(Debug, Clone, Copy, Default)]
pub struct HistogramEqualization;

/// Lookup table equalizing one channel histogram
fn equalization_lut(histogram: &[u32; HISTOGRAM_BINS], total: u32) -> [u8; HISTOGRAM_BINS] {
    let mut lut = [0u8; HISTOGRAM_BINS];
    let cdf_min = histogram.iter().copied().find(|c| *c > 0).unwrap_or(0);
    let denom = total.saturating_sub(cdf_min);

    let mut cdf = 0u32;
    for (value, count) in histogram.iter().enumerate() {
        cdf += count;
        lut[value] = if denom == 0 {
            value as u8
        } else {
            let scaled = (cdf.saturating_sub(cdf_min)) as f64 / denom as f64;
            (scaled * (HISTOGRAM_BINS - 1) as f64).round() as u8
        };
    }
    lut
}

impl ImageFilter for HistogramEqualization {
    fn name(&self) -> &str {
        "histogram-equalization"
    }

    fn apply(&self, image: &RgbaImage) -> RgbaImage {
        let mut histograms = [[0u32; HISTOGRAM_BINS]; 3];
        for pixel in image.pixels() {
            for (channel, histogram) in histograms.iter_mut().enumerate() {
                histogram[pixel.0[channel] as usize] += 1;
            }
        }

        let total = image.width() * image.height();
        let luts = histograms.map(|h| equalization_lut(&h, total));

        let mut out = image.clone();
        for pixel in out.pixels_mut() {
            for (channel, lut) in luts.iter().enumerate() {
                pixel.0[channel] = lut[pixel.0[channel] as usize];
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_narrow_range_is_stretched() {
        let mut image = RgbaImage::new(4, 1);
        for (x, v) in [100u8, 101, 102, 103].iter().enumerate() {
            image.put_pixel(x as u32, 0, Rgba([*v, *v, *v, 255]));
        }
        let out = HistogramEqualization.apply(&image);
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(out.get_pixel(3, 0).0, [255, 255, 255, 255]);
        assert!(out.get_pixel(1, 0).0[0] < out.get_pixel(2, 0).0[0]);
    }

    #[test]
    fn test_uniform_image_is_unchanged() {
        let image = RgbaImage::from_pixel(3, 3, Rgba([42, 42, 42, 200]));
        let out = HistogramEqualization.apply(&image);
        assert_eq!(out, image);
    }

    #[test]
    fn test_alpha_is_preserved() {
        let mut image = RgbaImage::from_pixel(2, 1, Rgba([10, 10, 10, 7]));
        image.put_pixel(1, 0, Rgba([200, 200, 200, 9]));
        let out = HistogramEqualization.apply(&image);
        assert_eq!(out.get_pixel(0, 0).0[3], 7);
        assert_eq!(out.get_pixel(1, 0).0[3], 9);
    }
}
