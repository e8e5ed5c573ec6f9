// SPDX-License-Identifier: GPL-3.0-only

//! Depth <-> disparity conversion
//!
//! Depth is distance in meters, disparity is its inverse in 1/meters. A
//! conversion inverts every sample at the map's native precision. Samples
//! without a measurement (zero, negative or non-finite) stay zero.

use crate::backends::camera::types::{
    DepthData, DepthDataType, DepthPrecision, DepthRepresentation, DepthValues,
};
use half::f16;
use std::sync::Arc;
use tracing::trace;

/// Converts depth data between the depth and disparity representations
pub struct DepthRepresentationConverter;

impl DepthRepresentationConverter {
    /// Depth data in the depth representation
    ///
    /// Returns the same `Arc` when `data` already is depth.
    pub fn to_depth(data: &Arc<DepthData>) -> Arc<DepthData> {
        Self::convert(data, DepthRepresentation::Depth)
    }

    /// Depth data in the disparity representation
    ///
    /// Returns the same `Arc` when `data` already is disparity.
    pub fn to_disparity(data: &Arc<DepthData>) -> Arc<DepthData> {
        Self::convert(data, DepthRepresentation::Disparity)
    }

    pub fn convert(data: &Arc<DepthData>, target: DepthRepresentation) -> Arc<DepthData> {
        if data.representation == target {
            return Arc::clone(data);
        }
        let target_type = DepthDataType::from_parts(target, data.map.precision());
        Arc::new(data.converting(target_type))
    }
}

/// Inverse of a sample, zero for samples without a measurement
#[inline]
pub fn invert(value: f32) -> f32 {
    if value.is_finite() && value > 0.0 {
        1.0 / value
    } else {
        0.0
    }
}

#[inline]
fn invert_f16(value: f16) -> f16 {
    let inverted = f16::from_f32(invert(value.to_f32()));
    // Tiny distances overflow the half range
    if inverted.is_infinite() {
        f16::MAX
    } else {
        inverted
    }
}

impl DepthData {
    /// Explicit conversion to `data_type` (representation and precision)
    pub fn converting(&self, data_type: DepthDataType) -> DepthData {
        let invert_values = data_type.representation() != self.representation;
        trace!(
            from = %self.data_type(),
            to = %data_type,
            "Converting depth data"
        );

        let values = match (self.map.values(), data_type.precision()) {
            (DepthValues::Float16(v), DepthPrecision::Float16) if invert_values => {
                DepthValues::Float16(v.iter().map(|x| invert_f16(*x)).collect())
            }
            (DepthValues::Float32(v), DepthPrecision::Float32) if invert_values => {
                DepthValues::Float32(v.iter().map(|x| invert(*x)).collect())
            }
            (values, DepthPrecision::Float32) => {
                let mut out = values.to_f32_vec();
                if invert_values {
                    out.iter_mut().for_each(|x| *x = invert(*x));
                }
                DepthValues::Float32(out)
            }
            (values, DepthPrecision::Float16) => DepthValues::Float16(
                values
                    .to_f32_vec()
                    .into_iter()
                    .map(|x| {
                        let x = if invert_values { invert(x) } else { x };
                        let h = f16::from_f32(x);
                        if h.is_infinite() { f16::MAX } else { h }
                    })
                    .collect(),
            ),
        };

        DepthData {
            map: self.map.with_values(values),
            representation: data_type.representation(),
            timestamp: self.timestamp,
            filtered: self.filtered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::DepthMap;
    use std::time::Duration;

    fn depth32(values: Vec<f32>) -> Arc<DepthData> {
        let width = values.len() as u32;
        Arc::new(DepthData::new(
            DepthMap::new(width, 1, DepthValues::Float32(values)).unwrap(),
            DepthRepresentation::Depth,
            Duration::from_millis(5),
        ))
    }

    #[test]
    fn test_same_representation_is_identity() {
        let data = depth32(vec![1.0, 2.0]);
        let converted = DepthRepresentationConverter::to_depth(&data);
        assert!(Arc::ptr_eq(&data, &converted));
    }

    #[test]
    fn test_depth_to_disparity_inverts_values() {
        let data = depth32(vec![2.0, 0.5, 0.0, -1.0, f32::NAN]);
        let disparity = DepthRepresentationConverter::to_disparity(&data);
        assert_eq!(disparity.representation, DepthRepresentation::Disparity);
        assert_eq!(
            disparity.map.values().to_f32_vec(),
            vec![0.5, 2.0, 0.0, 0.0, 0.0]
        );
        assert_eq!(disparity.timestamp, data.timestamp);
    }

    #[test]
    fn test_precision_is_preserved() {
        let values = vec![f16::from_f32(0.5), f16::from_f32(4.0)];
        let data = Arc::new(DepthData::new(
            DepthMap::new(2, 1, DepthValues::Float16(values)).unwrap(),
            DepthRepresentation::Disparity,
            Duration::ZERO,
        ));
        let depth = DepthRepresentationConverter::to_depth(&data);
        assert_eq!(depth.data_type(), DepthDataType::DepthFloat16);
        assert_eq!(depth.map.values().to_f32_vec(), vec![2.0, 0.25]);
    }

    #[test]
    fn test_round_trip_recovers_values() {
        let data = depth32(vec![0.3, 1.25, 2.5]);
        let back = DepthRepresentationConverter::to_depth(
            &DepthRepresentationConverter::to_disparity(&data),
        );
        for (a, b) in back
            .map
            .values()
            .to_f32_vec()
            .iter()
            .zip(data.map.values().to_f32_vec())
        {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_explicit_conversion_changes_precision() {
        let data = depth32(vec![2.0, 4.0]);
        let converted = data.converting(DepthDataType::DisparityFloat16);
        assert_eq!(converted.data_type(), DepthDataType::DisparityFloat16);
        assert_eq!(converted.map.values().to_f32_vec(), vec![0.5, 0.25]);
    }

    #[test]
    fn test_conversion_keeps_dimensions_and_inverts() {
        let data = Arc::new(DepthData::new(
            DepthMap::new(3, 2, DepthValues::Float32(vec![1.0, 2.0, 4.0, 0.0, 0.5, 8.0])).unwrap(),
            DepthRepresentation::Depth,
            Duration::ZERO,
        ));
        let disparity = DepthRepresentationConverter::to_disparity(&data);
        assert_eq!((disparity.map.width(), disparity.map.height()), (3, 2));
        assert_eq!(
            disparity.map.values().to_f32_vec(),
            vec![1.0, 0.5, 0.25, 0.0, 2.0, 0.125]
        );
    }

    #[test]
    fn test_half_overflow_saturates() {
        let values = vec![f16::from_f32(1.0e-5)];
        let data = Arc::new(DepthData::new(
            DepthMap::new(1, 1, DepthValues::Float16(values)).unwrap(),
            DepthRepresentation::Depth,
            Duration::ZERO,
        ));
        let disparity = DepthRepresentationConverter::to_disparity(&data);
        assert_eq!(disparity.map.values().get(0), Some(f16::MAX.to_f32()));
    }
}
