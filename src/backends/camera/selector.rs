// SPDX-License-Identifier: GPL-3.0-only

//! Device and format selection
//!
//! Picks the physical camera for a [`CameraType`] and the highest-resolution
//! video format whose companion depth formats include the target encoding.

use super::CaptureBackend;
use super::types::*;
use crate::constants::TARGET_DEPTH_TYPE;
use crate::errors::{CaptureError, CaptureResult};
use tracing::{debug, info, warn};

/// Chooses capture devices and formats on a backend
pub struct CameraSelector;

impl CameraSelector {
    /// Device-type preference list for a camera request, most preferred first
    pub fn device_preferences(camera_type: CameraType) -> Vec<DeviceKind> {
        match camera_type.facing {
            Facing::Front => {
                let mut kinds = vec![DeviceKind::TrueDepth];
                if !camera_type.require_depth {
                    kinds.push(DeviceKind::WideAngle);
                }
                kinds
            }
            Facing::Back => {
                let mut kinds = vec![DeviceKind::DualCamera];
                if !camera_type.require_depth {
                    kinds.extend([DeviceKind::WideAngle, DeviceKind::Telephoto]);
                }
                kinds
            }
        }
    }

    /// Select the device for `camera_type`
    ///
    /// Falls back to the backend's default video device when no preferred
    /// device exists. Fails only when there is no device at all.
    pub fn select_device(
        backend: &dyn CaptureBackend,
        camera_type: CameraType,
    ) -> CaptureResult<CaptureDevice> {
        let kinds = Self::device_preferences(camera_type);
        let devices = backend.discover_devices(camera_type.facing, &kinds);

        if let Some(device) = devices.into_iter().next() {
            info!(device = %device.name, kind = %device.kind, facing = %device.facing, "Selected video device");
            return Ok(device);
        }

        match backend.default_video_device() {
            Some(device) => {
                warn!(
                    facing = %camera_type.facing,
                    require_depth = camera_type.require_depth,
                    fallback = %device.name,
                    "No preferred device, using default video device"
                );
                Ok(device)
            }
            None => Err(CaptureError::NoDeviceFound),
        }
    }

    /// Select the video format and its depth format for `device`
    pub fn select_formats(
        backend: &dyn CaptureBackend,
        device: &CaptureDevice,
    ) -> CaptureResult<(CaptureFormat, DepthFormat)> {
        let formats = backend.supported_formats(device);
        Self::select_from(&formats, TARGET_DEPTH_TYPE).ok_or_else(|| {
            CaptureError::NoMatchingFormat(format!(
                "{} offers no {} depth format",
                device.name, TARGET_DEPTH_TYPE
            ))
        })
    }

    /// Pure selection over a format list
    ///
    /// Keeps formats with at least one `depth_type` companion, takes the
    /// widest (first on ties), then its widest `depth_type` depth format
    /// (first on ties).
    pub fn select_from(
        formats: &[CaptureFormat],
        depth_type: DepthDataType,
    ) -> Option<(CaptureFormat, DepthFormat)> {
        let video = first_max_by_width(
            formats
                .iter()
                .filter(|f| f.depth_formats_of(depth_type).next().is_some()),
            |f| f.size.width,
        )?;
        let depth = first_max_by_width(video.depth_formats_of(depth_type), |d| d.size.width)?;

        debug!(format = %video, depth_format = %depth, "Selected capture formats");
        Some((video.clone(), *depth))
    }

    /// Every format that has depth companions, for diagnostics
    pub fn describe_depth_formats(
        backend: &dyn CaptureBackend,
        device: &CaptureDevice,
    ) -> Vec<String> {
        backend
            .supported_formats(device)
            .iter()
            .filter(|f| !f.depth_formats.is_empty())
            .map(|f| {
                let depth: Vec<String> = f.depth_formats.iter().map(|d| d.to_string()).collect();
                format!("{} -> [{}]", f, depth.join(", "))
            })
            .collect()
    }
}

fn first_max_by_width<'a, T, I, F>(items: I, width: F) -> Option<&'a T>
where
    I: Iterator<Item = &'a T>,
    F: Fn(&T) -> u32,
{
    let mut best: Option<&'a T> = None;
    for item in items {
        match best {
            Some(current) if width(item) <= width(current) => {}
            _ => best = Some(item),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth(width: u32, data_type: DepthDataType) -> DepthFormat {
        DepthFormat {
            size: Size::new(width, width * 3 / 4),
            data_type,
        }
    }

    fn format(width: u32, depth_formats: Vec<DepthFormat>) -> CaptureFormat {
        CaptureFormat {
            size: Size::new(width, width * 3 / 4),
            pixel_format: PixelFormat::NV12,
            framerate: Framerate::from_int(30),
            depth_formats,
        }
    }

    #[test]
    fn test_prefers_depth_compatible_format_then_widest_depth() {
        let formats = vec![
            format(
                1920,
                vec![
                    depth(640, DepthDataType::DepthFloat32),
                    depth(1280, DepthDataType::DepthFloat32),
                ],
            ),
            format(4032, vec![]),
        ];
        let (video, depth) =
            CameraSelector::select_from(&formats, DepthDataType::DepthFloat32).unwrap();
        assert_eq!(video.size.width, 1920);
        assert_eq!(depth.size.width, 1280);
    }

    #[test]
    fn test_never_falls_back_to_lower_precision() {
        let formats = vec![format(
            1920,
            vec![
                depth(640, DepthDataType::DepthFloat16),
                depth(640, DepthDataType::DisparityFloat32),
            ],
        )];
        assert!(CameraSelector::select_from(&formats, DepthDataType::DepthFloat32).is_none());
    }

    #[test]
    fn test_ties_keep_first_encountered() {
        let formats = vec![
            format(1280, vec![depth(320, DepthDataType::DepthFloat32)]),
            format(1280, vec![depth(640, DepthDataType::DepthFloat32)]),
        ];
        let (_, depth) =
            CameraSelector::select_from(&formats, DepthDataType::DepthFloat32).unwrap();
        assert_eq!(depth.size.width, 320);
    }

    #[test]
    fn test_filters_depth_formats_by_encoding() {
        let formats = vec![format(
            1920,
            vec![
                depth(1280, DepthDataType::DisparityFloat16),
                depth(640, DepthDataType::DepthFloat32),
            ],
        )];
        let (_, depth) =
            CameraSelector::select_from(&formats, DepthDataType::DepthFloat32).unwrap();
        assert_eq!(depth.size.width, 640);
        assert_eq!(depth.data_type, DepthDataType::DepthFloat32);
    }

    #[test]
    fn test_device_preferences() {
        assert_eq!(
            CameraSelector::device_preferences(CameraType::front(true)),
            vec![DeviceKind::TrueDepth]
        );
        assert_eq!(
            CameraSelector::device_preferences(CameraType::back(false)),
            vec![
                DeviceKind::DualCamera,
                DeviceKind::WideAngle,
                DeviceKind::Telephoto
            ]
        );
    }
}
