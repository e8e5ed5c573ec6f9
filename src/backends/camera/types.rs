// SPDX-License-Identifier: GPL-3.0-only
// Shared types for capture backend abstraction

//! Shared types for capture backends

use half::f16;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Which side of the device a camera faces
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// User-facing camera (selfie side)
    #[default]
    Front,
    /// World-facing camera
    Back,
}

impl std::fmt::Display for Facing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Facing::Front => write!(f, "front"),
            Facing::Back => write!(f, "back"),
        }
    }
}

/// Physical camera module type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// Structured-light depth camera (front)
    TrueDepth,
    /// Stereo pair producing disparity (back)
    DualCamera,
    /// Single wide-angle module
    WideAngle,
    /// Single telephoto module
    Telephoto,
}

impl DeviceKind {
    /// Whether this module type can deliver depth data
    pub fn supports_depth(&self) -> bool {
        matches!(self, DeviceKind::TrueDepth | DeviceKind::DualCamera)
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::TrueDepth => write!(f, "TrueDepth"),
            DeviceKind::DualCamera => write!(f, "Dual"),
            DeviceKind::WideAngle => write!(f, "Wide Angle"),
            DeviceKind::Telephoto => write!(f, "Telephoto"),
        }
    }
}

/// Represents a physical capture device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureDevice {
    pub id: String,
    pub name: String,
    pub facing: Facing,
    pub kind: DeviceKind,
}

/// Camera request: facing plus whether depth is mandatory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CameraType {
    pub facing: Facing,
    pub require_depth: bool,
}

impl CameraType {
    pub fn front(require_depth: bool) -> Self {
        Self {
            facing: Facing::Front,
            require_depth,
        }
    }

    pub fn back(require_depth: bool) -> Self {
        Self {
            facing: Facing::Back,
            require_depth,
        }
    }

    /// Same depth requirement, opposite facing
    pub fn toggled(&self) -> Self {
        let facing = match self.facing {
            Facing::Front => Facing::Back,
            Facing::Back => Facing::Front,
        };
        Self {
            facing,
            require_depth: self.require_depth,
        }
    }
}

/// Pixel dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Framerate as a fraction (numerator/denominator)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Framerate {
    pub num: u32,
    pub denom: u32,
}

impl Framerate {
    /// Create a new framerate from numerator and denominator
    pub fn new(num: u32, denom: u32) -> Self {
        Self {
            num,
            denom: if denom == 0 { 1 } else { denom },
        }
    }

    /// Create a framerate from an integer (e.g., 30 becomes 30/1)
    pub fn from_int(fps: u32) -> Self {
        Self { num: fps, denom: 1 }
    }

    /// Get the framerate as a floating point value
    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.denom as f64
    }

    /// Duration of a single frame at this rate
    pub fn frame_duration(&self) -> Duration {
        if self.num == 0 {
            return Duration::from_secs(1);
        }
        Duration::from_nanos(1_000_000_000u64 * self.denom as u64 / self.num as u64)
    }
}

impl std::fmt::Display for Framerate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.denom != 1 {
            write!(f, "{:.2}", self.as_f64())
        } else {
            write!(f, "{}", self.num)
        }
    }
}

impl Default for Framerate {
    fn default() -> Self {
        Self { num: 30, denom: 1 }
    }
}

/// Pixel format of video frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// BGRA - 32-bit with alpha (B G R A byte order)
    /// The format the video output is always configured to deliver
    BGRA,
    /// RGBA - 32-bit with alpha (4 bytes per pixel)
    RGBA,
    /// NV12 - Semi-planar 4:2:0 (Y plane + interleaved UV plane)
    /// Native sensor format of most capture formats
    NV12,
}

/// Whether depth values are distances or inverse distances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepthRepresentation {
    /// Absolute distance from the camera in meters
    Depth,
    /// Inverse distance in 1/meters (closer = larger)
    Disparity,
}

impl std::fmt::Display for DepthRepresentation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DepthRepresentation::Depth => write!(f, "depth"),
            DepthRepresentation::Disparity => write!(f, "disparity"),
        }
    }
}

/// Bit precision of depth samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepthPrecision {
    Float16,
    Float32,
}

/// Pixel encoding of a depth map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthDataType {
    DisparityFloat16,
    DisparityFloat32,
    DepthFloat16,
    DepthFloat32,
}

impl DepthDataType {
    pub fn from_parts(representation: DepthRepresentation, precision: DepthPrecision) -> Self {
        match (representation, precision) {
            (DepthRepresentation::Disparity, DepthPrecision::Float16) => Self::DisparityFloat16,
            (DepthRepresentation::Disparity, DepthPrecision::Float32) => Self::DisparityFloat32,
            (DepthRepresentation::Depth, DepthPrecision::Float16) => Self::DepthFloat16,
            (DepthRepresentation::Depth, DepthPrecision::Float32) => Self::DepthFloat32,
        }
    }

    pub fn representation(&self) -> DepthRepresentation {
        match self {
            Self::DisparityFloat16 | Self::DisparityFloat32 => DepthRepresentation::Disparity,
            Self::DepthFloat16 | Self::DepthFloat32 => DepthRepresentation::Depth,
        }
    }

    pub fn precision(&self) -> DepthPrecision {
        match self {
            Self::DisparityFloat16 | Self::DepthFloat16 => DepthPrecision::Float16,
            Self::DisparityFloat32 | Self::DepthFloat32 => DepthPrecision::Float32,
        }
    }
}

impl std::fmt::Display for DepthDataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DisparityFloat16 => write!(f, "DisparityFloat16"),
            Self::DisparityFloat32 => write!(f, "DisparityFloat32"),
            Self::DepthFloat16 => write!(f, "DepthFloat16"),
            Self::DepthFloat32 => write!(f, "DepthFloat32"),
        }
    }
}

/// A depth stream format offered alongside a video format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthFormat {
    pub size: Size,
    pub data_type: DepthDataType,
}

impl std::fmt::Display for DepthFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.size, self.data_type)
    }
}

/// Video format specification with its companion depth formats
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureFormat {
    pub size: Size,
    pub pixel_format: PixelFormat,
    pub framerate: Framerate,
    pub depth_formats: Vec<DepthFormat>,
}

impl CaptureFormat {
    /// Companion depth formats with the given encoding
    pub fn depth_formats_of(&self, data_type: DepthDataType) -> impl Iterator<Item = &DepthFormat> {
        self.depth_formats
            .iter()
            .filter(move |d| d.data_type == data_type)
    }
}

impl std::fmt::Display for CaptureFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {}fps", self.size, self.framerate)
    }
}

/// Orientation of a capture connection
///
/// Sensors deliver landscape-right natively; other orientations are
/// expressed as clockwise quarter turns from that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Orientation {
    #[default]
    Portrait,
    PortraitUpsideDown,
    LandscapeRight,
    LandscapeLeft,
}

impl Orientation {
    /// Clockwise quarter turns relative to the sensor's native orientation
    pub fn quarter_turns(&self) -> u32 {
        match self {
            Orientation::LandscapeRight => 0,
            Orientation::Portrait => 1,
            Orientation::LandscapeLeft => 2,
            Orientation::PortraitUpsideDown => 3,
        }
    }
}

/// Orientation and mirroring applied to an output connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionSettings {
    pub orientation: Orientation,
    pub mirrored: bool,
}

impl ConnectionSettings {
    /// Portrait orientation, mirrored iff the camera faces the user
    pub fn for_facing(facing: Facing) -> Self {
        Self {
            orientation: Orientation::Portrait,
            mirrored: facing == Facing::Front,
        }
    }

    /// Map a normalized rectangle from sensor output space into this connection's space
    ///
    /// Rotation is applied first, then the horizontal mirror.
    pub fn transform_rect(&self, rect: &FaceRegion) -> FaceRegion {
        let mut out = rect.clone();
        for _ in 0..self.orientation.quarter_turns() {
            out = FaceRegion {
                x: 1.0 - (out.y + out.height),
                y: out.x,
                width: out.height,
                height: out.width,
            };
        }
        if self.mirrored {
            out.x = 1.0 - (out.x + out.width);
        }
        out
    }
}

/// A rectangular face region within a frame
///
/// Coordinates are normalized (0.0 to 1.0) relative to the frame dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceRegion {
    /// Left edge (0.0 = left of frame, 1.0 = right of frame)
    pub x: f32,
    /// Top edge (0.0 = top of frame, 1.0 = bottom of frame)
    pub y: f32,
    /// Width as fraction of frame width
    pub width: f32,
    /// Height as fraction of frame height
    pub height: f32,
}

/// Kinds of metadata the metadata output can detect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKind {
    Face,
    HumanBody,
    Barcode,
}

/// A detected metadata object in output (sensor) coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataObject {
    pub kind: MetadataKind,
    pub bounds: FaceRegion,
}

/// A single video frame from the video output
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Pixel data, `stride * height` bytes
    pub data: Arc<[u8]>,
    pub format: PixelFormat,
    /// Row stride in bytes
    pub stride: u32,
    /// Capture timestamp relative to session start
    pub timestamp: Duration,
}

/// Scalar samples of a depth map at their native precision
#[derive(Debug, Clone, PartialEq)]
pub enum DepthValues {
    Float16(Vec<f16>),
    Float32(Vec<f32>),
}

impl DepthValues {
    pub fn len(&self) -> usize {
        match self {
            DepthValues::Float16(v) => v.len(),
            DepthValues::Float32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn precision(&self) -> DepthPrecision {
        match self {
            DepthValues::Float16(_) => DepthPrecision::Float16,
            DepthValues::Float32(_) => DepthPrecision::Float32,
        }
    }

    /// Sample `index` widened to f32
    pub fn get(&self, index: usize) -> Option<f32> {
        match self {
            DepthValues::Float16(v) => v.get(index).map(|x| x.to_f32()),
            DepthValues::Float32(v) => v.get(index).copied(),
        }
    }

    /// All samples widened to f32
    pub fn to_f32_vec(&self) -> Vec<f32> {
        match self {
            DepthValues::Float16(v) => v.iter().map(|x| x.to_f32()).collect(),
            DepthValues::Float32(v) => v.clone(),
        }
    }
}

/// A 2D buffer of depth or disparity samples
#[derive(Debug, Clone, PartialEq)]
pub struct DepthMap {
    width: u32,
    height: u32,
    values: DepthValues,
}

impl DepthMap {
    /// Create a depth map, checking the sample count against the dimensions
    pub fn new(width: u32, height: u32, values: DepthValues) -> BackendResult<Self> {
        let expected = width as usize * height as usize;
        if values.len() != expected {
            return Err(BackendError::Other(format!(
                "depth map {}x{} needs {} samples, got {}",
                width,
                height,
                expected,
                values.len()
            )));
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    /// Same dimensions, new samples; the sample count must not change
    pub(crate) fn with_values(&self, values: DepthValues) -> Self {
        debug_assert_eq!(
            values.len(),
            self.values.len(),
            "depth map sample count changed"
        );
        Self {
            width: self.width,
            height: self.height,
            values,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn values(&self) -> &DepthValues {
        &self.values
    }

    pub fn precision(&self) -> DepthPrecision {
        self.values.precision()
    }

    /// Sample at (x, y), widened to f32
    pub fn value_at(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.values.get(y as usize * self.width as usize + x as usize)
    }
}

/// One depth frame as delivered by the depth output
#[derive(Debug, Clone, PartialEq)]
pub struct DepthData {
    pub map: DepthMap,
    pub representation: DepthRepresentation,
    /// Capture timestamp relative to session start
    pub timestamp: Duration,
    /// Whether the depth output's smoothing filter was applied
    pub filtered: bool,
}

impl DepthData {
    pub fn new(map: DepthMap, representation: DepthRepresentation, timestamp: Duration) -> Self {
        Self {
            map,
            representation,
            timestamp,
            filtered: false,
        }
    }

    /// Encoding of this frame (representation plus precision)
    pub fn data_type(&self) -> DepthDataType {
        DepthDataType::from_parts(self.representation, self.map.precision())
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone)]
pub enum BackendError {
    /// Backend is not available on this system
    NotAvailable(String),
    /// Failed to start or stop streaming
    StreamFailed(String),
    /// Camera device not found
    DeviceNotFound(String),
    /// Format not supported
    FormatNotSupported(String),
    /// Device input rejected by the session
    InputRejected(String),
    /// Other errors
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::NotAvailable(msg) => write!(f, "Backend not available: {}", msg),
            BackendError::StreamFailed(msg) => write!(f, "Stream failed: {}", msg),
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::FormatNotSupported(msg) => write!(f, "Format not supported: {}", msg),
            BackendError::InputRejected(msg) => write!(f, "Input rejected: {}", msg),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}
