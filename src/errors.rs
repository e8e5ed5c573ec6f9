// SPDX-License-Identifier: GPL-3.0-only

//! Error types for depth capture, rendering and still-photo loading

use std::fmt;

use crate::backends::camera::types::BackendError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for capture session configuration
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Result type alias for still-photo depth loading
pub type PhotoResult<T> = Result<T, PhotoError>;

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Capture session errors
    Capture(CaptureError),
    /// Still-photo depth errors
    Photo(PhotoError),
    /// Configuration errors
    Config(String),
    /// Storage/filesystem errors
    Storage(String),
    /// Generic error with message
    Other(String),
}

/// Capture session configuration errors
///
/// These indicate a hardware or platform precondition that the caller is
/// expected to have checked. They are reported before the pipeline starts
/// and are never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// No matching device and no default video device
    NoDeviceFound,
    /// No video format offers a companion depth format of the target encoding
    NoMatchingFormat(String),
    /// The device input cannot be attached to the session
    CannotAddInput(String),
    /// A required output (video, depth or metadata) cannot be attached
    CannotAddOutput(String),
    /// The session has not been configured yet
    NotConfigured,
    /// The operation is not valid in the current session phase
    InvalidState(String),
    /// Backend failure while starting or stopping the stream
    Backend(String),
}

/// Still-photo depth errors
#[derive(Debug, Clone)]
pub enum PhotoError {
    /// Manifest could not be read or parsed
    InvalidManifest(String),
    /// A referenced resource is missing
    MissingResource(String),
    /// A raw depth map does not match its declared dimensions
    InvalidDepthMap(String),
    /// Image decoding failed
    DecodeFailed(String),
    /// Writing an output image failed
    SaveFailed(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Capture(e) => write!(f, "Capture error: {}", e),
            AppError::Photo(e) => write!(f, "Photo error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::NoDeviceFound => write!(f, "No capture device found"),
            CaptureError::NoMatchingFormat(msg) => write!(f, "No matching format: {}", msg),
            CaptureError::CannotAddInput(msg) => write!(f, "Cannot add input: {}", msg),
            CaptureError::CannotAddOutput(msg) => write!(f, "Cannot add output: {}", msg),
            CaptureError::NotConfigured => write!(f, "Capture session is not configured"),
            CaptureError::InvalidState(msg) => write!(f, "Invalid session state: {}", msg),
            CaptureError::Backend(msg) => write!(f, "Backend error: {}", msg),
        }
    }
}

impl fmt::Display for PhotoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhotoError::InvalidManifest(msg) => write!(f, "Invalid manifest: {}", msg),
            PhotoError::MissingResource(msg) => write!(f, "Missing resource: {}", msg),
            PhotoError::InvalidDepthMap(msg) => write!(f, "Invalid depth map: {}", msg),
            PhotoError::DecodeFailed(msg) => write!(f, "Decode failed: {}", msg),
            PhotoError::SaveFailed(msg) => write!(f, "Save failed: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for CaptureError {}
impl std::error::Error for PhotoError {}

impl From<CaptureError> for AppError {
    fn from(err: CaptureError) -> Self {
        AppError::Capture(err)
    }
}

impl From<PhotoError> for AppError {
    fn from(err: PhotoError) -> Self {
        AppError::Photo(err)
    }
}

impl From<BackendError> for CaptureError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::DeviceNotFound(_) => CaptureError::NoDeviceFound,
            BackendError::FormatNotSupported(msg) => CaptureError::NoMatchingFormat(msg),
            other => CaptureError::Backend(other.to_string()),
        }
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for PhotoError {
    fn from(err: std::io::Error) -> Self {
        PhotoError::MissingResource(err.to_string())
    }
}

impl From<image::ImageError> for PhotoError {
    fn from(err: image::ImageError) -> Self {
        PhotoError::DecodeFailed(err.to_string())
    }
}

impl From<serde_json::Error> for PhotoError {
    fn from(err: serde_json::Error) -> Self {
        PhotoError::InvalidManifest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_maps_to_configuration_error() {
        let err: CaptureError = BackendError::DeviceNotFound("none".into()).into();
        assert_eq!(err, CaptureError::NoDeviceFound);

        let err: CaptureError = BackendError::Other("boom".into()).into();
        assert!(matches!(err, CaptureError::Backend(_)));
    }

    #[test]
    fn test_display_includes_category() {
        let err = AppError::from(CaptureError::NoMatchingFormat("depth32".into()));
        assert_eq!(
            err.to_string(),
            "Capture error: No matching format: depth32"
        );
    }
}
