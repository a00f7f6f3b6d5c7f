//! Error kinds surfaced by the capture and registration flow

use std::io;
use thiserror::Error;

/// Camera acquisition and frame handling errors
#[derive(Debug, Error)]
pub enum CameraError {
    /// The device exists but the user may not open it
    #[error("camera access denied for {0}")]
    PermissionDenied(String),
    #[error("camera device not found: {0}")]
    DeviceNotFound(String),
    /// No live session, or the session has not delivered a frame yet
    #[error("camera is not ready")]
    NotReady,
    #[error("unsupported pixel format {0}")]
    UnsupportedFormat(String),
    #[error("image encoding failed: {0}")]
    Encode(String),
    #[error("camera backend error: {0}")]
    Backend(String),
}

impl CameraError {
    /// Classify an IO error raised while opening `device`
    pub fn from_io(device: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(device.to_string()),
            io::ErrorKind::NotFound => Self::DeviceNotFound(device.to_string()),
            _ => Self::Backend(format!("{}: {}", device, err)),
        }
    }
}

/// Errors from the registration backend HTTP API
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("server returned HTTP {status}")]
    Status { status: u16 },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Why a registration attempt did not go through
#[derive(Debug, Error)]
pub enum RegisterError {
    /// Username empty after trimming
    #[error("username must not be empty")]
    Validation,
    #[error("a registration is already in progress")]
    SubmitInFlight,
    #[error("exactly {expected} photos are required, {actual} captured")]
    IncompletePhotos { expected: usize, actual: usize },
    #[error("server error: HTTP {status}")]
    Server { status: u16 },
    #[error("network error: {0}")]
    Network(String),
}

impl From<ApiError> for RegisterError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Status { status } => Self::Server { status },
            ApiError::Transport(e) => Self::Network(e.to_string()),
            ApiError::Decode(e) => Self::Network(e.to_string()),
        }
    }
}
