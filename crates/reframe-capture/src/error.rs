//! Error types for capture devices and readback

use reframe_surface::{ErrorClass, SurfaceError};
use thiserror::Error;

/// Errors that can occur while capturing
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Device resolution below the supported minimum
    #[error("Resolution too low: {width}x{height} (minimum 16x16)")]
    InvalidResolution {
        /// Configured width
        width: u32,
        /// Configured height
        height: u32,
    },

    /// Invalid device or scheduler configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No device with this name
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// A device with this name already exists
    #[error("Device already exists: {0}")]
    DuplicateDevice(String),

    /// Device limit reached
    #[error("Too many devices (max {max})")]
    TooManyDevices {
        /// Configured limit
        max: usize,
    },

    /// Pixel transfer from the render target failed
    #[error("Readback failed: {0}")]
    Transfer(String),

    /// The frame source could not render
    #[error("Render failed: {0}")]
    Render(String),

    /// Surface error
    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),
}

/// Result type for capture operations
pub type Result<T> = std::result::Result<T, CaptureError>;

impl CaptureError {
    /// Classify this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidResolution { .. }
            | Self::InvalidConfig(_)
            | Self::DeviceNotFound(_)
            | Self::DuplicateDevice(_)
            | Self::TooManyDevices { .. } => ErrorClass::Configuration,
            Self::Transfer(_) | Self::Render(_) => ErrorClass::Transfer,
            Self::Surface(e) => e.class(),
        }
    }
}

/// Classify a capture error for recovery decisions
pub fn classify_error(error: &CaptureError) -> ErrorClass {
    error.class()
}
