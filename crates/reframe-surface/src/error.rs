//! Error types and error classification
//!
//! Every crate in the workspace reports failures with its own typed error,
//! but they all map onto one [`ErrorClass`] taxonomy so callers can decide
//! how to react without matching every variant.

use thiserror::Error;

use crate::format::SurfaceFormat;

/// How a failure should be handled by the caller
///
/// There are no automatic retries anywhere in the pipeline. The class tells
/// the caller whether correcting input and reissuing makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Invalid resolution, unsupported format or bad buffer size.
    ///
    /// Rejected at call time. Nothing is left allocated; the caller must
    /// correct the configuration and reissue.
    Configuration,

    /// An asynchronous readback failed.
    ///
    /// The frame is skipped for that tick; the device stays armed.
    Transfer,

    /// The API was used out of order (convert before allocate, complete
    /// before done, unsupported frame handed to a converter).
    ///
    /// This is a caller defect, not a runtime condition.
    Programming,

    /// A surface could not be allocated. There is no degraded mode.
    ResourceExhaustion,
}

impl ErrorClass {
    /// Whether the pipeline can continue after this error
    ///
    /// Configuration errors are recoverable once the caller fixes the
    /// configuration; transfer errors only lose one frame.
    pub const fn is_recoverable(self) -> bool {
        matches!(self, Self::Configuration | Self::Transfer)
    }

    /// Whether the error indicates a caller defect
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::Programming | Self::ResourceExhaustion)
    }
}

/// Errors from surface allocation and frame buffer access
#[derive(Error, Debug)]
pub enum SurfaceError {
    /// Width or height is zero
    #[error("Invalid dimensions {width}x{height}")]
    InvalidDimensions {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
    },

    /// Byte buffer does not match what the frame dimensions require
    #[error("Buffer size mismatch: need {expected} bytes, got {actual}")]
    BufferSize {
        /// Bytes required by the layout
        expected: usize,
        /// Bytes supplied
        actual: usize,
    },

    /// The frame buffer was disposed or handed off already
    #[error("Frame buffer already disposed")]
    Disposed,

    /// The frame carries an external surface where bytes were expected, or
    /// the other way round
    #[error("Frame buffer kind does not match its format: {0}")]
    BufferKind(String),

    /// Surface size does not fit in memory
    #[error("Surface allocation of {bytes} bytes failed ({width}x{height} {format:?})")]
    AllocationFailed {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
        /// Requested format
        format: SurfaceFormat,
        /// Requested size in bytes (saturated on overflow)
        bytes: usize,
    },

    /// Allocation would exceed the allocator's byte budget
    #[error("Surface budget exhausted: {requested} bytes requested, {available} available")]
    BudgetExhausted {
        /// Requested size in bytes
        requested: usize,
        /// Remaining budget in bytes
        available: usize,
    },
}

/// Result type for surface operations
pub type Result<T> = std::result::Result<T, SurfaceError>;

impl SurfaceError {
    /// Classify this error
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidDimensions { .. } | Self::BufferSize { .. } | Self::BufferKind(_) => {
                ErrorClass::Configuration
            }
            Self::Disposed => ErrorClass::Programming,
            Self::AllocationFailed { .. } | Self::BudgetExhausted { .. } => {
                ErrorClass::ResourceExhaustion
            }
        }
    }

    pub(crate) fn buffer_kind(msg: impl Into<String>) -> Self {
        Self::BufferKind(msg.into())
    }
}

/// Classify a surface error for recovery decisions
pub fn classify_error(error: &SurfaceError) -> ErrorClass {
    error.class()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SurfaceError::InvalidDimensions { width: 0, height: 4 };
        assert_eq!(err.to_string(), "Invalid dimensions 0x4");

        let err = SurfaceError::BufferSize {
            expected: 32,
            actual: 16,
        };
        assert_eq!(err.to_string(), "Buffer size mismatch: need 32 bytes, got 16");
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            classify_error(&SurfaceError::InvalidDimensions { width: 0, height: 0 }),
            ErrorClass::Configuration
        );
        assert_eq!(classify_error(&SurfaceError::Disposed), ErrorClass::Programming);
        assert_eq!(
            classify_error(&SurfaceError::BudgetExhausted {
                requested: 10,
                available: 0
            }),
            ErrorClass::ResourceExhaustion
        );
    }

    #[test]
    fn test_recoverability() {
        assert!(ErrorClass::Configuration.is_recoverable());
        assert!(ErrorClass::Transfer.is_recoverable());
        assert!(!ErrorClass::Programming.is_recoverable());
        assert!(ErrorClass::ResourceExhaustion.is_fatal());
    }
}
