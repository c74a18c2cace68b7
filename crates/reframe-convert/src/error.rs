//! Error types for frame conversion

use reframe_surface::{ErrorClass, FrameFormat, SurfaceError};
use thiserror::Error;

use crate::job::JobState;
use crate::registry::ConverterKind;

/// Errors that can occur while converting frames
#[derive(Error, Debug)]
pub enum ConvertError {
    /// A converter was handed a frame it cannot convert
    ///
    /// Callers must check `can_convert` (or use the registry) first.
    #[error("{kind:?} converter cannot convert {format:?} frame")]
    Unsupported {
        /// Converter that rejected the frame
        kind: ConverterKind,
        /// Format of the rejected frame
        format: FrameFormat,
    },

    /// No registered converter accepts the frame on this platform
    #[error("No converter registered for {0:?} frames")]
    NoConverter(FrameFormat),

    /// Job operation called in the wrong state
    #[error("Cannot {operation} while job is {state:?}")]
    InvalidState {
        /// Operation attempted
        operation: &'static str,
        /// State the job was in
        state: JobState,
    },

    /// A converter kind was registered for a format it does not accept
    #[error("{kind:?} converter cannot be registered for {format:?} frames")]
    Registration {
        /// Converter kind
        kind: ConverterKind,
        /// Format it was registered for
        format: FrameFormat,
    },

    /// A plane view does not fit inside its buffer
    #[error("{plane} plane ends at byte {end} but buffer holds {len}")]
    PlaneOutOfBounds {
        /// Plane name
        plane: &'static str,
        /// First byte past the plane (saturated on overflow)
        end: usize,
        /// Buffer length
        len: usize,
    },

    /// Surface does not have the size or layout the conversion writes
    #[error("Surface mismatch: expected {expected}, got {actual}")]
    SurfaceMismatch {
        /// Expected size and layout
        expected: String,
        /// Actual size and layout
        actual: String,
    },

    /// Frame or surface error
    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),

    /// The conversion worker thread could not be started
    #[error("Conversion worker unavailable: {0}")]
    WorkerUnavailable(String),

    /// The conversion worker stopped while a task was in flight
    #[error("Conversion worker stopped with a task in flight")]
    WorkerLost,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for conversion operations
pub type Result<T> = std::result::Result<T, ConvertError>;

impl ConvertError {
    /// Classify this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Unsupported { .. } | Self::InvalidState { .. } | Self::Registration { .. } => {
                ErrorClass::Programming
            }
            Self::NoConverter(_)
            | Self::PlaneOutOfBounds { .. }
            | Self::SurfaceMismatch { .. }
            | Self::InvalidConfig(_) => ErrorClass::Configuration,
            Self::Surface(e) => e.class(),
            Self::WorkerUnavailable(_) | Self::WorkerLost => ErrorClass::ResourceExhaustion,
        }
    }

    pub(crate) fn invalid_state(operation: &'static str, state: JobState) -> Self {
        Self::InvalidState { operation, state }
    }
}

/// Classify a conversion error for recovery decisions
pub fn classify_error(error: &ConvertError) -> ErrorClass {
    error.class()
}
