//! # reframe
//!
//! Video frame conversion, display surface lifecycle and virtual capture
//! devices for Rust.
//!
//! This crate provides a unified interface to the reframe libraries:
//!
//! - **[`surface`]** - Frame descriptors, display surfaces, allocate-or-reuse and ownership transfer
//! - **[`convert`]** - Packed32 / Planar420 / external surface conversion and presentation
//! - **[`capture`]** - Virtual capture devices with frame pacing and GPU readback
//!
//! # Features
//!
//! All features are enabled by default. You can selectively enable only what you need:
//!
//! ```toml
//! # Use everything (default)
//! reframe = "0.1"
//!
//! # Conversion only
//! reframe = { version = "0.1", default-features = false, features = ["convert"] }
//! ```
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `convert` | Yes | Frame conversion engine |
//! | `capture` | Yes | Virtual capture devices |
//! | `full` | No | All features from all sub-crates |
//!
//! [`surface`] is always available.
//!
//! # Quick Start
//!
//! ## Capture → Convert
//!
//! ```rust
//! use std::time::Duration;
//! use reframe::prelude::*;
//!
//! let allocator = SurfaceAllocator::new();
//! let gpu = SoftwareGpu::new();
//! let caps = ReadbackCapabilities::probe(&gpu);
//! let input = VirtualVideoInput::new();
//!
//! let mut scheduler = CaptureScheduler::new(
//!     SchedulerConfig::default(), caps, gpu, input.clone(), allocator.clone(),
//! )?;
//! let camera = DeviceConfig::builder().name("cam").resolution(64, 48).fps(30).build();
//! scheduler.add_device(camera, Box::new(TestPattern::new()))?;
//!
//! let mut presenter = FramePresenter::new(ConverterConfig::default(), allocator)?;
//! for _ in 0..3 {
//!     scheduler.tick(Duration::from_millis(34))?;
//!     if let Some(frame) = input.take_frame("cam")? {
//!         if let Some(presented) = presenter.present(frame)? {
//!             // local frames are mirrored; readback rows are bottom-up
//!             assert!(presented.transform.mirror);
//!             assert!(presented.transform.vertical_flip);
//!         }
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            reframe                              │
//! ├─────────────────────┬─────────────────────┬─────────────────────┤
//! │   reframe-capture   │   reframe-convert   │   reframe-surface   │
//! │                     │                     │                     │
//! │  CaptureScheduler   │  FramePresenter     │  FrameDescriptor    │
//! │  CaptureDevice      │  ConverterRegistry  │  SurfaceAllocator   │
//! │  GpuReadback        │  ConversionJob      │  SurfaceSlot        │
//! └──────────┬──────────┴──────────┬──────────┴─────────────────────┘
//!            │                     │
//!            ▼                     ▼
//!   VideoInput::update_frame   Surface + material tag + DisplayTransform
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// RE-EXPORTS
// =============================================================================

/// Frame descriptors, display surfaces and their lifecycle.
///
/// See [`reframe_surface`] documentation for details.
pub use reframe_surface as surface;

/// Pixel format conversion from frame descriptors to display surfaces.
///
/// This module provides:
/// - Packed32 direct copy
/// - Planar420 luminance + chroma layout and BT.601 RGBA output
/// - External surface handoff
/// - Display transforms (mirror, rotation, vertical flip)
///
/// See [`reframe_convert`] documentation for details.
#[cfg(feature = "convert")]
#[cfg_attr(docsrs, doc(cfg(feature = "convert")))]
pub use reframe_convert as convert;

/// Virtual capture devices with frame pacing and readback.
///
/// This module provides:
/// - Per-device pacing clocks
/// - Sync and async readback strategies
/// - A virtual video input for registered devices
///
/// See [`reframe_capture`] documentation for details.
#[cfg(feature = "capture")]
#[cfg_attr(docsrs, doc(cfg(feature = "capture")))]
pub use reframe_capture as capture;

// =============================================================================
// PRELUDE - Common types for convenience
// =============================================================================

/// Prelude module with commonly used types.
///
/// ```rust
/// use reframe::prelude::*;
/// ```
pub mod prelude {
    pub use reframe_surface::{
        ErrorClass, FrameDescriptor, FrameFormat, Rotation, SourceId, Surface, SurfaceAllocator,
        SurfaceError, SurfaceFormat,
    };

    #[cfg(feature = "convert")]
    pub use reframe_convert::{ConvertError, ConverterConfig, DisplayTransform, FramePresenter, Presented};

    #[cfg(feature = "capture")]
    pub use reframe_capture::{
        CaptureError, CaptureScheduler, DeviceConfig, ReadbackCapabilities, SchedulerConfig,
        SoftwareGpu, TestPattern, VideoInput, VirtualVideoInput,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    #[cfg(feature = "convert")]
    fn test_convert_reexport() {
        let config = convert::ConverterConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    #[cfg(feature = "capture")]
    fn test_capture_reexport() {
        let config = capture::DeviceConfig::default();
        assert!(config.validate().is_ok());
    }
}
