//! # reframe-convert
//!
//! Pixel format conversion from frame descriptors to display surfaces.
//!
//! This crate is part of the `reframe` workspace and builds on
//! [`reframe-surface`](reframe_surface) for frames, surfaces and the
//! allocate-or-reuse rule.
//!
//! # Features
//!
//! - **Closed converter set**: Packed32 copy, planar luminance + chroma,
//!   planar to RGBA, external surface handoff
//! - **Lookup-table dispatch**: formats map to converters through
//!   [`ConverterRegistry`], extended by explicit registration
//! - **Bounds-checked planes**: every plane view is validated against its
//!   buffer before a byte is read; odd sizes are handled
//! - **Off-path worker**: optional dedicated thread for planar copies, polled
//!   without blocking
//! - **Presenter**: one call per frame, returns the surface, its material and
//!   the display transform
//!
//! # Quick Start
//!
//! ```rust
//! use reframe_convert::{ConverterConfig, FramePresenter, PlanarOutput};
//! use reframe_surface::{FrameDescriptor, FrameFormat, SurfaceAllocator};
//!
//! let config = ConverterConfig::builder()
//!     .planar_output(PlanarOutput::LumaChroma)
//!     .build();
//! let mut presenter = FramePresenter::new(config, SurfaceAllocator::new())?;
//!
//! let len = FrameFormat::Planar420.buffer_len(640, 480).unwrap_or_default();
//! let frame = FrameDescriptor::planar420(640, 480, vec![16; len])?;
//!
//! if let Some(presented) = presenter.present(frame)? {
//!     // luminance + chroma surface is 50% taller than the image
//!     assert_eq!(presenter.surface().map(|s| s.height()), Some(720));
//!     assert_eq!(presented.meta.height, 480);
//!     assert!(presented.material_tag.is_some());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! FrameDescriptor
//!       │
//!       ▼
//! ┌───────────────────┐
//! │ ConverterRegistry │ ◄── format → [ConverterKind] lookup table
//! └─────────┬─────────┘     capability check per kind
//!           ▼
//! ┌───────────────────┐
//! │  ConversionJob    │ ◄── Idle → Allocated → (Converting) → Done
//! │                   │     ensure_surface on the caller's surface
//! └─────────┬─────────┘
//!           │ PlanarRgba only
//!           ▼
//! ┌───────────────────┐
//! │ luma+chroma job   │ ──► BT.601 blit ──► copy into final surface
//! └───────────────────┘
//! ```

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod config;
pub mod error;
pub mod job;
pub mod planes;
pub mod registry;
pub mod transform;
pub mod yuv;

// =============================================================================
// DISPATCH AND PRESENTATION
// =============================================================================

pub mod presenter;
pub mod worker;

// =============================================================================
// RE-EXPORTS - PRIMARY API
// =============================================================================

pub use config::{ConverterConfig, ConverterConfigBuilder, Dispatch, PlanarOutput, PlatformCapabilities};
pub use error::{classify_error, ConvertError, Result};
pub use job::{ConversionJob, JobState};
pub use planes::{copy_i420, I420Layout, LumaChromaLayout, PlaneView};
pub use presenter::{FramePresenter, Presented};
pub use registry::{surface_extent, ConverterKind, ConverterRegistry, LUMA_CHROMA_MATERIAL};
pub use transform::DisplayTransform;
pub use worker::{ConversionWorker, WorkerStats};

// =============================================================================
// CRATE-LEVEL ITEMS
// =============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
