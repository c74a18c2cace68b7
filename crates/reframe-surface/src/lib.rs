//! # reframe-surface
//!
//! Frame descriptors, display surfaces and the allocate-or-reuse surface
//! lifecycle shared by the conversion engine and the capture scheduler.
//!
//! This crate is part of the `reframe` workspace. It has no knowledge of
//! pixel conversion or capture pacing; it only defines who owns which
//! buffer and when it is released.
//!
//! # Ownership Model
//!
//! ```text
//!  producer (capture / transport)
//!          │ FrameDescriptor (owned bytes or external Surface)
//!          ▼
//!  conversion job ── ensure_surface ──► SurfaceAllocator
//!          │                               ▲
//!          │ complete(): frame disposed    │ destroy / release
//!          ▼                               │
//!  Surface ── SurfaceSlot (pipeline-owned) ┘
//!          │
//!          └─ take_ownership() ──► caller-owned, never touched again
//! ```
//!
//! - A [`Surface`] is never pipeline-owned and caller-owned at the same time;
//!   it has no `Clone`.
//! - A [`FrameDescriptor`] must be disposed explicitly. Undisposed frames
//!   are counted as leaks by [`FrameTracker`] and logged in debug builds.
//! - [`SurfaceAllocator::stats`] counts every allocation and release, so
//!   reuse and leak properties are checked with counters, never with drop
//!   timing.
//!
//! # Error Classes
//!
//! All errors in the workspace map to an [`ErrorClass`]:
//!
//! | Class | Example | Handling |
//! |-------|---------|----------|
//! | `Configuration` | zero-sized frame, short buffer | fix input, reissue |
//! | `Transfer` | async readback failed | frame skipped |
//! | `Programming` | buffer used after dispose | caller defect |
//! | `ResourceExhaustion` | surface allocation failed | fatal |

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod error;
pub mod format;
pub mod frame;
pub mod slot;
pub mod surface;

// =============================================================================
// RE-EXPORTS - PRIMARY API
// =============================================================================

pub use error::{classify_error, ErrorClass, Result, SurfaceError};
pub use format::{chroma_extent, FrameFormat, Rotation, SourceId, SurfaceFormat};
pub use frame::{FrameBuffer, FrameDescriptor, FrameMeta, FrameTracker};
pub use slot::SurfaceSlot;
pub use surface::{AllocationStats, Surface, SurfaceAllocator, SurfaceId};

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
