//! # reframe-capture
//!
//! Virtual capture devices: paced rendering into an offscreen target and
//! synchronous or asynchronous readback into a platform video input.
//!
//! This crate is part of the `reframe` workspace and builds on
//! [`reframe-surface`](reframe_surface) for render targets and the
//! allocate-or-reuse rule.
//!
//! # Features
//!
//! - **Frame pacing**: each device emits at most one frame per `1/fps` of
//!   host time and at most one frame per tick
//! - **Readback strategies**: Sync (one tick of latency) or Async (callback
//!   delivered on a later tick), chosen once from a startup probe
//! - **Non-fatal transfer errors**: failed readbacks skip the frame and the
//!   device stays armed
//! - **Resolution validation**: devices below 16x16 stay disabled until
//!   reconfigured
//! - **Virtual video input**: in-memory device registry that hands captured
//!   frames back out as frame descriptors
//!
//! # Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use reframe_capture::{
//!     CaptureScheduler, DeviceConfig, ReadbackCapabilities, SchedulerConfig,
//!     SoftwareGpu, TestPattern, VirtualVideoInput,
//! };
//! use reframe_surface::SurfaceAllocator;
//!
//! let gpu = SoftwareGpu::new();
//! let caps = ReadbackCapabilities::probe(&gpu);
//! let input = VirtualVideoInput::new();
//!
//! let mut scheduler = CaptureScheduler::new(
//!     SchedulerConfig::default(),
//!     caps,
//!     gpu,
//!     input.clone(),
//!     SurfaceAllocator::new(),
//! )?;
//!
//! let config = DeviceConfig::builder().name("cam").resolution(64, 48).fps(10).build();
//! scheduler.add_device(config, Box::new(TestPattern::new()))?;
//!
//! for _ in 0..4 {
//!     scheduler.tick(Duration::from_millis(100))?;
//! }
//! assert_eq!(input.frames_received("cam"), 3);
//! # Ok::<(), reframe_capture::CaptureError>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//!            tick(elapsed)
//!                 │
//!                 ▼
//! ┌──────────────────────────────┐
//! │       CaptureScheduler       │ ◄── pump backend, drain completions
//! └──────────────┬───────────────┘
//!                │ per armed device
//!                ▼
//! ┌──────────────────────────────┐
//! │ CaptureDevice + PacingClock  │ ◄── at most one capture per tick
//! └──────────────┬───────────────┘
//!                │ FrameSource::render
//!                ▼
//! ┌──────────────────────────────┐
//! │         GpuReadback          │ ──► Sync: copy to CPU surface
//! └──────────────┬───────────────┘ ──► Async: callback on later pump
//!                ▼
//! ┌──────────────────────────────┐
//! │     VideoInput::update_frame │
//! └──────────────────────────────┘
//! ```

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod config;
pub mod error;
pub mod pacing;
pub mod readback;
pub mod source;
pub mod video_input;

// =============================================================================
// DEVICES AND SCHEDULING
// =============================================================================

pub mod device;
pub mod driver;
pub mod scheduler;

// =============================================================================
// RE-EXPORTS - PRIMARY API
// =============================================================================

pub use config::{
    DeviceConfig, DeviceConfigBuilder, SchedulerConfig, SchedulerConfigBuilder, MIN_DIMENSION,
};
pub use device::{CaptureDevice, DeviceState, DeviceStats};
pub use driver::drive;
pub use error::{classify_error, CaptureError, Result};
pub use pacing::PacingClock;
pub use readback::{
    GpuReadback, ReadbackCallback, ReadbackCapabilities, ReadbackData, ReadbackMode, RequestId,
    SoftwareGpu,
};
pub use scheduler::{CaptureScheduler, SchedulerStats};
pub use source::{FrameSource, TestPattern};
pub use video_input::{VideoInput, VirtualVideoInput};

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
