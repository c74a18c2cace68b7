//! Frame descriptors
//!
//! A [`FrameDescriptor`] describes one captured or received image together
//! with its backing buffer. It is owned by exactly one component at a time
//! and must be disposed explicitly with [`FrameDescriptor::dispose`]:
//!
//! - the conversion engine disposes it when a conversion completes,
//! - the producer disposes it if conversion is never attempted.
//!
//! Dropping a descriptor without disposing it still frees the memory, but it
//! is counted as a leak on its [`FrameTracker`] and, in debug builds, logged.
//!
//! # Examples
//!
//! ```rust
//! use reframe_surface::{FrameDescriptor, FrameFormat, FrameTracker, Rotation, SourceId};
//!
//! let tracker = FrameTracker::new();
//! let frame = FrameDescriptor::packed32(4, 2, vec![0u8; 32])?
//!     .with_rotation(Rotation::Deg90)
//!     .with_source(SourceId::Remote(7))
//!     .with_tracker(&tracker);
//!
//! assert_eq!(frame.format(), FrameFormat::Packed32);
//! frame.dispose();
//! assert_eq!(tracker.disposed(), 1);
//! assert_eq!(tracker.leaked(), 0);
//! # Ok::<(), reframe_surface::SurfaceError>(())
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

use crate::error::{Result, SurfaceError};
use crate::format::{FrameFormat, Rotation, SourceId};
use crate::surface::Surface;

/// Backing storage of a frame
///
/// Byte buffers and external surfaces are mutually exclusive.
#[derive(Debug)]
pub enum FrameBuffer {
    /// Owned contiguous bytes
    Bytes(Vec<u8>),
    /// A platform-owned surface
    External(Surface),
}

#[derive(Debug, Default)]
struct TrackerCounters {
    created: AtomicU64,
    disposed: AtomicU64,
    leaked: AtomicU64,
}

/// Counts frame descriptors created, disposed and leaked
///
/// Attach one tracker to the frames of a producer (or a test) to verify the
/// explicit release contract.
#[derive(Debug, Clone, Default)]
pub struct FrameTracker {
    counters: Arc<TrackerCounters>,
}

impl FrameTracker {
    /// Create a tracker with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames attached to this tracker
    pub fn created(&self) -> u64 {
        self.counters.created.load(Ordering::Relaxed)
    }

    /// Frames disposed explicitly
    pub fn disposed(&self) -> u64 {
        self.counters.disposed.load(Ordering::Relaxed)
    }

    /// Frames dropped without being disposed
    pub fn leaked(&self) -> u64 {
        self.counters.leaked.load(Ordering::Relaxed)
    }

    /// Frames that are still alive
    pub fn outstanding(&self) -> u64 {
        self.created() - self.disposed() - self.leaked()
    }
}

/// One image plus its backing buffer
pub struct FrameDescriptor {
    width: u32,
    height: u32,
    format: FrameFormat,
    buffer: Option<FrameBuffer>,
    rotation: Rotation,
    top_row_first: bool,
    source: SourceId,
    disposed: bool,
    tracker: Option<FrameTracker>,
}

impl FrameDescriptor {
    /// Create a Packed32 frame
    ///
    /// The buffer must hold exactly `width * height * 4` bytes.
    pub fn packed32(width: u32, height: u32, bytes: Vec<u8>) -> Result<Self> {
        Self::from_bytes(FrameFormat::Packed32, width, height, bytes)
    }

    /// Create a Planar420 frame
    ///
    /// The buffer must hold the luminance plane followed by the U and V
    /// planes, each `ceil(width/2) x ceil(height/2)`, tightly packed.
    pub fn planar420(width: u32, height: u32, bytes: Vec<u8>) -> Result<Self> {
        Self::from_bytes(FrameFormat::Planar420, width, height, bytes)
    }

    /// Wrap a platform-owned surface
    pub fn external(surface: Surface) -> Self {
        Self::new_unchecked(
            FrameFormat::ExternalSurface,
            surface.width(),
            surface.height(),
            FrameBuffer::External(surface),
        )
    }

    /// Create a frame with any byte-backed format
    ///
    /// Dimensions are not validated here; zero-sized frames are rejected by
    /// the conversion engine when it allocates. The buffer length is checked
    /// against the format for non-zero dimensions.
    pub fn from_bytes(format: FrameFormat, width: u32, height: u32, bytes: Vec<u8>) -> Result<Self> {
        if !format.has_bytes() {
            return Err(SurfaceError::buffer_kind(
                "external surface frames cannot be built from bytes",
            ));
        }
        if width > 0 && height > 0 {
            let expected = format
                .buffer_len(width, height)
                .ok_or(SurfaceError::InvalidDimensions { width, height })?;
            if bytes.len() != expected {
                return Err(SurfaceError::BufferSize {
                    expected,
                    actual: bytes.len(),
                });
            }
        }
        Ok(Self::new_unchecked(
            format,
            width,
            height,
            FrameBuffer::Bytes(bytes),
        ))
    }

    fn new_unchecked(format: FrameFormat, width: u32, height: u32, buffer: FrameBuffer) -> Self {
        Self {
            width,
            height,
            format,
            buffer: Some(buffer),
            rotation: Rotation::Deg0,
            top_row_first: true,
            source: SourceId::Local,
            disposed: false,
            tracker: None,
        }
    }

    /// Set the rotation the UI must apply
    #[must_use]
    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Set whether the first buffer row is the top of the image
    #[must_use]
    pub fn with_top_row_first(mut self, top_row_first: bool) -> Self {
        self.top_row_first = top_row_first;
        self
    }

    /// Set the frame source
    #[must_use]
    pub fn with_source(mut self, source: SourceId) -> Self {
        self.source = source;
        self
    }

    /// Count this frame on a tracker
    #[must_use]
    pub fn with_tracker(mut self, tracker: &FrameTracker) -> Self {
        if let Some(old) = self.tracker.replace(tracker.clone()) {
            // moving to a new tracker: the old one no longer expects a release
            old.counters.created.fetch_sub(1, Ordering::Relaxed);
        }
        tracker.counters.created.fetch_add(1, Ordering::Relaxed);
        self
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel layout
    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// Rotation the UI must apply
    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Whether the first buffer row is the top of the image
    pub fn top_row_first(&self) -> bool {
        self.top_row_first
    }

    /// Frame source
    pub fn source(&self) -> SourceId {
        self.source
    }

    /// Whether the frame holds directly addressable bytes
    pub fn has_direct_memory(&self) -> bool {
        matches!(self.buffer, Some(FrameBuffer::Bytes(_)))
    }

    /// Borrow the byte buffer
    ///
    /// # Errors
    ///
    /// [`SurfaceError::Disposed`] once the buffer is gone, or
    /// [`SurfaceError::BufferKind`] for external-surface frames.
    pub fn bytes(&self) -> Result<&[u8]> {
        match self.buffer {
            Some(FrameBuffer::Bytes(ref bytes)) => Ok(bytes),
            Some(FrameBuffer::External(_)) => Err(SurfaceError::buffer_kind(
                "frame holds an external surface, not bytes",
            )),
            None => Err(SurfaceError::Disposed),
        }
    }

    /// Take the external surface out of the frame
    ///
    /// After this call the caller owns the surface; disposing the frame will
    /// not destroy it. Returns `None` for byte frames or if the surface was
    /// already taken.
    pub fn take_surface(&mut self) -> Option<Surface> {
        match self.buffer.take() {
            Some(FrameBuffer::External(surface)) => Some(surface),
            other => {
                self.buffer = other;
                None
            }
        }
    }

    /// Release the frame and its buffer
    ///
    /// An external surface that was not taken is destroyed with the frame.
    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.buffer = None;
        if let Some(ref tracker) = self.tracker {
            tracker.counters.disposed.fetch_add(1, Ordering::Relaxed);
        }
        trace!(
            "Disposed {:?} frame {}x{} from {}",
            self.format,
            self.width,
            self.height,
            self.source
        );
    }
}

impl fmt::Debug for FrameDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameDescriptor")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("rotation", &self.rotation)
            .field("top_row_first", &self.top_row_first)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl Drop for FrameDescriptor {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }
        if let Some(ref tracker) = self.tracker {
            tracker.counters.leaked.fetch_add(1, Ordering::Relaxed);
        }
        #[cfg(debug_assertions)]
        tracing::warn!(
            "{:?} frame {}x{} from {} was not disposed. This can lead to memory leaks!",
            self.format,
            self.width,
            self.height,
            self.source
        );
        self.disposed = true;
    }
}

/// Metadata copied from a frame before it is consumed
///
/// For luminance + chroma surfaces the surface is 50% taller than the
/// image; `height` here is always the true image height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMeta {
    /// Image width
    pub width: u32,
    /// Image height
    pub height: u32,
    /// Rotation the UI must apply
    pub rotation: Rotation,
    /// Whether the first row is the top of the image
    pub top_row_first: bool,
    /// Layout of the original frame
    pub source_format: FrameFormat,
    /// Where the frame came from
    pub source: SourceId,
}

impl FrameMeta {
    /// Copy metadata from a frame
    pub fn of(frame: &FrameDescriptor) -> Self {
        Self {
            width: frame.width,
            height: frame.height,
            rotation: frame.rotation,
            top_row_first: frame.top_row_first,
            source_format: frame.format,
            source: frame.source,
        }
    }

    /// True for frames received over the network
    pub fn is_remote(&self) -> bool {
        self.source.is_remote()
    }
}
