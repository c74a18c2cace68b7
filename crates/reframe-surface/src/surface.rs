//! Display surfaces and their allocator
//!
//! A [`Surface`] is the output image handed to the rendering layer. Surfaces
//! are only created through a [`SurfaceAllocator`], which counts every
//! allocation and release so tests can prove the allocate-or-reuse policy
//! and catch leaks without relying on drop timing.
//!
//! # Sizing rule
//!
//! [`SurfaceAllocator::ensure_surface`] is the single sizing rule used by
//! every converter and by the capture path: an exact match of width, height
//! and format is a no-op, any mismatch destroys the old surface and
//! allocates a new one that matches exactly.
//!
//! ```rust
//! use reframe_surface::{SurfaceAllocator, SurfaceFormat};
//!
//! let allocator = SurfaceAllocator::new();
//! let mut slot = None;
//!
//! assert!(allocator.ensure_surface(64, 32, SurfaceFormat::Rgba32, &mut slot)?);
//! assert!(!allocator.ensure_surface(64, 32, SurfaceFormat::Rgba32, &mut slot)?);
//! assert_eq!(allocator.stats().allocated, 1);
//! # Ok::<(), reframe_surface::SurfaceError>(())
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::{Result, SurfaceError};
use crate::format::SurfaceFormat;

/// Unique identity of a surface for the lifetime of its allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(u64);

impl SurfaceId {
    /// Raw id value
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Counters {
    next_id: AtomicU64,
    allocated: AtomicU64,
    released: AtomicU64,
    live_bytes: AtomicUsize,
}

/// Snapshot of allocator counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllocationStats {
    /// Surfaces allocated since the allocator was created
    pub allocated: u64,

    /// Surfaces released (destroyed explicitly or dropped by their owner)
    pub released: u64,

    /// Bytes held by live surfaces
    pub live_bytes: usize,
}

impl AllocationStats {
    /// Surfaces that are currently alive
    pub const fn outstanding(&self) -> u64 {
        self.allocated - self.released
    }
}

/// An image surface owned by exactly one party
///
/// Either the pipeline owns it (inside a [`SurfaceSlot`](crate::SurfaceSlot)
/// or a conversion job) or the caller does after taking ownership. There is
/// no `Clone`; a surface is never shared.
pub struct Surface {
    id: SurfaceId,
    width: u32,
    height: u32,
    format: SurfaceFormat,
    data: Vec<u8>,
    counters: Arc<Counters>,
}

impl Surface {
    /// Surface identity
    pub fn id(&self) -> SurfaceId {
        self.id
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
    pub fn format(&self) -> SurfaceFormat {
        self.format
    }

    /// `(width, height)`
    pub fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Bytes per row
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Total size in bytes
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Whether the surface has exactly this size and layout
    pub fn matches(&self, width: u32, height: u32, format: SurfaceFormat) -> bool {
        self.width == width && self.height == height && self.format == format
    }

    /// Raw pixel data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable raw pixel data
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// One row of pixels
    ///
    /// Returns `None` past the last row.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        let stride = self.stride();
        let start = (y as usize).checked_mul(stride)?;
        self.data.get(start..start + stride)
    }

    /// One mutable row of pixels
    pub fn row_mut(&mut self, y: u32) -> Option<&mut [u8]> {
        let stride = self.stride();
        let start = (y as usize).checked_mul(stride)?;
        self.data.get_mut(start..start + stride)
    }

    /// Replace the pixel data with a raw buffer of exactly the same size
    pub fn load_raw(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() != self.data.len() {
            return Err(SurfaceError::BufferSize {
                expected: self.data.len(),
                actual: bytes.len(),
            });
        }
        self.data.copy_from_slice(bytes);
        Ok(())
    }

    /// Copy another surface of identical size and layout into this one
    pub fn copy_from(&mut self, source: &Surface) -> Result<()> {
        if !self.matches(source.width, source.height, source.format) {
            return Err(SurfaceError::BufferSize {
                expected: self.data.len(),
                actual: source.data.len(),
            });
        }
        self.data.copy_from_slice(&source.data);
        Ok(())
    }
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        self.counters.released.fetch_add(1, Ordering::Relaxed);
        self.counters
            .live_bytes
            .fetch_sub(self.data.len(), Ordering::Relaxed);
        trace!("Surface {} released", self.id);
    }
}

/// Creates and destroys surfaces, tracking outstanding allocations
///
/// Cloning an allocator shares its counters; every clone hands out ids from
/// the same sequence.
#[derive(Debug, Clone, Default)]
pub struct SurfaceAllocator {
    counters: Arc<Counters>,
    budget: Option<usize>,
}

impl SurfaceAllocator {
    /// Create an allocator without a byte budget
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an allocator that refuses to hold more than `bytes` in live
    /// surfaces
    pub fn with_budget(bytes: usize) -> Self {
        Self {
            counters: Arc::default(),
            budget: Some(bytes),
        }
    }

    /// Allocate a zero-filled surface
    ///
    /// # Errors
    ///
    /// - [`SurfaceError::InvalidDimensions`] if width or height is zero
    /// - [`SurfaceError::AllocationFailed`] if the size overflows or memory
    ///   cannot be reserved
    /// - [`SurfaceError::BudgetExhausted`] if the budget would be exceeded
    pub fn allocate(&self, width: u32, height: u32, format: SurfaceFormat) -> Result<Surface> {
        if width == 0 || height == 0 {
            return Err(SurfaceError::InvalidDimensions { width, height });
        }

        let failed = |bytes: usize| SurfaceError::AllocationFailed {
            width,
            height,
            format,
            bytes,
        };

        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|px| px.checked_mul(format.bytes_per_pixel()))
            .ok_or_else(|| failed(usize::MAX))?;

        if let Some(budget) = self.budget {
            let live = self.counters.live_bytes.load(Ordering::Relaxed);
            let available = budget.saturating_sub(live);
            if len > available {
                return Err(SurfaceError::BudgetExhausted {
                    requested: len,
                    available,
                });
            }
        }

        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|_| failed(len))?;
        data.resize(len, 0);

        let id = SurfaceId(self.counters.next_id.fetch_add(1, Ordering::Relaxed));
        self.counters.allocated.fetch_add(1, Ordering::Relaxed);
        self.counters.live_bytes.fetch_add(len, Ordering::Relaxed);

        debug!(
            "Allocated surface {} ({}x{} {:?}, {} bytes)",
            id, width, height, format, len
        );

        Ok(Surface {
            id,
            width,
            height,
            format,
            data,
            counters: Arc::clone(&self.counters),
        })
    }

    /// Destroy a surface explicitly
    pub fn destroy(&self, surface: Surface) {
        debug!(
            "Destroying surface {} ({}x{} {:?})",
            surface.id, surface.width, surface.height, surface.format
        );
        drop(surface);
    }

    /// Make `slot` hold a surface of exactly this size and layout
    ///
    /// Exact match is a no-op. Any mismatch destroys the old surface first
    /// and then allocates a new one. If the new allocation fails the slot is
    /// left empty.
    ///
    /// Returns `true` if a new surface was allocated, meaning any external
    /// reference to the old surface must be refreshed.
    pub fn ensure_surface(
        &self,
        width: u32,
        height: u32,
        format: SurfaceFormat,
        slot: &mut Option<Surface>,
    ) -> Result<bool> {
        if let Some(existing) = slot.as_ref() {
            if existing.matches(width, height, format) {
                return Ok(false);
            }
        }

        if let Some(old) = slot.take() {
            self.destroy(old);
        }

        *slot = Some(self.allocate(width, height, format)?);
        Ok(true)
    }

    /// Current counters
    pub fn stats(&self) -> AllocationStats {
        AllocationStats {
            allocated: self.counters.allocated.load(Ordering::Relaxed),
            released: self.counters.released.load(Ordering::Relaxed),
            live_bytes: self.counters.live_bytes.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_sizes() {
        let allocator = SurfaceAllocator::new();
        let surface = allocator
            .allocate(4, 2, SurfaceFormat::Rgba32)
            .expect("allocate");

        assert_eq!(surface.extent(), (4, 2));
        assert_eq!(surface.byte_len(), 32);
        assert_eq!(surface.stride(), 16);
        assert!(surface.data().iter().all(|&b| b == 0));

        let luma = allocator.allocate(5, 3, SurfaceFormat::R8).expect("allocate");
        assert_eq!(luma.byte_len(), 15);
    }

    #[test]
    fn test_zero_size_rejected() {
        let allocator = SurfaceAllocator::new();
        let err = allocator
            .allocate(0, 16, SurfaceFormat::Rgba32)
            .expect_err("zero width must fail");
        assert!(matches!(err, SurfaceError::InvalidDimensions { .. }));
        assert_eq!(allocator.stats().allocated, 0);
    }

    #[test]
    fn test_ensure_surface_allocates_once() {
        let allocator = SurfaceAllocator::new();
        let mut slot = None;

        for (w, h) in [(16, 16), (640, 480), (17, 15)] {
            let before = allocator.stats().allocated;
            let first = allocator
                .ensure_surface(w, h, SurfaceFormat::Rgba32, &mut slot)
                .expect("ensure");
            let second = allocator
                .ensure_surface(w, h, SurfaceFormat::Rgba32, &mut slot)
                .expect("ensure");

            assert!(first);
            assert!(!second);
            assert_eq!(allocator.stats().allocated - before, 1);
        }
    }

    #[test]
    fn test_ensure_surface_recreates_on_mismatch() {
        let allocator = SurfaceAllocator::new();
        let mut slot = None;

        allocator
            .ensure_surface(32, 32, SurfaceFormat::Rgba32, &mut slot)
            .expect("ensure");
        let first_id = slot.as_ref().expect("surface").id();

        allocator
            .ensure_surface(32, 32, SurfaceFormat::R8, &mut slot)
            .expect("ensure");
        let second_id = slot.as_ref().expect("surface").id();

        assert_ne!(first_id, second_id);
        let stats = allocator.stats();
        assert_eq!(stats.allocated, 2);
        assert_eq!(stats.released, 1);
        assert_eq!(stats.outstanding(), 1);
        assert_eq!(stats.live_bytes, 32 * 32);
    }

    #[test]
    fn test_budget_exhaustion_leaves_slot_empty() {
        let allocator = SurfaceAllocator::with_budget(1024);
        let mut slot = None;

        allocator
            .ensure_surface(16, 16, SurfaceFormat::Rgba32, &mut slot)
            .expect("fits exactly");

        let err = allocator
            .ensure_surface(32, 32, SurfaceFormat::Rgba32, &mut slot)
            .expect_err("exceeds budget");
        assert!(matches!(err, SurfaceError::BudgetExhausted { .. }));
        assert!(slot.is_none());
        assert_eq!(allocator.stats().outstanding(), 0);
    }

    #[test]
    fn test_rows_and_copy() {
        let allocator = SurfaceAllocator::new();
        let mut a = allocator.allocate(2, 2, SurfaceFormat::R8).expect("allocate");
        a.load_raw(&[1, 2, 3, 4]).expect("load");
        assert_eq!(a.row(1), Some(&[3u8, 4][..]));
        assert_eq!(a.row(2), None);

        let mut b = allocator.allocate(2, 2, SurfaceFormat::R8).expect("allocate");
        b.copy_from(&a).expect("copy");
        assert_eq!(b.data(), &[1, 2, 3, 4]);

        let c = allocator.allocate(3, 2, SurfaceFormat::R8).expect("allocate");
        assert!(b.copy_from(&c).is_err());
        assert!(b.load_raw(&[0; 3]).is_err());
    }
}
