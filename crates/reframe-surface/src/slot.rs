//! Pipeline-owned surface slots and ownership transfer
//!
//! A [`SurfaceSlot`] holds at most one surface on behalf of the pipeline.
//! The pipeline may resize, recreate or destroy whatever the slot holds.
//! [`SurfaceSlot::take_ownership`] empties the slot and gives the surface to
//! the caller; from then on the pipeline has no reference to it and will
//! never destroy or reuse it.

use tracing::debug;

use crate::error::Result;
use crate::format::SurfaceFormat;
use crate::surface::{Surface, SurfaceAllocator};

/// A pipeline-owned home for one surface
#[derive(Debug)]
pub struct SurfaceSlot {
    allocator: SurfaceAllocator,
    surface: Option<Surface>,
}

impl SurfaceSlot {
    /// Create an empty slot
    pub fn new(allocator: SurfaceAllocator) -> Self {
        Self {
            allocator,
            surface: None,
        }
    }

    /// Ensure the slot holds a surface of exactly this size and layout
    ///
    /// Returns `true` if a new surface was allocated.
    pub fn ensure(&mut self, width: u32, height: u32, format: SurfaceFormat) -> Result<bool> {
        self.allocator
            .ensure_surface(width, height, format, &mut self.surface)
    }

    /// Current surface, if any
    pub fn get(&self) -> Option<&Surface> {
        self.surface.as_ref()
    }

    /// Current surface for writing, if any
    pub fn get_mut(&mut self) -> Option<&mut Surface> {
        self.surface.as_mut()
    }

    /// Whether the slot is empty
    pub fn is_empty(&self) -> bool {
        self.surface.is_none()
    }

    /// Hand the surface to the caller
    ///
    /// The slot is empty afterwards and the pipeline never touches the
    /// returned surface again.
    pub fn take_ownership(&mut self) -> Option<Surface> {
        let taken = self.surface.take();
        if let Some(ref surface) = taken {
            debug!("Ownership of surface {} transferred to caller", surface.id());
        }
        taken
    }

    /// Temporarily move the surface out so it can be lent to a job
    ///
    /// Unlike [`take_ownership`](Self::take_ownership) the surface is expected
    /// to come back through [`put`](Self::put).
    pub fn lend(&mut self) -> Option<Surface> {
        self.surface.take()
    }

    /// Store a surface in the slot
    ///
    /// A different surface already held is destroyed first.
    pub fn put(&mut self, surface: Surface) {
        if let Some(old) = self.surface.take() {
            if old.id() != surface.id() {
                self.allocator.destroy(old);
            }
        }
        self.surface = Some(surface);
    }

    /// Destroy the held surface, if any
    pub fn release(&mut self) {
        if let Some(surface) = self.surface.take() {
            self.allocator.destroy(surface);
        }
    }

    /// Allocator backing this slot
    pub fn allocator(&self) -> &SurfaceAllocator {
        &self.allocator
    }
}

impl Drop for SurfaceSlot {
    fn drop(&mut self) {
        self.release();
    }
}
