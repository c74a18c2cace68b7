//! Surface lifecycle example
//!
//! Shows the allocate-or-reuse rule, ownership transfer out of a slot and
//! leak counting for frame descriptors.
//!
//! # Running
//!
//! ```bash
//! cargo run -p reframe-surface --example lifecycle
//! ```

use reframe_surface::{FrameDescriptor, FrameTracker, SurfaceAllocator, SurfaceFormat, SurfaceSlot};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    println!("reframe-surface v{}", reframe_surface::VERSION);
    println!("=====================");

    let allocator = SurfaceAllocator::with_budget(16 * 1024 * 1024);
    let mut slot = SurfaceSlot::new(allocator.clone());

    // same size twice: one allocation
    let first = slot.ensure(640, 480, SurfaceFormat::Rgba32)?;
    let second = slot.ensure(640, 480, SurfaceFormat::Rgba32)?;
    println!("ensure 640x480 twice: allocated {} then {}", first, second);

    // size change: destroy then recreate
    let resized = slot.ensure(320, 240, SurfaceFormat::Rgba32)?;
    println!("ensure 320x240: allocated {}", resized);

    // the caller now owns the surface; releasing the slot leaves it alone
    let owned = slot.take_ownership().ok_or("slot was empty")?;
    slot.release();
    println!("taken surface {} is {}x{}", owned.id(), owned.width(), owned.height());
    allocator.destroy(owned);

    let tracker = FrameTracker::new();
    let disposed = FrameDescriptor::packed32(4, 2, vec![0; 32])?.with_tracker(&tracker);
    disposed.dispose();
    let forgotten = FrameDescriptor::packed32(4, 2, vec![0; 32])?.with_tracker(&tracker);
    drop(forgotten);
    println!(
        "frames: {} created, {} disposed, {} leaked",
        tracker.created(),
        tracker.disposed(),
        tracker.leaked()
    );

    let stats = allocator.stats();
    println!(
        "surfaces: {} allocated, {} released, {} bytes live",
        stats.allocated, stats.released, stats.live_bytes
    );

    Ok(())
}
