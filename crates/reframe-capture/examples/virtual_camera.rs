//! Virtual camera example
//!
//! Runs two devices for one simulated second: a valid 30 FPS camera and an
//! undersized one that stays disabled until it is reconfigured. Prints the
//! per-device counters afterwards.
//!
//! # Running
//!
//! ```bash
//! cargo run -p reframe-capture --example virtual_camera
//! ```

use std::time::Duration;

use reframe_capture::{
    CaptureScheduler, DeviceConfig, ReadbackCapabilities, SchedulerConfig, SoftwareGpu,
    TestPattern, VirtualVideoInput,
};
use reframe_surface::SurfaceAllocator;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("reframe-capture v{}", reframe_capture::VERSION);
    println!("=====================");

    let gpu = SoftwareGpu::new();
    let caps = ReadbackCapabilities::probe(&gpu);

    let input = VirtualVideoInput::new();
    let allocator = SurfaceAllocator::new();
    let mut scheduler = CaptureScheduler::new(
        SchedulerConfig::default(),
        caps,
        gpu,
        input.clone(),
        allocator.clone(),
    )?;
    println!("Readback mode: {:?}", scheduler.mode());

    let main_cam = DeviceConfig::builder()
        .name("VirtualCamera1")
        .resolution(640, 360)
        .fps(30)
        .build();
    scheduler.add_device(main_cam, Box::new(TestPattern::new()))?;

    let tiny = DeviceConfig::builder()
        .name("Tiny")
        .resolution(8, 8)
        .fps(15)
        .build();
    if let Err(e) = scheduler.add_device(tiny, Box::new(TestPattern::solid([0, 0, 255, 255]))) {
        println!("Tiny disabled: {}", e);
    }

    // 60 Hz host loop for one second
    let host_tick = Duration::from_secs(1) / 60;
    for tick in 0..60 {
        if tick == 20 {
            // one failed readback; the frame is skipped
            scheduler.backend_mut().fail_next(1);
        }
        if tick == 30 {
            let fixed = DeviceConfig::builder()
                .name("Tiny")
                .resolution(32, 32)
                .fps(15)
                .build();
            scheduler.reconfigure("Tiny", fixed)?;
        }
        scheduler.tick(host_tick)?;
    }

    println!();
    for device in scheduler.devices() {
        let stats = device.stats();
        println!(
            "{}: {:?}, {} captures, {} delivered, {} transfer errors",
            device.name(),
            device.state(),
            stats.captures,
            stats.frames_delivered,
            stats.transfer_errors
        );
    }

    if let Some(frame) = input.take_frame("VirtualCamera1")? {
        println!(
            "Latest frame: {}x{} {:?}, top row first: {}",
            frame.width(),
            frame.height(),
            frame.format(),
            frame.top_row_first()
        );
        frame.dispose();
    }

    scheduler.shutdown();
    let stats = allocator.stats();
    println!(
        "Surfaces: {} allocated, {} released, {} bytes live",
        stats.allocated, stats.released, stats.live_bytes
    );

    Ok(())
}
