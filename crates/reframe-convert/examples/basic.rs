//! Basic frame conversion example
//!
//! Pushes one frame of each byte-backed format through a presenter and
//! prints the resulting surface, material and display transform.
//!
//! # Running
//!
//! ```bash
//! cargo run -p reframe-convert --example basic
//! ```

use reframe_convert::{ConverterConfig, Dispatch, FramePresenter, PlanarOutput};
use reframe_surface::{FrameDescriptor, FrameFormat, Rotation, SourceId, SurfaceAllocator};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("reframe-convert v{}", reframe_convert::VERSION);
    println!("=====================");

    let allocator = SurfaceAllocator::new();

    for (label, output, dispatch) in [
        ("RGBA, inline", PlanarOutput::Rgba, Dispatch::Inline),
        ("luma+chroma, worker", PlanarOutput::LumaChroma, Dispatch::Worker),
    ] {
        let config = ConverterConfig::builder()
            .planar_output(output)
            .dispatch(dispatch)
            .build();
        let mut presenter = FramePresenter::new(config, allocator.clone())?;
        println!();
        println!("Presenter: {}", label);

        let packed = FrameDescriptor::packed32(320, 240, vec![200; 320 * 240 * 4])?
            .with_rotation(Rotation::Deg90);
        show(&mut presenter, packed)?;

        let len = FrameFormat::Planar420
            .buffer_len(175, 121)
            .ok_or("planar size overflow")?;
        let planar = FrameDescriptor::planar420(175, 121, vec![90; len])?
            .with_source(SourceId::Remote(1))
            .with_top_row_first(false);
        show(&mut presenter, planar)?;
    }

    let stats = allocator.stats();
    println!();
    println!(
        "Surfaces: {} allocated, {} released, {} bytes live",
        stats.allocated, stats.released, stats.live_bytes
    );

    Ok(())
}

fn show(
    presenter: &mut FramePresenter,
    frame: FrameDescriptor,
) -> Result<(), Box<dyn std::error::Error>> {
    let format = frame.format();
    let mut presented = presenter.present(frame)?;
    while presented.is_none() {
        std::thread::yield_now();
        presented = presenter.poll()?;
    }

    if let (Some(presented), Some(surface)) = (presented, presenter.surface()) {
        println!("  {:?} {}x{}:", format, presented.meta.width, presented.meta.height);
        println!(
            "    surface {} {}x{} {:?} (new: {})",
            surface.id(),
            surface.width(),
            surface.height(),
            surface.format(),
            presented.new_surface
        );
        println!("    material: {:?}", presented.material_tag);
        println!(
            "    mirror: {}, flip: {}, ui rotation: {}",
            presented.transform.mirror,
            presented.transform.vertical_flip,
            presented.transform.ui_rotation()
        );
    }
    Ok(())
}
