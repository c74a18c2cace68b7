//! Frame sources rendered into a device's offscreen target

use reframe_surface::{Surface, SurfaceFormat};

use crate::error::{CaptureError, Result};

/// Something that can draw one frame into a BGRA render target
pub trait FrameSource: Send {
    /// Render the next frame into `target`
    ///
    /// `target` is BGRA at the device's configured size.
    fn render(&mut self, target: &mut Surface) -> Result<()>;
}

/// Moving color bars
///
/// Each frame shifts the bars by one column so consecutive frames differ.
#[derive(Debug, Clone, Default)]
pub struct TestPattern {
    frame: u64,
    solid: Option<[u8; 4]>,
}

/// Bar colors in BGRA order
const BARS: [[u8; 4]; 8] = [
    [255, 255, 255, 255],
    [0, 255, 255, 255],
    [255, 255, 0, 255],
    [0, 255, 0, 255],
    [255, 0, 255, 255],
    [0, 0, 255, 255],
    [255, 0, 0, 255],
    [0, 0, 0, 255],
];

impl TestPattern {
    /// Moving color bars
    pub fn new() -> Self {
        Self::default()
    }

    /// A single BGRA color every frame
    pub fn solid(bgra: [u8; 4]) -> Self {
        Self {
            frame: 0,
            solid: Some(bgra),
        }
    }

    /// Frames rendered so far
    pub fn frames_rendered(&self) -> u64 {
        self.frame
    }
}

impl FrameSource for TestPattern {
    fn render(&mut self, target: &mut Surface) -> Result<()> {
        if target.format() != SurfaceFormat::Bgra32 {
            return Err(CaptureError::Render(format!(
                "test pattern needs a BGRA target, got {:?}",
                target.format()
            )));
        }

        let width = target.width() as usize;
        let bar_width = (width / BARS.len()).max(1);
        let shift = self.frame as usize;

        for y in 0..target.height() {
            let Some(row) = target.row_mut(y) else {
                break;
            };
            for (x, pixel) in row.chunks_exact_mut(4).enumerate() {
                let color = match self.solid {
                    Some(color) => color,
                    None => BARS[((x + shift) / bar_width) % BARS.len()],
                };
                pixel.copy_from_slice(&color);
            }
        }

        self.frame += 1;
        Ok(())
    }
}
