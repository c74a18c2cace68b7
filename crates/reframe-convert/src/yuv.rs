//! YUV to RGBA blit
//!
//! Converts a luminance + chroma surface (see [`crate::planes`]) into a
//! regular RGBA surface. This is the pass a GPU would run as a shader over
//! the single-buffer layout; here it runs on the CPU with the BT.601 integer
//! matrix.

use reframe_surface::{Surface, SurfaceFormat};

use crate::error::{ConvertError, Result};
use crate::planes::LumaChromaLayout;

/// Convert single YUV pixel to RGB
///
/// Uses BT.601 color matrix (standard for SD video):
/// R = 1.164(Y-16) + 1.596(V-128)
/// G = 1.164(Y-16) - 0.813(V-128) - 0.391(U-128)
/// B = 1.164(Y-16) + 2.018(U-128)
#[inline]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    // Scale factors (multiplied by 256 for integer math)
    const Y_SCALE: i32 = 298; // 1.164 * 256
    const V_TO_R: i32 = 409; // 1.596 * 256
    const U_TO_G: i32 = 100; // 0.391 * 256
    const V_TO_G: i32 = 208; // 0.813 * 256
    const U_TO_B: i32 = 516; // 2.018 * 256

    let y = i32::from(y) - 16;
    let u = i32::from(u) - 128;
    let v = i32::from(v) - 128;

    let r = (Y_SCALE * y + V_TO_R * v + 128) >> 8;
    let g = (Y_SCALE * y - U_TO_G * u - V_TO_G * v + 128) >> 8;
    let b = (Y_SCALE * y + U_TO_B * u + 128) >> 8;

    (
        r.clamp(0, 255) as u8,
        g.clamp(0, 255) as u8,
        b.clamp(0, 255) as u8,
    )
}

fn describe(surface: &Surface) -> String {
    format!(
        "{}x{} {:?}",
        surface.width(),
        surface.height(),
        surface.format()
    )
}

/// Blit a `width x height` luminance + chroma surface into an RGBA surface
///
/// `src` must be an R8 surface with the extent of
/// [`LumaChromaLayout::surface_extent`]; `dst` must be a `width x height`
/// RGBA surface.
pub fn luma_chroma_to_rgba(src: &Surface, width: u32, height: u32, dst: &mut Surface) -> Result<()> {
    let layout = LumaChromaLayout::new(width, height);
    let (sw, sh) = layout.surface_extent().ok_or(ConvertError::SurfaceMismatch {
        expected: format!("luma+chroma surface for {}x{}", width, height),
        actual: describe(src),
    })?;

    if !src.matches(sw, sh, SurfaceFormat::R8) {
        return Err(ConvertError::SurfaceMismatch {
            expected: format!("{}x{} R8", sw, sh),
            actual: describe(src),
        });
    }
    if !dst.matches(width, height, SurfaceFormat::Rgba32) {
        return Err(ConvertError::SurfaceMismatch {
            expected: format!("{}x{} Rgba32", width, height),
            actual: describe(dst),
        });
    }

    let planes = src.data();
    layout.validate(planes.len())?;

    for row in 0..height {
        let y = row as usize;
        let out = dst.row_mut(row).ok_or(ConvertError::PlaneOutOfBounds {
            plane: "RGBA",
            end: (y + 1) * width as usize * 4,
            len: 0,
        })?;
        let (Some(luma), Some(u_row), Some(v_row)) = (
            layout.y.row(planes, y),
            layout.u.row(planes, y / 2),
            layout.v.row(planes, y / 2),
        ) else {
            return Err(ConvertError::PlaneOutOfBounds {
                plane: "Y",
                end: layout.v.end().unwrap_or(usize::MAX),
                len: planes.len(),
            });
        };

        for (x, pixel) in out.chunks_exact_mut(4).enumerate() {
            let (r, g, b) = yuv_to_rgb(luma[x], u_row[x / 2], v_row[x / 2]);
            pixel[0] = r;
            pixel[1] = g;
            pixel[2] = b;
            pixel[3] = 255;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planes::copy_i420;
    use reframe_surface::SurfaceAllocator;

    #[test]
    fn test_yuv_to_rgb() {
        // Black (Y=16, U=128, V=128)
        assert_eq!(yuv_to_rgb(16, 128, 128), (0, 0, 0));

        // White (Y=235, U=128, V=128)
        let (r, g, b) = yuv_to_rgb(235, 128, 128);
        assert!(r > 250 && g > 250 && b > 250);

        // Strong V pushes red up and green down
        let (r, g, _) = yuv_to_rgb(128, 128, 240);
        assert!(r > g);
    }

    #[test]
    fn test_blit_odd_frame() {
        let (w, h) = (5u32, 3u32);
        let allocator = SurfaceAllocator::new();
        let layout = LumaChromaLayout::new(w, h);
        let (sw, sh) = layout.surface_extent().expect("extent");

        // 5x3 luma at 235, 3x2 chroma at neutral
        let mut i420 = vec![235u8; 15];
        i420.extend(std::iter::repeat(128u8).take(12));

        let mut planes = allocator.allocate(sw, sh, SurfaceFormat::R8).expect("allocate");
        copy_i420(&i420, w, h, planes.data_mut()).expect("copy");

        let mut rgba = allocator
            .allocate(w, h, SurfaceFormat::Rgba32)
            .expect("allocate");
        luma_chroma_to_rgba(&planes, w, h, &mut rgba).expect("blit");

        for pixel in rgba.data().chunks_exact(4) {
            assert!(pixel[0] > 250 && pixel[1] > 250 && pixel[2] > 250);
            assert_eq!(pixel[3], 255);
        }
    }

    #[test]
    fn test_blit_rejects_wrong_surfaces() {
        let allocator = SurfaceAllocator::new();
        let planes = allocator.allocate(4, 6, SurfaceFormat::R8).expect("allocate");
        let mut wrong = allocator
            .allocate(4, 4, SurfaceFormat::Bgra32)
            .expect("allocate");

        let err = luma_chroma_to_rgba(&planes, 4, 4, &mut wrong).expect_err("bgra target");
        assert!(matches!(err, ConvertError::SurfaceMismatch { .. }));

        let mut rgba = allocator
            .allocate(4, 4, SurfaceFormat::Rgba32)
            .expect("allocate");
        assert!(luma_chroma_to_rgba(&planes, 4, 4, &mut rgba).is_ok());
        assert!(luma_chroma_to_rgba(&planes, 4, 2, &mut rgba).is_err());
    }
}
