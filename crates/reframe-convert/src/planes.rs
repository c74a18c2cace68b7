//! Bounds-checked plane views over planar 4:2:0 buffers
//!
//! Planar frames arrive as one tightly packed byte buffer (Y, then U, then
//! V). The luminance + chroma output surface is a single-channel image that
//! keeps the luminance plane on top and puts both chroma planes side by side
//! below it:
//!
//! ```text
//!          ◄──────────── stride S ────────────►
//!   row 0  ┌──────────────────────────────────┐
//!          │                Y                 │  H rows
//!   row H  ├────────────────┬─────────────────┤
//!          │       U        │        V        │  ceil(H/2) rows
//!          └────────────────┴─────────────────┘
//!          ◄── ceil(W/2) ──►◄── ceil(W/2) ───►
//! ```
//!
//! U starts at byte `S*H`, V at `S*H + S/2`. For even widths `S == W`, so V
//! starts at `S*H + W/2`. Odd widths pad the stride to `W + 1`; otherwise the
//! last U column and the first V column would share a byte.
//!
//! Every view is validated against its buffer length before a single byte is
//! read or written.

use reframe_surface::chroma_extent;

use crate::error::{ConvertError, Result};

/// One plane inside a larger byte buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneView {
    /// Byte offset of the first row
    pub offset: usize,
    /// Bytes between the starts of two rows
    pub stride: usize,
    /// Bytes used per row
    pub width: usize,
    /// Number of rows
    pub height: usize,
}

impl PlaneView {
    /// First byte past the last row, `None` on overflow
    pub fn end(&self) -> Option<usize> {
        if self.height == 0 {
            return Some(self.offset);
        }
        self.stride
            .checked_mul(self.height - 1)?
            .checked_add(self.width)?
            .checked_add(self.offset)
    }

    /// Check that the view fits in a buffer of `len` bytes
    pub fn validate(&self, plane: &'static str, len: usize) -> Result<()> {
        match self.end() {
            Some(end) if end <= len && (self.height <= 1 || self.width <= self.stride) => Ok(()),
            Some(end) => Err(ConvertError::PlaneOutOfBounds { plane, end, len }),
            None => Err(ConvertError::PlaneOutOfBounds {
                plane,
                end: usize::MAX,
                len,
            }),
        }
    }

    /// Row `y` of the plane
    pub fn row<'a>(&self, buf: &'a [u8], y: usize) -> Option<&'a [u8]> {
        if y >= self.height {
            return None;
        }
        let start = self.offset.checked_add(self.stride.checked_mul(y)?)?;
        buf.get(start..start.checked_add(self.width)?)
    }

    /// Mutable row `y` of the plane
    pub fn row_mut<'a>(&self, buf: &'a mut [u8], y: usize) -> Option<&'a mut [u8]> {
        if y >= self.height {
            return None;
        }
        let start = self.offset.checked_add(self.stride.checked_mul(y)?)?;
        buf.get_mut(start..start.checked_add(self.width)?)
    }
}

/// Plane layout of a tightly packed I420 frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct I420Layout {
    /// Luminance plane
    pub y: PlaneView,
    /// Blue-difference chroma plane
    pub u: PlaneView,
    /// Red-difference chroma plane
    pub v: PlaneView,
}

impl I420Layout {
    /// Layout of a `width x height` frame with no row padding
    pub fn packed(width: u32, height: u32) -> Self {
        let w = width as usize;
        let h = height as usize;
        let cw = chroma_extent(w);
        let ch = chroma_extent(h);
        let luma_len = w.saturating_mul(h);
        let chroma_len = cw.saturating_mul(ch);

        Self {
            y: PlaneView {
                offset: 0,
                stride: w,
                width: w,
                height: h,
            },
            u: PlaneView {
                offset: luma_len,
                stride: cw,
                width: cw,
                height: ch,
            },
            v: PlaneView {
                offset: luma_len.saturating_add(chroma_len),
                stride: cw,
                width: cw,
                height: ch,
            },
        }
    }

    /// Check all three planes against a buffer of `len` bytes
    pub fn validate(&self, len: usize) -> Result<()> {
        self.y.validate("Y", len)?;
        self.u.validate("U", len)?;
        self.v.validate("V", len)
    }
}

/// Plane layout of the single-channel luminance + chroma surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LumaChromaLayout {
    /// Image width
    pub width: u32,
    /// Image height
    pub height: u32,
    /// Surface row stride (image width padded to even)
    pub stride: usize,
    /// Luminance plane
    pub y: PlaneView,
    /// U plane, left half below the luminance
    pub u: PlaneView,
    /// V plane, right half below the luminance
    pub v: PlaneView,
}

impl LumaChromaLayout {
    /// Layout for a `width x height` image
    pub fn new(width: u32, height: u32) -> Self {
        let w = width as usize;
        let h = height as usize;
        let stride = w + (w & 1);
        let cw = chroma_extent(w);
        let ch = chroma_extent(h);
        let chroma_offset = stride.saturating_mul(h);

        Self {
            width,
            height,
            stride,
            y: PlaneView {
                offset: 0,
                stride,
                width: w,
                height: h,
            },
            u: PlaneView {
                offset: chroma_offset,
                stride,
                width: cw,
                height: ch,
            },
            v: PlaneView {
                offset: chroma_offset.saturating_add(stride / 2),
                stride,
                width: cw,
                height: ch,
            },
        }
    }

    /// Surface size `(stride, H + ceil(H/2))` this layout needs
    ///
    /// Returns `None` if the size does not fit in `u32`.
    pub fn surface_extent(&self) -> Option<(u32, u32)> {
        let width = u32::try_from(self.stride).ok()?;
        let rows = self.y.height.checked_add(self.u.height)?;
        let height = u32::try_from(rows).ok()?;
        Some((width, height))
    }

    /// Bytes of a surface with this layout
    pub fn byte_len(&self) -> Option<usize> {
        let (w, h) = self.surface_extent()?;
        (w as usize).checked_mul(h as usize)
    }

    /// Check all three planes against a buffer of `len` bytes
    pub fn validate(&self, len: usize) -> Result<()> {
        self.y.validate("Y", len)?;
        self.u.validate("U", len)?;
        self.v.validate("V", len)
    }
}

fn copy_plane(
    plane: &'static str,
    src: &[u8],
    from: &PlaneView,
    dst: &mut [u8],
    to: &PlaneView,
) -> Result<()> {
    for y in 0..from.height {
        let (Some(src_row), Some(dst_row)) = (from.row(src, y), to.row_mut(dst, y)) else {
            return Err(ConvertError::PlaneOutOfBounds {
                plane,
                end: from.end().unwrap_or(usize::MAX),
                len: src.len(),
            });
        };
        dst_row.copy_from_slice(src_row);
    }
    Ok(())
}

/// Copy a packed I420 buffer into a luminance + chroma surface buffer
///
/// Both layouts are validated before any byte is copied; a short source or
/// destination is reported as [`ConvertError::PlaneOutOfBounds`] and leaves
/// `dst` untouched.
pub fn copy_i420(src: &[u8], width: u32, height: u32, dst: &mut [u8]) -> Result<()> {
    let from = I420Layout::packed(width, height);
    let to = LumaChromaLayout::new(width, height);

    from.validate(src.len())?;
    to.validate(dst.len())?;

    copy_plane("Y", src, &from.y, dst, &to.y)?;
    copy_plane("U", src, &from.u, dst, &to.u)?;
    copy_plane("V", src, &from.v, dst, &to.v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reframe_surface::FrameFormat;

    fn numbered(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_plane_view_end() {
        let view = PlaneView {
            offset: 10,
            stride: 8,
            width: 4,
            height: 3,
        };
        assert_eq!(view.end(), Some(10 + 16 + 4));
        assert!(view.validate("Y", 30).is_ok());
        assert!(view.validate("Y", 29).is_err());
    }

    #[test]
    fn test_even_layout_offsets() {
        let layout = LumaChromaLayout::new(640, 480);
        assert_eq!(layout.stride, 640);
        assert_eq!(layout.u.offset, 640 * 480);
        assert_eq!(layout.v.offset, 640 * 480 + 320);
        assert_eq!(layout.surface_extent(), Some((640, 720)));
    }

    #[test]
    fn test_odd_height_chroma_rows() {
        let layout = LumaChromaLayout::new(160, 121);
        assert_eq!(layout.u.height, 61);
        assert_eq!(layout.surface_extent(), Some((160, 182)));
    }

    #[test]
    fn test_odd_width_pads_stride() {
        let layout = LumaChromaLayout::new(17, 15);
        assert_eq!(layout.stride, 18);
        assert_eq!(layout.u.width, 9);
        assert_eq!(layout.v.offset, 18 * 15 + 9);
        assert_eq!(layout.byte_len(), Some(18 * 23));
        assert_eq!(layout.v.end(), layout.byte_len());
    }

    #[test]
    fn test_copy_i420_odd_dimensions() {
        let (w, h) = (17u32, 15u32);
        let len = FrameFormat::Planar420.buffer_len(w, h).expect("len");
        let src = numbered(len);

        let layout = LumaChromaLayout::new(w, h);
        let mut dst = vec![0u8; layout.byte_len().expect("len")];
        copy_i420(&src, w, h, &mut dst).expect("copy");

        let from = I420Layout::packed(w, h);
        for y in 0..15 {
            assert_eq!(layout.y.row(&dst, y), from.y.row(&src, y));
        }
        for y in 0..8 {
            assert_eq!(layout.u.row(&dst, y), from.u.row(&src, y));
            assert_eq!(layout.v.row(&dst, y), from.v.row(&src, y));
        }
        // last V byte of the source lands on the last byte of the surface
        assert_eq!(dst.last(), src.last());
    }

    #[test]
    fn test_copy_i420_short_source_rejected() {
        let len = FrameFormat::Planar420.buffer_len(4, 4).expect("len");
        let src = vec![7u8; len - 1];
        let mut dst = vec![0u8; LumaChromaLayout::new(4, 4).byte_len().expect("len")];

        let err = copy_i420(&src, 4, 4, &mut dst).expect_err("short");
        assert!(matches!(err, ConvertError::PlaneOutOfBounds { plane: "V", .. }));
        assert!(dst.iter().all(|&b| b == 0));
    }
}
