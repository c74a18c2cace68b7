//! Pixel layouts, rotation and frame source identity

use std::fmt;

/// Layout of an incoming frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameFormat {
    /// One interleaved buffer, 4 bytes per pixel (ABGR word order, which is
    /// R, G, B, A in memory)
    Packed32,

    /// I420: full-resolution luminance plane followed by U and V planes at
    /// half resolution, rounded up, in both dimensions
    Planar420,

    /// Pixels already live in a platform-owned surface; conversion is an
    /// ownership handoff
    ExternalSurface,
}

impl FrameFormat {
    /// Whether frames of this format carry a byte buffer
    pub const fn has_bytes(self) -> bool {
        !matches!(self, Self::ExternalSurface)
    }

    /// Bytes a tightly packed buffer of this format needs
    ///
    /// Returns `None` for external surfaces and on arithmetic overflow.
    pub fn buffer_len(self, width: u32, height: u32) -> Option<usize> {
        let w = width as usize;
        let h = height as usize;
        match self {
            Self::Packed32 => w.checked_mul(h)?.checked_mul(4),
            Self::Planar420 => {
                let luma = w.checked_mul(h)?;
                let chroma = chroma_extent(w).checked_mul(chroma_extent(h))?;
                luma.checked_add(chroma.checked_mul(2)?)
            }
            Self::ExternalSurface => None,
        }
    }
}

/// Half of a dimension, rounded up (420 chroma subsampling)
#[inline]
pub const fn chroma_extent(extent: usize) -> usize {
    (extent + 1) / 2
}

/// Layout of a display surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceFormat {
    /// 8-bit R, G, B, A
    Rgba32,
    /// 8-bit B, G, R, A (capture device input layout)
    Bgra32,
    /// Single 8-bit channel (luminance + chroma packed in one buffer)
    R8,
}

impl SurfaceFormat {
    /// Bytes per pixel
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba32 | Self::Bgra32 => 4,
            Self::R8 => 1,
        }
    }
}

/// Clockwise rotation the UI must apply before showing an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    /// No rotation
    #[default]
    Deg0,
    /// 90 degrees
    Deg90,
    /// 180 degrees
    Deg180,
    /// 270 degrees
    Deg270,
}

impl Rotation {
    /// Parse a rotation in degrees
    ///
    /// Only multiples of 90 in `[0, 360)` are valid.
    pub const fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees {
            0 => Some(Self::Deg0),
            90 => Some(Self::Deg90),
            180 => Some(Self::Deg180),
            270 => Some(Self::Deg270),
            _ => None,
        }
    }

    /// Rotation in degrees
    pub const fn degrees(self) -> i32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }
}

/// Where a frame came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SourceId {
    /// A local capture device
    #[default]
    Local,
    /// A remote peer, identified by an opaque connection id
    Remote(u64),
}

impl SourceId {
    /// True for frames received from a remote peer
    pub const fn is_remote(self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote(id) => write!(f, "remote-{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_len() {
        assert_eq!(FrameFormat::Packed32.buffer_len(4, 2), Some(32));
        // 4x2 luma + two 2x1 chroma planes
        assert_eq!(FrameFormat::Planar420.buffer_len(4, 2), Some(12));
        // odd sizes round chroma up: 17x15 luma + 2 * 9x8
        assert_eq!(FrameFormat::Planar420.buffer_len(17, 15), Some(255 + 144));
        assert_eq!(FrameFormat::ExternalSurface.buffer_len(4, 2), None);
    }

    #[test]
    fn test_chroma_extent() {
        assert_eq!(chroma_extent(120), 60);
        assert_eq!(chroma_extent(121), 61);
        assert_eq!(chroma_extent(1), 1);
    }

    #[test]
    fn test_rotation_parse() {
        assert_eq!(Rotation::from_degrees(90), Some(Rotation::Deg90));
        assert_eq!(Rotation::from_degrees(45), None);
        assert_eq!(Rotation::from_degrees(360), None);
        assert_eq!(Rotation::Deg270.degrees(), 270);
    }

    #[test]
    fn test_source_id() {
        assert!(!SourceId::Local.is_remote());
        assert!(SourceId::Remote(3).is_remote());
        assert_eq!(SourceId::Remote(3).to_string(), "remote-3");
        assert_eq!(SourceId::Local.to_string(), "local");
    }
}
