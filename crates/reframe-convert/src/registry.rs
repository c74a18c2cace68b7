//! Converter kinds and the format lookup table
//!
//! Converters form a closed set ([`ConverterKind`]). Which converter handles
//! which [`FrameFormat`] is decided by a lookup table that is filled from the
//! configuration and can be extended by explicit registration.
//!
//! # Examples
//!
//! ```rust
//! use reframe_convert::{ConverterConfig, ConverterKind, ConverterRegistry, PlanarOutput};
//! use reframe_surface::{FrameDescriptor, FrameFormat};
//!
//! let config = ConverterConfig::builder()
//!     .planar_output(PlanarOutput::LumaChroma)
//!     .build();
//! let registry = ConverterRegistry::with_defaults(&config);
//!
//! let frame = FrameDescriptor::packed32(2, 2, vec![0; 16])?;
//! assert_eq!(registry.select(&frame), Some(ConverterKind::Packed32));
//! assert_eq!(registry.kinds_for(FrameFormat::Planar420), &[ConverterKind::LumaChroma]);
//! frame.dispose();
//! # Ok::<(), reframe_surface::SurfaceError>(())
//! ```

use std::collections::HashMap;

use reframe_surface::{FrameDescriptor, FrameFormat, Surface, SurfaceFormat};
use tracing::debug;

use crate::config::{ConverterConfig, PlanarOutput, PlatformCapabilities};
use crate::error::{ConvertError, Result};
use crate::planes::LumaChromaLayout;

/// Material tag of the single-buffer luminance + chroma layout
///
/// The surface is R8 and `height + ceil(height / 2)` rows tall. Luminance
/// fills the top `height` rows. U occupies the left half of each chroma
/// row and V starts at column `stride / 2`.
///
/// For odd widths the stride is `width + 1`, so the surface is one column
/// wider than the image. Shaders must sample with the stride, not the
/// frame width.
pub const LUMA_CHROMA_MATERIAL: &str = "i420-single-buffer";

/// The closed set of conversion strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConverterKind {
    /// Packed32 bytes copied verbatim into an RGBA surface
    Packed32,

    /// Planar420 planes copied into one single-channel surface
    LumaChroma,

    /// Planar420 converted to RGBA through a luminance + chroma pass and a
    /// blit
    PlanarRgba,

    /// Ownership handoff of a platform surface
    External,
}

impl ConverterKind {
    /// Frame format this converter accepts
    pub const fn input_format(self) -> FrameFormat {
        match self {
            Self::Packed32 => FrameFormat::Packed32,
            Self::LumaChroma | Self::PlanarRgba => FrameFormat::Planar420,
            Self::External => FrameFormat::ExternalSurface,
        }
    }

    /// Surface layout this converter writes
    ///
    /// External surfaces keep whatever layout the platform gave them.
    pub const fn output_format(self) -> Option<SurfaceFormat> {
        match self {
            Self::Packed32 | Self::PlanarRgba => Some(SurfaceFormat::Rgba32),
            Self::LumaChroma => Some(SurfaceFormat::R8),
            Self::External => None,
        }
    }

    /// Material needed to display the output, `None` for plain RGBA
    pub const fn material_tag(self) -> Option<&'static str> {
        match self {
            Self::LumaChroma => Some(LUMA_CHROMA_MATERIAL),
            _ => None,
        }
    }

    /// Capability check against the frame and the platform
    ///
    /// Pure; never touches the frame buffer.
    pub fn can_convert(self, frame: &FrameDescriptor, capabilities: &PlatformCapabilities) -> bool {
        if frame.format() != self.input_format() {
            return false;
        }
        match self {
            Self::Packed32 => frame.has_direct_memory(),
            Self::LumaChroma => capabilities.direct_memory && frame.has_direct_memory(),
            Self::PlanarRgba => {
                capabilities.direct_memory && capabilities.gpu_blit && frame.has_direct_memory()
            }
            Self::External => !frame.has_direct_memory(),
        }
    }

    /// Output surface `(width, height)` for a `width x height` frame
    ///
    /// Returns `None` if the size does not fit in `u32`.
    pub fn surface_extent(self, width: u32, height: u32) -> Option<(u32, u32)> {
        match self {
            Self::LumaChroma => LumaChromaLayout::new(width, height).surface_extent(),
            Self::Packed32 | Self::PlanarRgba | Self::External => Some((width, height)),
        }
    }

    /// Whether `surface` must be rebuilt before it can hold this frame's output
    pub fn needs_recreate(self, frame: &FrameDescriptor, surface: Option<&Surface>) -> bool {
        let Some(surface) = surface else {
            return true;
        };
        let (Some((w, h)), Some(format)) = (
            self.surface_extent(frame.width(), frame.height()),
            self.output_format(),
        ) else {
            // external frames bring their own surface
            return true;
        };
        !surface.matches(w, h, format)
    }
}

/// Surface size a frame needs with its default layout
///
/// Planar frames report the single-buffer luminance + chroma size, which is
/// `ceil(H/2)` rows taller than the image.
pub fn surface_extent(frame: &FrameDescriptor) -> Option<(u32, u32)> {
    let kind = match frame.format() {
        FrameFormat::Packed32 => ConverterKind::Packed32,
        FrameFormat::Planar420 => ConverterKind::LumaChroma,
        FrameFormat::ExternalSurface => ConverterKind::External,
    };
    kind.surface_extent(frame.width(), frame.height())
}

/// Lookup table from frame format to candidate converters
#[derive(Debug, Clone)]
pub struct ConverterRegistry {
    table: HashMap<FrameFormat, Vec<ConverterKind>>,
    capabilities: PlatformCapabilities,
}

impl ConverterRegistry {
    /// Empty table
    pub fn new(capabilities: PlatformCapabilities) -> Self {
        Self {
            table: HashMap::new(),
            capabilities,
        }
    }

    /// Table with one converter per format chosen from `config`
    ///
    /// When RGBA output is configured for planar frames, the luminance +
    /// chroma converter stays registered behind it for platforms without a
    /// blit pass.
    pub fn with_defaults(config: &ConverterConfig) -> Self {
        let mut table = HashMap::new();
        table.insert(FrameFormat::Packed32, vec![ConverterKind::Packed32]);
        table.insert(
            FrameFormat::Planar420,
            match config.planar_output {
                PlanarOutput::Rgba => vec![ConverterKind::PlanarRgba, ConverterKind::LumaChroma],
                PlanarOutput::LumaChroma => vec![ConverterKind::LumaChroma],
            },
        );
        table.insert(FrameFormat::ExternalSurface, vec![ConverterKind::External]);

        Self {
            table,
            capabilities: config.capabilities,
        }
    }

    /// Register a converter for a format, ahead of existing entries
    ///
    /// # Errors
    ///
    /// [`ConvertError::Registration`] if the converter does not accept
    /// frames of `format`.
    pub fn register(&mut self, format: FrameFormat, kind: ConverterKind) -> Result<()> {
        if kind.input_format() != format {
            return Err(ConvertError::Registration { kind, format });
        }
        let kinds = self.table.entry(format).or_default();
        kinds.retain(|k| *k != kind);
        kinds.insert(0, kind);
        debug!("Registered {:?} converter for {:?} frames", kind, format);
        Ok(())
    }

    /// First registered converter that can convert `frame`
    pub fn select(&self, frame: &FrameDescriptor) -> Option<ConverterKind> {
        self.kinds_for(frame.format())
            .iter()
            .copied()
            .find(|kind| kind.can_convert(frame, &self.capabilities))
    }

    /// Converters registered for a format, in priority order
    pub fn kinds_for(&self, format: FrameFormat) -> &[ConverterKind] {
        self.table.get(&format).map(Vec::as_slice).unwrap_or_default()
    }

    /// Platform capabilities used for selection
    pub fn capabilities(&self) -> &PlatformCapabilities {
        &self.capabilities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reframe_surface::SurfaceAllocator;

    fn planar(w: u32, h: u32) -> FrameDescriptor {
        let len = FrameFormat::Planar420.buffer_len(w, h).expect("len");
        FrameDescriptor::planar420(w, h, vec![0; len]).expect("frame")
    }

    #[test]
    fn test_can_convert_by_format() {
        let caps = PlatformCapabilities::default();
        let frame = FrameDescriptor::packed32(2, 2, vec![0; 16]).expect("frame");
        assert!(ConverterKind::Packed32.can_convert(&frame, &caps));
        assert!(!ConverterKind::LumaChroma.can_convert(&frame, &caps));
        assert!(!ConverterKind::External.can_convert(&frame, &caps));
        frame.dispose();
    }

    #[test]
    fn test_planar_requires_direct_memory() {
        let caps = PlatformCapabilities {
            direct_memory: false,
            gpu_blit: true,
        };
        let frame = planar(4, 4);
        assert!(!ConverterKind::LumaChroma.can_convert(&frame, &caps));
        assert!(!ConverterKind::PlanarRgba.can_convert(&frame, &caps));
        frame.dispose();
    }

    #[test]
    fn test_select_falls_back_without_blit() {
        let config = ConverterConfig::builder()
            .capabilities(PlatformCapabilities {
                direct_memory: true,
                gpu_blit: false,
            })
            .build();
        let registry = ConverterRegistry::with_defaults(&config);

        let frame = planar(4, 4);
        assert_eq!(registry.select(&frame), Some(ConverterKind::LumaChroma));
        frame.dispose();

        let registry = ConverterRegistry::with_defaults(&ConverterConfig::default());
        let frame = planar(4, 4);
        assert_eq!(registry.select(&frame), Some(ConverterKind::PlanarRgba));
        frame.dispose();
    }

    #[test]
    fn test_register_validates_format() {
        let mut registry = ConverterRegistry::new(PlatformCapabilities::default());
        let err = registry
            .register(FrameFormat::Packed32, ConverterKind::LumaChroma)
            .expect_err("mismatched format");
        assert!(matches!(err, ConvertError::Registration { .. }));

        registry
            .register(FrameFormat::Planar420, ConverterKind::PlanarRgba)
            .expect("register");
        registry
            .register(FrameFormat::Planar420, ConverterKind::LumaChroma)
            .expect("register");
        assert_eq!(
            registry.kinds_for(FrameFormat::Planar420),
            &[ConverterKind::LumaChroma, ConverterKind::PlanarRgba]
        );
        assert!(registry.kinds_for(FrameFormat::Packed32).is_empty());
    }

    #[test]
    fn test_surface_extent_and_recreate() {
        let frame = planar(640, 480);
        assert_eq!(surface_extent(&frame), Some((640, 720)));
        assert_eq!(
            ConverterKind::PlanarRgba.surface_extent(640, 480),
            Some((640, 480))
        );

        let allocator = SurfaceAllocator::new();
        let luma = allocator
            .allocate(640, 720, SurfaceFormat::R8)
            .expect("allocate");
        assert!(!ConverterKind::LumaChroma.needs_recreate(&frame, Some(&luma)));
        assert!(ConverterKind::PlanarRgba.needs_recreate(&frame, Some(&luma)));
        assert!(ConverterKind::LumaChroma.needs_recreate(&frame, None));
        frame.dispose();
    }

    #[test]
    fn test_odd_width_surface_is_one_column_wider() {
        assert_eq!(
            ConverterKind::LumaChroma.surface_extent(17, 15),
            Some((18, 23))
        );
        assert_eq!(
            ConverterKind::LumaChroma.surface_extent(16, 15),
            Some((16, 23))
        );
        // RGBA output keeps the image width
        assert_eq!(
            ConverterKind::PlanarRgba.surface_extent(17, 15),
            Some((17, 15))
        );
    }

    #[test]
    fn test_material_tag() {
        assert_eq!(
            ConverterKind::LumaChroma.material_tag(),
            Some(LUMA_CHROMA_MATERIAL)
        );
        assert_eq!(ConverterKind::PlanarRgba.material_tag(), None);
    }
}
