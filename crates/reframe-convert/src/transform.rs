//! Display transform for converted frames

use reframe_surface::FrameMeta;

/// How the rendering layer must orient a converted surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayTransform {
    /// Mirror horizontally (local camera preview)
    pub mirror: bool,

    /// Clockwise rotation in degrees: 0, 90, 180 or 270
    pub rotation_degrees: i32,

    /// Flip vertically (first buffer row is the bottom of the image)
    pub vertical_flip: bool,
}

impl DisplayTransform {
    /// Transform for a frame with this metadata
    pub fn for_frame(meta: &FrameMeta) -> Self {
        Self {
            mirror: !meta.is_remote(),
            rotation_degrees: meta.rotation.degrees(),
            vertical_flip: !meta.top_row_first,
        }
    }

    /// Horizontal and vertical scale factors, `-1.0` for flipped axes
    pub fn scale(&self) -> (f32, f32) {
        let x = if self.mirror { -1.0 } else { 1.0 };
        let y = if self.vertical_flip { -1.0 } else { 1.0 };
        (x, y)
    }

    /// Signed rotation for a UI whose positive angles turn counter-clockwise
    ///
    /// Mirroring reverses the direction of rotation, so mirrored views rotate
    /// by `+degrees` and all others by `-degrees`.
    pub fn ui_rotation(&self) -> i32 {
        if self.mirror {
            self.rotation_degrees
        } else {
            -self.rotation_degrees
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reframe_surface::{FrameFormat, Rotation, SourceId};

    fn meta(source: SourceId, rotation: Rotation, top_row_first: bool) -> FrameMeta {
        FrameMeta {
            width: 640,
            height: 480,
            rotation,
            top_row_first,
            source_format: FrameFormat::Packed32,
            source,
        }
    }

    #[test]
    fn test_local_frame_is_mirrored() {
        let transform = DisplayTransform::for_frame(&meta(SourceId::Local, Rotation::Deg90, true));
        assert!(transform.mirror);
        assert!(!transform.vertical_flip);
        assert_eq!(transform.scale(), (-1.0, 1.0));
        assert_eq!(transform.ui_rotation(), 90);
    }

    #[test]
    fn test_remote_bottom_up_frame() {
        let transform =
            DisplayTransform::for_frame(&meta(SourceId::Remote(4), Rotation::Deg270, false));
        assert!(!transform.mirror);
        assert!(transform.vertical_flip);
        assert_eq!(transform.scale(), (1.0, -1.0));
        assert_eq!(transform.ui_rotation(), -270);
    }
}
