//! Capture device registration surface
//!
//! The video input is the platform side of a virtual camera: devices are
//! added and removed by name and fed one BGRA frame per capture. Frames fed
//! into [`VirtualVideoInput`] can be taken back out as local
//! [`FrameDescriptor`]s, which closes the loop into the conversion engine.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use reframe_surface::{FrameDescriptor, Rotation, SourceId};
use tracing::{debug, info, trace, warn};

use crate::error::{CaptureError, Result};

/// Platform virtual camera interface
pub trait VideoInput {
    /// Register a device
    fn add_device(&mut self, name: &str, width: u32, height: u32, fps: u32) -> Result<()>;

    /// Unregister a device
    fn remove_device(&mut self, name: &str) -> Result<()>;

    /// Feed one BGRA frame
    ///
    /// Returns `false` if the frame was rejected.
    fn update_frame(
        &mut self,
        name: &str,
        bgra: &[u8],
        width: u32,
        height: u32,
        rotation: Rotation,
        top_row_first: bool,
    ) -> bool;
}

#[derive(Debug)]
struct LatestFrame {
    width: u32,
    height: u32,
    rotation: Rotation,
    top_row_first: bool,
    bgra: Vec<u8>,
}

#[derive(Debug)]
struct VirtualDevice {
    width: u32,
    height: u32,
    fps: u32,
    frames_received: u64,
    latest: Option<LatestFrame>,
}

/// In-memory video input
///
/// Cheap to clone; clones share the same devices, so one handle can be given
/// to a scheduler while another reads frames back.
#[derive(Debug, Clone, Default)]
pub struct VirtualVideoInput {
    devices: Arc<Mutex<HashMap<String, VirtualDevice>>>,
}

impl VirtualVideoInput {
    /// Create an input with no devices
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a device is registered
    pub fn has_device(&self, name: &str) -> bool {
        self.devices.lock().contains_key(name)
    }

    /// Registered device names, sorted
    pub fn device_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.devices.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Registered `(width, height, fps)` of a device
    pub fn device_mode(&self, name: &str) -> Option<(u32, u32, u32)> {
        self.devices
            .lock()
            .get(name)
            .map(|device| (device.width, device.height, device.fps))
    }

    /// Frames accepted for a device since it was added
    pub fn frames_received(&self, name: &str) -> u64 {
        self.devices
            .lock()
            .get(name)
            .map_or(0, |device| device.frames_received)
    }

    /// Take the latest frame of a device as a local RGBA frame descriptor
    ///
    /// Returns `Ok(None)` if no new frame arrived since the last call.
    pub fn take_frame(&self, name: &str) -> Result<Option<FrameDescriptor>> {
        let latest = {
            let mut devices = self.devices.lock();
            let device = devices
                .get_mut(name)
                .ok_or_else(|| CaptureError::DeviceNotFound(name.to_string()))?;
            device.latest.take()
        };

        let Some(latest) = latest else {
            return Ok(None);
        };

        let mut rgba = latest.bgra;
        for pixel in rgba.chunks_exact_mut(4) {
            pixel.swap(0, 2);
        }

        let frame = FrameDescriptor::packed32(latest.width, latest.height, rgba)?
            .with_rotation(latest.rotation)
            .with_top_row_first(latest.top_row_first)
            .with_source(SourceId::Local);
        Ok(Some(frame))
    }
}

impl VideoInput for VirtualVideoInput {
    fn add_device(&mut self, name: &str, width: u32, height: u32, fps: u32) -> Result<()> {
        let mut devices = self.devices.lock();
        if devices.contains_key(name) {
            return Err(CaptureError::DuplicateDevice(name.to_string()));
        }

        devices.insert(
            name.to_string(),
            VirtualDevice {
                width,
                height,
                fps,
                frames_received: 0,
                latest: None,
            },
        );
        info!("Video input device added: {} {}x{}@{}", name, width, height, fps);
        Ok(())
    }

    fn remove_device(&mut self, name: &str) -> Result<()> {
        match self.devices.lock().remove(name) {
            Some(device) => {
                info!(
                    "Video input device removed: {} ({} frames)",
                    name, device.frames_received
                );
                Ok(())
            }
            None => Err(CaptureError::DeviceNotFound(name.to_string())),
        }
    }

    fn update_frame(
        &mut self,
        name: &str,
        bgra: &[u8],
        width: u32,
        height: u32,
        rotation: Rotation,
        top_row_first: bool,
    ) -> bool {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(4));
        if width == 0 || height == 0 || expected != Some(bgra.len()) {
            warn!(
                "Rejected frame for {}: {} bytes for {}x{} BGRA",
                name,
                bgra.len(),
                width,
                height
            );
            return false;
        }

        let mut devices = self.devices.lock();
        let Some(device) = devices.get_mut(name) else {
            debug!("Frame for unknown device {} dropped", name);
            return false;
        };

        if (width, height) != (device.width, device.height) {
            debug!(
                "Device {} fed {}x{}, registered {}x{}",
                name, width, height, device.width, device.height
            );
        }

        device.frames_received += 1;
        device.latest = Some(LatestFrame {
            width,
            height,
            rotation,
            top_row_first,
            bgra: bgra.to_vec(),
        });
        trace!("Device {} frame {}", name, device.frames_received);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reframe_surface::FrameFormat;

    #[test]
    fn test_add_remove() {
        let mut input = VirtualVideoInput::new();
        input.add_device("cam", 16, 16, 30).expect("add");
        assert!(input.has_device("cam"));
        assert_eq!(input.device_mode("cam"), Some((16, 16, 30)));

        assert!(matches!(
            input.add_device("cam", 16, 16, 30),
            Err(CaptureError::DuplicateDevice(_))
        ));

        input.remove_device("cam").expect("remove");
        assert!(input.device_names().is_empty());
        assert!(matches!(
            input.remove_device("cam"),
            Err(CaptureError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_update_frame_validates_length() {
        let mut input = VirtualVideoInput::new();
        input.add_device("cam", 16, 16, 30).expect("add");

        assert!(!input.update_frame("cam", &[0; 16], 16, 16, Rotation::Deg0, true));
        assert!(!input.update_frame("other", &[0; 1024], 16, 16, Rotation::Deg0, true));
        assert!(input.update_frame("cam", &[0; 1024], 16, 16, Rotation::Deg0, true));
        assert_eq!(input.frames_received("cam"), 1);
    }

    #[test]
    fn test_take_frame_swizzles() {
        let mut input = VirtualVideoInput::new();
        input.add_device("cam", 16, 16, 30).expect("add");

        let bgra: Vec<u8> = [10u8, 20, 30, 255].repeat(16 * 16);
        assert!(input.update_frame("cam", &bgra, 16, 16, Rotation::Deg180, false));

        let frame = input
            .take_frame("cam")
            .expect("take")
            .expect("frame present");
        assert_eq!(frame.format(), FrameFormat::Packed32);
        assert_eq!(frame.rotation(), Rotation::Deg180);
        assert!(!frame.top_row_first());
        assert_eq!(frame.source(), SourceId::Local);
        assert_eq!(&frame.bytes().expect("bytes")[..4], &[30, 20, 10, 255]);
        frame.dispose();

        assert!(input.take_frame("cam").expect("take").is_none());
    }
}
