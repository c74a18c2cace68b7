//! Capture device and scheduler configuration
//!
//! # Examples
//!
//! ```rust
//! use reframe_capture::{DeviceConfig, SchedulerConfig};
//!
//! let device = DeviceConfig::builder()
//!     .name("VirtualCamera1")
//!     .resolution(1280, 720)
//!     .fps(30)
//!     .build();
//! assert!(device.validate().is_ok());
//!
//! let scheduler = SchedulerConfig::builder()
//!     .allow_async_readback(false)
//!     .build();
//! assert_eq!(scheduler.max_devices, 8);
//! ```

use std::time::Duration;

/// Smallest width or height a device may capture at
pub const MIN_DIMENSION: u32 = 16;

/// Configuration of one virtual capture device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Unique device name (default: "VirtualCamera1")
    pub name: String,

    /// Output width in pixels (default: 1280)
    pub width: u32,

    /// Output height in pixels (default: 720)
    pub height: u32,

    /// Target frames per second (default: 60)
    pub fps: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "VirtualCamera1".to_string(),
            width: 1280,
            height: 720,
            fps: 60,
        }
    }
}

impl DeviceConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> DeviceConfigBuilder {
        DeviceConfigBuilder::default()
    }

    /// Whether the resolution is large enough to capture
    pub fn resolution_valid(&self) -> bool {
        self.width >= MIN_DIMENSION && self.height >= MIN_DIMENSION
    }

    /// Time between two captures
    ///
    /// `fps` of zero is treated as one.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }

    /// Validate configuration and return any issues
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.name.is_empty() {
            issues.push("name cannot be empty".to_string());
        }

        if !self.resolution_valid() {
            issues.push(format!(
                "resolution {}x{} is below {}x{}",
                self.width, self.height, MIN_DIMENSION, MIN_DIMENSION
            ));
        }

        if self.fps == 0 {
            issues.push("fps must be at least 1".to_string());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

/// Builder for [`DeviceConfig`]
#[derive(Debug, Clone, Default)]
pub struct DeviceConfigBuilder {
    name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
}

impl DeviceConfigBuilder {
    /// Set the device name
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set output width and height
    #[must_use]
    pub fn resolution(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Set target frames per second
    #[must_use]
    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = Some(fps);
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> DeviceConfig {
        let defaults = DeviceConfig::default();

        DeviceConfig {
            name: self.name.unwrap_or(defaults.name),
            width: self.width.unwrap_or(defaults.width),
            height: self.height.unwrap_or(defaults.height),
            fps: self.fps.unwrap_or(defaults.fps),
        }
    }
}

/// Configuration of the capture scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Use asynchronous readback when the platform supports it
    /// (default: true)
    ///
    /// Some platforms report support but fail sporadically; set to false to
    /// force synchronous readback everywhere.
    pub allow_async_readback: bool,

    /// Maximum number of devices (default: 8)
    pub max_devices: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            allow_async_readback: true,
            max_devices: 8,
        }
    }
}

impl SchedulerConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::default()
    }

    /// Validate configuration and return any issues
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.max_devices == 0 {
            issues.push("max_devices must be at least 1".to_string());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

/// Builder for [`SchedulerConfig`]
#[derive(Debug, Clone, Default)]
pub struct SchedulerConfigBuilder {
    allow_async_readback: Option<bool>,
    max_devices: Option<usize>,
}

impl SchedulerConfigBuilder {
    /// Allow or forbid asynchronous readback
    #[must_use]
    pub fn allow_async_readback(mut self, allow: bool) -> Self {
        self.allow_async_readback = Some(allow);
        self
    }

    /// Set the device limit
    #[must_use]
    pub fn max_devices(mut self, max: usize) -> Self {
        self.max_devices = Some(max);
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> SchedulerConfig {
        let defaults = SchedulerConfig::default();

        SchedulerConfig {
            allow_async_readback: self
                .allow_async_readback
                .unwrap_or(defaults.allow_async_readback),
            max_devices: self.max_devices.unwrap_or(defaults.max_devices),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DeviceConfig::default();
        assert_eq!(config.width, 1280);
        assert_eq!(config.height, 720);
        assert_eq!(config.fps, 60);
        assert!(config.validate().is_ok());

        assert!(SchedulerConfig::default().allow_async_readback);
    }

    #[test]
    fn test_builder_pattern() {
        let config = DeviceConfig::builder()
            .name("cam")
            .resolution(640, 480)
            .fps(10)
            .build();

        assert_eq!(config.name, "cam");
        assert_eq!(config.frame_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_resolution_boundary() {
        let ok = DeviceConfig::builder().resolution(16, 16).build();
        assert!(ok.validate().is_ok());

        let low = DeviceConfig::builder().resolution(15, 720).build();
        assert!(!low.resolution_valid());
        assert_eq!(low.validate().expect_err("too small").len(), 1);
    }

    #[test]
    fn test_config_validation() {
        let config = DeviceConfig::builder()
            .name("")
            .resolution(8, 8)
            .fps(0)
            .build();
        assert_eq!(config.validate().expect_err("invalid").len(), 3);
        assert_eq!(config.frame_interval(), Duration::from_secs(1));

        let scheduler = SchedulerConfig::builder().max_devices(0).build();
        assert!(scheduler.validate().is_err());
    }
}
