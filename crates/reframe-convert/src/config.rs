//! Converter configuration
//!
//! # Examples
//!
//! ```rust
//! use reframe_convert::{ConverterConfig, Dispatch, PlanarOutput};
//!
//! let config = ConverterConfig::builder()
//!     .dispatch(Dispatch::Worker)
//!     .planar_output(PlanarOutput::LumaChroma)
//!     .build();
//!
//! assert!(config.validate().is_ok());
//! ```

/// Where the pixel work of a conversion runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dispatch {
    /// On the calling thread, during `convert()` (default)
    #[default]
    Inline,

    /// On a dedicated conversion thread; `is_done()` polls for completion
    Worker,
}

/// Output produced for Planar420 frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlanarOutput {
    /// One single-channel surface holding luminance on top and both chroma
    /// planes side by side below it. Needs a material that understands the
    /// layout.
    LumaChroma,

    /// A regular RGBA surface, produced by a blit pass over the luma+chroma
    /// surface (default)
    #[default]
    Rgba,
}

/// What the platform lets converters do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformCapabilities {
    /// Frame bytes can be read directly (required for Planar420)
    pub direct_memory: bool,

    /// A blit pass from luma+chroma to RGBA is available
    pub gpu_blit: bool,
}

impl Default for PlatformCapabilities {
    fn default() -> Self {
        Self {
            direct_memory: true,
            gpu_blit: true,
        }
    }
}

/// Configuration for converters and the presenter
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// Where plane copies run (default: Inline)
    pub dispatch: Dispatch,

    /// Output for Planar420 frames (default: Rgba)
    pub planar_output: PlanarOutput,

    /// Platform capabilities (default: everything available)
    pub capabilities: PlatformCapabilities,

    /// Thread name of the conversion worker (default: "reframe-convert")
    pub worker_name: String,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            dispatch: Dispatch::Inline,
            planar_output: PlanarOutput::Rgba,
            capabilities: PlatformCapabilities::default(),
            worker_name: "reframe-convert".to_string(),
        }
    }
}

impl ConverterConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> ConverterConfigBuilder {
        ConverterConfigBuilder::default()
    }

    /// Validate configuration and return any issues
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.dispatch == Dispatch::Worker && !self.capabilities.direct_memory {
            issues.push("worker dispatch requires direct memory access".to_string());
        }

        if self.worker_name.is_empty() {
            issues.push("worker_name cannot be empty".to_string());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

/// Builder for [`ConverterConfig`]
#[derive(Debug, Clone, Default)]
pub struct ConverterConfigBuilder {
    dispatch: Option<Dispatch>,
    planar_output: Option<PlanarOutput>,
    capabilities: Option<PlatformCapabilities>,
    worker_name: Option<String>,
}

impl ConverterConfigBuilder {
    /// Set where plane copies run
    #[must_use]
    pub fn dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// Set the Planar420 output layout
    #[must_use]
    pub fn planar_output(mut self, output: PlanarOutput) -> Self {
        self.planar_output = Some(output);
        self
    }

    /// Set platform capabilities
    #[must_use]
    pub fn capabilities(mut self, capabilities: PlatformCapabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    /// Set the worker thread name
    #[must_use]
    pub fn worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = Some(name.into());
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> ConverterConfig {
        let defaults = ConverterConfig::default();

        ConverterConfig {
            dispatch: self.dispatch.unwrap_or(defaults.dispatch),
            planar_output: self.planar_output.unwrap_or(defaults.planar_output),
            capabilities: self.capabilities.unwrap_or(defaults.capabilities),
            worker_name: self.worker_name.unwrap_or(defaults.worker_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConverterConfig::default();
        assert_eq!(config.dispatch, Dispatch::Inline);
        assert_eq!(config.planar_output, PlanarOutput::Rgba);
        assert!(config.capabilities.direct_memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = ConverterConfig::builder()
            .dispatch(Dispatch::Worker)
            .planar_output(PlanarOutput::LumaChroma)
            .worker_name("test-worker")
            .build();

        assert_eq!(config.dispatch, Dispatch::Worker);
        assert_eq!(config.planar_output, PlanarOutput::LumaChroma);
        assert_eq!(config.worker_name, "test-worker");
    }

    #[test]
    fn test_config_validation() {
        let config = ConverterConfig::builder()
            .dispatch(Dispatch::Worker)
            .capabilities(PlatformCapabilities {
                direct_memory: false,
                gpu_blit: true,
            })
            .worker_name("")
            .build();

        let issues = config.validate().expect_err("invalid");
        assert_eq!(issues.len(), 2);
    }
}
