//! Capture and readback scheduler
//!
//! Drives every registered [`CaptureDevice`] from a single cooperative tick:
//!
//! 1. pump the readback backend so async completions from earlier ticks are
//!    delivered, and feed successful ones to the video input
//! 2. advance each armed device's pacing clock
//! 3. capture on devices whose clock fired: render, then read back (Sync) or
//!    submit a request (Async)
//!
//! The readback mode is decided once from [`ReadbackCapabilities`] when the
//! scheduler is created and never changes for any device.

use std::collections::BTreeMap;
use std::time::Duration;

use reframe_surface::SurfaceAllocator;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::config::{DeviceConfig, SchedulerConfig};
use crate::device::{CaptureDevice, Completion, DeviceState, DeviceStats};
use crate::error::{CaptureError, Result};
use crate::readback::{GpuReadback, ReadbackCapabilities, ReadbackMode};
use crate::source::FrameSource;
use crate::video_input::VideoInput;

/// Aggregate counters over all devices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Ticks run
    pub ticks: u64,
    /// Devices known to the scheduler
    pub devices: usize,
    /// Devices currently armed
    pub armed: usize,
    /// Devices disabled by invalid configuration
    pub disabled: usize,
    /// Sum of per-device counters
    pub totals: DeviceStats,
}

/// Paces capture devices and moves their pixels to a video input
pub struct CaptureScheduler<B: GpuReadback, V: VideoInput> {
    config: SchedulerConfig,
    capabilities: ReadbackCapabilities,
    mode: ReadbackMode,
    backend: B,
    input: V,
    allocator: SurfaceAllocator,
    devices: BTreeMap<String, CaptureDevice>,
    completion_tx: UnboundedSender<Completion>,
    completion_rx: UnboundedReceiver<Completion>,
    ticks: u64,
}

impl<B: GpuReadback, V: VideoInput> CaptureScheduler<B, V> {
    /// Create a scheduler
    ///
    /// `capabilities` comes from a single [`ReadbackCapabilities::probe`] at
    /// startup.
    pub fn new(
        config: SchedulerConfig,
        capabilities: ReadbackCapabilities,
        backend: B,
        input: V,
        allocator: SurfaceAllocator,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|issues| CaptureError::InvalidConfig(issues.join("; ")))?;

        let mode = capabilities.mode(config.allow_async_readback);
        match mode {
            ReadbackMode::Async => warn!(
                "Async readback is active. This increases throughput but can fail on some platforms."
            ),
            ReadbackMode::Sync => {
                info!("Async readback is disabled. Frames are delivered one tick late.")
            }
        }

        let (completion_tx, completion_rx) = unbounded_channel();
        Ok(Self {
            config,
            capabilities,
            mode,
            backend,
            input,
            allocator,
            devices: BTreeMap::new(),
            completion_tx,
            completion_rx,
            ticks: 0,
        })
    }

    /// Add a device
    ///
    /// A device whose configuration fails validation is kept in the
    /// `Uninitialized` state, is not registered with the video input and
    /// never captures until [`reconfigure`](Self::reconfigure) fixes it. The
    /// validation error is returned either way.
    pub fn add_device(&mut self, config: DeviceConfig, source: Box<dyn FrameSource>) -> Result<()> {
        if config.name.is_empty() {
            return Err(CaptureError::InvalidConfig(
                "name cannot be empty".to_string(),
            ));
        }
        if self.devices.contains_key(&config.name) {
            return Err(CaptureError::DuplicateDevice(config.name));
        }
        if self.devices.len() >= self.config.max_devices {
            return Err(CaptureError::TooManyDevices {
                max: self.config.max_devices,
            });
        }

        let name = config.name.clone();
        let (width, height, fps) = (config.width, config.height, config.fps);
        let valid = config.validate().is_ok();
        let mut device = CaptureDevice::new(config, self.mode, source, &self.allocator);

        if !valid {
            let err = device.invalid_config_error();
            warn!("Device {} disabled: {}", name, err);
            self.devices.insert(name, device);
            return Err(err);
        }

        self.input.add_device(&name, width, height, fps)?;
        device.set_registered(true);
        device.arm();

        info!(
            "Device {} armed: {}x{}@{} ({:?} readback)",
            name, width, height, fps, self.mode
        );
        self.devices.insert(name, device);
        Ok(())
    }

    /// Remove a device
    ///
    /// Outstanding async requests are discarded before the device's surfaces
    /// are released.
    pub fn remove_device(&mut self, name: &str) -> Result<()> {
        let mut device = self
            .devices
            .remove(name)
            .ok_or_else(|| CaptureError::DeviceNotFound(name.to_string()))?;

        device.shutdown(&mut self.backend);
        if device.is_registered() {
            self.input.remove_device(name)?;
        }
        info!("Device {} removed", name);
        Ok(())
    }

    /// Replace a device's configuration
    ///
    /// Valid configurations re-arm the device and re-register it with the
    /// video input when size or rate changed. In-flight async readbacks of
    /// the old size are dropped then. Surfaces resize on the next
    /// capture. Invalid configurations disable the device. The readback
    /// mode is kept.
    pub fn reconfigure(&mut self, name: &str, config: DeviceConfig) -> Result<()> {
        if config.name != name {
            return Err(CaptureError::InvalidConfig(format!(
                "cannot rename device {} to {}",
                name, config.name
            )));
        }

        let device = self
            .devices
            .get_mut(name)
            .ok_or_else(|| CaptureError::DeviceNotFound(name.to_string()))?;

        if config.validate().is_err() {
            device.shutdown(&mut self.backend);
            if device.is_registered() {
                self.input.remove_device(name)?;
                device.set_registered(false);
            }
            device.set_config(config);
            device.disable();
            let err = device.invalid_config_error();
            warn!("Device {} disabled: {}", name, err);
            return Err(err);
        }

        let old = device.config();
        let changed = (old.width, old.height, old.fps) != (config.width, config.height, config.fps);
        if changed {
            device.discard_outstanding(&mut self.backend);
        }
        if device.is_registered() && changed {
            self.input.remove_device(name)?;
            device.set_registered(false);
        }
        if !device.is_registered() {
            self.input
                .add_device(name, config.width, config.height, config.fps)?;
            device.set_registered(true);
        }

        info!(
            "Device {} reconfigured: {}x{}@{}",
            name, config.width, config.height, config.fps
        );
        device.set_config(config);
        device.arm();
        Ok(())
    }

    /// Run one tick with `elapsed` host time since the previous one
    ///
    /// Returns the number of frames delivered to the video input. Per-frame
    /// failures are logged and skipped; only surface allocation failures
    /// are returned.
    pub fn tick(&mut self, elapsed: Duration) -> Result<usize> {
        self.ticks += 1;
        self.backend.pump();

        let mut delivered = 0;
        while let Ok(completion) = self.completion_rx.try_recv() {
            match self.devices.get_mut(&completion.device) {
                Some(device) => {
                    delivered +=
                        device.complete(&mut self.input, completion.id, completion.result);
                }
                None => debug!(
                    "Completion {} for removed device {} dropped",
                    completion.id, completion.device
                ),
            }
        }

        for device in self.devices.values_mut() {
            if device.pace(elapsed) {
                delivered +=
                    device.capture(&mut self.backend, &mut self.input, &self.completion_tx)?;
            }
        }

        Ok(delivered)
    }

    /// Remove every device
    pub fn shutdown(&mut self) {
        let names: Vec<String> = self.devices.keys().cloned().collect();
        for name in names {
            if let Err(e) = self.remove_device(&name) {
                debug!("Removing {} during shutdown: {}", name, e);
            }
        }
    }

    /// Device by name
    pub fn device(&self, name: &str) -> Option<&CaptureDevice> {
        self.devices.get(name)
    }

    /// All devices in name order
    pub fn devices(&self) -> impl Iterator<Item = &CaptureDevice> {
        self.devices.values()
    }

    /// State of a device
    pub fn device_state(&self, name: &str) -> Option<DeviceState> {
        self.devices.get(name).map(CaptureDevice::state)
    }

    /// Counters of a device
    pub fn stats(&self, name: &str) -> Option<DeviceStats> {
        self.devices.get(name).map(CaptureDevice::stats)
    }

    /// Aggregate counters
    pub fn scheduler_stats(&self) -> SchedulerStats {
        let mut stats = SchedulerStats {
            ticks: self.ticks,
            devices: self.devices.len(),
            ..SchedulerStats::default()
        };
        for device in self.devices.values() {
            match device.state() {
                DeviceState::Uninitialized => stats.disabled += 1,
                _ => stats.armed += 1,
            }
            let d = device.stats();
            stats.totals.captures += d.captures;
            stats.totals.frames_delivered += d.frames_delivered;
            stats.totals.transfer_errors += d.transfer_errors;
            stats.totals.skipped_renders += d.skipped_renders;
        }
        stats
    }

    /// Readback mode used by every device
    pub fn mode(&self) -> ReadbackMode {
        self.mode
    }

    /// Probe result the scheduler was created with
    pub fn capabilities(&self) -> ReadbackCapabilities {
        self.capabilities
    }

    /// Video input
    pub fn input(&self) -> &V {
        &self.input
    }

    /// Video input for writing
    pub fn input_mut(&mut self) -> &mut V {
        &mut self.input
    }

    /// Readback backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Readback backend for writing
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: GpuReadback, V: VideoInput> Drop for CaptureScheduler<B, V> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<B: GpuReadback, V: VideoInput> std::fmt::Debug for CaptureScheduler<B, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureScheduler")
            .field("mode", &self.mode)
            .field("devices", &self.devices)
            .field("ticks", &self.ticks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readback::SoftwareGpu;
    use crate::source::TestPattern;
    use crate::video_input::VirtualVideoInput;

    fn scheduler(
        gpu: SoftwareGpu,
        allow_async: bool,
    ) -> (CaptureScheduler<SoftwareGpu, VirtualVideoInput>, VirtualVideoInput) {
        let input = VirtualVideoInput::new();
        let config = SchedulerConfig::builder()
            .allow_async_readback(allow_async)
            .max_devices(2)
            .build();
        let caps = ReadbackCapabilities::probe(&gpu);
        let scheduler =
            CaptureScheduler::new(config, caps, gpu, input.clone(), SurfaceAllocator::new())
                .expect("scheduler");
        (scheduler, input)
    }

    fn camera(name: &str, width: u32, height: u32, fps: u32) -> DeviceConfig {
        DeviceConfig::builder()
            .name(name)
            .resolution(width, height)
            .fps(fps)
            .build()
    }

    #[test]
    fn test_ten_fps_pacing() {
        let (mut scheduler, _) = scheduler(SoftwareGpu::sync_only(), true);
        scheduler
            .add_device(camera("cam", 16, 16, 10), Box::new(TestPattern::new()))
            .expect("add");

        for _ in 0..20 {
            scheduler.tick(Duration::from_millis(50)).expect("tick");
        }

        let stats = scheduler.stats("cam").expect("stats");
        assert_eq!(stats.captures, 10);
        assert_eq!(stats.frames_delivered, 9);
    }

    #[test]
    fn test_sync_delivers_one_tick_late() {
        let (mut scheduler, input) = scheduler(SoftwareGpu::new(), false);
        assert_eq!(scheduler.mode(), ReadbackMode::Sync);
        scheduler
            .add_device(camera("cam", 16, 16, 10), Box::new(TestPattern::new()))
            .expect("add");

        assert_eq!(scheduler.tick(Duration::from_millis(100)).expect("tick"), 0);
        assert_eq!(scheduler.tick(Duration::from_millis(100)).expect("tick"), 1);
        assert_eq!(input.frames_received("cam"), 1);
    }

    #[test]
    fn test_async_error_skips_frame() {
        let (mut scheduler, input) = scheduler(SoftwareGpu::new(), true);
        assert_eq!(scheduler.mode(), ReadbackMode::Async);
        scheduler
            .add_device(camera("cam", 16, 16, 10), Box::new(TestPattern::new()))
            .expect("add");
        scheduler.backend_mut().fail_next(1);

        // submits a request that will fail
        assert_eq!(scheduler.tick(Duration::from_millis(100)).expect("tick"), 0);

        // the failure arrives: zero frames, still armed
        assert_eq!(scheduler.tick(Duration::from_millis(100)).expect("tick"), 0);
        assert_eq!(scheduler.device_state("cam"), Some(DeviceState::Armed));
        assert_eq!(scheduler.stats("cam").expect("stats").transfer_errors, 1);

        // the next request succeeds
        assert_eq!(scheduler.tick(Duration::from_millis(100)).expect("tick"), 1);
        assert_eq!(input.frames_received("cam"), 1);
    }

    #[test]
    fn test_invalid_resolution_disables_until_reconfigured() {
        let (mut scheduler, input) = scheduler(SoftwareGpu::sync_only(), true);

        let err = scheduler
            .add_device(camera("cam", 8, 8, 10), Box::new(TestPattern::new()))
            .expect_err("too small");
        assert!(matches!(err, CaptureError::InvalidResolution { width: 8, height: 8 }));
        assert_eq!(scheduler.device_state("cam"), Some(DeviceState::Uninitialized));
        assert!(!input.has_device("cam"));

        scheduler.tick(Duration::from_secs(1)).expect("tick");
        assert_eq!(scheduler.stats("cam").expect("stats").captures, 0);

        scheduler
            .reconfigure("cam", camera("cam", 16, 16, 10))
            .expect("reconfigure");
        assert_eq!(scheduler.device_state("cam"), Some(DeviceState::Armed));
        assert!(input.has_device("cam"));

        scheduler.tick(Duration::from_millis(100)).expect("tick");
        assert_eq!(scheduler.stats("cam").expect("stats").captures, 1);
    }

    #[test]
    fn test_reconfigure_resizes() {
        let (mut scheduler, input) = scheduler(SoftwareGpu::sync_only(), true);
        scheduler
            .add_device(camera("cam", 16, 16, 10), Box::new(TestPattern::new()))
            .expect("add");
        scheduler.tick(Duration::from_millis(100)).expect("tick");

        scheduler
            .reconfigure("cam", camera("cam", 32, 16, 20))
            .expect("reconfigure");
        assert_eq!(input.device_mode("cam"), Some((32, 16, 20)));

        // new cpu buffer holds no readback yet
        assert_eq!(scheduler.tick(Duration::from_millis(50)).expect("tick"), 0);
        assert_eq!(scheduler.tick(Duration::from_millis(50)).expect("tick"), 1);

        let frame = input
            .take_frame("cam")
            .expect("take")
            .expect("frame present");
        assert_eq!((frame.width(), frame.height()), (32, 16));
        frame.dispose();

        let err = scheduler
            .reconfigure("cam", camera("cam", 32, 4, 20))
            .expect_err("too small");
        assert!(matches!(err, CaptureError::InvalidResolution { .. }));
        assert_eq!(scheduler.device_state("cam"), Some(DeviceState::Uninitialized));
        assert!(!input.has_device("cam"));
    }

    #[test]
    fn test_device_limits() {
        let (mut scheduler, _) = scheduler(SoftwareGpu::new(), true);
        scheduler
            .add_device(camera("a", 16, 16, 10), Box::new(TestPattern::new()))
            .expect("add");

        assert!(matches!(
            scheduler.add_device(camera("a", 16, 16, 10), Box::new(TestPattern::new())),
            Err(CaptureError::DuplicateDevice(_))
        ));

        scheduler
            .add_device(camera("b", 16, 16, 10), Box::new(TestPattern::new()))
            .expect("add");
        assert!(matches!(
            scheduler.add_device(camera("c", 16, 16, 10), Box::new(TestPattern::new())),
            Err(CaptureError::TooManyDevices { max: 2 })
        ));
        assert_eq!(scheduler.scheduler_stats().armed, 2);
    }

    #[test]
    fn test_remove_discards_outstanding() {
        let (mut scheduler, input) = scheduler(SoftwareGpu::new(), true);
        scheduler
            .add_device(camera("cam", 16, 16, 10), Box::new(TestPattern::new()))
            .expect("add");
        scheduler.tick(Duration::from_millis(100)).expect("tick");
        assert_eq!(scheduler.backend().pending(), 1);

        scheduler.remove_device("cam").expect("remove");
        assert_eq!(scheduler.backend().pending(), 0);
        assert!(!input.has_device("cam"));

        assert_eq!(scheduler.tick(Duration::from_millis(100)).expect("tick"), 0);
        assert!(matches!(
            scheduler.remove_device("cam"),
            Err(CaptureError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_reconfigure_drops_in_flight_readbacks() {
        let (mut scheduler, input) = scheduler(SoftwareGpu::new(), true);
        scheduler
            .add_device(camera("cam", 16, 16, 10), Box::new(TestPattern::new()))
            .expect("add");
        scheduler.tick(Duration::from_millis(100)).expect("tick");
        assert_eq!(scheduler.backend().pending(), 1);

        scheduler
            .reconfigure("cam", camera("cam", 32, 16, 10))
            .expect("reconfigure");
        assert_eq!(scheduler.backend().pending(), 0);
        assert_eq!(scheduler.device("cam").map(CaptureDevice::outstanding), Some(0));

        // the 16x16 readback never reaches the 32x16 device
        assert_eq!(scheduler.tick(Duration::from_millis(100)).expect("tick"), 0);
        assert!(input.take_frame("cam").expect("take").is_none());

        assert_eq!(scheduler.tick(Duration::from_millis(100)).expect("tick"), 1);
        let frame = input
            .take_frame("cam")
            .expect("take")
            .expect("frame present");
        assert_eq!((frame.width(), frame.height()), (32, 16));
        frame.dispose();
    }

    #[test]
    fn test_drop_unregisters_devices() {
        let (mut scheduler, input) = scheduler(SoftwareGpu::new(), true);
        scheduler
            .add_device(camera("cam", 16, 16, 10), Box::new(TestPattern::new()))
            .expect("add");
        drop(scheduler);
        assert!(input.device_names().is_empty());
    }
}
