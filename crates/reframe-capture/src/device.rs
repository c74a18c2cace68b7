//! One virtual capture device
//!
//! State machine:
//!
//! ```text
//! Uninitialized ──(valid config)──► Armed ──► Rendering ──► Reading ──► Armed
//!       ▲                             │
//!       └──────(invalid config)───────┘
//! ```
//!
//! `Uninitialized` is terminal until the device is reconfigured.

use reframe_surface::{Rotation, SurfaceAllocator, SurfaceFormat, SurfaceSlot};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace, warn};

use crate::config::DeviceConfig;
use crate::error::{CaptureError, Result};
use crate::pacing::PacingClock;
use crate::readback::{GpuReadback, ReadbackCallback, ReadbackData, ReadbackMode, RequestId};
use crate::source::FrameSource;
use crate::video_input::VideoInput;

/// Render targets store the bottom row first
const READBACK_TOP_ROW_FIRST: bool = false;

/// Device lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Failed validation; no capture until reconfigured
    Uninitialized,
    /// Waiting for the pacing clock
    Armed,
    /// Frame source drawing into the render target
    Rendering,
    /// Pixels moving from the render target to the CPU
    Reading,
}

/// Per-device counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Paced captures attempted
    pub captures: u64,
    /// Frames accepted by the video input
    pub frames_delivered: u64,
    /// Readbacks that reported an error (frame skipped)
    pub transfer_errors: u64,
    /// Captures skipped because the frame source failed
    pub skipped_renders: u64,
}

/// Async readback completion routed back to its device
pub(crate) struct Completion {
    pub(crate) device: String,
    pub(crate) id: RequestId,
    pub(crate) result: Result<ReadbackData>,
}

/// A named virtual camera feed
pub struct CaptureDevice {
    config: DeviceConfig,
    mode: ReadbackMode,
    state: DeviceState,
    source: Box<dyn FrameSource>,
    render_target: SurfaceSlot,
    cpu_texture: SurfaceSlot,
    has_readback: bool,
    clock: PacingClock,
    outstanding: Vec<RequestId>,
    stats: DeviceStats,
    registered: bool,
}

impl CaptureDevice {
    pub(crate) fn new(
        config: DeviceConfig,
        mode: ReadbackMode,
        source: Box<dyn FrameSource>,
        allocator: &SurfaceAllocator,
    ) -> Self {
        let clock = PacingClock::new(config.fps);
        Self {
            config,
            mode,
            state: DeviceState::Uninitialized,
            source,
            render_target: SurfaceSlot::new(allocator.clone()),
            cpu_texture: SurfaceSlot::new(allocator.clone()),
            has_readback: false,
            clock,
            outstanding: Vec::new(),
            stats: DeviceStats::default(),
            registered: false,
        }
    }

    /// Device name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Current configuration
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Readback strategy, fixed for the device's lifetime
    pub fn mode(&self) -> ReadbackMode {
        self.mode
    }

    /// Lifecycle state
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Counters
    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    /// Async requests not yet completed
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// Whether the device is registered with the video input
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub(crate) fn arm(&mut self) {
        self.state = DeviceState::Armed;
        self.clock.reset(self.config.fps);
    }

    pub(crate) fn disable(&mut self) {
        self.state = DeviceState::Uninitialized;
    }

    pub(crate) fn set_config(&mut self, config: DeviceConfig) {
        self.config = config;
    }

    pub(crate) fn set_registered(&mut self, registered: bool) {
        self.registered = registered;
    }

    /// Advance the pacing clock; disabled devices do not accumulate time
    pub(crate) fn pace(&mut self, elapsed: std::time::Duration) -> bool {
        self.state == DeviceState::Armed && self.clock.tick(elapsed)
    }

    /// Run one paced capture
    ///
    /// Returns the number of frames delivered to the video input (Sync mode
    /// delivers the previous capture here). Render and transfer failures
    /// skip the frame and leave the device armed; only surface allocation
    /// failures are returned.
    pub(crate) fn capture<B, V>(
        &mut self,
        backend: &mut B,
        input: &mut V,
        completions: &UnboundedSender<Completion>,
    ) -> Result<usize>
    where
        B: GpuReadback + ?Sized,
        V: VideoInput + ?Sized,
    {
        let (width, height) = (self.config.width, self.config.height);
        self.render_target.ensure(width, height, SurfaceFormat::Bgra32)?;
        self.stats.captures += 1;

        let mut delivered = 0;
        if self.mode == ReadbackMode::Sync {
            if self.cpu_texture.ensure(width, height, SurfaceFormat::Bgra32)? {
                self.has_readback = false;
            }
            if self.has_readback {
                delivered += self.deliver_previous(input);
                self.has_readback = false;
            }
        }

        self.state = DeviceState::Rendering;
        let Some(target) = self.render_target.get_mut() else {
            self.state = DeviceState::Armed;
            return Ok(delivered);
        };
        if let Err(e) = self.source.render(target) {
            warn!("Device {}: render failed, skipping frame: {}", self.config.name, e);
            self.stats.skipped_renders += 1;
            self.state = DeviceState::Armed;
            return Ok(delivered);
        }

        self.state = DeviceState::Reading;
        match self.mode {
            ReadbackMode::Sync => self.read_sync(backend),
            ReadbackMode::Async => self.request_async(backend, completions),
        }

        self.state = DeviceState::Armed;
        Ok(delivered)
    }

    fn deliver_previous<V: VideoInput + ?Sized>(&mut self, input: &mut V) -> usize {
        let Some(texture) = self.cpu_texture.get() else {
            return 0;
        };
        let accepted = input.update_frame(
            &self.config.name,
            texture.data(),
            texture.width(),
            texture.height(),
            Rotation::Deg0,
            READBACK_TOP_ROW_FIRST,
        );
        if accepted {
            self.stats.frames_delivered += 1;
            1
        } else {
            0
        }
    }

    fn read_sync<B: GpuReadback + ?Sized>(&mut self, backend: &mut B) {
        let (Some(target), Some(texture)) =
            (self.render_target.get(), self.cpu_texture.get_mut())
        else {
            return;
        };
        match backend.read_sync(target, texture) {
            Ok(()) => self.has_readback = true,
            Err(e) => {
                warn!("Device {}: readback failed, skipping frame: {}", self.config.name, e);
                self.stats.transfer_errors += 1;
                self.has_readback = false;
            }
        }
    }

    fn request_async<B: GpuReadback + ?Sized>(
        &mut self,
        backend: &mut B,
        completions: &UnboundedSender<Completion>,
    ) {
        let Some(target) = self.render_target.get() else {
            return;
        };

        let tx = completions.clone();
        let device = self.config.name.clone();
        let callback: ReadbackCallback =
            Box::new(move |id: RequestId, result: Result<ReadbackData>| {
                if tx.send(Completion { device, id, result }).is_err() {
                    trace!("Completion for {} dropped, scheduler gone", id);
                }
            });

        match backend.request_async(target, callback) {
            Ok(id) => {
                trace!("Device {}: {} submitted", self.config.name, id);
                self.outstanding.push(id);
            }
            Err(e) => {
                warn!(
                    "Device {}: readback request failed, skipping frame: {}",
                    self.config.name, e
                );
                self.stats.transfer_errors += 1;
            }
        }
    }

    /// Handle an async completion; returns frames delivered
    pub(crate) fn complete<V: VideoInput + ?Sized>(
        &mut self,
        input: &mut V,
        id: RequestId,
        result: Result<ReadbackData>,
    ) -> usize {
        let Some(position) = self.outstanding.iter().position(|&pending| pending == id) else {
            debug!("Device {}: stale completion {} ignored", self.config.name, id);
            return 0;
        };
        self.outstanding.swap_remove(position);

        let data = match result {
            Ok(data) => data,
            Err(e) => {
                warn!("Device {}: {}. Skipping frame.", self.config.name, e);
                self.stats.transfer_errors += 1;
                return 0;
            }
        };

        let accepted = input.update_frame(
            &self.config.name,
            &data.bytes,
            data.width,
            data.height,
            Rotation::Deg0,
            READBACK_TOP_ROW_FIRST,
        );
        if accepted {
            self.stats.frames_delivered += 1;
            1
        } else {
            0
        }
    }

    /// Drop every in-flight async request; late completions become stale
    pub(crate) fn discard_outstanding<B: GpuReadback + ?Sized>(&mut self, backend: &mut B) {
        for id in self.outstanding.drain(..) {
            if !backend.discard(id) {
                debug!("Device {}: {} already completed", self.config.name, id);
            }
        }
    }

    /// Discard outstanding requests and release both surfaces
    pub(crate) fn shutdown<B: GpuReadback + ?Sized>(&mut self, backend: &mut B) {
        self.discard_outstanding(backend);
        self.render_target.release();
        self.cpu_texture.release();
        self.has_readback = false;
    }

    pub(crate) fn invalid_config_error(&self) -> CaptureError {
        if !self.config.resolution_valid() {
            CaptureError::InvalidResolution {
                width: self.config.width,
                height: self.config.height,
            }
        } else {
            CaptureError::InvalidConfig(
                self.config
                    .validate()
                    .err()
                    .unwrap_or_default()
                    .join("; "),
            )
        }
    }
}

impl std::fmt::Debug for CaptureDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureDevice")
            .field("config", &self.config)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("outstanding", &self.outstanding.len())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readback::SoftwareGpu;
    use crate::source::TestPattern;
    use crate::video_input::VirtualVideoInput;
    use reframe_surface::Surface;
    use tokio::sync::mpsc::unbounded_channel;

    /// Fills the target with its render count; the second render fails
    struct FlakySource {
        renders: u8,
    }

    impl FrameSource for FlakySource {
        fn render(&mut self, target: &mut Surface) -> Result<()> {
            self.renders += 1;
            if self.renders == 2 {
                return Err(CaptureError::Render("source lost".to_string()));
            }
            target.data_mut().fill(self.renders);
            Ok(())
        }
    }

    fn device(mode: ReadbackMode) -> CaptureDevice {
        let config = DeviceConfig::builder()
            .name("cam")
            .resolution(16, 16)
            .fps(10)
            .build();
        let mut device = CaptureDevice::new(
            config,
            mode,
            Box::new(TestPattern::solid([1, 2, 3, 255])),
            &SurfaceAllocator::new(),
        );
        device.arm();
        device
    }

    #[test]
    fn test_uninitialized_does_not_pace() {
        let mut device = device(ReadbackMode::Sync);
        device.disable();
        assert!(!device.pace(std::time::Duration::from_secs(1)));
        assert_eq!(device.state(), DeviceState::Uninitialized);
    }

    #[test]
    fn test_sync_capture_latency() {
        let mut device = device(ReadbackMode::Sync);
        let mut gpu = SoftwareGpu::sync_only();
        let mut input = VirtualVideoInput::new();
        input.add_device("cam", 16, 16, 10).expect("add");
        let (tx, _rx) = unbounded_channel();

        assert_eq!(device.capture(&mut gpu, &mut input, &tx).expect("capture"), 0);
        assert_eq!(device.capture(&mut gpu, &mut input, &tx).expect("capture"), 1);
        assert_eq!(device.state(), DeviceState::Armed);
        assert_eq!(device.stats().captures, 2);
        assert_eq!(input.frames_received("cam"), 1);
    }

    #[test]
    fn test_stale_completion_ignored() {
        let mut device = device(ReadbackMode::Async);
        let mut input = VirtualVideoInput::new();
        input.add_device("cam", 16, 16, 10).expect("add");

        let mut gpu = SoftwareGpu::new();
        let (tx, mut rx) = unbounded_channel();
        device.capture(&mut gpu, &mut input, &tx).expect("capture");
        assert_eq!(device.outstanding(), 1);

        gpu.pump();
        let completion = rx.try_recv().expect("completion");
        let id = completion.id;
        assert_eq!(
            device.complete(&mut input, completion.id, completion.result),
            1
        );
        let late = Err(CaptureError::Transfer("late".to_string()));
        assert_eq!(device.complete(&mut input, id, late), 0);
        assert_eq!(device.stats().transfer_errors, 0);
    }

    #[test]
    fn test_shutdown_discards_requests() {
        let mut device = device(ReadbackMode::Async);
        let mut input = VirtualVideoInput::new();
        let mut gpu = SoftwareGpu::new();
        let (tx, mut rx) = unbounded_channel();

        device.capture(&mut gpu, &mut input, &tx).expect("capture");
        device.shutdown(&mut gpu);

        assert_eq!(device.outstanding(), 0);
        assert_eq!(gpu.pending(), 0);
        gpu.pump();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_sync_render_failure_does_not_redeliver() {
        let config = DeviceConfig::builder()
            .name("cam")
            .resolution(16, 16)
            .fps(10)
            .build();
        let mut device = CaptureDevice::new(
            config,
            ReadbackMode::Sync,
            Box::new(FlakySource { renders: 0 }),
            &SurfaceAllocator::new(),
        );
        device.arm();
        let mut gpu = SoftwareGpu::sync_only();
        let mut input = VirtualVideoInput::new();
        input.add_device("cam", 16, 16, 10).expect("add");
        let (tx, _rx) = unbounded_channel();

        let delivered: Vec<usize> = (0..3)
            .map(|_| device.capture(&mut gpu, &mut input, &tx).expect("capture"))
            .collect();
        assert_eq!(delivered, vec![0, 1, 0]);
        assert_eq!(device.stats().skipped_renders, 1);
        assert_eq!(device.stats().frames_delivered, 1);
        assert_eq!(input.frames_received("cam"), 1);

        let first = input.take_frame("cam").expect("take").expect("first frame");
        assert!(first.bytes().expect("bytes").iter().all(|&b| b == 1));

        // third render is the next frame out, not a repeat of the first
        assert_eq!(device.capture(&mut gpu, &mut input, &tx).expect("capture"), 1);
        let next = input.take_frame("cam").expect("take").expect("next frame");
        assert!(next.bytes().expect("bytes").iter().all(|&b| b == 3));
        assert_eq!(input.frames_received("cam"), 2);
    }
}
