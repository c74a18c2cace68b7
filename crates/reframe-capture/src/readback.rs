//! GPU readback backends
//!
//! Readback moves a rendered image from GPU-resident memory into a
//! CPU-readable buffer. Two strategies exist:
//!
//! - **Sync**: copy immediately into a CPU surface. Callers read the
//!   *previous* frame's target before rendering the next one so the copy
//!   never waits on work that was just submitted.
//! - **Async**: submit a request carrying a completion callback. The
//!   backend invokes the callback from [`GpuReadback::pump`], which the
//!   scheduler calls at the start of each tick, so callbacks never run while
//!   a tick is in progress.
//!
//! Whether async readback is usable is probed once through
//! [`ReadbackCapabilities::probe`] and then passed to the scheduler.

use std::collections::VecDeque;
use std::fmt;

use reframe_surface::{Surface, SurfaceFormat};
use tracing::{debug, info, trace};

use crate::error::{CaptureError, Result};

/// Readback strategy of one device, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadbackMode {
    /// Copy the previous frame before rendering the next
    Sync,
    /// Non-blocking request with a completion callback
    Async,
}

/// Result of the one-time platform probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadbackCapabilities {
    /// Platform supports non-blocking readback
    pub async_readback: bool,
}

impl ReadbackCapabilities {
    /// Probe a backend once
    pub fn probe<B: GpuReadback + ?Sized>(backend: &B) -> Self {
        let async_readback = backend.supports_async();
        info!("Readback probe: async supported = {}", async_readback);
        Self { async_readback }
    }

    /// Mode new devices use
    ///
    /// Async is chosen only when both the platform and the caller allow it.
    pub fn mode(&self, allow_async: bool) -> ReadbackMode {
        if self.async_readback && allow_async {
            ReadbackMode::Async
        } else {
            ReadbackMode::Sync
        }
    }
}

/// Identity of one async readback request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    /// Raw value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Pixels delivered by a readback, in the source surface's layout
#[derive(Clone, PartialEq, Eq)]
pub struct ReadbackData {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel layout
    pub format: SurfaceFormat,
    /// Tightly packed rows
    pub bytes: Vec<u8>,
}

impl fmt::Debug for ReadbackData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadbackData")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Completion callback of an async request
pub type ReadbackCallback = Box<dyn FnOnce(RequestId, Result<ReadbackData>) + Send>;

/// Platform readback interface
pub trait GpuReadback {
    /// Whether non-blocking requests are supported
    fn supports_async(&self) -> bool;

    /// Copy `source` into `destination` immediately
    ///
    /// Both surfaces must have the same size and layout.
    fn read_sync(&mut self, source: &Surface, destination: &mut Surface) -> Result<()>;

    /// Submit a non-blocking request
    ///
    /// The callback runs from a later [`pump`](Self::pump) with either the
    /// pixels or a transfer error. No timeout applies.
    fn request_async(&mut self, source: &Surface, callback: ReadbackCallback) -> Result<RequestId>;

    /// Deliver completions of requests submitted before this call
    fn pump(&mut self);

    /// Drop a pending request without invoking its callback
    ///
    /// Returns `false` if the request already completed or never existed.
    fn discard(&mut self, id: RequestId) -> bool;
}

struct PendingRead {
    id: RequestId,
    result: Result<ReadbackData>,
    callback: ReadbackCallback,
}

/// CPU-backed readback implementation
///
/// Async requests snapshot the source when submitted and complete on the
/// next [`pump`](GpuReadback::pump). Transfer errors can be injected with
/// [`fail_next`](Self::fail_next).
pub struct SoftwareGpu {
    async_supported: bool,
    next_id: u64,
    pending: VecDeque<PendingRead>,
    failures: usize,
}

impl SoftwareGpu {
    /// Backend supporting both strategies
    pub fn new() -> Self {
        Self {
            async_supported: true,
            next_id: 1,
            pending: VecDeque::new(),
            failures: 0,
        }
    }

    /// Backend reporting no async support
    pub fn sync_only() -> Self {
        Self {
            async_supported: false,
            ..Self::new()
        }
    }

    /// Make the next `count` readbacks report a transfer error
    pub fn fail_next(&mut self, count: usize) {
        self.failures = count;
    }

    /// Number of async requests awaiting a pump
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn take_failure(&mut self) -> bool {
        if self.failures > 0 {
            self.failures -= 1;
            true
        } else {
            false
        }
    }
}

impl Default for SoftwareGpu {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SoftwareGpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareGpu")
            .field("async_supported", &self.async_supported)
            .field("pending", &self.pending.len())
            .field("failures", &self.failures)
            .finish()
    }
}

impl GpuReadback for SoftwareGpu {
    fn supports_async(&self) -> bool {
        self.async_supported
    }

    fn read_sync(&mut self, source: &Surface, destination: &mut Surface) -> Result<()> {
        if self.take_failure() {
            return Err(CaptureError::Transfer("injected sync failure".to_string()));
        }
        destination.copy_from(source)?;
        trace!("Sync readback {} -> {}", source.id(), destination.id());
        Ok(())
    }

    fn request_async(&mut self, source: &Surface, callback: ReadbackCallback) -> Result<RequestId> {
        if !self.async_supported {
            return Err(CaptureError::Transfer(
                "async readback not supported".to_string(),
            ));
        }

        let id = RequestId(self.next_id);
        self.next_id += 1;

        let result = if self.take_failure() {
            Err(CaptureError::Transfer(format!("{} failed", id)))
        } else {
            Ok(ReadbackData {
                width: source.width(),
                height: source.height(),
                format: source.format(),
                bytes: source.data().to_vec(),
            })
        };

        trace!("Queued {} for surface {}", id, source.id());
        self.pending.push_back(PendingRead {
            id,
            result,
            callback,
        });
        Ok(id)
    }

    fn pump(&mut self) {
        let ready: Vec<PendingRead> = self.pending.drain(..).collect();
        for read in ready {
            (read.callback)(read.id, read.result);
        }
    }

    fn discard(&mut self, id: RequestId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|read| read.id != id);
        let discarded = self.pending.len() != before;
        if discarded {
            debug!("Discarded {}", id);
        }
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use reframe_surface::SurfaceAllocator;
    use std::sync::Arc;

    fn target(allocator: &SurfaceAllocator, fill: u8) -> Surface {
        let mut surface = allocator
            .allocate(16, 16, SurfaceFormat::Bgra32)
            .expect("allocate");
        surface.data_mut().fill(fill);
        surface
    }

    #[test]
    fn test_probe_and_mode() {
        let caps = ReadbackCapabilities::probe(&SoftwareGpu::new());
        assert_eq!(caps.mode(true), ReadbackMode::Async);
        assert_eq!(caps.mode(false), ReadbackMode::Sync);

        let caps = ReadbackCapabilities::probe(&SoftwareGpu::sync_only());
        assert_eq!(caps.mode(true), ReadbackMode::Sync);
    }

    #[test]
    fn test_sync_readback() {
        let allocator = SurfaceAllocator::new();
        let source = target(&allocator, 7);
        let mut destination = target(&allocator, 0);

        let mut gpu = SoftwareGpu::new();
        gpu.read_sync(&source, &mut destination).expect("read");
        assert!(destination.data().iter().all(|&b| b == 7));

        gpu.fail_next(1);
        let err = gpu.read_sync(&source, &mut destination).expect_err("injected");
        assert!(matches!(err, CaptureError::Transfer(_)));
    }

    #[test]
    fn test_async_completes_on_pump() {
        let allocator = SurfaceAllocator::new();
        let mut source = target(&allocator, 3);
        let delivered = Arc::new(Mutex::new(Vec::new()));

        let mut gpu = SoftwareGpu::new();
        let sink = Arc::clone(&delivered);
        let id = gpu
            .request_async(
                &source,
                Box::new(move |id, result| {
                    sink.lock().push((id, result));
                }),
            )
            .expect("request");

        // snapshot taken at submission
        source.data_mut().fill(9);
        assert!(delivered.lock().is_empty());
        assert_eq!(gpu.pending(), 1);

        gpu.pump();
        let delivered = delivered.lock();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, id);
        let data = delivered[0].1.as_ref().expect("pixels");
        assert_eq!((data.width, data.height), (16, 16));
        assert!(data.bytes.iter().all(|&b| b == 3));
    }

    #[test]
    fn test_async_error_and_discard() {
        let allocator = SurfaceAllocator::new();
        let source = target(&allocator, 1);
        let errors = Arc::new(Mutex::new(0usize));

        let mut gpu = SoftwareGpu::new();
        gpu.fail_next(1);

        let sink = Arc::clone(&errors);
        gpu.request_async(
            &source,
            Box::new(move |_, result| {
                if result.is_err() {
                    *sink.lock() += 1;
                }
            }),
        )
        .expect("request");

        let ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&ran);
        let discarded = gpu
            .request_async(
                &source,
                Box::new(move |_, _| *flag.lock() = true),
            )
            .expect("request");
        assert!(gpu.discard(discarded));
        assert!(!gpu.discard(discarded));

        gpu.pump();
        assert_eq!(*errors.lock(), 1);
        assert!(!*ran.lock());
        assert_eq!(gpu.pending(), 0);
    }

    #[test]
    fn test_sync_only_rejects_requests() {
        let allocator = SurfaceAllocator::new();
        let source = target(&allocator, 1);
        let mut gpu = SoftwareGpu::sync_only();
        assert!(gpu.request_async(&source, Box::new(|_, _| {})).is_err());
    }
}
