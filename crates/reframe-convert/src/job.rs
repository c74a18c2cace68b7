//! Conversion jobs
//!
//! A [`ConversionJob`] converts one frame at a time into a display surface
//! and keeps its scratch surfaces between frames.
//!
//! # State Machine
//!
//! ```text
//!            allocate()            convert()
//!   Idle ───────────────► Allocated ─────────► Done ──┐
//!    ▲                        │                 ▲     │
//!    │                        │ (worker)        │     │ complete()
//!    │                        ▼     is_done()   │     │
//!    │                    Converting ───────────┘     │
//!    └────────────────────────────────────────────────┘
//! ```
//!
//! Calling an operation in the wrong state returns a `Programming`-class
//! error immediately. `convert()` is a no-op while `Converting` or `Done`.
//!
//! # Ownership
//!
//! `allocate()` takes the frame and the caller's surface. The surface is
//! reused if it already has the right size and layout; otherwise it is
//! destroyed and replaced. `complete()` disposes the frame and hands the
//! finished surface back. If `allocate()` fails the frame is disposed and
//! the caller's surface stays where it was.
//!
//! # Examples
//!
//! ```rust
//! use reframe_convert::{ConversionJob, ConverterKind};
//! use reframe_surface::{FrameDescriptor, SurfaceAllocator};
//!
//! let allocator = SurfaceAllocator::new();
//! let mut job = ConversionJob::new(ConverterKind::Packed32, allocator);
//!
//! let frame = FrameDescriptor::packed32(4, 2, vec![255; 32])?;
//! let mut surface = None;
//! job.allocate(frame, &mut surface)?;
//! job.convert()?;
//! assert!(job.is_done());
//!
//! let surface = job.complete()?;
//! assert_eq!(surface.extent(), (4, 2));
//! # Ok::<(), reframe_convert::ConvertError>(())
//! ```

use std::sync::Arc;

use reframe_surface::{FrameDescriptor, Surface, SurfaceAllocator, SurfaceError, SurfaceFormat};
use tracing::{debug, error, trace, warn};

use crate::config::PlatformCapabilities;
use crate::error::{ConvertError, Result};
use crate::planes::copy_i420;
use crate::registry::ConverterKind;
use crate::worker::{ConversionWorker, PlaneCopyTask, TaskOutput, TaskPoll};
use crate::yuv::luma_chroma_to_rgba;

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// No frame bound
    Idle,
    /// Frame and output surface bound
    Allocated,
    /// Work submitted and not finished yet
    Converting,
    /// Output ready for `complete()`
    Done,
}

struct Binding {
    frame: Option<FrameDescriptor>,
    target: Option<Surface>,
    width: u32,
    height: u32,
}

impl Binding {
    fn take_parts(&mut self) -> Option<(FrameDescriptor, Surface)> {
        match (self.frame.take(), self.target.take()) {
            (Some(frame), Some(target)) => Some((frame, target)),
            (frame, target) => {
                self.frame = frame;
                self.target = target;
                None
            }
        }
    }
}

/// Scratch state of the planar to RGBA strategy
struct Composite {
    planes: Box<ConversionJob>,
    plane_surface: Option<Surface>,
    blit_target: Option<Surface>,
}

/// One conversion strategy bound to at most one frame at a time
pub struct ConversionJob {
    kind: ConverterKind,
    allocator: SurfaceAllocator,
    capabilities: PlatformCapabilities,
    worker: Option<Arc<ConversionWorker>>,
    state: JobState,
    binding: Option<Binding>,
    in_flight: Option<crate::worker::TaskHandle>,
    failure: Option<ConvertError>,
    composite: Option<Composite>,
}

impl ConversionJob {
    /// Create an idle job that converts inline
    pub fn new(kind: ConverterKind, allocator: SurfaceAllocator) -> Self {
        let composite = (kind == ConverterKind::PlanarRgba).then(|| Composite {
            planes: Box::new(Self::new(ConverterKind::LumaChroma, allocator.clone())),
            plane_surface: None,
            blit_target: None,
        });

        Self {
            kind,
            allocator,
            capabilities: PlatformCapabilities::default(),
            worker: None,
            state: JobState::Idle,
            binding: None,
            in_flight: None,
            failure: None,
            composite,
        }
    }

    /// Use these platform capabilities for `can_convert`
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: PlatformCapabilities) -> Self {
        self.capabilities = capabilities;
        if let Some(composite) = self.composite.as_mut() {
            composite.planes.capabilities = capabilities;
        }
        self
    }

    /// Run planar copies on `worker` instead of inline
    ///
    /// Only planar strategies use the worker; the others finish inline.
    #[must_use]
    pub fn with_worker(mut self, worker: Arc<ConversionWorker>) -> Self {
        match self.kind {
            ConverterKind::LumaChroma => self.worker = Some(worker),
            ConverterKind::PlanarRgba => {
                if let Some(composite) = self.composite.as_mut() {
                    composite.planes.worker = Some(worker);
                }
            }
            ConverterKind::Packed32 | ConverterKind::External => {}
        }
        self
    }

    /// Strategy of this job
    pub fn kind(&self) -> ConverterKind {
        self.kind
    }

    /// Current state
    pub fn state(&self) -> JobState {
        self.state
    }

    /// Material needed to display this job's output
    pub fn material_tag(&self) -> Option<&'static str> {
        self.kind.material_tag()
    }

    /// Whether this job can convert `frame` on this platform
    pub fn can_convert(&self, frame: &FrameDescriptor) -> bool {
        self.kind.can_convert(frame, &self.capabilities)
    }

    /// Bind a frame and make `surface` fit its output
    ///
    /// On success the surface moves into the job and comes back from
    /// [`complete`](Self::complete). On failure the frame is disposed and
    /// `surface` is left as it was (or empty, if reallocation failed).
    ///
    /// # Errors
    ///
    /// - `Programming`: job not idle, or the frame cannot be converted by
    ///   this strategy
    /// - `Configuration`: zero-sized frame
    /// - `ResourceExhaustion`: the output surface cannot be allocated
    pub fn allocate(&mut self, frame: FrameDescriptor, surface: &mut Option<Surface>) -> Result<()> {
        if self.state != JobState::Idle {
            frame.dispose();
            return Err(self.fail_fast(ConvertError::invalid_state("allocate", self.state)));
        }
        if !self.can_convert(&frame) {
            let err = ConvertError::Unsupported {
                kind: self.kind,
                format: frame.format(),
            };
            frame.dispose();
            return Err(self.fail_fast(err));
        }

        let (width, height) = (frame.width(), frame.height());
        if let Err(err) = self.prepare(width, height, surface) {
            debug!(
                "{:?} job rejected {}x{} frame: {}",
                self.kind, width, height, err
            );
            frame.dispose();
            return Err(err);
        }

        let frame = match self.composite.as_mut() {
            Some(composite) => {
                composite
                    .planes
                    .allocate(frame, &mut composite.plane_surface)?;
                None
            }
            None => Some(frame),
        };

        self.binding = Some(Binding {
            frame,
            target: surface.take(),
            width,
            height,
        });
        self.state = JobState::Allocated;
        trace!("{:?} job allocated for {}x{} frame", self.kind, width, height);
        Ok(())
    }

    fn prepare(&mut self, width: u32, height: u32, surface: &mut Option<Surface>) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(SurfaceError::InvalidDimensions { width, height }.into());
        }

        match (self.kind.surface_extent(width, height), self.kind.output_format()) {
            (Some((w, h)), Some(format)) => {
                self.allocator.ensure_surface(w, h, format, surface)?;
            }
            (None, _) => return Err(SurfaceError::InvalidDimensions { width, height }.into()),
            (Some(_), None) => {
                // platform surfaces cannot be reused; the frame brings a new one
                if let Some(old) = surface.take() {
                    self.allocator.destroy(old);
                }
            }
        }

        if let Some(composite) = self.composite.as_mut() {
            self.allocator.ensure_surface(
                width,
                height,
                SurfaceFormat::Rgba32,
                &mut composite.blit_target,
            )?;
        }
        Ok(())
    }

    /// Run the conversion
    ///
    /// Inline strategies finish here. With a worker the job moves to
    /// `Converting` and [`is_done`](Self::is_done) reports completion. Calling
    /// again while `Converting` or `Done` does nothing.
    ///
    /// If the conversion fails the frame is disposed, the output surface is
    /// destroyed and the job returns to `Idle`.
    pub fn convert(&mut self) -> Result<()> {
        match self.state {
            JobState::Idle => {
                return Err(self.fail_fast(ConvertError::invalid_state("convert", self.state)));
            }
            JobState::Converting | JobState::Done => return Ok(()),
            JobState::Allocated => {}
        }

        match self.run() {
            Ok(pending) => {
                self.state = if pending {
                    JobState::Converting
                } else {
                    JobState::Done
                };
                trace!("{:?} job is {:?}", self.kind, self.state);
                Ok(())
            }
            Err(err) => {
                warn!("{:?} conversion failed: {}", self.kind, err);
                if let Some(target) = self.abort() {
                    self.allocator.destroy(target);
                }
                Err(err)
            }
        }
    }

    /// Returns `true` if work is still pending
    fn run(&mut self) -> Result<bool> {
        if let Some(composite) = self.composite.as_mut() {
            composite.planes.convert()?;
            return Ok(composite.planes.state == JobState::Converting);
        }

        let disposed = || ConvertError::from(SurfaceError::Disposed);
        let binding = self
            .binding
            .as_mut()
            .ok_or(ConvertError::invalid_state("convert", self.state))?;

        match self.kind {
            ConverterKind::Packed32 => {
                let (Some(frame), Some(target)) = (binding.frame.as_ref(), binding.target.as_mut())
                else {
                    return Err(disposed());
                };
                target.load_raw(frame.bytes()?)?;
                Ok(false)
            }
            ConverterKind::External => {
                let frame = binding.frame.as_mut().ok_or_else(disposed)?;
                let surface = frame.take_surface().ok_or_else(disposed)?;
                debug!("Took ownership of external surface {}", surface.id());
                binding.target = Some(surface);
                Ok(false)
            }
            ConverterKind::LumaChroma => match self.worker.as_ref() {
                Some(worker) => {
                    let (frame, target) = binding.take_parts().ok_or_else(disposed)?;
                    match worker.submit(PlaneCopyTask { frame, target }) {
                        Ok(handle) => {
                            self.in_flight = Some(handle);
                            Ok(true)
                        }
                        Err(task) => {
                            binding.frame = Some(task.frame);
                            binding.target = Some(task.target);
                            Err(ConvertError::WorkerLost)
                        }
                    }
                }
                None => {
                    let (Some(frame), Some(target)) =
                        (binding.frame.as_ref(), binding.target.as_mut())
                    else {
                        return Err(disposed());
                    };
                    copy_i420(frame.bytes()?, binding.width, binding.height, target.data_mut())?;
                    Ok(false)
                }
            },
            ConverterKind::PlanarRgba => Err(ConvertError::invalid_state("convert", self.state)),
        }
    }

    /// Whether the output is ready
    ///
    /// Polls the worker without blocking.
    pub fn is_done(&mut self) -> bool {
        if self.state == JobState::Converting {
            self.poll();
        }
        self.state == JobState::Done
    }

    fn poll(&mut self) {
        if let Some(composite) = self.composite.as_mut() {
            if composite.planes.is_done() {
                self.state = JobState::Done;
            }
            return;
        }

        let Some(handle) = self.in_flight.as_ref() else {
            self.state = JobState::Done;
            return;
        };
        match handle.try_take() {
            TaskPoll::Pending => {}
            TaskPoll::Ready(output) => {
                self.in_flight = None;
                self.restore(output);
                self.state = JobState::Done;
            }
            TaskPoll::Lost => {
                self.in_flight = None;
                self.failure = Some(ConvertError::WorkerLost);
                self.state = JobState::Done;
            }
        }
    }

    fn restore(&mut self, output: TaskOutput) {
        if let Err(err) = output.result {
            self.failure = Some(err);
        }
        match self.binding.as_mut() {
            Some(binding) => {
                binding.frame = Some(output.frame);
                binding.target = Some(output.target);
            }
            None => output.frame.dispose(),
        }
    }

    /// Dispose the frame and return the finished surface
    ///
    /// The job is `Idle` afterwards, whether or not the conversion
    /// succeeded.
    ///
    /// # Errors
    ///
    /// - `Programming` if the job is not done
    /// - the worker's error if the off-path copy failed
    pub fn complete(&mut self) -> Result<Surface> {
        if !self.is_done() {
            return Err(self.fail_fast(ConvertError::invalid_state("complete", self.state)));
        }

        self.state = JobState::Idle;
        let Some(binding) = self.binding.take() else {
            return Err(SurfaceError::Disposed.into());
        };
        if let Some(frame) = binding.frame {
            frame.dispose();
        }

        if let Some(err) = self.failure.take() {
            warn!("{:?} conversion failed: {}", self.kind, err);
            if let Some(target) = binding.target {
                self.allocator.destroy(target);
            }
            return Err(err);
        }

        let target = match self.composite.as_mut() {
            Some(composite) => {
                finish_composite(composite, binding.width, binding.height, binding.target)?
            }
            None => binding.target.ok_or(SurfaceError::Disposed)?,
        };

        trace!(
            "{:?} job completed into surface {}",
            self.kind,
            target.id()
        );
        Ok(target)
    }

    /// Drop the bound frame and return the job to `Idle`
    ///
    /// Waits for any in-flight worker task first. Returns the output surface
    /// if one was bound; the caller decides whether to keep or destroy it.
    pub fn abort(&mut self) -> Option<Surface> {
        if let Some(handle) = self.in_flight.take() {
            debug!("Draining in-flight {:?} conversion", self.kind);
            if let Some(output) = handle.wait() {
                self.restore(output);
            }
        }
        if let Some(composite) = self.composite.as_mut() {
            if let Some(planes) = composite.planes.abort() {
                composite.plane_surface = Some(planes);
            }
        }

        self.failure = None;
        self.state = JobState::Idle;
        let binding = self.binding.take()?;
        if let Some(frame) = binding.frame {
            frame.dispose();
        }
        binding.target
    }

    fn fail_fast(&self, err: ConvertError) -> ConvertError {
        error!("{:?} conversion job: {}", self.kind, err);
        err
    }
}

/// Blit the finished planes into the scratch target and copy it out
fn finish_composite(
    composite: &mut Composite,
    width: u32,
    height: u32,
    target: Option<Surface>,
) -> Result<Surface> {
    let planes = composite.planes.complete()?;
    let blit = composite
        .blit_target
        .as_mut()
        .ok_or(ConvertError::from(SurfaceError::Disposed))?;

    let blitted = luma_chroma_to_rgba(&planes, width, height, blit);
    composite.plane_surface = Some(planes);
    blitted?;

    let mut target = target.ok_or(SurfaceError::Disposed)?;
    target.copy_from(blit)?;
    Ok(target)
}

impl std::fmt::Debug for ConversionJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionJob")
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("worker", &self.worker.as_ref().map(|w| w.name().to_string()))
            .finish_non_exhaustive()
    }
}

impl Drop for ConversionJob {
    fn drop(&mut self) {
        if let Some(target) = self.abort() {
            self.allocator.destroy(target);
        }
    }
}
