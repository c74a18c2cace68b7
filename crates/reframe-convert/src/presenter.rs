//! Frame presenter
//!
//! Per-view convenience that owns one job per converter kind and the
//! pipeline-owned display surface. Frames go in, display-ready surfaces and
//! the transform to show them with come out.
//!
//! # Examples
//!
//! ```rust
//! use reframe_convert::{ConverterConfig, FramePresenter};
//! use reframe_surface::{FrameDescriptor, SurfaceAllocator};
//!
//! let mut presenter = FramePresenter::new(ConverterConfig::default(), SurfaceAllocator::new())?;
//!
//! let frame = FrameDescriptor::packed32(4, 2, vec![0; 32])?;
//! let presented = presenter.present(frame)?.expect("inline conversion finishes at once");
//! assert!(presented.new_surface);
//! assert!(presented.transform.mirror);
//! assert_eq!(presenter.surface().map(|s| s.extent()), Some((4, 2)));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use reframe_surface::{
    FrameDescriptor, FrameMeta, Surface, SurfaceAllocator, SurfaceId, SurfaceSlot,
};
use tracing::{debug, info, trace, warn};

use crate::config::{ConverterConfig, Dispatch};
use crate::error::{ConvertError, Result};
use crate::job::ConversionJob;
use crate::registry::{ConverterKind, ConverterRegistry};
use crate::transform::DisplayTransform;
use crate::worker::{ConversionWorker, WorkerStats};

/// A finished frame ready for the rendering layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presented {
    /// The display surface was (re)created; references to the old one are
    /// stale
    pub new_surface: bool,

    /// Metadata of the presented frame
    pub meta: FrameMeta,

    /// How to orient the surface
    pub transform: DisplayTransform,

    /// Material required by the surface layout, `None` for plain RGBA
    pub material_tag: Option<&'static str>,
}

#[derive(Debug)]
struct Active {
    kind: ConverterKind,
    meta: FrameMeta,
}

/// Converts frames into one display surface
#[derive(Debug)]
pub struct FramePresenter {
    registry: ConverterRegistry,
    allocator: SurfaceAllocator,
    worker: Option<Arc<ConversionWorker>>,
    jobs: HashMap<ConverterKind, ConversionJob>,
    display: SurfaceSlot,
    active: Option<Active>,
    last_surface: Option<SurfaceId>,
    presented: u64,
    dropped: u64,
}

impl FramePresenter {
    /// Create a presenter
    ///
    /// Starts the conversion worker when `config.dispatch` is
    /// [`Dispatch::Worker`].
    ///
    /// # Errors
    ///
    /// [`ConvertError::InvalidConfig`] for an invalid configuration,
    /// [`ConvertError::WorkerUnavailable`] if the worker cannot start.
    pub fn new(config: ConverterConfig, allocator: SurfaceAllocator) -> Result<Self> {
        if let Err(issues) = config.validate() {
            return Err(ConvertError::InvalidConfig(issues.join(", ")));
        }

        info!("Creating FramePresenter with config: {:?}", config);

        let worker = match config.dispatch {
            Dispatch::Worker => Some(Arc::new(ConversionWorker::spawn(
                config.worker_name.clone(),
            )?)),
            Dispatch::Inline => None,
        };

        Ok(Self {
            registry: ConverterRegistry::with_defaults(&config),
            display: SurfaceSlot::new(allocator.clone()),
            allocator,
            worker,
            jobs: HashMap::new(),
            active: None,
            last_surface: None,
            presented: 0,
            dropped: 0,
        })
    }

    /// Converter lookup table, for explicit registration
    pub fn registry_mut(&mut self) -> &mut ConverterRegistry {
        &mut self.registry
    }

    /// Start converting a frame
    ///
    /// Returns the presented frame if the conversion finished at once, or
    /// `None` if it is still running (see [`poll`](Self::poll)). A frame
    /// that arrives while a conversion is running is dropped and disposed.
    ///
    /// # Errors
    ///
    /// [`ConvertError::NoConverter`] if no converter accepts the frame on
    /// this platform, or any error of the job. The frame is disposed in
    /// every case.
    pub fn present(&mut self, frame: FrameDescriptor) -> Result<Option<Presented>> {
        if self.active.is_some() {
            trace!("Conversion in progress, dropping {:?} frame", frame.format());
            self.dropped += 1;
            frame.dispose();
            return Ok(None);
        }

        let Some(kind) = self.registry.select(&frame) else {
            let format = frame.format();
            warn!("No converter for {:?} frame from {}", format, frame.source());
            frame.dispose();
            return Err(ConvertError::NoConverter(format));
        };

        let meta = FrameMeta::of(&frame);
        let job = self.jobs.entry(kind).or_insert_with(|| {
            let job = ConversionJob::new(kind, self.allocator.clone())
                .with_capabilities(*self.registry.capabilities());
            match self.worker.as_ref() {
                Some(worker) => job.with_worker(Arc::clone(worker)),
                None => job,
            }
        });

        let mut surface = self.display.lend();
        if let Err(err) = job.allocate(frame, &mut surface) {
            if let Some(surface) = surface {
                self.display.put(surface);
            }
            return Err(err);
        }
        job.convert()?;

        self.active = Some(Active { kind, meta });
        self.poll()
    }

    /// Finish a running conversion if it is done
    ///
    /// Returns `None` while nothing is running or the conversion is still in
    /// progress.
    pub fn poll(&mut self) -> Result<Option<Presented>> {
        let Some(active) = self.active.as_ref() else {
            return Ok(None);
        };
        let kind = active.kind;
        let Some(job) = self.jobs.get_mut(&kind) else {
            self.active = None;
            return Ok(None);
        };
        if !job.is_done() {
            return Ok(None);
        }

        let meta = active.meta;
        self.active = None;
        let surface = job.complete()?;
        let material_tag = job.material_tag();

        let new_surface = self.last_surface != Some(surface.id());
        if new_surface {
            debug!(
                "Display surface is now {} ({}x{} {:?})",
                surface.id(),
                surface.width(),
                surface.height(),
                surface.format()
            );
        }
        self.last_surface = Some(surface.id());
        self.display.put(surface);
        self.presented += 1;

        Ok(Some(Presented {
            new_surface,
            meta,
            transform: DisplayTransform::for_frame(&meta),
            material_tag,
        }))
    }

    /// Whether a conversion is running
    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// Current display surface
    pub fn surface(&self) -> Option<&Surface> {
        self.display.get()
    }

    /// Take ownership of the current display surface
    ///
    /// The presenter never touches the returned surface again; the next
    /// frame gets a fresh one.
    pub fn take_surface(&mut self) -> Option<Surface> {
        self.display.take_ownership()
    }

    /// Frames presented and frames dropped while busy
    pub fn counts(&self) -> (u64, u64) {
        (self.presented, self.dropped)
    }

    /// Conversion worker statistics, if a worker runs
    pub fn worker_stats(&self) -> Option<WorkerStats> {
        self.worker.as_ref().map(|w| w.stats())
    }
}

impl Drop for FramePresenter {
    fn drop(&mut self) {
        // jobs drain in-flight work before the worker is released
        self.jobs.clear();
    }
}
