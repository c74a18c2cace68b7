//! Off-path conversion worker
//!
//! Plane copies for large planar frames can be moved off the tick thread.
//! The worker owns one dedicated thread and receives commands over a
//! channel. A task moves the frame and its target surface to the worker and
//! both come back with the result, so no buffer is ever shared between
//! threads.
//!
//! # Architecture
//!
//! ```text
//!  tick thread                          worker thread
//!  ───────────                          ─────────────
//!  ConversionJob::convert()
//!     └─ submit(task) ──CopyCommand──► copy_i420()
//!  ConversionJob::is_done()                  │
//!     └─ TaskHandle::try_take() ◄─TaskOutput─┘
//! ```
//!
//! Dropping a job with a task in flight waits for that task's output before
//! the surface is released.

use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use reframe_surface::{FrameDescriptor, Surface};
use tracing::{debug, info, trace, warn};

use crate::error::{ConvertError, Result};
use crate::planes::copy_i420;

/// A planar copy moved to the worker
#[derive(Debug)]
pub(crate) struct PlaneCopyTask {
    pub(crate) frame: FrameDescriptor,
    pub(crate) target: Surface,
}

/// Task result with ownership of the frame and surface returned
#[derive(Debug)]
pub(crate) struct TaskOutput {
    pub(crate) frame: FrameDescriptor,
    pub(crate) target: Surface,
    pub(crate) result: Result<()>,
}

struct CopyCommand {
    task: PlaneCopyTask,
    reply: SyncSender<TaskOutput>,
}

/// Outcome of polling a task
#[derive(Debug)]
pub(crate) enum TaskPoll {
    Pending,
    Ready(TaskOutput),
    /// The worker stopped before replying
    Lost,
}

/// Completion side of one submitted task
#[derive(Debug)]
pub(crate) struct TaskHandle {
    rx: Receiver<TaskOutput>,
}

impl TaskHandle {
    /// Check for completion without blocking
    pub(crate) fn try_take(&self) -> TaskPoll {
        match self.rx.try_recv() {
            Ok(output) => TaskPoll::Ready(output),
            Err(TryRecvError::Empty) => TaskPoll::Pending,
            Err(TryRecvError::Disconnected) => TaskPoll::Lost,
        }
    }

    /// Block until the task finishes
    ///
    /// Returns `None` if the worker stopped before replying.
    pub(crate) fn wait(self) -> Option<TaskOutput> {
        self.rx.recv().ok()
    }
}

/// Worker statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Tasks accepted
    pub submitted: u64,
    /// Tasks finished successfully
    pub completed: u64,
    /// Tasks that failed
    pub failed: u64,
    /// Bytes copied into target surfaces
    pub bytes_copied: u64,
}

/// Dedicated conversion thread
///
/// Shared between jobs through an `Arc`; the thread stops when the last
/// reference is dropped, after finishing every queued task.
pub struct ConversionWorker {
    name: String,
    command_tx: Option<Sender<CopyCommand>>,
    thread: Option<JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl ConversionWorker {
    /// Start the worker thread
    ///
    /// # Errors
    ///
    /// [`ConvertError::WorkerUnavailable`] if the thread cannot be spawned.
    pub fn spawn(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let (command_tx, command_rx) = mpsc::channel();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));

        let thread_stats = Arc::clone(&stats);
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_worker(command_rx, thread_stats))
            .map_err(|e| ConvertError::WorkerUnavailable(e.to_string()))?;

        info!("Conversion worker '{}' started", name);

        Ok(Self {
            name,
            command_tx: Some(command_tx),
            thread: Some(thread),
            stats,
        })
    }

    /// Worker thread name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current statistics
    pub fn stats(&self) -> WorkerStats {
        *self.stats.lock()
    }

    /// Queue a planar copy
    ///
    /// If the worker is gone the task is handed back untouched.
    pub(crate) fn submit(&self, task: PlaneCopyTask) -> std::result::Result<TaskHandle, PlaneCopyTask> {
        let Some(command_tx) = self.command_tx.as_ref() else {
            return Err(task);
        };
        let (reply, rx) = mpsc::sync_channel(1);
        match command_tx.send(CopyCommand { task, reply }) {
            Ok(()) => {
                self.stats.lock().submitted += 1;
                Ok(TaskHandle { rx })
            }
            Err(mpsc::SendError(command)) => Err(command.task),
        }
    }
}

impl std::fmt::Debug for ConversionWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionWorker")
            .field("name", &self.name)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Drop for ConversionWorker {
    fn drop(&mut self) {
        // closing the channel ends the loop once the queue is drained
        drop(self.command_tx.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Conversion worker '{}' panicked", self.name);
            }
        }
        debug!("Conversion worker '{}' stopped", self.name);
    }
}

fn run_worker(commands: Receiver<CopyCommand>, stats: Arc<Mutex<WorkerStats>>) {
    while let Ok(CopyCommand { task, reply }) = commands.recv() {
        let PlaneCopyTask { frame, mut target } = task;
        let result = frame
            .bytes()
            .map_err(ConvertError::from)
            .and_then(|src| copy_i420(src, frame.width(), frame.height(), target.data_mut()));

        {
            let mut stats = stats.lock();
            if result.is_ok() {
                stats.completed += 1;
                stats.bytes_copied += target.byte_len() as u64;
            } else {
                stats.failed += 1;
            }
        }
        trace!("Worker copied planes into surface {}", target.id());

        let output = TaskOutput {
            frame,
            target,
            result,
        };
        if let Err(mpsc::SendError(orphan)) = reply.send(output) {
            // receiver dropped without draining
            orphan.frame.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planes::LumaChromaLayout;
    use reframe_surface::{FrameFormat, SurfaceAllocator, SurfaceFormat};

    fn task(allocator: &SurfaceAllocator, w: u32, h: u32) -> PlaneCopyTask {
        let len = FrameFormat::Planar420.buffer_len(w, h).expect("len");
        let frame = FrameDescriptor::planar420(w, h, vec![42; len]).expect("frame");
        let (sw, sh) = LumaChromaLayout::new(w, h).surface_extent().expect("extent");
        let target = allocator.allocate(sw, sh, SurfaceFormat::R8).expect("allocate");
        PlaneCopyTask { frame, target }
    }

    #[test]
    fn test_worker_round_trip() {
        let allocator = SurfaceAllocator::new();
        let worker = ConversionWorker::spawn("test-convert").expect("spawn");

        let handle = worker.submit(task(&allocator, 16, 16)).expect("submit");
        let output = handle.wait().expect("output");

        assert!(output.result.is_ok());
        assert!(output.target.data()[..256].iter().all(|&b| b == 42));
        output.frame.dispose();

        let stats = worker.stats();
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.completed, 1);
    }

    #[test]
    fn test_worker_reports_short_target() {
        let allocator = SurfaceAllocator::new();
        let worker = ConversionWorker::spawn("test-convert").expect("spawn");

        let mut bad = task(&allocator, 16, 16);
        bad.target = allocator.allocate(4, 4, SurfaceFormat::R8).expect("allocate");

        let output = worker.submit(bad).expect("submit").wait().expect("output");
        assert!(matches!(
            output.result,
            Err(ConvertError::PlaneOutOfBounds { .. })
        ));
        output.frame.dispose();
        assert_eq!(worker.stats().failed, 1);
    }

    #[test]
    fn test_worker_drop_joins_thread() {
        let worker = ConversionWorker::spawn("test-convert").expect("spawn");
        assert_eq!(worker.name(), "test-convert");
        drop(worker);
    }
}
