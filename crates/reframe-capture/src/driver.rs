//! Async tick driver
//!
//! Runs a [`CaptureScheduler`] from a tokio interval, measuring the real
//! time between ticks and handing it to the pacing clocks.

use std::time::Duration;

use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::debug;

use crate::error::Result;
use crate::readback::GpuReadback;
use crate::scheduler::CaptureScheduler;
use crate::video_input::VideoInput;

/// Tick `scheduler` every `period`, `ticks` times
///
/// Late ticks are delayed rather than burst, the pacing clocks absorb the
/// extra elapsed time. Returns the total number of frames delivered.
pub async fn drive<B, V>(
    scheduler: &mut CaptureScheduler<B, V>,
    period: Duration,
    ticks: u64,
) -> Result<usize>
where
    B: GpuReadback,
    V: VideoInput,
{
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last = Instant::now();
    let mut delivered = 0;
    for _ in 0..ticks {
        let now = timer.tick().await;
        delivered += scheduler.tick(now.saturating_duration_since(last))?;
        last = now;
    }

    debug!("Driver finished {} ticks, {} frames delivered", ticks, delivered);
    Ok(delivered)
}
