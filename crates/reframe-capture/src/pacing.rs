//! Frame pacing
//!
//! A device emits frames at its configured rate regardless of how often the
//! host ticks. Elapsed host time is accumulated; once the accumulator
//! reaches one frame interval, the interval is subtracted and one capture
//! happens. At most one capture happens per tick, even after a long stall.

use std::time::Duration;

/// Accumulator deciding which ticks capture a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacingClock {
    interval: Duration,
    accumulated: Duration,
}

impl PacingClock {
    /// Clock for `fps` frames per second (zero is treated as one)
    pub fn new(fps: u32) -> Self {
        Self::with_interval(Duration::from_secs(1) / fps.max(1))
    }

    /// Clock with an explicit frame interval
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            accumulated: Duration::ZERO,
        }
    }

    /// Add elapsed host time; returns `true` if this tick captures
    pub fn tick(&mut self, elapsed: Duration) -> bool {
        self.accumulated = self.accumulated.saturating_add(elapsed);
        if self.accumulated >= self.interval {
            self.accumulated -= self.interval;
            true
        } else {
            false
        }
    }

    /// Time between two captures
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time accumulated towards the next capture
    pub fn accumulated(&self) -> Duration {
        self.accumulated
    }

    /// Change the rate and start accumulating from zero
    pub fn reset(&mut self, fps: u32) {
        *self = Self::new(fps);
    }
}
