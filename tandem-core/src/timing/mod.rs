//! Timing service
//!
//! Periodic tasks wake on absolute deadlines: each deadline is the previous
//! one plus the period, never "now plus the period", so jitter in one
//! activation does not accumulate into drift. When an activation runs so
//! late that whole periods were missed, the schedule skips them and counts
//! them instead of bursting to catch up.

use embassy_time::{Duration, Instant};
use tandem_hal::Timer;

/// Absolute-deadline periodic schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeriodicSchedule {
    period_us: u64,
    next_us: u64,
    missed: u32,
}

impl PeriodicSchedule {
    /// First deadline is one period after `start_us`
    pub const fn new(period_us: u32, start_us: u64) -> Self {
        Self {
            period_us: period_us as u64,
            next_us: start_us + period_us as u64,
            missed: 0,
        }
    }

    /// Deadline of the next activation
    pub fn deadline(&self) -> u64 {
        self.next_us
    }

    pub fn period_us(&self) -> u64 {
        self.period_us
    }

    /// Total periods skipped so far
    pub fn missed(&self) -> u32 {
        self.missed
    }

    /// Move to the following deadline after an activation completed at `now_us`
    ///
    /// Returns the number of periods skipped because `now_us` was already
    /// past them.
    pub fn advance(&mut self, now_us: u64) -> u32 {
        self.next_us += self.period_us;
        if self.period_us == 0 || self.next_us > now_us {
            return 0;
        }
        let behind = ((now_us - self.next_us) / self.period_us + 1) as u32;
        self.next_us += behind as u64 * self.period_us;
        self.missed = self.missed.saturating_add(behind);
        behind
    }
}

/// Fraction of a period an activation may use before it counts as an overrun
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ExecutionBudget {
    warn_us: u64,
}

impl ExecutionBudget {
    pub fn new(period_us: u32, warn_percent: u8) -> Self {
        Self {
            warn_us: period_us as u64 * warn_percent.min(100) as u64 / 100,
        }
    }

    pub fn warn_us(&self) -> u64 {
        self.warn_us
    }

    pub fn exceeded(&self, elapsed_us: u64) -> bool {
        elapsed_us > self.warn_us
    }
}

/// Elapsed-time measurement on a HAB timer
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started_us: u64,
}

impl Stopwatch {
    pub fn start<T: Timer>(timer: &T) -> Self {
        Self {
            started_us: timer.now_micros(),
        }
    }

    pub fn started_us(&self) -> u64 {
        self.started_us
    }

    pub fn elapsed_us<T: Timer>(&self, timer: &T) -> u64 {
        timer.elapsed_since(self.started_us)
    }
}

/// Block the calling task until the absolute deadline
pub async fn sleep_until(deadline_us: u64) {
    embassy_time::Timer::at(Instant::from_micros(deadline_us)).await
}

/// Convert a configured microsecond timeout
pub fn micros(us: u32) -> Duration {
    Duration::from_micros(us as u64)
}
