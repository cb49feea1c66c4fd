//! Simulated independent watchdog
//!
//! The real watchdog counts down on its own clock. Here the test stands in
//! for that clock by calling [`SimWatchdog::poll`] while advancing virtual
//! time. A timeout fires exactly once until the watchdog is fed again.

use std::sync::{Arc, Mutex};

use tandem_hal::{Timer, WatchdogTimer};

use crate::clock::SimClock;
use crate::trace::{SimTrace, TraceEntry};

#[derive(Debug, Default)]
struct WatchdogState {
    armed: bool,
    window_us: u64,
    last_feed_us: u64,
    expired: bool,
    trips: u32,
    feeds: u32,
    caused_last_reset: bool,
}

#[derive(Debug, Clone)]
pub struct SimWatchdog {
    state: Arc<Mutex<WatchdogState>>,
    clock: SimClock,
    trace: SimTrace,
}

impl SimWatchdog {
    pub fn new(clock: SimClock, trace: SimTrace) -> Self {
        Self {
            state: Arc::new(Mutex::new(WatchdogState::default())),
            clock,
            trace,
        }
    }

    /// Evaluate the countdown at the current virtual time
    ///
    /// Returns `true` only on the poll where a new timeout fires.
    pub fn poll(&self) -> bool {
        let now = self.clock.now_micros();
        let fired = self.with(|s| {
            if !s.armed || s.expired {
                return false;
            }
            if now.saturating_sub(s.last_feed_us) > s.window_us {
                s.expired = true;
                s.trips += 1;
                return true;
            }
            false
        });
        if fired {
            self.trace.record(TraceEntry::WatchdogTrip);
        }
        fired
    }

    /// Number of timeouts fired so far
    pub fn trips(&self) -> u32 {
        self.with(|s| s.trips)
    }

    /// Number of feeds so far
    pub fn feeds(&self) -> u32 {
        self.with(|s| s.feeds)
    }

    pub fn is_armed(&self) -> bool {
        self.with(|s| s.armed)
    }

    /// Pretend the previous boot ended in a watchdog reset
    pub fn set_caused_last_reset(&self, caused: bool) {
        self.with(|s| s.caused_last_reset = caused);
    }

    fn with<R>(&self, f: impl FnOnce(&mut WatchdogState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

impl WatchdogTimer for SimWatchdog {
    fn start(&mut self, window_us: u32) {
        let now = self.clock.now_micros();
        self.with(|s| {
            s.armed = true;
            s.window_us = window_us as u64;
            s.last_feed_us = now;
            s.expired = false;
        });
    }

    fn feed(&mut self) {
        let now = self.clock.now_micros();
        self.with(|s| {
            s.last_feed_us = now;
            s.expired = false;
            s.feeds += 1;
        });
        self.trace.record(TraceEntry::WatchdogFeed);
    }

    fn caused_last_reset(&self) -> bool {
        self.with(|s| s.caused_last_reset)
    }
}
