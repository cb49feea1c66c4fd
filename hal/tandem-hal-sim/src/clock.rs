//! Virtual microsecond clock

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tandem_hal::Timer;

/// Shared virtual clock
///
/// Cloning yields a handle to the same time base.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now_us: Arc<AtomicU64>,
}

impl SimClock {
    /// Create a clock at t = 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock at the given time
    pub fn starting_at(us: u64) -> Self {
        let clock = Self::new();
        clock.set(us);
        clock
    }

    /// Move time forward
    pub fn advance(&self, us: u64) {
        self.now_us.fetch_add(us, Ordering::SeqCst);
    }

    /// Jump to an absolute time; never moves backwards
    pub fn set(&self, us: u64) {
        self.now_us.fetch_max(us, Ordering::SeqCst);
    }
}

impl Timer for SimClock {
    fn now_micros(&self) -> u64 {
        self.now_us.load(Ordering::SeqCst)
    }

    /// Delays are charged to virtual time instead of spinning
    fn delay_micros(&self, us: u32) {
        self.advance(us as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic() {
        let clock = SimClock::starting_at(1_000);
        clock.set(500);
        assert_eq!(clock.now_micros(), 1_000);
        clock.delay_micros(20);
        assert_eq!(clock.now_micros(), 1_020);
        assert_eq!(clock.elapsed_since(1_000), 20);
    }
}
