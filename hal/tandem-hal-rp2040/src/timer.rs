//! Monotonic timer over the embassy time driver

use embassy_time::{block_for, Duration, Instant};
use tandem_hal::Timer;

/// Microsecond clock backed by the RP2040 64-bit timer
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RpTimer;

impl Timer for RpTimer {
    fn now_micros(&self) -> u64 {
        Instant::now().as_micros()
    }

    fn delay_micros(&self, us: u32) {
        block_for(Duration::from_micros(us as u64));
    }
}
