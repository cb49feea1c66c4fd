//! RP2040 hardware watchdog

use embassy_rp::peripherals::WATCHDOG;
use embassy_rp::watchdog::{ResetReason, Watchdog};
use embassy_rp::Peri;
use embassy_time::Duration;
use tandem_hal::WatchdogTimer;

/// Hardware watchdog; a missed feed resets the chip
pub struct RpWatchdog {
    inner: Watchdog,
    timed_out: bool,
}

impl RpWatchdog {
    /// Take the watchdog and record why the chip last reset
    ///
    /// The countdown pauses while a debugger halts the core.
    pub fn new(watchdog: Peri<'static, WATCHDOG>) -> Self {
        let mut inner = Watchdog::new(watchdog);
        inner.pause_on_debug(true);
        let timed_out = matches!(inner.reset_reason(), Some(ResetReason::TimedOut));
        Self { inner, timed_out }
    }
}

impl WatchdogTimer for RpWatchdog {
    fn start(&mut self, window_us: u32) {
        #[cfg(feature = "defmt")]
        defmt::info!("watchdog armed, window {} us", window_us);
        self.inner.start(Duration::from_micros(window_us as u64));
    }

    fn feed(&mut self) {
        self.inner.feed();
    }

    fn caused_last_reset(&self) -> bool {
        self.timed_out
    }
}
