//! Independent watchdog timer
//!
//! The watchdog runs from its own clock. If it is not fed within the
//! configured window it forces the platform into its reset path without
//! any help from software.

/// Independent hardware timeout
pub trait WatchdogTimer {
    /// Arm the watchdog with the given window
    fn start(&mut self, window_us: u32);

    /// Restart the countdown
    fn feed(&mut self);

    /// Check if the last reset was caused by this watchdog
    fn caused_last_reset(&self) -> bool;
}
