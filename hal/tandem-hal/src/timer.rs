//! High-resolution monotonic timer

/// Microsecond monotonic clock
///
/// `now_micros` never decreases. `delay_micros` busy-waits and is meant
/// for sub-period hardware settling, never for task pacing.
pub trait Timer {
    /// Microseconds since an arbitrary, fixed epoch
    fn now_micros(&self) -> u64;

    /// Spin for at least `us` microseconds
    fn delay_micros(&self, us: u32);

    /// Microseconds elapsed since `since`
    fn elapsed_since(&self, since: u64) -> u64 {
        self.now_micros().saturating_sub(since)
    }
}

impl<T: Timer + ?Sized> Timer for &T {
    fn now_micros(&self) -> u64 {
        (**self).now_micros()
    }

    fn delay_micros(&self, us: u32) {
        (**self).delay_micros(us)
    }
}
