//! Hardware watchdog supervision
//!
//! Only the Safety Monitor Task refreshes the watchdog, once per
//! activation. A refresh that comes later than the configured refresh
//! period is reported as [`WatchdogStatus::Late`] so the monitor can warn
//! before the hardware window actually expires.

use tandem_hal::WatchdogTimer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WatchdogConfigError {
    ZeroWindow,
    /// Two refresh periods must fit in the window
    RefreshTooSlow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WatchdogStatus {
    /// Not started yet
    Disarmed,
    Healthy,
    /// Gap since the last refresh exceeded the refresh period
    Late { gap_us: u64 },
}

pub struct WatchdogSupervisor<W: WatchdogTimer> {
    watchdog: W,
    window_us: u32,
    refresh_us: u32,
    last_refresh_us: Option<u64>,
    refreshes: u32,
}

impl<W: WatchdogTimer> WatchdogSupervisor<W> {
    pub fn new(watchdog: W, window_us: u32, refresh_us: u32) -> Result<Self, WatchdogConfigError> {
        if window_us == 0 || refresh_us == 0 {
            return Err(WatchdogConfigError::ZeroWindow);
        }
        if refresh_us.saturating_mul(2) >= window_us {
            return Err(WatchdogConfigError::RefreshTooSlow);
        }
        Ok(Self {
            watchdog,
            window_us,
            refresh_us,
            last_refresh_us: None,
            refreshes: 0,
        })
    }

    /// Arm the hardware watchdog; cannot be undone
    pub fn start(&mut self, now_us: u64) {
        self.watchdog.start(self.window_us);
        self.last_refresh_us = Some(now_us);
        info!("watchdog armed, window {} us", self.window_us);
    }

    pub fn refresh(&mut self, now_us: u64) {
        if self.last_refresh_us.is_none() {
            return;
        }
        self.watchdog.feed();
        self.last_refresh_us = Some(now_us);
        self.refreshes = self.refreshes.wrapping_add(1);
        trace!("watchdog refreshed at {}", now_us);
    }

    /// Health of the refresh cadence, checked before refreshing
    pub fn status(&self, now_us: u64) -> WatchdogStatus {
        match self.last_refresh_us {
            None => WatchdogStatus::Disarmed,
            Some(last) => {
                let gap_us = now_us.saturating_sub(last);
                if gap_us > self.refresh_us as u64 {
                    WatchdogStatus::Late { gap_us }
                } else {
                    WatchdogStatus::Healthy
                }
            }
        }
    }

    /// Whether the previous reset was a watchdog expiry
    pub fn caused_last_reset(&self) -> bool {
        self.watchdog.caused_last_reset()
    }

    pub fn refreshes(&self) -> u32 {
        self.refreshes
    }
}
