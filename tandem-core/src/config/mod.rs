//! Configuration types
//!
//! The kernel treats configuration as an immutable input: it is validated
//! once at init and never mutated afterwards.

pub mod types;

pub use types::*;

/// Configuration rejected by [`SystemConfig::validate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// `min >= max` or negative hard margin on the given motor
    InvalidLimits { motor: u8 },
    /// Two tasks share a priority
    DuplicatePriority,
    /// Safety Monitor must outrank Motor Control
    MonitorPriorityTooLow,
    /// Safety Monitor period must be shorter than Motor Control's
    MonitorPeriodTooLong,
    /// Watchdog refresh must be under half the window
    WatchdogRefreshTooSlow,
    /// A task period or stack budget is zero
    ZeroPeriod,
    /// A timeout is zero
    ZeroTimeout,
    /// Overrun warning percentage outside 1..=100
    InvalidOverrunPercent,
    /// Same bus device used twice
    DuplicateDevice,
    /// Binary blob could not be decoded
    Decode,
}

impl SystemConfig {
    /// Check every cross-field constraint
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, l) in self.limits.iter().enumerate() {
            if l.min >= l.max || l.hard_margin < 0 {
                return Err(ConfigError::InvalidLimits { motor: i as u8 });
            }
        }

        let tasks = self.tasks.all();
        for (i, a) in tasks.iter().enumerate() {
            if a.period_us == 0 || a.stack_bytes == 0 {
                return Err(ConfigError::ZeroPeriod);
            }
            if tasks[i + 1..].iter().any(|b| b.priority == a.priority) {
                return Err(ConfigError::DuplicatePriority);
            }
        }
        if self.tasks.safety_monitor.priority <= self.tasks.motor_control.priority {
            return Err(ConfigError::MonitorPriorityTooLow);
        }
        if self.tasks.safety_monitor.period_us >= self.tasks.motor_control.period_us {
            return Err(ConfigError::MonitorPeriodTooLong);
        }

        let t = &self.timeouts;
        let all = [
            t.warning_timeout_us,
            t.watchdog_window_us,
            t.watchdog_refresh_us,
            t.bus_mutex_us,
            t.state_mutex_us,
            t.monitor_mutex_us,
            t.bus_transfer_us,
            t.comms_liveness_us,
            t.telemetry_min_interval_us,
        ];
        if all.contains(&0) || t.persistent_violation_limit == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if t.watchdog_refresh_us >= t.watchdog_window_us / 2 {
            return Err(ConfigError::WatchdogRefreshTooSlow);
        }
        if !(1..=100).contains(&t.overrun_warn_percent) {
            return Err(ConfigError::InvalidOverrunPercent);
        }

        let d = &self.devices;
        let ids = [d.drivers[0], d.drivers[1], d.encoders[0], d.encoders[1]];
        for (i, a) in ids.iter().enumerate() {
            if ids[i + 1..].contains(a) {
                return Err(ConfigError::DuplicateDevice);
            }
        }
        Ok(())
    }

    /// Decode and validate a postcard blob
    #[cfg(feature = "serde")]
    pub fn from_postcard(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = postcard::from_bytes(bytes).map_err(|_| ConfigError::Decode)?;
        config.validate()?;
        Ok(config)
    }
}
