//! Configuration type definitions
//!
//! All angles are millidegrees and all durations are microseconds. The
//! firmware embeds the configuration as postcard-serialized binary data
//! produced at build time.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tandem_hal::DeviceId;

/// Number of motor axes on the platform
pub const NUM_MOTORS: usize = 2;

/// Default outer margin beyond the soft limits (30°)
pub const DEFAULT_HARD_MARGIN: i32 = 30_000;

/// Soft and hard position limits for one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PositionLimits {
    /// Lowest permitted target (millidegrees)
    pub min: i32,
    /// Highest permitted target (millidegrees)
    pub max: i32,
    /// Distance outside `[min, max]` still treated as a soft violation
    pub hard_margin: i32,
}

impl PositionLimits {
    /// Create limits with the default hard margin
    pub const fn new(min: i32, max: i32) -> Self {
        Self {
            min,
            max,
            hard_margin: DEFAULT_HARD_MARGIN,
        }
    }

    /// Create limits from whole degrees
    pub const fn from_degrees(min: i32, max: i32) -> Self {
        Self::new(min * 1000, max * 1000)
    }

    pub fn contains(&self, value: i32) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn clamp(&self, value: i32) -> i32 {
        value.clamp(self.min, self.max)
    }

    /// Check if `value` lies beyond the hard margin on either side
    pub fn beyond_hard(&self, value: i32) -> bool {
        value < self.min.saturating_sub(self.hard_margin)
            || value > self.max.saturating_add(self.hard_margin)
    }
}

impl Default for PositionLimits {
    fn default() -> Self {
        Self::from_degrees(0, 180)
    }
}

/// Scheduling parameters for one task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TaskTiming {
    /// Higher value is more urgent; unique across tasks
    pub priority: u8,
    /// Activation period
    pub period_us: u32,
    /// Stack budget in bytes
    pub stack_bytes: u32,
}

impl TaskTiming {
    pub const fn new(priority: u8, period_us: u32, stack_bytes: u32) -> Self {
        Self {
            priority,
            period_us,
            stack_bytes,
        }
    }
}

/// Timing parameters for every task in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TaskSet {
    pub safety_monitor: TaskTiming,
    pub motor_control: TaskTiming,
    pub command_rx: TaskTiming,
    pub telemetry: TaskTiming,
}

impl Default for TaskSet {
    fn default() -> Self {
        Self {
            safety_monitor: TaskTiming::new(4, 500, 2048),
            motor_control: TaskTiming::new(3, 1_000, 4096),
            command_rx: TaskTiming::new(2, 5_000, 2048),
            telemetry: TaskTiming::new(1, 20_000, 2048),
        }
    }
}

impl TaskSet {
    /// All timings in descending priority order of the defaults
    pub fn all(&self) -> [TaskTiming; 4] {
        [
            self.safety_monitor,
            self.motor_control,
            self.command_rx,
            self.telemetry,
        ]
    }
}

/// Timeout thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Timeouts {
    /// Time allowed in WARNING before escalating to FAULT
    pub warning_timeout_us: u32,
    /// Hardware watchdog window
    pub watchdog_window_us: u32,
    /// Maximum interval between watchdog refreshes
    pub watchdog_refresh_us: u32,
    /// Motor Control Task bus mutex acquire
    pub bus_mutex_us: u32,
    /// Motor-state mutex acquire from non-monitor tasks
    pub state_mutex_us: u32,
    /// Any mutex acquire from the Safety Monitor Task
    pub monitor_mutex_us: u32,
    /// Single bus transfer
    pub bus_transfer_us: u32,
    /// Host link silence tolerated before CommLoss
    pub comms_liveness_us: u32,
    /// Share of the control period that triggers an overrun event
    pub overrun_warn_percent: u8,
    /// Consecutive soft violations on one axis treated as fatal
    pub persistent_violation_limit: u8,
    /// Minimum spacing between telemetry frames
    pub telemetry_min_interval_us: u32,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            warning_timeout_us: 500_000,
            watchdog_window_us: 100_000,
            watchdog_refresh_us: 10_000,
            bus_mutex_us: 300,
            state_mutex_us: 200,
            monitor_mutex_us: 100,
            bus_transfer_us: 200,
            comms_liveness_us: 1_000_000,
            overrun_warn_percent: 80,
            persistent_violation_limit: 3,
            telemetry_min_interval_us: 50_000,
        }
    }
}

/// Bus addressing of the motor drivers and encoders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceMap {
    pub drivers: [u8; NUM_MOTORS],
    pub encoders: [u8; NUM_MOTORS],
}

impl DeviceMap {
    pub fn driver_ids(&self) -> [DeviceId; NUM_MOTORS] {
        self.drivers.map(DeviceId)
    }

    pub fn encoder_ids(&self) -> [DeviceId; NUM_MOTORS] {
        self.encoders.map(DeviceId)
    }
}

impl Default for DeviceMap {
    fn default() -> Self {
        Self {
            drivers: [0, 1],
            encoders: [2, 3],
        }
    }
}

/// Complete system configuration, immutable after init
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SystemConfig {
    pub limits: [PositionLimits; NUM_MOTORS],
    pub tasks: TaskSet,
    pub timeouts: Timeouts,
    pub devices: DeviceMap,
}
