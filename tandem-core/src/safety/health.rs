//! Periodic health checks
//!
//! Evaluated by the Safety Monitor Task every activation from a snapshot
//! of the shared motor state, host link liveness, watchdog cadence and
//! the e-stop latch.

use portable_atomic::{AtomicBool, AtomicU64, Ordering};

use super::events::{SafetyEventKind, Severity};
use super::watchdog::WatchdogStatus;
use crate::motor::{DriverStatus, MotorStates};

/// Worst condition found by one health check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HealthReport {
    pub severity: Severity,
    /// `None` when nominal
    pub cause: Option<SafetyEventKind>,
}

impl HealthReport {
    pub const NOMINAL: Self = Self {
        severity: Severity::Info,
        cause: None,
    };

    pub fn is_nominal(&self) -> bool {
        self.cause.is_none()
    }

    fn note(&mut self, severity: Severity, cause: SafetyEventKind) {
        if self.cause.is_none() || severity > self.severity {
            self.severity = severity;
            self.cause = Some(cause);
        }
    }
}

/// Last time the host was heard from
///
/// Silence is only judged once the host has spoken at least once, so a
/// bench setup without a host connected does not degrade.
pub struct LinkLiveness {
    last_rx_us: AtomicU64,
    seen: AtomicBool,
}

impl Default for LinkLiveness {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkLiveness {
    pub const fn new() -> Self {
        Self {
            last_rx_us: AtomicU64::new(0),
            seen: AtomicBool::new(false),
        }
    }

    /// Record a valid frame from the host
    pub fn touch(&self, now_us: u64) {
        self.last_rx_us.store(now_us, Ordering::Release);
        self.seen.store(true, Ordering::Release);
    }

    /// Time since the last frame, `None` before the first one
    pub fn silent_for(&self, now_us: u64) -> Option<u64> {
        if !self.seen.load(Ordering::Acquire) {
            return None;
        }
        Some(now_us.saturating_sub(self.last_rx_us.load(Ordering::Acquire)))
    }
}

/// Inputs for one check
#[derive(Debug, Clone, Copy)]
pub struct HealthInputs {
    pub motors: MotorStates,
    pub link_silent_us: Option<u64>,
    pub watchdog: WatchdogStatus,
    pub estop_latched: bool,
}

pub struct HealthMonitor {
    comms_liveness_us: u64,
}

impl HealthMonitor {
    pub fn new(comms_liveness_us: u32) -> Self {
        Self {
            comms_liveness_us: comms_liveness_us as u64,
        }
    }

    /// Evaluate all conditions, returning the most severe one
    ///
    /// `in_fault` suppresses the e-stop check: a latched e-stop is the
    /// expected state while in FAULT.
    pub fn check(&self, inputs: &HealthInputs, in_fault: bool) -> HealthReport {
        let mut report = HealthReport::NOMINAL;

        if inputs.estop_latched && !in_fault {
            report.note(Severity::Fatal, SafetyEventKind::EmergencyStop);
        }

        for motor in inputs.motors.iter() {
            let flags = motor.driver_status_flags;
            if flags.over_temperature() {
                report.note(Severity::Fatal, SafetyEventKind::OverTemperature);
            } else if flags.pre_warning() {
                report.note(Severity::Warning, SafetyEventKind::ThermalWarning);
            }
            if motor.stall_flag {
                report.note(Severity::Fatal, SafetyEventKind::Stall);
            }
            if flags.contains(DriverStatus::SHORT) {
                report.note(Severity::Fatal, SafetyEventKind::DriverFault);
            }
        }

        if let WatchdogStatus::Late { gap_us } = inputs.watchdog {
            warn!("watchdog refresh late by {} us", gap_us);
            report.note(Severity::Warning, SafetyEventKind::WatchdogLate);
        }

        if inputs.link_silent_us.is_some_and(|silent| silent > self.comms_liveness_us) {
            report.note(Severity::Warning, SafetyEventKind::CommLoss);
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NUM_MOTORS;
    use crate::motor::MotorState;

    fn nominal() -> HealthInputs {
        HealthInputs {
            motors: [MotorState::default(); NUM_MOTORS],
            link_silent_us: None,
            watchdog: WatchdogStatus::Healthy,
            estop_latched: false,
        }
    }

    #[test]
    fn test_nominal() {
        let m = HealthMonitor::new(1_000_000);
        assert!(m.check(&nominal(), false).is_nominal());
    }

    #[test]
    fn test_thermal_levels() {
        let m = HealthMonitor::new(1_000_000);
        let mut inputs = nominal();
        inputs.motors[1].apply_status(DriverStatus::OTPW);
        let r = m.check(&inputs, false);
        assert_eq!(r.severity, Severity::Warning);
        assert_eq!(r.cause, Some(SafetyEventKind::ThermalWarning));

        inputs.motors[0].apply_status(DriverStatus::OT);
        let r = m.check(&inputs, false);
        assert_eq!(r.severity, Severity::Fatal);
        assert_eq!(r.cause, Some(SafetyEventKind::OverTemperature));
    }

    #[test]
    fn test_comm_loss_after_first_frame_only() {
        let m = HealthMonitor::new(1_000);
        let link = LinkLiveness::new();
        let mut inputs = nominal();

        inputs.link_silent_us = link.silent_for(50_000);
        assert!(m.check(&inputs, false).is_nominal());

        link.touch(10_000);
        inputs.link_silent_us = link.silent_for(10_500);
        assert!(m.check(&inputs, false).is_nominal());
        inputs.link_silent_us = link.silent_for(11_001);
        assert_eq!(m.check(&inputs, false).cause, Some(SafetyEventKind::CommLoss));
    }

    #[test]
    fn test_latched_estop_fatal_outside_fault() {
        let m = HealthMonitor::new(1_000);
        let mut inputs = nominal();
        inputs.estop_latched = true;
        assert_eq!(m.check(&inputs, false).severity, Severity::Fatal);
        assert!(m.check(&inputs, true).is_nominal());
    }
}
