//! Fail-safe state machine
//!
//! Owned by the Safety Monitor Task; every other task only reads the
//! published state. The legal transitions are:
//!
//! ```text
//! INIT ──init──► SAFE ──degraded──► WARNING ──escalate──► FAULT
//!                 ▲                    │                     │
//!                 └─────recovered──────┘                     │
//!                 └───────────────manual reset───────────────┘
//! ```
//!
//! FAULT is left only by a manual reset; nothing in here clears it on a
//! timer or on nominal health.

use super::events::{SafetyEvent, SafetyEventKind, Severity};
use super::health::HealthReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FailSafeState {
    /// Hardware and kernel objects being brought up
    Init,
    /// Normal operation
    Safe,
    /// Degraded; returns to SAFE if the condition clears in time
    Warning,
    /// Outputs stopped; waits for a manual reset
    Fault,
}

/// What drives a state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Trigger {
    InitComplete,
    Degraded,
    Recovered,
    Escalate,
    ManualReset,
}

impl FailSafeState {
    /// Published encoding
    pub const fn code(self) -> u8 {
        match self {
            FailSafeState::Init => 0,
            FailSafeState::Safe => 1,
            FailSafeState::Warning => 2,
            FailSafeState::Fault => 3,
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(FailSafeState::Init),
            1 => Some(FailSafeState::Safe),
            2 => Some(FailSafeState::Warning),
            3 => Some(FailSafeState::Fault),
            _ => None,
        }
    }

    /// Motion commands are only executed in SAFE and WARNING
    pub fn motion_allowed(self) -> bool {
        matches!(self, FailSafeState::Safe | FailSafeState::Warning)
    }

    /// Next state, or `None` if `trigger` is not legal here
    pub fn transition(self, trigger: Trigger) -> Option<Self> {
        use FailSafeState::*;
        use Trigger::*;

        match (self, trigger) {
            (Init, InitComplete) => Some(Safe),
            (Safe, Degraded) => Some(Warning),
            (Warning, Recovered) => Some(Safe),
            (Warning, Escalate) => Some(Fault),
            (Fault, ManualReset) => Some(Safe),
            _ => None,
        }
    }
}

/// What the owner of the machine must do after an input
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    None,
    /// FAULT was just entered: stop the motors and latch the e-stop
    SafeStop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetError {
    /// Wrong reset key
    BadKey,
    /// The e-stop input is still asserted
    EstopAsserted,
    /// Nothing to reset
    NotFaulted,
}

pub struct FailSafeMachine {
    state: FailSafeState,
    warning_timeout_us: u64,
    warning_since_us: u64,
    cause: Option<SafetyEventKind>,
    /// A warning-level event arrived since the last health update
    event_warning: bool,
    /// Worst input seen while still in INIT
    deferred: Option<(Severity, SafetyEventKind)>,
    transitions: u32,
}

impl FailSafeMachine {
    pub fn new(warning_timeout_us: u32) -> Self {
        Self {
            state: FailSafeState::Init,
            warning_timeout_us: warning_timeout_us as u64,
            warning_since_us: 0,
            cause: None,
            event_warning: false,
            deferred: None,
            transitions: 0,
        }
    }

    pub fn state(&self) -> FailSafeState {
        self.state
    }

    /// Condition that moved the machine out of SAFE
    pub fn cause(&self) -> Option<SafetyEventKind> {
        self.cause
    }

    pub fn transitions(&self) -> u32 {
        self.transitions
    }

    fn apply(&mut self, trigger: Trigger) -> bool {
        match self.state.transition(trigger) {
            Some(next) => {
                debug!("fail-safe {:?} -> {:?}", self.state, next);
                self.state = next;
                self.transitions = self.transitions.wrapping_add(1);
                true
            }
            None => false,
        }
    }

    /// Leave INIT, replaying anything reported during bring-up
    pub fn init_complete(&mut self, now_us: u64) -> Action {
        if !self.apply(Trigger::InitComplete) {
            return Action::None;
        }
        info!("fail-safe: init complete");
        match self.deferred.take() {
            Some((severity, cause)) => self.report(severity, cause, now_us),
            None => Action::None,
        }
    }

    /// Feed one safety event
    pub fn evaluate(&mut self, event: &SafetyEvent, now_us: u64) -> Action {
        self.report(event.severity(), event.kind, now_us)
    }

    /// Feed a condition at the given severity
    ///
    /// A fatal condition reaches FAULT from SAFE in one call, passing
    /// through WARNING.
    pub fn report(&mut self, severity: Severity, cause: SafetyEventKind, now_us: u64) -> Action {
        if severity == Severity::Info {
            return Action::None;
        }
        if self.state == FailSafeState::Init {
            if self.deferred.map_or(true, |(s, _)| severity > s) {
                self.deferred = Some((severity, cause));
            }
            return Action::None;
        }

        if self.apply(Trigger::Degraded) {
            self.warning_since_us = now_us;
            self.cause = Some(cause);
            warn!("fail-safe WARNING: {:?}", cause);
        }
        if severity == Severity::Warning {
            self.event_warning = true;
            return Action::None;
        }
        if self.apply(Trigger::Escalate) {
            self.cause = Some(cause);
            error!("fail-safe FAULT: {:?}", cause);
            return Action::SafeStop;
        }
        Action::None
    }

    /// Periodic health input
    ///
    /// WARNING clears back to SAFE once health is nominal and no warning
    /// event arrived since the previous update, and escalates to FAULT
    /// once it has lasted longer than the warning timeout.
    pub fn update(&mut self, health: &HealthReport, now_us: u64) -> Action {
        let mut action = Action::None;
        if let Some(cause) = health.cause {
            action = self.report(health.severity, cause, now_us);
        } else if self.state == FailSafeState::Warning && !self.event_warning {
            self.apply(Trigger::Recovered);
            info!("fail-safe: recovered");
            self.cause = None;
        }
        self.event_warning = false;

        if self.state == FailSafeState::Warning
            && now_us.saturating_sub(self.warning_since_us) > self.warning_timeout_us
        {
            self.apply(Trigger::Escalate);
            error!("fail-safe FAULT: warning timeout");
            return Action::SafeStop;
        }
        action
    }

    /// FAULT -> SAFE; key and e-stop input are checked by the caller
    pub fn manual_reset(&mut self) -> Result<(), ResetError> {
        if self.apply(Trigger::ManualReset) {
            info!("fail-safe: manual reset");
            self.cause = None;
            self.event_warning = false;
            Ok(())
        } else {
            Err(ResetError::NotFaulted)
        }
    }
}
