//! Safety subsystem
//!
//! - [`events`] - safety events and the event queue
//! - [`state`] - fail-safe state machine (INIT, SAFE, WARNING, FAULT)
//! - [`health`] - periodic health checks
//! - [`position`] - position limit enforcement
//! - [`estop`] - emergency stop latch and driver enable outputs
//! - [`watchdog`] - hardware watchdog supervision

pub mod estop;
pub mod events;
pub mod health;
pub mod position;
pub mod state;
pub mod watchdog;

pub use estop::{EmergencyStop, EnableOutputs, SharedOutputs, StopSource, MANUAL_RESET_KEY};
pub use events::{
    EventPayload, EventSource, LimitClass, MotorFault, SafetyEvent, SafetyEventKind,
    SafetyEventQueue, SafetyEventSink, SensorFault, Severity,
};
pub use health::{HealthInputs, HealthMonitor, HealthReport, LinkLiveness};
pub use position::{PositionLimitViolation, PositionSafetyEnforcer};
pub use state::{Action, FailSafeMachine, FailSafeState, ResetError, Trigger};
pub use watchdog::{WatchdogConfigError, WatchdogStatus, WatchdogSupervisor};
