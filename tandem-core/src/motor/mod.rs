//! Motor-side data model and external device contracts
//!
//! Positions are millidegrees and velocities millidegrees per second
//! throughout the kernel.

pub mod driver;
pub mod encoder;

pub use driver::{DriverError, DriverLink, DriverStatus, StatusByte};
pub use encoder::{EncoderLink, EncoderSample, EncoderTracker};

use crate::config::NUM_MOTORS;

/// Motor axis identifier (0 or 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorId(u8);

impl MotorId {
    pub const M0: MotorId = MotorId(0);
    pub const M1: MotorId = MotorId(1);
    pub const ALL: [MotorId; NUM_MOTORS] = [Self::M0, Self::M1];

    /// Validate a raw id
    pub const fn new(raw: u8) -> Option<Self> {
        if (raw as usize) < NUM_MOTORS {
            Some(MotorId(raw))
        } else {
            None
        }
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn raw(self) -> u8 {
        self.0
    }
}

/// What a [`MotorCommand`] asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandKind {
    /// `target_value` is an absolute position
    MoveToPosition,
    /// `target_value` is a signed velocity
    MoveToVelocity,
    /// Controlled deceleration to standstill
    Stop,
    /// `target_value` is the new maximum velocity for position moves
    Configure,
}

impl From<tandem_protocol::CommandKind> for CommandKind {
    fn from(kind: tandem_protocol::CommandKind) -> Self {
        use tandem_protocol::CommandKind as Wire;
        match kind {
            Wire::MoveToPosition => CommandKind::MoveToPosition,
            Wire::MoveToVelocity => CommandKind::MoveToVelocity,
            Wire::Stop => CommandKind::Stop,
            Wire::Configure => CommandKind::Configure,
        }
    }
}

/// One motion request, consumed exactly once by the Motor Control Task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorCommand {
    pub motor_id: MotorId,
    pub kind: CommandKind,
    pub target_value: i32,
    /// Time the command entered the kernel (µs)
    pub timestamp_us: u64,
}

impl MotorCommand {
    pub const fn new(motor_id: MotorId, kind: CommandKind, target_value: i32, timestamp_us: u64) -> Self {
        Self {
            motor_id,
            kind,
            target_value,
            timestamp_us,
        }
    }

    pub const fn move_to(motor_id: MotorId, position: i32, timestamp_us: u64) -> Self {
        Self::new(motor_id, CommandKind::MoveToPosition, position, timestamp_us)
    }
}

/// Latest known state of one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorState {
    pub position: i32,
    pub velocity: i32,
    pub driver_status_flags: DriverStatus,
    /// Over-temperature or pre-warning reported by the driver
    pub thermal_flag: bool,
    pub stall_flag: bool,
}

impl MotorState {
    /// Fold a driver status read into the state
    pub fn apply_status(&mut self, status: DriverStatus) {
        self.driver_status_flags = status;
        self.thermal_flag = status.over_temperature() || status.pre_warning();
        self.stall_flag = status.stalled();
    }
}

/// Shared state of both axes, guarded by the motor-state mutex
pub type MotorStates = [MotorState; NUM_MOTORS];

impl From<&MotorState> for tandem_protocol::MotorSnapshot {
    fn from(s: &MotorState) -> Self {
        Self {
            position: s.position,
            velocity: s.velocity,
            driver_flags: s.driver_status_flags.bits(),
            thermal: s.thermal_flag,
            stall: s.stall_flag,
        }
    }
}
