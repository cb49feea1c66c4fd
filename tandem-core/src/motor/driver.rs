//! Stepper driver command contract over the shared bus
//!
//! Each exchange is a 5-byte datagram: one address byte (bit 7 set for a
//! write) followed by 32 bits of data, MSB first. The driver answers every
//! datagram with its status byte and the data of the *previous* read, so a
//! register read takes two transfers.

use core::ops::BitOr;

use tandem_hal::{BusTransaction, DeviceId, HalError};

use super::{CommandKind, MotorId};
use crate::config::NUM_MOTORS;

/// Datagram length on the bus
pub const DATAGRAM_LEN: usize = 5;

/// Address flag for register writes
pub const WRITE_BIT: u8 = 0x80;

/// Full-step count times microstep resolution
pub const MICROSTEPS_PER_REV: i64 = 200 * 256;

/// Maximum velocity for position moves until configured (1 rev/s)
pub const DEFAULT_VMAX: u32 = MICROSTEPS_PER_REV as u32;

/// Register addresses
pub mod reg {
    pub const RAMPMODE: u8 = 0x20;
    pub const XACTUAL: u8 = 0x21;
    pub const VMAX: u8 = 0x27;
    pub const XTARGET: u8 = 0x2D;
    pub const DRV_STATUS: u8 = 0x6F;
}

/// Ramp generator mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RampMode {
    Position = 0,
    VelocityPositive = 1,
    VelocityNegative = 2,
    Hold = 3,
}

/// Status byte returned with every datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusByte(pub u8);

impl StatusByte {
    pub const RESET: u8 = 0x01;
    pub const DRIVER_ERROR: u8 = 0x02;
    pub const STALL: u8 = 0x04;
    pub const STANDSTILL: u8 = 0x08;
    pub const NOT_READY: u8 = 0x80;

    pub fn is_ready(self) -> bool {
        self.0 & Self::NOT_READY == 0
    }

    pub fn driver_error(self) -> bool {
        self.0 & Self::DRIVER_ERROR != 0
    }
}

/// Decoded driver status flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriverStatus(u8);

impl DriverStatus {
    /// Over-temperature shutdown
    pub const OT: Self = Self(0x01);
    /// Over-temperature pre-warning
    pub const OTPW: Self = Self(0x02);
    pub const STALL: Self = Self(0x04);
    /// Short to ground or supply on either coil
    pub const SHORT: Self = Self(0x08);
    /// Open load on either coil
    pub const OPEN_LOAD: Self = Self(0x10);
    pub const STANDSTILL: Self = Self(0x20);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0x3F)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn over_temperature(self) -> bool {
        self.contains(Self::OT)
    }

    pub const fn pre_warning(self) -> bool {
        self.contains(Self::OTPW)
    }

    pub const fn stalled(self) -> bool {
        self.contains(Self::STALL)
    }

    /// Conditions the driver cannot recover from by itself
    pub const fn is_hard_fault(self) -> bool {
        self.0 & (Self::OT.0 | Self::SHORT.0) != 0
    }

    /// Decode the DRV_STATUS register
    pub fn from_register(raw: u32) -> Self {
        let mut s = Self::empty();
        let bit = |n: u32| raw & (1 << n) != 0;
        if bit(24) {
            s = s | Self::STALL;
        }
        if bit(25) {
            s = s | Self::OT;
        }
        if bit(26) {
            s = s | Self::OTPW;
        }
        if bit(27) || bit(28) {
            s = s | Self::SHORT;
        }
        if bit(29) || bit(30) {
            s = s | Self::OPEN_LOAD;
        }
        if bit(31) {
            s = s | Self::STANDSTILL;
        }
        s
    }
}

impl BitOr for DriverStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Device-level failure on a driver or encoder exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverError {
    Bus(HalError),
    /// Encoder frame failed its parity check
    Parity,
    /// Encoder flagged an internal error
    SensorFault,
}

impl From<HalError> for DriverError {
    fn from(e: HalError) -> Self {
        DriverError::Bus(e)
    }
}

impl DriverError {
    /// Numeric code carried in safety events
    pub fn code(self) -> u16 {
        match self {
            DriverError::Bus(HalError::Timeout) => 0x01,
            DriverError::Bus(HalError::InvalidParameter) => 0x02,
            DriverError::Bus(HalError::NotReady) => 0x03,
            DriverError::Bus(HalError::Bus) => 0x04,
            DriverError::Parity => 0x10,
            DriverError::SensorFault => 0x11,
        }
    }
}

/// Build a register write datagram
pub fn build_write(addr: u8, value: u32) -> [u8; DATAGRAM_LEN] {
    let d = value.to_be_bytes();
    [addr | WRITE_BIT, d[0], d[1], d[2], d[3]]
}

/// Build a register read datagram
pub fn build_read(addr: u8) -> [u8; DATAGRAM_LEN] {
    [addr & !WRITE_BIT, 0, 0, 0, 0]
}

/// Split a reply into status and data
pub fn parse_reply(rx: &[u8; DATAGRAM_LEN]) -> Result<(StatusByte, u32), HalError> {
    let status = StatusByte(rx[0]);
    if !status.is_ready() {
        return Err(HalError::NotReady);
    }
    Ok((status, u32::from_be_bytes([rx[1], rx[2], rx[3], rx[4]])))
}

/// Millidegrees to driver microsteps
pub fn mdeg_to_microsteps(mdeg: i32) -> i32 {
    (mdeg as i64 * MICROSTEPS_PER_REV / 360_000) as i32
}

/// Command path to both motor drivers
#[derive(Debug, Clone)]
pub struct DriverLink {
    devices: [DeviceId; NUM_MOTORS],
    timeout_us: u32,
    vmax: [u32; NUM_MOTORS],
}

impl DriverLink {
    pub fn new(devices: [DeviceId; NUM_MOTORS], timeout_us: u32) -> Self {
        Self {
            devices,
            timeout_us,
            vmax: [DEFAULT_VMAX; NUM_MOTORS],
        }
    }

    fn exchange<B: BusTransaction>(
        &self,
        bus: &mut B,
        motor: MotorId,
        tx: [u8; DATAGRAM_LEN],
    ) -> Result<(StatusByte, u32), DriverError> {
        let mut rx = [0u8; DATAGRAM_LEN];
        bus.transfer(self.devices[motor.index()], &tx, &mut rx, self.timeout_us)?;
        Ok(parse_reply(&rx)?)
    }

    pub fn write_register<B: BusTransaction>(
        &self,
        bus: &mut B,
        motor: MotorId,
        addr: u8,
        value: u32,
    ) -> Result<StatusByte, DriverError> {
        self.exchange(bus, motor, build_write(addr, value))
            .map(|(status, _)| status)
    }

    /// Read a register (two transfers, see module docs)
    pub fn read_register<B: BusTransaction>(
        &self,
        bus: &mut B,
        motor: MotorId,
        addr: u8,
    ) -> Result<u32, DriverError> {
        self.exchange(bus, motor, build_read(addr))?;
        self.exchange(bus, motor, build_read(addr))
            .map(|(_, data)| data)
    }

    /// Issue a motion command; `value` in kernel units
    pub fn set_target<B: BusTransaction>(
        &mut self,
        bus: &mut B,
        motor: MotorId,
        kind: CommandKind,
        value: i32,
    ) -> Result<(), DriverError> {
        match kind {
            CommandKind::MoveToPosition => {
                self.write_register(bus, motor, reg::VMAX, self.vmax[motor.index()])?;
                self.write_register(bus, motor, reg::RAMPMODE, RampMode::Position as u32)?;
                self.write_register(bus, motor, reg::XTARGET, mdeg_to_microsteps(value) as u32)?;
            }
            CommandKind::MoveToVelocity => {
                let mode = if value < 0 {
                    RampMode::VelocityNegative
                } else {
                    RampMode::VelocityPositive
                };
                let speed = mdeg_to_microsteps(value).unsigned_abs();
                self.write_register(bus, motor, reg::VMAX, speed)?;
                self.write_register(bus, motor, reg::RAMPMODE, mode as u32)?;
            }
            CommandKind::Stop => {
                // Velocity mode toward zero decelerates on the configured ramp
                self.write_register(bus, motor, reg::VMAX, 0)?;
                self.write_register(bus, motor, reg::RAMPMODE, RampMode::VelocityPositive as u32)?;
            }
            CommandKind::Configure => {
                let speed = mdeg_to_microsteps(value).unsigned_abs();
                self.vmax[motor.index()] = speed;
                self.write_register(bus, motor, reg::VMAX, speed)?;
            }
        }
        Ok(())
    }

    pub fn read_status<B: BusTransaction>(
        &self,
        bus: &mut B,
        motor: MotorId,
    ) -> Result<DriverStatus, DriverError> {
        self.read_register(bus, motor, reg::DRV_STATUS)
            .map(DriverStatus::from_register)
    }

    /// Zero velocity and hold position immediately
    pub fn hard_stop<B: BusTransaction>(&self, bus: &mut B, motor: MotorId) -> Result<(), DriverError> {
        self.write_register(bus, motor, reg::VMAX, 0)?;
        self.write_register(bus, motor, reg::RAMPMODE, RampMode::Hold as u32)?;
        Ok(())
    }

    pub fn device(&self, motor: MotorId) -> DeviceId {
        self.devices[motor.index()]
    }
}

/// Check if a transmitted datagram is the hold-mode write issued by
/// [`DriverLink::hard_stop`]
pub fn is_hold_datagram(tx: &[u8]) -> bool {
    tx == build_write(reg::RAMPMODE, RampMode::Hold as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_hal_sim::{SimBus, SimClock, SimTrace};

    fn link() -> DriverLink {
        DriverLink::new([DeviceId(0), DeviceId(1)], 200)
    }

    #[test]
    fn test_datagram_layout() {
        assert_eq!(build_write(reg::XTARGET, 0x0102_0304), [0xAD, 1, 2, 3, 4]);
        assert_eq!(build_read(reg::DRV_STATUS), [0x6F, 0, 0, 0, 0]);
    }

    #[test]
    fn test_not_ready_maps_to_hal_error() {
        assert_eq!(
            parse_reply(&[StatusByte::NOT_READY, 0, 0, 0, 0]),
            Err(HalError::NotReady)
        );
        let (status, data) = parse_reply(&[StatusByte::STANDSTILL, 0, 0, 1, 0]).unwrap();
        assert_eq!(data, 256);
        assert!(status.is_ready());
    }

    #[test]
    fn test_status_register_decode() {
        let s = DriverStatus::from_register((1 << 25) | (1 << 31) | (1 << 29));
        assert!(s.over_temperature());
        assert!(s.contains(DriverStatus::STANDSTILL));
        assert!(s.contains(DriverStatus::OPEN_LOAD));
        assert!(!s.stalled());
        assert!(s.is_hard_fault());
    }

    #[test]
    fn test_microstep_conversion() {
        assert_eq!(mdeg_to_microsteps(360_000), 51_200);
        assert_eq!(mdeg_to_microsteps(-180_000), -25_600);
    }

    #[test]
    fn test_move_to_position_writes() {
        let mut bus = SimBus::new(SimClock::new(), SimTrace::new());
        let mut l = link();
        l.set_target(&mut bus, MotorId::M1, CommandKind::MoveToPosition, 90_000)
            .unwrap();
        let tx: Vec<_> = bus.transfers_to(DeviceId(1)).into_iter().map(|t| t.tx).collect();
        assert_eq!(
            tx,
            vec![
                build_write(reg::VMAX, DEFAULT_VMAX).to_vec(),
                build_write(reg::RAMPMODE, 0).to_vec(),
                build_write(reg::XTARGET, 12_800).to_vec(),
            ]
        );
    }

    #[test]
    fn test_negative_velocity_mode() {
        let mut bus = SimBus::new(SimClock::new(), SimTrace::new());
        let mut l = link();
        l.set_target(&mut bus, MotorId::M0, CommandKind::MoveToVelocity, -360_000)
            .unwrap();
        let t = bus.transfers();
        assert_eq!(t[0].tx, build_write(reg::VMAX, 51_200).to_vec());
        assert_eq!(t[1].tx, build_write(reg::RAMPMODE, 2).to_vec());
    }

    #[test]
    fn test_hard_stop_ends_in_hold() {
        let mut bus = SimBus::new(SimClock::new(), SimTrace::new());
        link().hard_stop(&mut bus, MotorId::M0).unwrap();
        let t = bus.transfers();
        assert_eq!(t.len(), 2);
        assert!(is_hold_datagram(&t[1].tx));
    }

    #[test]
    fn test_read_status_uses_second_reply() {
        let mut bus = SimBus::new(SimClock::new(), SimTrace::new());
        bus.push_reply(DeviceId(0), &[0, 0xFF, 0xFF, 0xFF, 0xFF]);
        bus.push_reply(DeviceId(0), &[0, 0x01, 0, 0, 0]);
        let s = link().read_status(&mut bus, MotorId::M0).unwrap();
        assert_eq!(s, DriverStatus::STALL);
    }

    #[test]
    fn test_driver_not_ready_propagates() {
        let mut bus = SimBus::new(SimClock::new(), SimTrace::new());
        bus.push_reply(DeviceId(0), &[StatusByte::NOT_READY, 0, 0, 0, 0]);
        assert_eq!(
            link().hard_stop(&mut bus, MotorId::M0),
            Err(DriverError::Bus(HalError::NotReady))
        );
    }
}
