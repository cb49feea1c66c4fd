//! Magnetic encoder feedback
//!
//! The encoder answers a read with a 16-bit frame, MSB first:
//!
//! ```text
//! bit 15      14      13..0
//!     parity  error   angle (14-bit, one revolution)
//! ```
//!
//! Parity is even over all 16 bits. [`EncoderTracker`] unwraps the
//! single-turn angle into a continuous position.

use tandem_hal::{BusTransaction, DeviceId};

use super::driver::DriverError;
use super::MotorId;
use crate::config::NUM_MOTORS;

/// Angle read command (all ones, parity included)
pub const READ_ANGLE: [u8; 2] = [0xFF, 0xFF];

/// Counts per revolution
pub const COUNTS_PER_REV: i32 = 1 << 14;

const ERROR_FLAG: u16 = 1 << 14;
const ANGLE_MASK: u16 = 0x3FFF;
const HALF_TURN_MDEG: i32 = 180_000;
const FULL_TURN_MDEG: i32 = 360_000;

/// One decoded reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EncoderSample {
    /// Raw 14-bit count
    pub raw: u16,
    /// Single-turn angle in millidegrees, `0..360_000`
    pub angle_mdeg: i32,
}

/// Decode a frame, checking parity and the error flag
pub fn decode_frame(frame: u16) -> Result<EncoderSample, DriverError> {
    if frame.count_ones() % 2 != 0 {
        return Err(DriverError::Parity);
    }
    if frame & ERROR_FLAG != 0 {
        return Err(DriverError::SensorFault);
    }
    let raw = frame & ANGLE_MASK;
    Ok(EncoderSample {
        raw,
        angle_mdeg: (raw as i64 * FULL_TURN_MDEG as i64 / COUNTS_PER_REV as i64) as i32,
    })
}

/// Build a valid frame for a raw count (simulation and tests)
pub fn encode_frame(raw: u16, error: bool) -> u16 {
    let mut frame = raw & ANGLE_MASK;
    if error {
        frame |= ERROR_FLAG;
    }
    if frame.count_ones() % 2 != 0 {
        frame |= 1 << 15;
    }
    frame
}

/// Feedback path from both encoders
#[derive(Debug, Clone)]
pub struct EncoderLink {
    devices: [DeviceId; NUM_MOTORS],
    timeout_us: u32,
}

impl EncoderLink {
    pub fn new(devices: [DeviceId; NUM_MOTORS], timeout_us: u32) -> Self {
        Self {
            devices,
            timeout_us,
        }
    }

    pub fn read_position<B: BusTransaction>(
        &self,
        bus: &mut B,
        encoder: MotorId,
    ) -> Result<EncoderSample, DriverError> {
        let mut rx = [0u8; 2];
        bus.transfer(self.devices[encoder.index()], &READ_ANGLE, &mut rx, self.timeout_us)?;
        decode_frame(u16::from_be_bytes(rx))
    }

    pub fn device(&self, encoder: MotorId) -> DeviceId {
        self.devices[encoder.index()]
    }
}

/// Multi-turn position and velocity from consecutive samples
///
/// Consecutive samples must be less than half a turn apart, which holds
/// for any realistic speed at the control-loop rate.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncoderTracker {
    last: Option<(i32, u64)>,
    turns: i32,
    position: i32,
    velocity: i32,
}

impl EncoderTracker {
    pub const fn new() -> Self {
        Self {
            last: None,
            turns: 0,
            position: 0,
            velocity: 0,
        }
    }

    /// Fold in a new angle sampled at `now_us`
    ///
    /// Returns `(position, velocity)` in millidegrees and millidegrees/s.
    pub fn update(&mut self, angle_mdeg: i32, now_us: u64) -> (i32, i32) {
        match self.last {
            None => {
                self.position = angle_mdeg;
            }
            Some((prev_angle, prev_us)) => {
                let delta = angle_mdeg - prev_angle;
                if delta > HALF_TURN_MDEG {
                    self.turns -= 1;
                } else if delta < -HALF_TURN_MDEG {
                    self.turns += 1;
                }
                let position = self.turns.saturating_mul(FULL_TURN_MDEG).saturating_add(angle_mdeg);
                let dt = now_us.saturating_sub(prev_us);
                if dt > 0 {
                    let v = (position as i64 - self.position as i64) * 1_000_000 / dt as i64;
                    self.velocity = v.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
                }
                self.position = position;
            }
        }
        self.last = Some((angle_mdeg, now_us));
        (self.position, self.velocity)
    }

    pub fn position(&self) -> i32 {
        self.position
    }

    pub fn velocity(&self) -> i32 {
        self.velocity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_hal::HalError;
    use tandem_hal_sim::{SimBus, SimClock, SimTrace};

    #[test]
    fn test_decode_quarter_turn() {
        let s = decode_frame(encode_frame(4096, false)).unwrap();
        assert_eq!(s.raw, 4096);
        assert_eq!(s.angle_mdeg, 90_000);
    }

    #[test]
    fn test_parity_and_error_flag() {
        let good = encode_frame(1, false);
        assert_eq!(decode_frame(good ^ 0x0002), Err(DriverError::Parity));
        assert_eq!(
            decode_frame(encode_frame(1, true)),
            Err(DriverError::SensorFault)
        );
    }

    #[test]
    fn test_unwrap_across_zero() {
        let mut t = EncoderTracker::new();
        assert_eq!(t.update(350_000, 0), (350_000, 0));
        // +20° across the wrap in 1 ms
        let (pos, vel) = t.update(10_000, 1_000);
        assert_eq!(pos, 370_000);
        assert_eq!(vel, 20_000_000);
        // and back down
        let (pos, _) = t.update(355_000, 2_000);
        assert_eq!(pos, 355_000);
    }

    #[test]
    fn test_read_position_over_bus() {
        let mut bus = SimBus::new(SimClock::new(), SimTrace::new());
        let dev = DeviceId(2);
        bus.push_reply(dev, &encode_frame(8192, false).to_be_bytes());
        let link = EncoderLink::new([dev, DeviceId(3)], 100);
        let s = link.read_position(&mut bus, MotorId::M0).unwrap();
        assert_eq!(s.angle_mdeg, 180_000);

        bus.inject_fault(dev, HalError::Timeout);
        assert_eq!(
            link.read_position(&mut bus, MotorId::M0),
            Err(DriverError::Bus(HalError::Timeout))
        );
    }
}
