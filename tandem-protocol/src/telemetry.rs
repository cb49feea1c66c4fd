//! Telemetry payload
//!
//! Layout (little-endian):
//! ```text
//! [uptime_ms: u64][fail_safe: u8][estop: u8]
//! 2 × [position: i32][velocity: i32][driver_flags: u8][thermal: u8][stall: u8]
//! 7 × counter: u32
//! ```

use crate::frame::FrameError;

/// Size of an encoded telemetry payload
pub const TELEMETRY_LEN: usize = 8 + 1 + 1 + 2 * MOTOR_LEN + 7 * 4;

const MOTOR_LEN: usize = 4 + 4 + 3;

/// One axis as reported to the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorSnapshot {
    /// Millidegrees
    pub position: i32,
    /// Millidegrees per second
    pub velocity: i32,
    /// Raw driver status bits
    pub driver_flags: u8,
    pub thermal: bool,
    pub stall: bool,
}

/// Kernel counters as reported to the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CounterSnapshot {
    pub command_drops: u32,
    pub event_drops: u32,
    pub mutex_timeouts: u32,
    pub bus_faults: u32,
    pub overruns: u32,
    pub estop_trips: u32,
    pub discarded_commands: u32,
}

/// Controller status snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Telemetry {
    pub uptime_ms: u64,
    /// Fail-safe state code: 0 init, 1 safe, 2 warning, 3 fault
    pub fail_safe: u8,
    pub estop_latched: bool,
    pub motors: [MotorSnapshot; 2],
    pub counters: CounterSnapshot,
}

struct Writer<'a> {
    buf: &'a mut [u8; TELEMETRY_LEN],
    at: usize,
}

impl Writer<'_> {
    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.at..self.at + bytes.len()].copy_from_slice(bytes);
        self.at += bytes.len();
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    at: usize,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.at..self.at + N]);
        self.at += N;
        out
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn flag(&mut self) -> Result<bool, FrameError> {
        match self.u8() {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(FrameError::InvalidFrame),
        }
    }

    fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take())
    }
}

impl Telemetry {
    pub fn to_bytes(&self) -> [u8; TELEMETRY_LEN] {
        let mut buf = [0u8; TELEMETRY_LEN];
        let mut w = Writer { buf: &mut buf, at: 0 };
        w.put(&self.uptime_ms.to_le_bytes());
        w.put(&[self.fail_safe, self.estop_latched as u8]);
        for m in &self.motors {
            w.put(&m.position.to_le_bytes());
            w.put(&m.velocity.to_le_bytes());
            w.put(&[m.driver_flags, m.thermal as u8, m.stall as u8]);
        }
        let c = &self.counters;
        for v in [
            c.command_drops,
            c.event_drops,
            c.mutex_timeouts,
            c.bus_faults,
            c.overruns,
            c.estop_trips,
            c.discarded_commands,
        ] {
            w.put(&v.to_le_bytes());
        }
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() != TELEMETRY_LEN {
            return Err(FrameError::InvalidFrame);
        }
        let mut r = Reader { buf: bytes, at: 0 };
        let uptime_ms = r.u64();
        let fail_safe = r.u8();
        let estop_latched = r.flag()?;
        let mut motors = [MotorSnapshot::default(); 2];
        for m in motors.iter_mut() {
            m.position = r.i32();
            m.velocity = r.i32();
            m.driver_flags = r.u8();
            m.thermal = r.flag()?;
            m.stall = r.flag()?;
        }
        let counters = CounterSnapshot {
            command_drops: r.u32(),
            event_drops: r.u32(),
            mutex_timeouts: r.u32(),
            bus_faults: r.u32(),
            overruns: r.u32(),
            estop_trips: r.u32(),
            discarded_commands: r.u32(),
        };
        Ok(Self {
            uptime_ms,
            fail_safe,
            estop_latched,
            motors,
            counters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::MAX_PAYLOAD_SIZE;

    #[test]
    fn test_fits_in_one_frame() {
        assert!(TELEMETRY_LEN <= MAX_PAYLOAD_SIZE);
    }

    #[test]
    fn test_layout_offsets() {
        let t = Telemetry {
            uptime_ms: 1,
            fail_safe: 2,
            estop_latched: true,
            motors: [
                MotorSnapshot {
                    position: 180_000,
                    velocity: -5,
                    driver_flags: 0x81,
                    thermal: false,
                    stall: true,
                },
                MotorSnapshot::default(),
            ],
            counters: CounterSnapshot {
                discarded_commands: 0xAABBCCDD,
                ..Default::default()
            },
        };
        let b = t.to_bytes();
        assert_eq!(&b[..10], &[1, 0, 0, 0, 0, 0, 0, 0, 2, 1]);
        assert_eq!(&b[10..14], &180_000i32.to_le_bytes());
        assert_eq!(b[18], 0x81);
        assert_eq!(b[20], 1);
        assert_eq!(&b[TELEMETRY_LEN - 4..], &[0xDD, 0xCC, 0xBB, 0xAA]);
        assert_eq!(Telemetry::from_bytes(&b), Ok(t));
    }

    #[test]
    fn test_rejects_bad_flag_and_length() {
        let mut b = Telemetry::default().to_bytes();
        assert_eq!(
            Telemetry::from_bytes(&b[..TELEMETRY_LEN - 1]),
            Err(FrameError::InvalidFrame)
        );
        b[9] = 7;
        assert_eq!(Telemetry::from_bytes(&b), Err(FrameError::InvalidFrame));
    }

    #[test]
    fn test_uptime_past_u32_millis() {
        // About 58 days
        let t = Telemetry {
            uptime_ms: 5_000_000_000,
            ..Default::default()
        };
        assert_eq!(Telemetry::from_bytes(&t.to_bytes()).map(|t| t.uptime_ms), Ok(5_000_000_000));
    }
}
