//! Message types for the host link
//!
//! Message types are divided into two categories:
//! - Host → Controller: motion commands, heartbeat, manual reset request
//! - Controller → Host: telemetry, command acknowledgements

use crate::frame::{Frame, FrameError};
use crate::telemetry::Telemetry;

// Message type IDs: Host → Controller
pub const MSG_COMMAND: u8 = 0x10;
pub const MSG_HEARTBEAT: u8 = 0x11;
pub const MSG_RESET_REQUEST: u8 = 0x12;

// Message type IDs: Controller → Host
pub const MSG_TELEMETRY: u8 = 0x80;
pub const MSG_ACK: u8 = 0x81;

/// Motion command kind as carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandKind {
    MoveToPosition,
    MoveToVelocity,
    Stop,
    Configure,
}

impl CommandKind {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(CommandKind::MoveToPosition),
            0x02 => Some(CommandKind::MoveToVelocity),
            0x03 => Some(CommandKind::Stop),
            0x04 => Some(CommandKind::Configure),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            CommandKind::MoveToPosition => 0x01,
            CommandKind::MoveToVelocity => 0x02,
            CommandKind::Stop => 0x03,
            CommandKind::Configure => 0x04,
        }
    }
}

/// Messages parsed from host-originated frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HostMessage {
    /// Motion command for one axis
    ///
    /// `value` is in millidegrees for positions and millidegrees per second
    /// for velocities.
    Command {
        seq: u8,
        motor: u8,
        kind: CommandKind,
        value: i32,
    },
    /// Link keep-alive
    Heartbeat,
    /// Request to clear a latched fault; `key` must match the controller's
    ResetRequest { key: u32 },
}

impl HostMessage {
    /// Parse a message from a frame
    pub fn from_frame(frame: &Frame) -> Result<Self, FrameError> {
        let p = frame.payload.as_slice();
        match frame.msg_type {
            MSG_COMMAND => {
                // [seq][motor][kind][value: i32 LE]
                if p.len() != 7 {
                    return Err(FrameError::InvalidFrame);
                }
                let kind = CommandKind::from_byte(p[2]).ok_or(FrameError::InvalidFrame)?;
                Ok(HostMessage::Command {
                    seq: p[0],
                    motor: p[1],
                    kind,
                    value: i32::from_le_bytes([p[3], p[4], p[5], p[6]]),
                })
            }
            MSG_HEARTBEAT => Ok(HostMessage::Heartbeat),
            MSG_RESET_REQUEST => {
                let key: [u8; 4] = p.try_into().map_err(|_| FrameError::InvalidFrame)?;
                Ok(HostMessage::ResetRequest {
                    key: u32::from_le_bytes(key),
                })
            }
            _ => Err(FrameError::UnknownType),
        }
    }

    /// Encode this message into a frame (host side and tests)
    pub fn to_frame(&self) -> Result<Frame, FrameError> {
        match *self {
            HostMessage::Command {
                seq,
                motor,
                kind,
                value,
            } => {
                let v = value.to_le_bytes();
                Frame::new(
                    MSG_COMMAND,
                    &[seq, motor, kind.to_byte(), v[0], v[1], v[2], v[3]],
                )
            }
            HostMessage::Heartbeat => Ok(Frame::empty(MSG_HEARTBEAT)),
            HostMessage::ResetRequest { key } => Frame::new(MSG_RESET_REQUEST, &key.to_le_bytes()),
        }
    }
}

/// Why a command was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AckStatus {
    Accepted,
    /// Command queue was full, command dropped
    QueueFull,
    /// Motor id out of range
    BadMotor,
    /// Emergency stop latched, motion refused
    Latched,
    /// Reset key wrong or e-stop still asserted
    ResetRefused,
}

impl AckStatus {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(AckStatus::Accepted),
            1 => Some(AckStatus::QueueFull),
            2 => Some(AckStatus::BadMotor),
            3 => Some(AckStatus::Latched),
            4 => Some(AckStatus::ResetRefused),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            AckStatus::Accepted => 0,
            AckStatus::QueueFull => 1,
            AckStatus::BadMotor => 2,
            AckStatus::Latched => 3,
            AckStatus::ResetRefused => 4,
        }
    }
}

/// Messages from the controller to the host
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceMessage {
    Telemetry(Telemetry),
    Ack { seq: u8, status: AckStatus },
}

impl DeviceMessage {
    pub fn to_frame(&self) -> Result<Frame, FrameError> {
        match self {
            DeviceMessage::Telemetry(t) => Frame::new(MSG_TELEMETRY, &t.to_bytes()),
            DeviceMessage::Ack { seq, status } => Frame::new(MSG_ACK, &[*seq, status.to_byte()]),
        }
    }

    /// Parse a controller frame (host side and tests)
    pub fn from_frame(frame: &Frame) -> Result<Self, FrameError> {
        let p = frame.payload.as_slice();
        match frame.msg_type {
            MSG_TELEMETRY => Ok(DeviceMessage::Telemetry(Telemetry::from_bytes(p)?)),
            MSG_ACK => match p {
                [seq, status] => Ok(DeviceMessage::Ack {
                    seq: *seq,
                    status: AckStatus::from_byte(*status).ok_or(FrameError::InvalidFrame)?,
                }),
                _ => Err(FrameError::InvalidFrame),
            },
            _ => Err(FrameError::UnknownType),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_layout() {
        let msg = HostMessage::Command {
            seq: 9,
            motor: 1,
            kind: CommandKind::MoveToPosition,
            value: -2,
        };
        let frame = msg.to_frame().unwrap();
        assert_eq!(frame.msg_type, MSG_COMMAND);
        assert_eq!(frame.payload.as_slice(), &[9, 1, 0x01, 0xFE, 0xFF, 0xFF, 0xFF]);
        assert_eq!(HostMessage::from_frame(&frame), Ok(msg));
    }

    #[test]
    fn test_command_bad_kind() {
        let frame = Frame::new(MSG_COMMAND, &[0, 0, 0x7F, 0, 0, 0, 0]).unwrap();
        assert_eq!(HostMessage::from_frame(&frame), Err(FrameError::InvalidFrame));
    }

    #[test]
    fn test_command_short_payload() {
        let frame = Frame::new(MSG_COMMAND, &[0, 0, 0x01]).unwrap();
        assert_eq!(HostMessage::from_frame(&frame), Err(FrameError::InvalidFrame));
    }

    #[test]
    fn test_reset_request() {
        let frame = HostMessage::ResetRequest { key: 0x5AFE_C1EA }.to_frame().unwrap();
        assert_eq!(frame.payload.as_slice(), &[0xEA, 0xC1, 0xFE, 0x5A]);
        assert_eq!(
            HostMessage::from_frame(&frame),
            Ok(HostMessage::ResetRequest { key: 0x5AFE_C1EA })
        );
        let truncated = Frame::new(MSG_RESET_REQUEST, &[0xEA, 0xC1]).unwrap();
        assert_eq!(HostMessage::from_frame(&truncated), Err(FrameError::InvalidFrame));
    }

    #[test]
    fn test_unknown_type() {
        assert_eq!(
            HostMessage::from_frame(&Frame::empty(0x42)),
            Err(FrameError::UnknownType)
        );
    }

    #[test]
    fn test_ack() {
        let msg = DeviceMessage::Ack {
            seq: 3,
            status: AckStatus::QueueFull,
        };
        let frame = msg.to_frame().unwrap();
        assert_eq!(frame.payload.as_slice(), &[3, 1]);
        assert_eq!(DeviceMessage::from_frame(&frame), Ok(msg));
    }
}
