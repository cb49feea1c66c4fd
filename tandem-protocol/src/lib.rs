//! Tandem host link protocol
//!
//! This crate defines the serial protocol between a host (PC, PLC or
//! pendant) and the Tandem controller. The controller never trusts the
//! link for safety: every command it decodes still goes through the
//! kernel's position enforcer, and silence on the link is itself a fault.
//!
//! # Protocol Overview
//!
//! All messages use a simple binary frame format:
//! ```text
//! ┌───────┬────────┬──────┬─────────────┬──────────┐
//! │ START │ LENGTH │ TYPE │ PAYLOAD     │ CHECKSUM │
//! │ 1B    │ 1B     │ 1B   │ 0–64B       │ 1B       │
//! └───────┴────────┴──────┴─────────────┴──────────┘
//! ```
//!
//! Multi-byte integers inside payloads are little-endian.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod frame;
pub mod messages;
pub mod telemetry;

pub use frame::{Frame, FrameError, FrameParser, FRAME_START, MAX_PAYLOAD_SIZE};
pub use messages::{AckStatus, CommandKind, DeviceMessage, HostMessage};
pub use telemetry::{CounterSnapshot, MotorSnapshot, Telemetry, TELEMETRY_LEN};
