//! Real-time coordination and safety kernel for the Tandem platform
//!
//! Everything between the host link and the two motor drivers that does
//! not depend on a specific board:
//!
//! - Task model, periodic timing and interrupt priority table
//! - Bounded queues, signals and priority-inheriting mutexes
//! - Motor driver and encoder exchanges over the shared bus
//! - Position limits, emergency stop, health checks and the fail-safe
//!   state machine
//! - The four system tasks, written against the hardware boundary traits
//!   so they run the same on the board and in host tests

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

#[macro_use]
mod fmt;

pub mod config;
pub mod interrupt;
pub mod ipc;
pub mod kernel;
pub mod motor;
pub mod safety;
pub mod tasks;
pub mod timing;

pub use config::{ConfigError, SystemConfig};
pub use kernel::{Kernel, COMMAND_QUEUE_LEN, EVENT_QUEUE_LEN};
pub use safety::{FailSafeState, SafetyEvent, SafetyEventKind, Severity};
pub use tasks::{Priority, TaskHandle, TaskId};
