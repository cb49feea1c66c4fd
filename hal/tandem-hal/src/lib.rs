//! Tandem Hardware Abstraction Boundary
//!
//! This crate defines the capability traits that the control kernel is
//! written against. Concrete peripherals live behind these traits so the
//! same kernel runs on real hardware or on the deterministic simulation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Kernel (tandem-core, tandem-firmware)  │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  tandem-hal (this crate - traits)       │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │  tandem-hal-  │       │  tandem-hal-  │
//! │    rp2040     │       │      sim      │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`gpio::OutputPin`], [`gpio::InputPin`] - Digital I/O
//! - [`bus::BusTransaction`] - Synchronous full-duplex bus transfer
//! - [`timer::Timer`] - Microsecond monotonic clock and delay
//! - [`irq::InterruptLine`], [`irq::InterruptControl`] - Interrupt registration and masking
//! - [`watchdog::WatchdogTimer`] - Independent hardware timeout

#![no_std]
#![deny(unsafe_code)]

pub mod bus;
pub mod error;
pub mod gpio;
pub mod irq;
pub mod timer;
pub mod watchdog;

// Re-export key traits at crate root for convenience
pub use bus::{BusConfig, BusTransaction, DeviceId};
pub use error::HalError;
pub use gpio::{InputPin, Level, OutputPin};
pub use irq::{InterruptControl, InterruptLine, InterruptMask, IrqHandler, IrqPriority};
pub use timer::Timer;
pub use watchdog::WatchdogTimer;
