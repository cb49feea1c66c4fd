//! RP2040 implementation of the Tandem hardware abstraction boundary
//!
//! This crate maps the `tandem-hal` capability traits onto RP2040
//! peripherals through `embassy-rp` and `embedded-hal` 1.0:
//!
//! - Driver enable outputs and the raw emergency-stop input
//! - SPI bus with one chip select per device
//! - Monotonic microsecond timer
//! - PRIMASK-based global interrupt masking
//! - Software interrupt lines that run the interrupt executors
//! - NVIC priority boosting for contended kernel mutexes
//! - RP2040 hardware watchdog

#![no_std]

pub mod boost;
pub mod gpio;
pub mod irq;
pub mod spi;
pub mod timer;
pub mod watchdog;

pub use boost::{NvicBoost, Tier};
pub use gpio::{RpOutput, SioInput};
pub use irq::{PrimaskControl, SwiLine};
pub use spi::ChipSelectBus;
pub use timer::RpTimer;
pub use watchdog::RpWatchdog;
