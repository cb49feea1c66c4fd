//! Board pin map and peripheral types
//!
//! | Signal            | GPIO |
//! |-------------------|------|
//! | Host link TX/RX   | 0/1  |
//! | Driver 0/1 enable | 10/11|
//! | E-stop button     | 15   |
//! | SPI0 MISO         | 16   |
//! | CS driver 0       | 17   |
//! | SPI0 SCK          | 18   |
//! | SPI0 MOSI         | 19   |
//! | CS driver 1       | 20   |
//! | CS encoder 0/1    | 21/22|

use embassy_rp::gpio::Output;
use embassy_rp::peripherals::SPI0;
use embassy_rp::spi::{Blocking, Spi};
use tandem_core::tasks::{MotorControlTask, SafetyMonitorTask};
use tandem_hal_rp2040::{ChipSelectBus, RpOutput, RpTimer, RpWatchdog, SioInput};

include!(concat!(env!("OUT_DIR"), "/board.rs"));

/// GPIO number of the emergency-stop input
pub const ESTOP_GPIO: u8 = 15;

/// Devices on the shared SPI bus
pub const BUS_DEVICES: usize = 4;

pub type Bus = ChipSelectBus<Spi<'static, SPI0, Blocking>, Output<'static>, BUS_DEVICES>;
pub type EnablePin = RpOutput<Output<'static>>;

pub type Monitor = SafetyMonitorTask<'static, Bus, EnablePin, SioInput, RpTimer, RpWatchdog>;
pub type Control = MotorControlTask<'static, Bus, EnablePin, RpTimer>;
