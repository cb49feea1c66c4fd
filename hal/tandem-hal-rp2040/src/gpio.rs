//! Digital I/O on RP2040 GPIO

use core::convert::Infallible;

use embassy_rp::pac;
use embedded_hal::digital::OutputPin as EhOutputPin;
use tandem_hal::{InputPin, Level, OutputPin};

/// Number of user GPIOs in bank 0
pub const GPIO_COUNT: u8 = 30;

/// Push-pull output over any infallible `embedded-hal` pin
///
/// The driven level is tracked locally so it can be read back through a
/// shared reference, which the emergency-stop path needs.
pub struct RpOutput<P> {
    pin: P,
    level: Level,
}

impl<P: EhOutputPin<Error = Infallible>> RpOutput<P> {
    /// Wrap `pin`, driving it to `initial` right away
    pub fn new(pin: P, initial: Level) -> Self {
        let mut out = Self { pin, level: initial };
        out.write(initial);
        out
    }
}

impl<P: EhOutputPin<Error = Infallible>> OutputPin for RpOutput<P> {
    fn write(&mut self, level: Level) {
        let result = match level {
            Level::Low => self.pin.set_low(),
            Level::High => self.pin.set_high(),
        };
        if let Err(never) = result {
            match never {}
        }
        self.level = level;
    }

    fn output_level(&self) -> Level {
        self.level
    }
}

/// Raw input sample from the SIO input register
///
/// Reads the pad without owning it, so the emergency-stop pin can be
/// awaited for edges by its interrupt task and sampled by the Safety
/// Monitor at the same time. The pin must be configured as an input by
/// its owner.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SioInput {
    mask: u32,
}

impl SioInput {
    /// Sample GPIO `gpio`; `None` for a pin outside bank 0
    pub const fn new(gpio: u8) -> Option<Self> {
        if gpio >= GPIO_COUNT {
            return None;
        }
        Some(Self { mask: 1 << gpio })
    }
}

impl InputPin for SioInput {
    fn read(&self) -> Level {
        Level::from((pac::SIO.gpio_in().read() & self.mask) != 0)
    }
}
