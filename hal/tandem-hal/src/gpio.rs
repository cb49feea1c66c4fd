//! Digital I/O capabilities
//!
//! Driver enable lines, the emergency-stop input and status LEDs are all
//! plain digital pins. Reads and writes are single register accesses and
//! are safe to call from interrupt context.

/// Logic level on a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// Level that asserts a signal with the given polarity
    pub fn active(active_low: bool) -> Self {
        if active_low {
            Level::Low
        } else {
            Level::High
        }
    }

    /// Level that releases a signal with the given polarity
    pub fn inactive(active_low: bool) -> Self {
        if active_low {
            Level::High
        } else {
            Level::Low
        }
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Digital output pin
pub trait OutputPin {
    /// Drive the pin to `level`
    fn write(&mut self, level: Level);

    /// Level the pin is currently driven to
    fn output_level(&self) -> Level;

    /// Set the pin high (logic 1)
    fn set_high(&mut self) {
        self.write(Level::High);
    }

    /// Set the pin low (logic 0)
    fn set_low(&mut self) {
        self.write(Level::Low);
    }
}

/// Digital input pin
pub trait InputPin {
    /// Sample the pin
    fn read(&self) -> Level;

    /// Check if the pin reads high (logic 1)
    fn is_high(&self) -> bool {
        self.read() == Level::High
    }

    /// Check if the pin reads low (logic 0)
    fn is_low(&self) -> bool {
        self.read() == Level::Low
    }
}
