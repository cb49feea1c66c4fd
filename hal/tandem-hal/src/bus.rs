//! Synchronous bus transactions
//!
//! Motor drivers and encoders share one full-duplex bus. Each device is
//! addressed by a [`DeviceId`] that the implementation maps to a chip
//! select. Callers serialize access through the kernel's bus mutex; the
//! trait itself assumes exclusive `&mut` access.

use crate::error::HalError;

/// Logical device on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceId(pub u8);

/// Full-duplex bus master
pub trait BusTransaction {
    /// Clock out `tx` while clocking in the same number of bytes into `rx`
    ///
    /// The transfer length is `tx.len()`; `rx` must be exactly as long,
    /// otherwise [`HalError::InvalidParameter`] is returned before any
    /// byte is sent. A transfer that does not finish within `timeout_us`
    /// returns [`HalError::Timeout`].
    fn transfer(
        &mut self,
        device: DeviceId,
        tx: &[u8],
        rx: &mut [u8],
        timeout_us: u32,
    ) -> Result<(), HalError>;
}

impl<B: BusTransaction + ?Sized> BusTransaction for &mut B {
    fn transfer(
        &mut self,
        device: DeviceId,
        tx: &[u8],
        rx: &mut [u8],
        timeout_us: u32,
    ) -> Result<(), HalError> {
        (**self).transfer(device, tx, rx, timeout_us)
    }
}

/// Check the length contract shared by all implementations
pub fn check_lengths(tx: &[u8], rx: &[u8]) -> Result<(), HalError> {
    if tx.is_empty() || tx.len() != rx.len() {
        return Err(HalError::InvalidParameter);
    }
    Ok(())
}

/// Bus configuration
#[derive(Debug, Clone, Copy)]
pub struct BusConfig {
    /// Clock frequency in Hz
    pub frequency: u32,
    /// Clock mode
    pub mode: Mode,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            frequency: 4_000_000, // 4 MHz
            mode: Mode::Mode3,
        }
    }
}

/// Clock mode (combined polarity and phase)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Mode 0: CPOL=0, CPHA=0
    Mode0,
    /// Mode 1: CPOL=0, CPHA=1
    Mode1,
    /// Mode 2: CPOL=1, CPHA=0
    Mode2,
    /// Mode 3: CPOL=1, CPHA=1
    Mode3,
}

impl Mode {
    /// Clock idles high
    pub fn idle_high(self) -> bool {
        matches!(self, Mode::Mode2 | Mode::Mode3)
    }

    /// Data captured on the second clock transition
    pub fn capture_second(self) -> bool {
        matches!(self, Mode::Mode1 | Mode::Mode3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_contract() {
        assert_eq!(check_lengths(&[1, 2], &[0, 0]), Ok(()));
        assert_eq!(check_lengths(&[1, 2], &[0]), Err(HalError::InvalidParameter));
        assert_eq!(check_lengths(&[], &[]), Err(HalError::InvalidParameter));
    }

    #[test]
    fn test_mode_bits() {
        assert!(Mode::Mode3.idle_high());
        assert!(Mode::Mode3.capture_second());
        assert!(!Mode::Mode0.idle_high());
        assert!(!Mode::Mode0.capture_second());
        assert!(Mode::Mode1.capture_second());
        assert!(Mode::Mode2.idle_high());
    }
}
