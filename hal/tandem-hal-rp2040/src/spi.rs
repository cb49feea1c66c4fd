//! SPI bus shared by the motor drivers and encoders

use embassy_rp::spi::{Config, Phase, Polarity};
use embassy_time::{Duration, Instant};
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;
use tandem_hal::bus::check_lengths;
use tandem_hal::{BusConfig, BusTransaction, DeviceId, HalError};

/// Translate the HAB bus settings into an embassy SPI configuration
pub fn spi_config(bus: &BusConfig) -> Config {
    let mut config = Config::default();
    config.frequency = bus.frequency;
    config.polarity = if bus.mode.idle_high() {
        Polarity::IdleHigh
    } else {
        Polarity::IdleLow
    };
    config.phase = if bus.mode.capture_second() {
        Phase::CaptureOnSecondTransition
    } else {
        Phase::CaptureOnFirstTransition
    };
    config
}

/// Blocking SPI master with one active-low chip select per device
///
/// `DeviceId(n)` selects `selects[n]`. The RP2040 SPI block cannot abort a
/// transfer in flight, so the timeout is checked once the last byte is
/// clocked; a slow transfer still reports [`HalError::Timeout`].
pub struct ChipSelectBus<B, CS, const N: usize> {
    bus: B,
    selects: [CS; N],
}

impl<B: SpiBus<u8>, CS: OutputPin, const N: usize> ChipSelectBus<B, CS, N> {
    /// Take the bus and deselect every device
    pub fn new(bus: B, mut selects: [CS; N]) -> Self {
        for cs in selects.iter_mut() {
            let _ = cs.set_high();
        }
        Self { bus, selects }
    }
}

impl<B: SpiBus<u8>, CS: OutputPin, const N: usize> BusTransaction for ChipSelectBus<B, CS, N> {
    fn transfer(
        &mut self,
        device: DeviceId,
        tx: &[u8],
        rx: &mut [u8],
        timeout_us: u32,
    ) -> Result<(), HalError> {
        check_lengths(tx, rx)?;
        let Self { bus, selects } = self;
        let cs = selects
            .get_mut(device.0 as usize)
            .ok_or(HalError::InvalidParameter)?;

        let started = Instant::now();
        cs.set_low().map_err(|_| HalError::Bus)?;
        let result = bus.transfer(rx, tx).and_then(|()| bus.flush());
        let released = cs.set_high();
        result.map_err(|_| HalError::Bus)?;
        released.map_err(|_| HalError::Bus)?;

        if started.elapsed() > Duration::from_micros(timeout_us as u64) {
            return Err(HalError::Timeout);
        }
        Ok(())
    }
}
