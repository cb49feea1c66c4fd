//! Outbound host link queue
//!
//! Acknowledgements from the command receiver and telemetry records share
//! one UART transmitter. Producers never wait: a full outbox drops the
//! message.

use defmt::*;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use portable_atomic::{AtomicU32, Ordering};
use tandem_protocol::DeviceMessage;

/// Messages waiting for the transmitter
pub static OUTBOX: Channel<CriticalSectionRawMutex, DeviceMessage, 8> = Channel::new();

static DROPPED: AtomicU32 = AtomicU32::new(0);

/// Queue `msg` for transmission
pub fn send(msg: DeviceMessage) {
    if OUTBOX.try_send(msg).is_err() {
        let dropped = DROPPED.fetch_add(1, Ordering::Relaxed) + 1;
        warn!("link outbox full, {} messages dropped", dropped);
    }
}
