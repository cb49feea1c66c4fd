//! Scriptable simulated bus
//!
//! Each device answers through a responder closure, a queue of one-shot
//! replies, or all zeros. Faults can be injected per device or for the
//! next transfer regardless of device. Every transfer charges latency to
//! the virtual clock; a simulated timeout charges the full timeout.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use tandem_hal::bus::check_lengths;
use tandem_hal::{BusTransaction, DeviceId, HalError};

use crate::clock::SimClock;
use crate::trace::{SimTrace, TraceEntry};

type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

/// Completed (or failed) transfer as seen by the simulation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub device: DeviceId,
    pub tx: Vec<u8>,
    pub result: Result<(), HalError>,
    pub started_at_us: u64,
}

#[derive(Default)]
struct BusState {
    responders: BTreeMap<DeviceId, Responder>,
    replies: BTreeMap<DeviceId, VecDeque<Vec<u8>>>,
    device_faults: BTreeMap<DeviceId, VecDeque<HalError>>,
    next_fault: VecDeque<HalError>,
    transfers: Vec<Transfer>,
    latency_us: u64,
    per_byte_us: u64,
}

/// Simulated full-duplex bus
#[derive(Clone)]
pub struct SimBus {
    state: Arc<Mutex<BusState>>,
    clock: SimClock,
    trace: SimTrace,
}

impl SimBus {
    pub fn new(clock: SimClock, trace: SimTrace) -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState::default())),
            clock,
            trace,
        }
    }

    /// Fixed cost per transfer plus cost per byte, in microseconds
    pub fn set_latency(&self, per_transfer_us: u64, per_byte_us: u64) {
        self.with(|s| {
            s.latency_us = per_transfer_us;
            s.per_byte_us = per_byte_us;
        });
    }

    /// Answer every transfer to `device` through `f(tx) -> rx`
    pub fn set_responder(
        &self,
        device: DeviceId,
        f: impl FnMut(&[u8]) -> Vec<u8> + Send + 'static,
    ) {
        self.with(|s| {
            s.responders.insert(device, Box::new(f));
        });
    }

    /// Queue a one-shot reply for `device`, used before any responder
    pub fn push_reply(&self, device: DeviceId, rx: &[u8]) {
        self.with(|s| s.replies.entry(device).or_default().push_back(rx.to_vec()));
    }

    /// Fail the next transfer to `device` with `error`
    pub fn inject_fault(&self, device: DeviceId, error: HalError) {
        self.with(|s| s.device_faults.entry(device).or_default().push_back(error));
    }

    /// Fail the next transfer to any device with `error`
    pub fn fail_next(&self, error: HalError) {
        self.with(|s| s.next_fault.push_back(error));
    }

    /// All transfers so far, oldest first
    pub fn transfers(&self) -> Vec<Transfer> {
        self.with(|s| s.transfers.clone())
    }

    /// Transfers addressed to `device`
    pub fn transfers_to(&self, device: DeviceId) -> Vec<Transfer> {
        self.with(|s| {
            s.transfers
                .iter()
                .filter(|t| t.device == device)
                .cloned()
                .collect()
        })
    }

    pub fn clear_transfers(&self) {
        self.with(|s| s.transfers.clear());
    }

    fn with<R>(&self, f: impl FnOnce(&mut BusState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

impl BusTransaction for SimBus {
    fn transfer(
        &mut self,
        device: DeviceId,
        tx: &[u8],
        rx: &mut [u8],
        timeout_us: u32,
    ) -> Result<(), HalError> {
        check_lengths(tx, rx)?;
        let started_at_us = tandem_hal::Timer::now_micros(&self.clock);

        let (result, charge_us) = self.with(|s| {
            let fault = s
                .next_fault
                .pop_front()
                .or_else(|| s.device_faults.get_mut(&device).and_then(|q| q.pop_front()));

            let cost = s.latency_us + s.per_byte_us * tx.len() as u64;
            let outcome = match fault {
                Some(HalError::Timeout) => (Err(HalError::Timeout), timeout_us as u64),
                Some(err) => (Err(err), cost),
                None if cost > timeout_us as u64 => (Err(HalError::Timeout), timeout_us as u64),
                None => {
                    let reply = match s.replies.get_mut(&device).and_then(|q| q.pop_front()) {
                        Some(reply) => reply,
                        None => match s.responders.get_mut(&device) {
                            Some(responder) => responder(tx),
                            None => Vec::new(),
                        },
                    };
                    rx.fill(0);
                    let n = reply.len().min(rx.len());
                    rx[..n].copy_from_slice(&reply[..n]);
                    (Ok(()), cost)
                }
            };

            s.transfers.push(Transfer {
                device,
                tx: tx.to_vec(),
                result: outcome.0,
                started_at_us,
            });
            outcome
        });

        self.clock.advance(charge_us);
        self.trace.record(TraceEntry::Transfer {
            device,
            tx: tx.to_vec(),
            result,
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_hal::Timer;

    fn bus() -> (SimBus, SimClock) {
        let clock = SimClock::new();
        (SimBus::new(clock.clone(), SimTrace::new()), clock)
    }

    #[test]
    fn test_reply_order() {
        let (mut bus, _) = bus();
        let dev = DeviceId(1);
        bus.set_responder(dev, |tx| tx.iter().map(|b| b.wrapping_add(1)).collect());
        bus.push_reply(dev, &[9, 9]);

        let mut rx = [0u8; 2];
        bus.transfer(dev, &[1, 2], &mut rx, 100).unwrap();
        assert_eq!(rx, [9, 9]);
        bus.transfer(dev, &[1, 2], &mut rx, 100).unwrap();
        assert_eq!(rx, [2, 3]);
    }

    #[test]
    fn test_injected_timeout_charges_timeout() {
        let (mut bus, clock) = bus();
        bus.inject_fault(DeviceId(0), HalError::Timeout);
        let mut rx = [0u8; 1];
        assert_eq!(
            bus.transfer(DeviceId(0), &[0], &mut rx, 250),
            Err(HalError::Timeout)
        );
        assert_eq!(clock.now_micros(), 250);
        // Fault was one-shot
        assert_eq!(bus.transfer(DeviceId(0), &[0], &mut rx, 250), Ok(()));
    }

    #[test]
    fn test_latency_beyond_timeout() {
        let (mut bus, _) = bus();
        bus.set_latency(50, 10);
        let mut rx = [0u8; 5];
        assert_eq!(
            bus.transfer(DeviceId(0), &[0; 5], &mut rx, 80),
            Err(HalError::Timeout)
        );
        assert_eq!(bus.transfer(DeviceId(0), &[0; 5], &mut rx, 100), Ok(()));
        assert_eq!(bus.transfers().len(), 2);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let (mut bus, _) = bus();
        let mut rx = [0u8; 1];
        assert_eq!(
            bus.transfer(DeviceId(0), &[1, 2], &mut rx, 100),
            Err(HalError::InvalidParameter)
        );
        assert!(bus.transfers().is_empty());
    }
}
