//! Ordered record of simulated peripheral activity

use std::sync::{Arc, Mutex, MutexGuard};

use tandem_hal::{DeviceId, HalError, Level};

/// One observable peripheral action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEntry {
    /// Output pin driven
    PinWrite { pin: &'static str, level: Level },
    /// Bus transfer attempted (`result` is the outcome reported to the caller)
    Transfer {
        device: DeviceId,
        tx: Vec<u8>,
        result: Result<(), HalError>,
    },
    /// Interrupt handler invoked
    Interrupt { line: &'static str },
    /// Watchdog fed
    WatchdogFeed,
    /// Watchdog timeout fired
    WatchdogTrip,
}

/// Shared trace handle
#[derive(Debug, Clone, Default)]
pub struct SimTrace {
    entries: Arc<Mutex<Vec<TraceEntry>>>,
}

impl SimTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: TraceEntry) {
        self.lock().push(entry);
    }

    /// Snapshot of everything recorded so far
    pub fn entries(&self) -> Vec<TraceEntry> {
        self.lock().clone()
    }

    /// Forget recorded entries
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Index of the first entry matching `pred`
    pub fn position(&self, pred: impl Fn(&TraceEntry) -> bool) -> Option<usize> {
        self.lock().iter().position(pred)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TraceEntry>> {
        // A panicking test thread must not hide the trace from the others
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
