//! Simulated digital pins

use std::sync::{Arc, Mutex};

use tandem_hal::{InputPin, Level, OutputPin};

use crate::trace::{SimTrace, TraceEntry};

#[derive(Debug)]
struct PinState {
    level: Level,
    writes: Vec<Level>,
}

/// A pin usable as output (kernel side) or input (driven by the test)
#[derive(Debug, Clone)]
pub struct SimPin {
    name: &'static str,
    state: Arc<Mutex<PinState>>,
    trace: SimTrace,
}

impl SimPin {
    pub fn new(name: &'static str, initial: Level, trace: SimTrace) -> Self {
        Self {
            name,
            state: Arc::new(Mutex::new(PinState {
                level: initial,
                writes: Vec::new(),
            })),
            trace,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Change the level seen by readers without recording a kernel write
    pub fn drive(&self, level: Level) {
        self.with(|s| s.level = level);
    }

    /// Levels written by the kernel, oldest first
    pub fn writes(&self) -> Vec<Level> {
        self.with(|s| s.writes.clone())
    }

    pub fn level(&self) -> Level {
        self.with(|s| s.level)
    }

    fn with<R>(&self, f: impl FnOnce(&mut PinState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

impl OutputPin for SimPin {
    fn write(&mut self, level: Level) {
        self.with(|s| {
            s.level = level;
            s.writes.push(level);
        });
        self.trace.record(TraceEntry::PinWrite {
            pin: self.name,
            level,
        });
    }

    fn output_level(&self) -> Level {
        self.level()
    }
}

impl InputPin for SimPin {
    fn read(&self) -> Level {
        self.level()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_are_traced_and_drives_are_not() {
        let trace = SimTrace::new();
        let mut pin = SimPin::new("en", Level::High, trace.clone());
        pin.drive(Level::Low);
        pin.set_high();
        pin.set_low();
        assert_eq!(pin.writes(), vec![Level::High, Level::Low]);
        assert_eq!(trace.entries().len(), 2);
        assert!(pin.is_low());
    }
}
