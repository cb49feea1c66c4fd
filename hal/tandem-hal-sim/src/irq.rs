//! Simulated interrupt lines and global mask

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tandem_hal::{HalError, InterruptControl, InterruptLine, InterruptMask, IrqHandler, IrqPriority};

use crate::trace::{SimTrace, TraceEntry};

#[derive(Debug, Default)]
struct LineState {
    handler: Option<IrqHandler>,
    priority: Option<IrqPriority>,
    fired: u32,
}

/// Interrupt line whose handler a test invokes with [`fire`](Self::fire)
#[derive(Debug, Clone)]
pub struct SimInterruptLine {
    name: &'static str,
    state: Arc<Mutex<LineState>>,
    trace: SimTrace,
}

impl SimInterruptLine {
    pub fn new(name: &'static str, trace: SimTrace) -> Self {
        Self {
            name,
            state: Arc::new(Mutex::new(LineState::default())),
            trace,
        }
    }

    /// Run the registered handler synchronously, as the hardware would
    ///
    /// Returns `false` when no handler is registered.
    pub fn fire(&self) -> bool {
        // Copy the fn pointer out so the handler runs without the lock held
        let handler = {
            let mut s = self.state.lock().unwrap_or_else(|e| e.into_inner());
            s.fired += 1;
            s.handler
        };
        match handler {
            Some(handler) => {
                self.trace.record(TraceEntry::Interrupt { line: self.name });
                handler();
                true
            }
            None => false,
        }
    }

    /// Number of times the line was fired
    pub fn fired(&self) -> u32 {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).fired
    }

    pub fn is_registered(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .handler
            .is_some()
    }
}

impl InterruptLine for SimInterruptLine {
    fn register(&mut self, handler: IrqHandler, priority: IrqPriority) -> Result<(), HalError> {
        let mut s = self.state.lock().unwrap_or_else(|e| e.into_inner());
        s.handler = Some(handler);
        s.priority = Some(priority);
        Ok(())
    }

    fn unregister(&mut self) {
        let mut s = self.state.lock().unwrap_or_else(|e| e.into_inner());
        s.handler = None;
        s.priority = None;
    }

    fn priority(&self) -> Option<IrqPriority> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).priority
    }
}

/// Global interrupt enable flag with call counters
#[derive(Debug, Clone)]
pub struct SimInterruptControl {
    enabled: Arc<AtomicBool>,
    disables: Arc<AtomicU32>,
    restores: Arc<AtomicU32>,
}

impl Default for SimInterruptControl {
    fn default() -> Self {
        Self::new()
    }
}

impl SimInterruptControl {
    /// Interrupts start enabled
    pub fn new() -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(true)),
            disables: Arc::new(AtomicU32::new(0)),
            restores: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Number of save-and-disable calls
    pub fn disable_calls(&self) -> u32 {
        self.disables.load(Ordering::SeqCst)
    }

    /// Number of restore calls
    pub fn restore_calls(&self) -> u32 {
        self.restores.load(Ordering::SeqCst)
    }

    /// Force the flag, e.g. to model code that starts with interrupts off
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }
}

impl InterruptControl for SimInterruptControl {
    fn save_and_disable(&self) -> InterruptMask {
        self.disables.fetch_add(1, Ordering::SeqCst);
        InterruptMask {
            was_enabled: self.enabled.swap(false, Ordering::SeqCst),
        }
    }

    fn restore(&self, mask: InterruptMask) {
        self.restores.fetch_add(1, Ordering::SeqCst);
        self.enabled.store(mask.was_enabled, Ordering::SeqCst);
    }

    fn interrupts_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}
