//! Emergency stop
//!
//! The stop sequence runs to completion from any context, interrupt
//! included, and never waits on anything:
//!
//! 1. driver enable outputs are de-energized
//! 2. the latch is set
//! 3. the Motor Control Task is suspended
//! 4. one `EmergencyStop` safety event is raised per latch
//!
//! The latch survives until a manual reset with the reset key while the
//! e-stop input is released.

use core::cell::RefCell;

use portable_atomic::{AtomicBool, AtomicU32, Ordering};
use tandem_hal::{InputPin, Level, OutputPin};

use super::events::{EventSource, SafetyEvent, SafetyEventKind, SafetyEventSink};
use super::state::ResetError;
use crate::config::NUM_MOTORS;
use crate::tasks::{TaskControl, TaskId};

/// Key a reset request must carry
pub const MANUAL_RESET_KEY: u32 = 0x5AFE_C1EA;

/// Driver enable outputs shared between tasks and the e-stop interrupt
pub type SharedOutputs<P> = critical_section::Mutex<RefCell<EnableOutputs<P>>>;

/// What requested the stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopSource {
    /// Physical e-stop input
    Button,
    /// A task asked for it
    Software(TaskId),
    /// Safe stop after entering FAULT
    Fault,
}

impl StopSource {
    fn code(self) -> u8 {
        match self {
            StopSource::Button => 1,
            StopSource::Software(_) => 2,
            StopSource::Fault => 3,
        }
    }

    fn event_source(self) -> EventSource {
        match self {
            StopSource::Button => EventSource::Interrupt,
            StopSource::Software(task) => EventSource::Task(task),
            StopSource::Fault => EventSource::Task(TaskId::SafetyMonitor),
        }
    }
}

/// Enable lines of both motor drivers
pub struct EnableOutputs<P: OutputPin> {
    pins: [P; NUM_MOTORS],
    active_low: bool,
    energized: bool,
}

impl<P: OutputPin> EnableOutputs<P> {
    /// Take the pins and drive them inactive
    pub fn new(pins: [P; NUM_MOTORS], active_low: bool) -> Self {
        let mut outputs = Self {
            pins,
            active_low,
            energized: true,
        };
        outputs.deenergize();
        outputs
    }

    pub fn shared(self) -> SharedOutputs<P> {
        critical_section::Mutex::new(RefCell::new(self))
    }

    pub fn deenergize(&mut self) {
        let level = Level::inactive(self.active_low);
        for pin in self.pins.iter_mut() {
            pin.write(level);
        }
        self.energized = false;
    }

    pub fn energize(&mut self) {
        let level = Level::active(self.active_low);
        for pin in self.pins.iter_mut() {
            pin.write(level);
        }
        self.energized = true;
    }

    pub fn is_energized(&self) -> bool {
        self.energized
    }
}

pub struct EmergencyStop {
    latched: AtomicBool,
    /// Bus-level hold still to be issued by the Motor Control Task
    hold_pending: AtomicBool,
    trips: AtomicU32,
}

impl Default for EmergencyStop {
    fn default() -> Self {
        Self::new()
    }
}

impl EmergencyStop {
    pub const fn new() -> Self {
        Self {
            latched: AtomicBool::new(false),
            hold_pending: AtomicBool::new(false),
            trips: AtomicU32::new(0),
        }
    }

    /// Run the stop sequence
    ///
    /// Idempotent: a second call while latched still de-energizes the
    /// outputs and suspends motor control but raises no further event.
    /// Returns `true` if this call set the latch.
    pub fn execute<P: OutputPin>(
        &self,
        outputs: &mut EnableOutputs<P>,
        source: StopSource,
        now_us: u64,
        motor_task: &TaskControl,
        events: &dyn SafetyEventSink,
    ) -> bool {
        outputs.deenergize();
        let first = !self.latched.swap(true, Ordering::AcqRel);
        motor_task.suspend();
        if first {
            self.hold_pending.store(true, Ordering::Release);
            self.trips.fetch_add(1, Ordering::Relaxed);
            let event = SafetyEvent::new(SafetyEventKind::EmergencyStop, source.event_source(), now_us)
                .with_detail(source.code());
            let _ = events.raise(event);
            error!("EMERGENCY STOP ({:?})", source);
        }
        first
    }

    /// Same as [`execute`](Self::execute) on outputs behind a critical section
    pub fn execute_shared<P: OutputPin>(
        &self,
        outputs: &SharedOutputs<P>,
        source: StopSource,
        now_us: u64,
        motor_task: &TaskControl,
        events: &dyn SafetyEventSink,
    ) -> bool {
        critical_section::with(|cs| {
            let mut outputs = outputs.borrow_ref_mut(cs);
            self.execute(&mut outputs, source, now_us, motor_task, events)
        })
    }

    pub fn is_latched(&self) -> bool {
        self.latched.load(Ordering::Acquire)
    }

    /// Claim the pending bus-level hold, once per latch
    pub fn take_hold_request(&self) -> bool {
        self.hold_pending.swap(false, Ordering::AcqRel)
    }

    /// Put back a hold that could not be issued
    pub fn defer_hold_request(&self) {
        if self.is_latched() {
            self.hold_pending.store(true, Ordering::Release);
        }
    }

    /// Latches since boot
    pub fn trips(&self) -> u32 {
        self.trips.load(Ordering::Relaxed)
    }

    /// Check a reset request without changing anything
    pub fn check_reset<I: InputPin>(&self, key: u32, input: &I, active_low: bool) -> Result<(), ResetError> {
        if key != MANUAL_RESET_KEY {
            return Err(ResetError::BadKey);
        }
        if input.read() == Level::active(active_low) {
            return Err(ResetError::EstopAsserted);
        }
        Ok(())
    }

    /// Clear the latch; only called by the Safety Monitor after
    /// [`check_reset`](Self::check_reset) passed
    pub fn clear(&self) {
        self.hold_pending.store(false, Ordering::Release);
        if self.latched.swap(false, Ordering::AcqRel) {
            info!("emergency stop latch cleared");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::BoundedQueue;
    use tandem_hal_sim::{SimPin, SimTrace};

    fn pins(trace: &SimTrace) -> [SimPin; NUM_MOTORS] {
        [
            SimPin::new("enable0", Level::High, trace.clone()),
            SimPin::new("enable1", Level::High, trace.clone()),
        ]
    }

    #[test]
    fn test_outputs_start_deenergized() {
        let trace = SimTrace::new();
        let p = pins(&trace);
        let mut outputs = EnableOutputs::new(p.clone(), true);
        assert_eq!(p[0].writes(), vec![Level::High]);
        outputs.energize();
        assert_eq!(p[1].level(), Level::Low);
        assert!(outputs.is_energized());
    }

    #[test]
    fn test_execute_is_idempotent() {
        let trace = SimTrace::new();
        let p = pins(&trace);
        let mut outputs = EnableOutputs::new(p.clone(), true);
        outputs.energize();
        let estop = EmergencyStop::new();
        let task = TaskControl::new();
        let q: BoundedQueue<SafetyEvent, 4> = BoundedQueue::new("events");

        assert!(estop.execute(&mut outputs, StopSource::Button, 7, &task, &q));
        assert!(!estop.execute(&mut outputs, StopSource::Button, 8, &task, &q));
        assert!(estop.is_latched());
        assert!(task.is_suspended());
        assert_eq!(p[0].level(), Level::High);
        assert_eq!(estop.trips(), 1);
        assert_eq!(q.len(), 1);
        assert_eq!(q.try_receive().unwrap().source, EventSource::Interrupt);

        assert!(estop.take_hold_request());
        assert!(!estop.take_hold_request());
    }

    #[test]
    fn test_reset_needs_key_and_released_input() {
        let trace = SimTrace::new();
        let input = SimPin::new("estop", Level::Low, trace);
        let estop = EmergencyStop::new();
        assert_eq!(estop.check_reset(0, &input, true), Err(ResetError::BadKey));
        assert_eq!(
            estop.check_reset(MANUAL_RESET_KEY, &input, true),
            Err(ResetError::EstopAsserted)
        );
        input.drive(Level::High);
        assert_eq!(estop.check_reset(MANUAL_RESET_KEY, &input, true), Ok(()));
    }
}
