//! Emergency stop from the button interrupt and from software

mod common;

use std::sync::{Arc, Mutex, OnceLock};
use std::task::{Wake, Waker};

use common::{is_xtarget, Rig};
use embassy_futures::block_on;
use tandem_core::interrupt::{IrqSource, PriorityTable};
use tandem_core::motor::driver::is_hold_datagram;
use tandem_core::motor::{MotorCommand, MotorId};
use tandem_core::safety::{
    EventSource, FailSafeState, ResetError, SafetyEventKind, StopSource, MANUAL_RESET_KEY,
};
use tandem_core::tasks::{PeriodOutcome, TaskId, TelemetryTask};
use tandem_hal::{DeviceId, HalError, IrqPriority, InterruptLine, Level, Timer};
use tandem_hal_sim::TraceEntry;

// The interrupt handler is a plain fn, so the rig it acts on is a static
static RIG: OnceLock<Rig> = OnceLock::new();

fn on_estop_irq() {
    if let Some(rig) = RIG.get() {
        let now = rig.board.clock.now_micros();
        rig.kernel.emergency_stop(rig.outputs, StopSource::Button, now);
    }
}

// Waker registered for the button line, woken by the bank interrupt
static ARMED: Mutex<Option<Waker>> = Mutex::new(None);

fn on_bank_irq() {
    if let Some(waker) = ARMED.lock().unwrap().take() {
        waker.wake();
    }
}

/// Waker whose wake is the stop sequence
struct StopOnWake(&'static Rig);

impl Wake for StopOnWake {
    fn wake(self: Arc<Self>) {
        let rig = self.0;
        rig.kernel
            .emergency_stop(rig.outputs, StopSource::Button, rig.board.clock.now_micros());
    }
}

fn is_hold(entry: &TraceEntry) -> bool {
    matches!(entry, TraceEntry::Transfer { tx, .. } if is_hold_datagram(tx))
}

#[test]
fn test_button_stops_before_queued_commands_and_latches() {
    let rig = RIG.get_or_init(Rig::new);
    let mut line = rig.board.estop_line.clone();
    PriorityTable::new()
        .register(&mut line, IrqSource::EmergencyStop, on_estop_irq)
        .unwrap();
    assert_eq!(line.priority(), Some(IrqPriority::HIGHEST));

    let mut monitor = rig.safety_monitor();
    let mut control = rig.motor_control();
    monitor.start();
    block_on(control.run_period());
    assert!(rig.energized());

    for target in [30_000, 60_000, 90_000] {
        rig.kernel.submit(MotorCommand::move_to(MotorId::M0, target, 0)).unwrap();
    }
    rig.board.trace.clear();

    assert!(rig.board.press_estop());
    // De-energized inside the handler, before any task ran
    let entries = rig.board.trace.entries();
    assert_eq!(entries[0], TraceEntry::Interrupt { line: "estop_irq" });
    assert_eq!(
        &entries[1..3],
        &[
            TraceEntry::PinWrite {
                pin: "enable0",
                level: Level::High
            },
            TraceEntry::PinWrite {
                pin: "enable1",
                level: Level::High
            },
        ]
    );
    assert!(rig.kernel.estop.is_latched());
    assert!(rig.kernel.motor_task.is_suspended());

    // Motor control holds both drivers and discards the queue
    assert_eq!(
        block_on(control.run_period()),
        PeriodOutcome::Suspended { discarded: 3 }
    );
    let holds = rig.board.trace.entries().iter().filter(|e| is_hold(e)).count();
    assert_eq!(holds, 2);
    assert_eq!(rig.board.trace.position(is_xtarget), None);
    assert_eq!(rig.kernel.counters().discarded_commands, 3);

    // The monitor turns the stop into FAULT
    assert_eq!(block_on(monitor.run_period()), FailSafeState::Fault);
    assert_eq!(monitor.machine().cause(), Some(SafetyEventKind::EmergencyStop));
    assert_eq!(rig.kernel.counters().estop_trips, 1);

    // Latched across periods; later commands never reach a driver
    rig.kernel.submit(MotorCommand::move_to(MotorId::M1, 45_000, 0)).unwrap();
    for _ in 0..5 {
        block_on(control.run_period());
        assert_eq!(block_on(monitor.run_period()), FailSafeState::Fault);
    }
    assert!(rig.kernel.estop.is_latched());
    assert!(!rig.energized());
    assert_eq!(rig.board.trace.position(is_xtarget), None);

    let mut telemetry = TelemetryTask::new(rig.kernel, rig.board.clock.clone());
    let report = block_on(telemetry.snapshot()).unwrap();
    assert_eq!(report.fail_safe, FailSafeState::Fault.code());
    assert!(report.estop_latched);

    // Reset needs the button released and the right key
    rig.kernel.reset_request.signal(MANUAL_RESET_KEY);
    block_on(monitor.run_period());
    assert_eq!(monitor.last_reset(), Some(Err(ResetError::EstopAsserted)));

    rig.board.release_estop();
    rig.kernel.reset_request.signal(0x1234_5678);
    block_on(monitor.run_period());
    assert_eq!(monitor.last_reset(), Some(Err(ResetError::BadKey)));
    assert_eq!(monitor.state(), FailSafeState::Fault);

    rig.kernel.reset_request.signal(MANUAL_RESET_KEY);
    assert_eq!(block_on(monitor.run_period()), FailSafeState::Safe);
    assert_eq!(monitor.last_reset(), Some(Ok(())));
    assert!(!rig.kernel.estop.is_latched());
    assert!(!rig.kernel.motor_task.is_suspended());

    assert!(matches!(
        block_on(control.run_period()),
        PeriodOutcome::Ran { .. }
    ));
    assert!(rig.energized());
}

#[test]
fn test_software_stop_is_idempotent() {
    let rig = Rig::new();
    let mut monitor = rig.safety_monitor();
    monitor.start();

    let source = StopSource::Software(TaskId::CommandRx);
    assert!(rig.kernel.emergency_stop(rig.outputs, source, 10));
    assert!(!rig.kernel.emergency_stop(rig.outputs, source, 20));
    assert_eq!(rig.kernel.counters().estop_trips, 1);
    assert!(rig.kernel.monitor_wake.is_pending());

    let events = rig.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, SafetyEventKind::EmergencyStop);
    assert_eq!(events[0].source, EventSource::Task(TaskId::CommandRx));
    assert_eq!(events[0].timestamp_us, 10);
}

#[test]
fn test_reset_refused_when_nothing_to_reset() {
    let rig = Rig::new();
    let mut monitor = rig.safety_monitor();
    monitor.start();

    rig.kernel.reset_request.signal(MANUAL_RESET_KEY);
    assert_eq!(block_on(monitor.run_period()), FailSafeState::Safe);
    assert_eq!(monitor.last_reset(), Some(Err(ResetError::NotFaulted)));
}

#[test]
fn test_failed_hold_is_retried_and_reported() {
    let rig = Rig::new();
    let mut monitor = rig.safety_monitor();
    let mut control = rig.motor_control();
    monitor.start();
    block_on(control.run_period());

    let holds_to = |device| {
        rig.board
            .bus
            .transfers_to(device)
            .iter()
            .filter(|t| t.result.is_ok() && is_hold_datagram(&t.tx))
            .count()
    };

    rig.kernel.emergency_stop(rig.outputs, StopSource::Button, rig.board.clock.now_micros());
    rig.board.bus.inject_fault(DeviceId(0), HalError::Timeout);
    assert_eq!(
        block_on(control.run_period()),
        PeriodOutcome::Suspended { discarded: 0 }
    );
    assert_eq!(holds_to(DeviceId(0)), 0);
    assert_eq!(holds_to(DeviceId(1)), 1);
    assert_eq!(rig.kernel.counters().bus_faults, 1);

    let events = rig.drain_events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, SafetyEventKind::EmergencyStop);
    assert_eq!(events[1].kind, SafetyEventKind::BusFault);
    assert_eq!(events[1].motor(), Some(MotorId::M0));

    // Retried on the next period, then not again for the same latch
    block_on(control.run_period());
    assert_eq!(holds_to(DeviceId(0)), 1);
    for _ in 0..3 {
        block_on(control.run_period());
    }
    assert_eq!(holds_to(DeviceId(0)), 1);
    assert_eq!(holds_to(DeviceId(1)), 2);
    assert!(rig.drain_events().is_empty());
}

#[test]
fn test_stop_runs_in_waker_called_by_bank_interrupt() {
    let rig: &'static Rig = Box::leak(Box::new(Rig::new()));
    let mut line = rig.board.estop_line.clone();
    PriorityTable::new()
        .register(&mut line, IrqSource::EmergencyStop, on_bank_irq)
        .unwrap();

    let mut monitor = rig.safety_monitor();
    let mut control = rig.motor_control();
    monitor.start();
    block_on(control.run_period());
    assert!(rig.energized());

    *ARMED.lock().unwrap() = Some(Waker::from(Arc::new(StopOnWake(rig))));
    rig.board.trace.clear();
    assert!(rig.board.press_estop());

    // Outputs off inside the interrupt, no task polled in between
    let entries = rig.board.trace.entries();
    assert_eq!(entries[0], TraceEntry::Interrupt { line: "estop_irq" });
    assert!(matches!(entries[1], TraceEntry::PinWrite { pin: "enable0", level: Level::High }));
    assert!(matches!(entries[2], TraceEntry::PinWrite { pin: "enable1", level: Level::High }));
    assert!(rig.kernel.estop.is_latched());
    assert!(rig.kernel.motor_task.is_suspended());
    assert!(rig.kernel.monitor_wake.is_pending());
    assert!(ARMED.lock().unwrap().is_none());
}
