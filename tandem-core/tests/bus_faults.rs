//! Bus failures and bus contention

mod common;

use std::time::{Duration as StdDuration, Instant};

use common::{microsteps, xtarget_writes, Rig};
use embassy_futures::block_on;
use tandem_core::ipc::IpcError;
use tandem_core::motor::{MotorCommand, MotorId};
use tandem_core::safety::{EventPayload, FailSafeState, SafetyEvent, SafetyEventKind, Severity};
use tandem_core::tasks::{PeriodOutcome, TaskId};
use tandem_core::timing::micros;
use tandem_hal::{DeviceId, HalError};

#[test]
fn test_bus_timeout_raises_event_then_recovers() {
    let rig = Rig::new();
    let mut monitor = rig.safety_monitor();
    let mut control = rig.motor_control();
    monitor.start();

    rig.kernel.submit(MotorCommand::move_to(MotorId::M0, 90_000, 0)).unwrap();
    rig.board.bus.inject_fault(DeviceId(0), HalError::Timeout);
    assert_eq!(
        block_on(control.run_period()),
        PeriodOutcome::Ran { executed: None }
    );

    let events = rig.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, SafetyEventKind::BusFault);
    assert_eq!(events[0].severity(), Severity::Info);
    assert_eq!(events[0].motor(), Some(MotorId::M0));
    assert_eq!(rig.kernel.counters().bus_faults, 1);

    // Next period runs normally
    rig.kernel.submit(MotorCommand::move_to(MotorId::M0, 45_000, 0)).unwrap();
    assert_eq!(
        block_on(control.run_period()),
        PeriodOutcome::Ran {
            executed: Some(MotorCommand::move_to(MotorId::M0, 45_000, 0))
        }
    );
    assert_eq!(xtarget_writes(&rig.board.bus, DeviceId(0)), vec![microsteps(45_000)]);
    assert!(rig.drain_events().is_empty());

    // A transient bus fault alone does not degrade the system
    rig.kernel.raise(events[0]).unwrap();
    assert_eq!(block_on(monitor.run_period()), FailSafeState::Safe);
}

#[test]
fn test_encoder_fault_carries_sensor_payload() {
    let rig = Rig::new();
    let mut monitor = rig.safety_monitor();
    let mut control = rig.motor_control();
    monitor.start();

    rig.board.bus.inject_fault(DeviceId(3), HalError::Bus);
    rig.board.bus.inject_fault(DeviceId(2), HalError::Bus);
    block_on(control.run_period());

    // Both failures are counted, only the first becomes an event
    assert_eq!(rig.kernel.counters().bus_faults, 2);
    let events = rig.drain_events();
    assert_eq!(events.len(), 1);
    match events[0].payload {
        EventPayload::Sensor(fault) => assert_eq!(fault.encoder, MotorId::M0),
        other => panic!("unexpected payload {:?}", other),
    }
}

#[test]
fn test_monitor_acquire_times_out_while_bus_held() {
    let rig = Rig::new();
    let holder = rig.kernel.tasks.telemetry;
    let guard = rig.bus.try_acquire(holder).unwrap();
    assert_eq!(rig.bus.holder(), Some(holder));

    let started = Instant::now();
    let timeout = micros(rig.kernel.config.timeouts.monitor_mutex_us);
    let result = block_on(rig.bus.acquire(rig.kernel.tasks.safety_monitor, timeout));
    assert_eq!(result.err(), Some(IpcError::Timeout));
    assert!(started.elapsed() < StdDuration::from_secs(1));
    assert_eq!(rig.bus.timeouts(), 1);

    drop(guard);
    assert!(block_on(rig.bus.acquire(rig.kernel.tasks.safety_monitor, timeout)).is_ok());
}

#[test]
fn test_safe_stop_does_not_wait_for_held_bus() {
    let rig = Rig::new();
    let mut monitor = rig.safety_monitor();
    monitor.start();

    let _guard = rig.bus.try_acquire(rig.kernel.tasks.command_rx).unwrap();
    rig.kernel
        .raise(SafetyEvent::from_task(SafetyEventKind::Stall, TaskId::MotorControl, 0))
        .unwrap();
    assert_eq!(block_on(monitor.run_period()), FailSafeState::Fault);

    // The controlled stop was skipped, the outputs still went down
    assert!(rig.board.bus.transfers().is_empty());
    assert!(!rig.energized());
    assert!(rig.kernel.estop.is_latched());
    assert_eq!(rig.kernel.counters().mutex_timeouts, 1);
}

#[test]
fn test_control_keeps_command_when_bus_unavailable() {
    let rig = Rig::new();
    let mut monitor = rig.safety_monitor();
    let mut control = rig.motor_control();
    monitor.start();

    rig.kernel.submit(MotorCommand::move_to(MotorId::M1, 30_000, 0)).unwrap();
    let guard = rig.bus.try_acquire(rig.kernel.tasks.telemetry).unwrap();
    assert_eq!(block_on(control.run_period()), PeriodOutcome::BusUnavailable);

    let events = rig.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, SafetyEventKind::MutexTimeout);
    assert_eq!(events[0].severity(), Severity::Info);

    drop(guard);
    assert_eq!(
        block_on(control.run_period()),
        PeriodOutcome::Ran {
            executed: Some(MotorCommand::move_to(MotorId::M1, 30_000, 0))
        }
    );
}
