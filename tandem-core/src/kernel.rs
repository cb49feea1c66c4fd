//! Shared kernel objects
//!
//! Everything the tasks and interrupt handlers share lives in one
//! [`Kernel`], created once at startup and then only used by reference.
//! Hardware resources (the bus and the driver enable outputs) are kept
//! outside so the kernel itself stays independent of the board.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use portable_atomic::{AtomicU32, AtomicU8, Ordering};
use tandem_hal::OutputPin;
use tandem_protocol::{CounterSnapshot, MotorSnapshot, Telemetry};

use crate::config::{ConfigError, SystemConfig, NUM_MOTORS};
use crate::ipc::{BinarySignal, BoundedQueue, IpcError, PiMutex, PriorityBoost};
use crate::motor::{MotorCommand, MotorState, MotorStates};
use crate::safety::{
    EmergencyStop, FailSafeState, LinkLiveness, PositionSafetyEnforcer, SafetyEvent,
    SafetyEventQueue, SafetyEventSink, SharedOutputs, StopSource,
};
use crate::tasks::{Priority, TaskControl, TaskHandle, TaskId, TaskTable, TaskTableError};

/// Motor command queue depth
pub const COMMAND_QUEUE_LEN: usize = 8;

/// Safety event queue depth
pub const EVENT_QUEUE_LEN: usize = 4;

/// Handles of the four system tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskHandles {
    pub safety_monitor: TaskHandle,
    pub motor_control: TaskHandle,
    pub command_rx: TaskHandle,
    pub telemetry: TaskHandle,
}

impl TaskHandles {
    pub fn get(&self, id: TaskId) -> TaskHandle {
        match id {
            TaskId::SafetyMonitor => self.safety_monitor,
            TaskId::MotorControl => self.motor_control,
            TaskId::CommandRx => self.command_rx,
            TaskId::Telemetry => self.telemetry,
        }
    }
}

/// Event counters not owned by a primitive
#[derive(Default)]
pub struct Counters {
    pub mutex_timeouts: AtomicU32,
    pub bus_faults: AtomicU32,
    pub overruns: AtomicU32,
    /// Commands flushed from the queue while motor control was suspended
    pub discarded_commands: AtomicU32,
}

impl Counters {
    pub const fn new() -> Self {
        Self {
            mutex_timeouts: AtomicU32::new(0),
            bus_faults: AtomicU32::new(0),
            overruns: AtomicU32::new(0),
            discarded_commands: AtomicU32::new(0),
        }
    }

    pub fn bump(counter: &AtomicU32) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU32, n: u32) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

pub struct Kernel {
    pub config: SystemConfig,
    pub tasks: TaskHandles,
    /// Host commands to the Motor Control Task
    pub commands: BoundedQueue<MotorCommand, COMMAND_QUEUE_LEN>,
    /// Safety events to the Safety Monitor Task
    pub safety_events: SafetyEventQueue<EVENT_QUEUE_LEN>,
    pub motor_state: PiMutex<MotorStates>,
    pub estop: EmergencyStop,
    pub motor_task: TaskControl,
    pub enforcer: PositionSafetyEnforcer,
    pub link: LinkLiveness,
    /// Reset key from the host, consumed by the Safety Monitor
    pub reset_request: Signal<CriticalSectionRawMutex, u32>,
    /// Runs the Safety Monitor ahead of its next deadline
    pub monitor_wake: BinarySignal,
    pub counters: Counters,
    fail_safe: AtomicU8,
}

impl Kernel {
    /// Build the kernel from a configuration, validating it first
    pub fn new(config: SystemConfig, boost: &'static dyn PriorityBoost) -> Result<Self, ConfigError> {
        config.validate()?;
        let t = &config.tasks;
        let handle = |id, timing: crate::config::TaskTiming| TaskHandle::new(id, Priority(timing.priority));
        let tasks = TaskHandles {
            safety_monitor: handle(TaskId::SafetyMonitor, t.safety_monitor),
            motor_control: handle(TaskId::MotorControl, t.motor_control),
            command_rx: handle(TaskId::CommandRx, t.command_rx),
            telemetry: handle(TaskId::Telemetry, t.telemetry),
        };
        info!(
            "kernel: control {} us, monitor {} us",
            t.motor_control.period_us, t.safety_monitor.period_us
        );

        Ok(Self {
            tasks,
            commands: BoundedQueue::new("commands"),
            safety_events: SafetyEventQueue::new(),
            motor_state: PiMutex::new("motor_state", [MotorState::default(); NUM_MOTORS], boost),
            estop: EmergencyStop::new(),
            motor_task: TaskControl::new(),
            enforcer: PositionSafetyEnforcer::new(config.limits, config.timeouts.persistent_violation_limit),
            link: LinkLiveness::new(),
            reset_request: Signal::new(),
            monitor_wake: BinarySignal::new(),
            counters: Counters::new(),
            fail_safe: AtomicU8::new(FailSafeState::Init.code()),
            config,
        })
    }

    /// Task table for the configured task set
    pub fn task_table<E>(&self, entry: impl FnMut(TaskId) -> E) -> Result<TaskTable<E, 4>, TaskTableError> {
        TaskTable::from_config(&self.config.tasks, entry)
    }

    /// Current fail-safe state as last published by the Safety Monitor
    pub fn fail_safe_state(&self) -> FailSafeState {
        FailSafeState::from_code(self.fail_safe.load(Ordering::Acquire)).unwrap_or(FailSafeState::Fault)
    }

    pub(crate) fn publish_state(&self, state: FailSafeState) {
        self.fail_safe.store(state.code(), Ordering::Release);
    }

    /// Queue a motion command without blocking
    pub fn submit(&self, command: MotorCommand) -> Result<(), IpcError> {
        self.commands.try_send(command)
    }

    /// Raise a safety event without blocking
    pub fn raise(&self, event: SafetyEvent) -> Result<(), IpcError> {
        self.safety_events.raise(event)
    }

    /// Software emergency stop, callable from any task or interrupt
    pub fn emergency_stop<P: OutputPin>(&self, outputs: &SharedOutputs<P>, source: StopSource, now_us: u64) -> bool {
        let first = self
            .estop
            .execute_shared(outputs, source, now_us, &self.motor_task, &self.safety_events);
        self.monitor_wake.signal_from_interrupt();
        first
    }

    pub fn counters(&self) -> CounterSnapshot {
        let c = &self.counters;
        CounterSnapshot {
            command_drops: self.commands.dropped(),
            event_drops: self.safety_events.dropped(),
            mutex_timeouts: c.mutex_timeouts.load(Ordering::Relaxed),
            bus_faults: c.bus_faults.load(Ordering::Relaxed),
            overruns: c.overruns.load(Ordering::Relaxed),
            estop_trips: self.estop.trips(),
            discarded_commands: c.discarded_commands.load(Ordering::Relaxed),
        }
    }

    /// Assemble a telemetry record from a motor state snapshot
    pub fn telemetry(&self, motors: &MotorStates, now_us: u64) -> Telemetry {
        Telemetry {
            uptime_ms: now_us / 1_000,
            fail_safe: self.fail_safe_state().code(),
            estop_latched: self.estop.is_latched(),
            motors: [MotorSnapshot::from(&motors[0]), MotorSnapshot::from(&motors[1])],
            counters: self.counters(),
        }
    }
}
