//! Task model
//!
//! The system runs a fixed set of four periodic tasks. Each one has a
//! unique priority (higher value preempts lower) and runs on an executor
//! tier of its own, so the priority is a property of where the task is
//! spawned rather than of a scheduler inside the kernel. The
//! [`TaskTable`] records the set and checks its constraints at startup.
//!
//! The task bodies are written as a synchronous-looking period step
//! (`run_period`) plus an endless loop that paces it on absolute
//! deadlines, so tests can drive single periods in virtual time.

pub mod comms;
pub mod motor_control;
pub mod safety_monitor;
pub mod telemetry;

pub use comms::CommandRxTask;
pub use motor_control::{MotorControlTask, PeriodOutcome};
pub use safety_monitor::SafetyMonitorTask;
pub use telemetry::TelemetryTask;

use heapless::Vec;
use portable_atomic::{AtomicBool, AtomicU32, Ordering};

use crate::config::{TaskSet, TaskTiming};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskId {
    SafetyMonitor,
    MotorControl,
    CommandRx,
    Telemetry,
}

impl TaskId {
    pub const ALL: [TaskId; 4] = [
        TaskId::SafetyMonitor,
        TaskId::MotorControl,
        TaskId::CommandRx,
        TaskId::Telemetry,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            TaskId::SafetyMonitor => "safety_monitor",
            TaskId::MotorControl => "motor_control",
            TaskId::CommandRx => "command_rx",
            TaskId::Telemetry => "telemetry",
        }
    }
}

/// Task priority; a higher value is more urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Priority(pub u8);

/// Identity of a running task as seen by IPC primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskHandle {
    pub id: TaskId,
    pub priority: Priority,
}

impl TaskHandle {
    pub const fn new(id: TaskId, priority: Priority) -> Self {
        Self { id, priority }
    }
}

/// One registered task
#[derive(Debug, Clone, Copy)]
pub struct TaskDescriptor<E> {
    pub name: &'static str,
    pub id: TaskId,
    pub priority: Priority,
    pub period_us: u32,
    pub stack_bytes: u32,
    pub entry: E,
}

impl<E> TaskDescriptor<E> {
    pub fn from_timing(id: TaskId, timing: TaskTiming, entry: E) -> Self {
        Self {
            name: id.name(),
            id,
            priority: Priority(timing.priority),
            period_us: timing.period_us,
            stack_bytes: timing.stack_bytes,
            entry,
        }
    }

    pub fn handle(&self) -> TaskHandle {
        TaskHandle::new(self.id, self.priority)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskTableError {
    DuplicatePriority,
    DuplicateId,
    ZeroPeriod,
    Full,
    Unknown,
}

/// Registered tasks
pub struct TaskTable<E, const N: usize = 4> {
    tasks: Vec<TaskDescriptor<E>, N>,
}

impl<E, const N: usize> Default for TaskTable<E, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E, const N: usize> TaskTable<E, N> {
    pub const fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    pub fn register(&mut self, task: TaskDescriptor<E>) -> Result<TaskHandle, TaskTableError> {
        if task.period_us == 0 {
            return Err(TaskTableError::ZeroPeriod);
        }
        if self.tasks.iter().any(|t| t.id == task.id) {
            return Err(TaskTableError::DuplicateId);
        }
        if self.tasks.iter().any(|t| t.priority == task.priority) {
            return Err(TaskTableError::DuplicatePriority);
        }
        let handle = task.handle();
        self.tasks.push(task).map_err(|_| TaskTableError::Full)?;
        debug!("task {} registered at priority {}", handle.id.name(), handle.priority.0);
        Ok(handle)
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskDescriptor<E>> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn handle(&self, id: TaskId) -> Result<TaskHandle, TaskTableError> {
        self.get(id).map(|t| t.handle()).ok_or(TaskTableError::Unknown)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks from most to least urgent
    pub fn by_priority(&self) -> Vec<&TaskDescriptor<E>, N> {
        let mut out: Vec<&TaskDescriptor<E>, N> = self.tasks.iter().collect();
        out.sort_unstable_by(|a, b| b.priority.cmp(&a.priority));
        out
    }
}

impl<E> TaskTable<E, 4> {
    /// Register the four system tasks from their configured timing
    pub fn from_config(tasks: &TaskSet, mut entry: impl FnMut(TaskId) -> E) -> Result<Self, TaskTableError> {
        let mut table = Self::new();
        let timings = [
            (TaskId::SafetyMonitor, tasks.safety_monitor),
            (TaskId::MotorControl, tasks.motor_control),
            (TaskId::CommandRx, tasks.command_rx),
            (TaskId::Telemetry, tasks.telemetry),
        ];
        for (id, timing) in timings {
            table.register(TaskDescriptor::from_timing(id, timing, entry(id)))?;
        }
        Ok(table)
    }
}

/// Cooperative suspension flag for a task
///
/// The emergency stop sets it from any context; the task checks it at the
/// start of every period and does nothing but hold its outputs safe while
/// it is set.
pub struct TaskControl {
    suspended: AtomicBool,
    suspensions: AtomicU32,
}

impl Default for TaskControl {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskControl {
    pub const fn new() -> Self {
        Self {
            suspended: AtomicBool::new(false),
            suspensions: AtomicU32::new(0),
        }
    }

    pub fn suspend(&self) {
        if !self.suspended.swap(true, Ordering::AcqRel) {
            self.suspensions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn resume(&self) {
        self.suspended.store(false, Ordering::Release);
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    pub fn suspensions(&self) -> u32 {
        self.suspensions.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() {}

    #[test]
    fn test_default_table() {
        let table = TaskTable::from_config(&TaskSet::default(), |_| noop as fn()).unwrap();
        assert_eq!(table.len(), 4);
        let order: std::vec::Vec<TaskId> = table.by_priority().iter().map(|t| t.id).collect();
        assert_eq!(order, TaskId::ALL.to_vec());
        assert_eq!(
            table.handle(TaskId::MotorControl),
            Ok(TaskHandle::new(TaskId::MotorControl, Priority(3)))
        );
    }

    #[test]
    fn test_duplicate_priority_rejected() {
        let mut tasks = TaskSet::default();
        tasks.telemetry.priority = tasks.command_rx.priority;
        assert_eq!(
            TaskTable::from_config(&tasks, |_| noop as fn()).err(),
            Some(TaskTableError::DuplicatePriority)
        );
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut table: TaskTable<fn(), 4> = TaskTable::new();
        let timing = TaskTiming::new(1, 1_000, 1024);
        table
            .register(TaskDescriptor::from_timing(TaskId::Telemetry, timing, noop as fn()))
            .unwrap();
        let again = TaskDescriptor::from_timing(TaskId::Telemetry, TaskTiming::new(2, 1_000, 1024), noop as fn());
        assert_eq!(table.register(again), Err(TaskTableError::DuplicateId));
    }

    #[test]
    fn test_suspend_counts_once() {
        let c = TaskControl::new();
        c.suspend();
        c.suspend();
        assert!(c.is_suspended());
        assert_eq!(c.suspensions(), 1);
        c.resume();
        assert!(!c.is_suspended());
    }
}
