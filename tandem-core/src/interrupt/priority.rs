//! Fixed interrupt priority assignment
//!
//! Hardware interrupt sources sit in a strict total order in
//! [`PriorityTable`]. Tasks that run on an interrupt executor get levels of
//! their own from [`TierLevels`], below the least urgent source, so every
//! interrupt handler preempts every task.

use core::cmp::Reverse;

use tandem_hal::{HalError, InterruptLine, IrqHandler, IrqPriority};

use crate::config::TaskSet;
use crate::tasks::{Priority, TaskId};

/// Every interrupt source the kernel knows about, most urgent first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IrqSource {
    /// Hardware emergency-stop button
    EmergencyStop,
    /// Control-loop timer tick
    ControlTimer,
    /// Bus transfer complete
    BusComplete,
    /// Host link receive/transmit
    Communication,
}

impl IrqSource {
    pub const ALL: [IrqSource; 4] = [
        IrqSource::EmergencyStop,
        IrqSource::ControlTimer,
        IrqSource::BusComplete,
        IrqSource::Communication,
    ];

    /// Position in the total order (0 is most urgent)
    pub const fn rank(self) -> usize {
        self as usize
    }
}

/// Priority level for each [`IrqSource`]
///
/// Lower numbers preempt higher ones. The table is fixed at init and must
/// be strictly increasing in [`IrqSource`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PriorityTable {
    levels: [IrqPriority; 4],
}

/// Priority table is not a strict total order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PriorityOrderError {
    pub source: IrqSource,
}

impl Default for PriorityTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityTable {
    /// Levels 0..=3, one per source
    pub const fn new() -> Self {
        Self {
            levels: [IrqPriority(0), IrqPriority(1), IrqPriority(2), IrqPriority(3)],
        }
    }

    /// Custom levels in [`IrqSource::ALL`] order
    pub fn with_levels(levels: [u8; 4]) -> Result<Self, PriorityOrderError> {
        let table = Self {
            levels: levels.map(IrqPriority),
        };
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> Result<(), PriorityOrderError> {
        for pair in IrqSource::ALL.windows(2) {
            if !self.priority(pair[0]).preempts(self.priority(pair[1])) {
                return Err(PriorityOrderError { source: pair[1] });
            }
        }
        Ok(())
    }

    pub fn priority(&self, source: IrqSource) -> IrqPriority {
        self.levels[source.rank()]
    }

    /// Install `handler` on `line` at the level assigned to `source`
    pub fn register<L: InterruptLine>(
        &self,
        line: &mut L,
        source: IrqSource,
        handler: IrqHandler,
    ) -> Result<(), HalError> {
        let priority = self.priority(source);
        debug!("irq {} -> priority {}", source.rank(), priority.0);
        line.register(handler, priority)
    }
}

/// Tasks that run on an interrupt executor
pub const EXECUTOR_TASKS: [TaskId; 2] = [TaskId::SafetyMonitor, TaskId::MotorControl];

/// Interrupt levels of the executor tiers
///
/// Ranked by configured task priority and placed on consecutive levels
/// directly below the least urgent [`IrqSource`]. Tasks on the thread
/// executor have no level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TierLevels {
    levels: [(TaskId, IrqPriority); EXECUTOR_TASKS.len()],
}

impl TierLevels {
    pub fn new(table: &PriorityTable, tasks: &TaskSet) -> Self {
        let floor = IrqSource::ALL
            .iter()
            .map(|&source| table.priority(source).0)
            .max()
            .unwrap_or(0);

        let mut ranked: [(TaskId, Priority, usize); EXECUTOR_TASKS.len()] =
            core::array::from_fn(|i| (EXECUTOR_TASKS[i], task_priority(tasks, EXECUTOR_TASKS[i]), i));
        // Most urgent first; ties keep the fixed order
        ranked.sort_unstable_by_key(|&(_, priority, i)| (Reverse(priority), i));

        let mut levels = [(TaskId::SafetyMonitor, IrqPriority(0)); EXECUTOR_TASKS.len()];
        for (rank, (slot, (id, _, _))) in levels.iter_mut().zip(ranked).enumerate() {
            *slot = (id, IrqPriority(floor.saturating_add(1 + rank as u8)));
        }
        Self { levels }
    }

    pub fn priority(&self, task: TaskId) -> Option<IrqPriority> {
        self.levels.iter().find(|(id, _)| *id == task).map(|&(_, level)| level)
    }

    /// Install an executor's `handler` on `line` at the level of `task`
    pub fn register<L: InterruptLine>(&self, line: &mut L, task: TaskId, handler: IrqHandler) -> Result<(), HalError> {
        let priority = self.priority(task).ok_or(HalError::InvalidParameter)?;
        debug!("tier {} -> priority {}", task.name(), priority.0);
        line.register(handler, priority)
    }
}

fn task_priority(tasks: &TaskSet, id: TaskId) -> Priority {
    let timing = match id {
        TaskId::SafetyMonitor => tasks.safety_monitor,
        TaskId::MotorControl => tasks.motor_control,
        TaskId::CommandRx => tasks.command_rx,
        TaskId::Telemetry => tasks.telemetry,
    };
    Priority(timing.priority)
}
