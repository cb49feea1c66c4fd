//! Priority inheritance at executor granularity
//!
//! Each real-time task runs on an interrupt executor bound to a software
//! interrupt line, so "raising a task's priority" means raising the NVIC
//! priority of that line. Tasks on the thread executor have no line and
//! cannot be raised; they only ever hold a contended mutex for a bounded
//! copy.

use embassy_rp::interrupt::{Interrupt, InterruptExt, Priority};
use tandem_core::ipc::PriorityBoost;
use tandem_core::tasks::{Priority as TaskPriority, TaskHandle, TaskId};

/// Where one task runs
#[derive(Debug, Clone, Copy)]
pub struct Tier {
    pub task: TaskId,
    /// Task priority as configured in the kernel
    pub priority: TaskPriority,
    /// Executor line and its base NVIC level, `None` for thread mode
    pub line: Option<(Interrupt, Priority)>,
}

/// [`PriorityBoost`] that rewrites executor line priorities in the NVIC
pub struct NvicBoost<const N: usize> {
    tiers: [Tier; N],
}

impl<const N: usize> NvicBoost<N> {
    pub const fn new(tiers: [Tier; N]) -> Self {
        Self { tiers }
    }

    fn tier(&self, task: TaskId) -> Option<&Tier> {
        self.tiers.iter().find(|t| t.task == task)
    }

    /// NVIC level of the executor that runs tasks at `priority`
    fn level_for(&self, priority: TaskPriority) -> Option<Priority> {
        self.tiers
            .iter()
            .find(|t| t.priority == priority)
            .and_then(|t| t.line)
            .map(|(_, level)| level)
    }
}

impl<const N: usize> PriorityBoost for NvicBoost<N> {
    fn boost(&self, holder: TaskHandle, to: TaskPriority) {
        let Some((irq, base)) = self.tier(holder.id).and_then(|t| t.line) else {
            return;
        };
        let Some(level) = self.level_for(to) else {
            return;
        };
        // Lower NVIC value preempts
        if (level as u8) < (base as u8) {
            irq.set_priority(level);
        }
    }

    fn restore(&self, holder: TaskHandle) {
        if let Some((irq, base)) = self.tier(holder.id).and_then(|t| t.line) {
            irq.set_priority(base);
        }
    }
}
