//! Interrupt priorities and critical sections

pub mod critical;
pub mod priority;

pub use critical::{
    CriticalSectionError, CriticalSectionGuard, CriticalSectionManager, CriticalSectionState,
    MAX_NESTING,
};
pub use priority::{IrqSource, PriorityOrderError, PriorityTable, TierLevels, EXECUTOR_TASKS};
