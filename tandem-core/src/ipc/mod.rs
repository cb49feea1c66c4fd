//! Inter-task communication primitives
//!
//! - [`BoundedQueue`] - fixed-capacity FIFO, non-blocking from interrupts
//! - [`PiMutex`] - mutex with acquire timeout and priority inheritance
//! - [`BinarySignal`], [`CountingSignal`] - interrupt-to-task handoff
//!
//! Every blocking operation takes an explicit timeout. Backing storage is
//! part of the primitive itself, so a `static` primitive needs no heap.

pub mod mutex;
pub mod queue;
pub mod signal;

pub use mutex::{NoBoost, PiGuard, PiMutex, PriorityBoost};
pub use queue::BoundedQueue;
pub use signal::{BinarySignal, CountingSignal};

/// IPC failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IpcError {
    /// Queue at capacity; the item was dropped
    QueueFull,
    /// Nothing to receive
    Empty,
    /// Wait expired before the operation could complete
    Timeout,
    /// Mutex held and caller asked not to wait
    Busy,
}
