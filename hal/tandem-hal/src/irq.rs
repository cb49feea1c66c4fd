//! Interrupt registration and global masking
//!
//! Handlers are plain functions: they may only perform bounded,
//! non-blocking work (write a register, signal a primitive). Anything that
//! needs context reaches it through statics owned by the firmware wiring.

use crate::error::HalError;

/// Interrupt handler entry point
pub type IrqHandler = fn();

/// Hardware interrupt priority
///
/// Lower numbers preempt higher numbers (0 is the most urgent), matching
/// the NVIC convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IrqPriority(pub u8);

impl IrqPriority {
    /// Most urgent priority level
    pub const HIGHEST: Self = Self(0);

    /// Check if this priority preempts `other`
    pub fn preempts(self, other: IrqPriority) -> bool {
        self.0 < other.0
    }
}

/// A single interrupt source that can carry a handler
pub trait InterruptLine {
    /// Install `handler` at `priority` and enable the line
    ///
    /// Registering twice replaces the previous handler.
    fn register(&mut self, handler: IrqHandler, priority: IrqPriority) -> Result<(), HalError>;

    /// Disable the line and drop its handler
    fn unregister(&mut self);

    /// Priority the line was registered at, if any
    fn priority(&self) -> Option<IrqPriority>;
}

/// Saved global interrupt-enable state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterruptMask {
    /// Interrupts were enabled when the mask was captured
    pub was_enabled: bool,
}

/// Global interrupt enable/disable
///
/// Only the kernel's critical-section manager calls this trait directly.
pub trait InterruptControl {
    /// Disable all maskable interrupts and return the previous state
    fn save_and_disable(&self) -> InterruptMask;

    /// Restore the state captured by [`save_and_disable`](Self::save_and_disable)
    fn restore(&self, mask: InterruptMask);

    /// Check if interrupts are currently enabled
    fn interrupts_enabled(&self) -> bool;
}

impl<C: InterruptControl + ?Sized> InterruptControl for &C {
    fn save_and_disable(&self) -> InterruptMask {
        (**self).save_and_disable()
    }

    fn restore(&self, mask: InterruptMask) {
        (**self).restore(mask)
    }

    fn interrupts_enabled(&self) -> bool {
        (**self).interrupts_enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lower_number_preempts() {
        assert!(IrqPriority::HIGHEST.preempts(IrqPriority(1)));
        assert!(!IrqPriority(2).preempts(IrqPriority(1)));
        assert!(!IrqPriority(1).preempts(IrqPriority(1)));
    }
}
