//! Nestable critical sections
//!
//! The interrupt-enable state is captured on the outermost `enter` and put
//! back on the matching outermost `exit`. Inner pairs only move the nesting
//! counter, so a routine that takes a critical section can be called from
//! inside another one.
//!
//! The manager backs the global `critical-section` implementation on the
//! target, so it must not itself depend on anything that takes a critical
//! section. All bookkeeping happens with interrupts already masked and uses
//! plain atomic loads and stores, which the Cortex-M0+ supports natively.

use core::marker::PhantomData;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tandem_hal::{InterruptControl, InterruptMask};

/// Deepest nesting accepted before `enter` refuses
pub const MAX_NESTING: u8 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CriticalSectionError {
    /// `exit` without a matching `enter`
    Unbalanced,
    /// Nesting deeper than [`MAX_NESTING`]
    NestingOverflow,
}

/// Snapshot of the manager's bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CriticalSectionState {
    pub nesting_level: u8,
    /// Mask captured on the outermost entry; meaningless at level 0
    pub saved_interrupt_mask: InterruptMask,
}

pub struct CriticalSectionManager<C: InterruptControl> {
    control: C,
    nesting: AtomicU8,
    saved_enabled: AtomicBool,
}

impl<C: InterruptControl> CriticalSectionManager<C> {
    pub const fn new(control: C) -> Self {
        Self {
            control,
            nesting: AtomicU8::new(0),
            saved_enabled: AtomicBool::new(false),
        }
    }

    /// Mask interrupts and increase the nesting level
    pub fn enter(&self) -> Result<(), CriticalSectionError> {
        let mask = self.control.save_and_disable();
        let level = self.nesting.load(Ordering::Relaxed);
        if level >= MAX_NESTING {
            self.control.restore(mask);
            return Err(CriticalSectionError::NestingOverflow);
        }
        if level == 0 {
            self.saved_enabled.store(mask.was_enabled, Ordering::Relaxed);
        }
        self.nesting.store(level + 1, Ordering::Relaxed);
        Ok(())
    }

    /// Decrease the nesting level, unmasking on the outermost exit
    pub fn exit(&self) -> Result<(), CriticalSectionError> {
        let level = self.nesting.load(Ordering::Relaxed);
        if level == 0 {
            return Err(CriticalSectionError::Unbalanced);
        }
        self.nesting.store(level - 1, Ordering::Relaxed);
        if level == 1 {
            self.control.restore(InterruptMask {
                was_enabled: self.saved_enabled.load(Ordering::Relaxed),
            });
        }
        Ok(())
    }

    pub fn state(&self) -> CriticalSectionState {
        CriticalSectionState {
            nesting_level: self.nesting.load(Ordering::Relaxed),
            saved_interrupt_mask: InterruptMask {
                was_enabled: self.saved_enabled.load(Ordering::Relaxed),
            },
        }
    }

    pub fn is_active(&self) -> bool {
        self.nesting.load(Ordering::Relaxed) > 0
    }

    /// Enter and return a guard that exits on drop
    pub fn lock(&self) -> Result<CriticalSectionGuard<'_, C>, CriticalSectionError> {
        self.enter()?;
        Ok(CriticalSectionGuard {
            manager: self,
            _not_send: PhantomData,
        })
    }

    /// Run `f` inside a critical section
    pub fn with<R>(&self, f: impl FnOnce() -> R) -> Result<R, CriticalSectionError> {
        let _guard = self.lock()?;
        Ok(f())
    }
}

/// Scope guard returned by [`CriticalSectionManager::lock`]
pub struct CriticalSectionGuard<'a, C: InterruptControl> {
    manager: &'a CriticalSectionManager<C>,
    // Must be released on the context that acquired it
    _not_send: PhantomData<*const ()>,
}

impl<C: InterruptControl> Drop for CriticalSectionGuard<'_, C> {
    fn drop(&mut self) {
        // Balanced by construction
        let _ = self.manager.exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_hal_sim::SimInterruptControl;

    #[test]
    fn test_nested_saves_once_restores_once() {
        let ctrl = SimInterruptControl::new();
        let cs = CriticalSectionManager::new(ctrl.clone());

        cs.enter().unwrap();
        cs.enter().unwrap();
        assert_eq!(cs.state().nesting_level, 2);
        assert!(cs.state().saved_interrupt_mask.was_enabled);

        cs.exit().unwrap();
        assert!(!ctrl.interrupts_enabled());
        assert_eq!(ctrl.restore_calls(), 0);

        cs.exit().unwrap();
        assert!(ctrl.interrupts_enabled());
        assert_eq!(ctrl.restore_calls(), 1);
    }

    #[test]
    fn test_entered_with_interrupts_off_stays_off() {
        let ctrl = SimInterruptControl::new();
        ctrl.set_enabled(false);
        let cs = CriticalSectionManager::new(ctrl.clone());
        cs.with(|| ()).unwrap();
        assert!(!ctrl.interrupts_enabled());
    }

    #[test]
    fn test_unbalanced_exit() {
        let ctrl = SimInterruptControl::new();
        let cs = CriticalSectionManager::new(ctrl.clone());
        assert_eq!(cs.exit(), Err(CriticalSectionError::Unbalanced));
        assert!(!cs.is_active());
        assert!(ctrl.interrupts_enabled());

        // Still usable afterwards, e.g. by the logger reporting it
        cs.enter().unwrap();
        assert!(!ctrl.interrupts_enabled());
        cs.exit().unwrap();
        assert!(ctrl.interrupts_enabled());
    }

    #[test]
    fn test_overflow_leaves_level_unchanged() {
        let ctrl = SimInterruptControl::new();
        let cs = CriticalSectionManager::new(ctrl.clone());
        for _ in 0..MAX_NESTING {
            cs.enter().unwrap();
        }
        assert_eq!(cs.enter(), Err(CriticalSectionError::NestingOverflow));
        assert_eq!(cs.state().nesting_level, MAX_NESTING);
        for _ in 0..MAX_NESTING {
            cs.exit().unwrap();
        }
        assert!(ctrl.interrupts_enabled());
    }

    #[test]
    fn test_guard_exits_on_drop() {
        let ctrl = SimInterruptControl::new();
        let cs = CriticalSectionManager::new(ctrl.clone());
        {
            let _outer = cs.lock().unwrap();
            let inner = cs.with(|| cs.state().nesting_level).unwrap();
            assert_eq!(inner, 2);
        }
        assert!(!cs.is_active());
        assert!(ctrl.interrupts_enabled());
    }
}
