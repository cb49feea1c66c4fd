//! Global `critical-section` implementation
//!
//! Every critical section in the firmware, including the ones embassy and
//! defmt take, goes through the kernel's nesting manager on top of
//! PRIMASK.
//!
//! PRIMASK only masks the core it runs on. Core 1 is never started, so
//! masking core 0 excludes every other context. Launching core 1 would
//! need the SIO spinlock implementation (embassy-rp's
//! `critical-section-impl`) in place of this one.

use critical_section::RawRestoreState;
use defmt::*;
use portable_atomic::{AtomicU32, Ordering};
use tandem_core::interrupt::CriticalSectionManager;
use tandem_hal_rp2040::PrimaskControl;

static MANAGER: CriticalSectionManager<PrimaskControl> = CriticalSectionManager::new(PrimaskControl);

static UNBALANCED: AtomicU32 = AtomicU32::new(0);

/// Releases that had no matching acquire
pub fn unbalanced_releases() -> u32 {
    UNBALANCED.load(Ordering::Relaxed)
}

struct KernelCriticalSection;
critical_section::set_impl!(KernelCriticalSection);

// SAFETY: single core; interrupts stay masked from the outermost acquire
// to its matching release
unsafe impl critical_section::Impl for KernelCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        if MANAGER.enter().is_err() {
            // Nesting overflow is a bug; logging would re-enter here
            cortex_m::interrupt::disable();
            cortex_m::asm::udf();
        }
    }

    unsafe fn release(_restore: RawRestoreState) {
        if let Err(e) = MANAGER.exit() {
            // The manager is back at depth zero, so the logger's own
            // critical section nests normally
            UNBALANCED.fetch_add(1, Ordering::Relaxed);
            error!("critical section release without acquire: {}", e);
        }
    }
}
