//! Global interrupt masking and software interrupt lines

use core::cell::Cell;

use cortex_m::register::primask;
use critical_section::Mutex;
use embassy_rp::interrupt::{Interrupt, InterruptExt, Priority};
use tandem_hal::{HalError, InterruptControl, InterruptLine, InterruptMask, IrqHandler, IrqPriority};

/// Number of software interrupt lines
pub const SWI_LINES: usize = 6;

/// NVIC level for each kernel priority level
///
/// The kernel uses six levels: four interrupt sources (e-stop, control
/// timer, bus complete, host link) then two executor tiers (safety
/// monitor, motor control). The NVIC has four, so two pairs of neighbours
/// share one. Bus complete shares with the control timer; the SPI is
/// polled and never raises it. The host link shares with the safety
/// monitor tier. Order between distinct levels is kept.
const FOLD: [Priority; 6] = [
    Priority::P0,
    Priority::P1,
    Priority::P1,
    Priority::P2,
    Priority::P2,
    Priority::P3,
];

/// Map a kernel priority onto an NVIC level
pub fn nvic_priority(priority: IrqPriority) -> Result<Priority, HalError> {
    FOLD.get(priority.0 as usize).copied().ok_or(HalError::InvalidParameter)
}

/// PRIMASK-based global interrupt control for the Cortex-M0+
pub struct PrimaskControl;

impl InterruptControl for PrimaskControl {
    fn save_and_disable(&self) -> InterruptMask {
        let was_enabled = primask::read().is_active();
        cortex_m::interrupt::disable();
        InterruptMask { was_enabled }
    }

    fn restore(&self, mask: InterruptMask) {
        if mask.was_enabled {
            // SAFETY: only re-enables what the matching save found enabled
            unsafe { cortex_m::interrupt::enable() }
        }
    }

    fn interrupts_enabled(&self) -> bool {
        primask::read().is_active()
    }
}

#[allow(clippy::declare_interior_mutable_const)]
const NO_HANDLER: Cell<Option<IrqHandler>> = Cell::new(None);

static HANDLERS: Mutex<[Cell<Option<IrqHandler>>; SWI_LINES]> = Mutex::new([NO_HANDLER; SWI_LINES]);

/// One of the six `SWI_IRQ_n` software interrupts
///
/// The firmware binds each vector to [`dispatch`] with the line's index;
/// the registered handler then runs at the line's NVIC priority. These
/// lines carry the interrupt executors, one per real-time tier.
pub struct SwiLine {
    index: usize,
    irq: Interrupt,
    priority: Option<IrqPriority>,
}

impl SwiLine {
    /// Line `SWI_IRQ_<index>`, or `None` past the last one
    pub const fn new(index: usize) -> Option<Self> {
        let irq = match index {
            0 => Interrupt::SWI_IRQ_0,
            1 => Interrupt::SWI_IRQ_1,
            2 => Interrupt::SWI_IRQ_2,
            3 => Interrupt::SWI_IRQ_3,
            4 => Interrupt::SWI_IRQ_4,
            5 => Interrupt::SWI_IRQ_5,
            _ => return None,
        };
        Some(Self {
            index,
            irq,
            priority: None,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn interrupt(&self) -> Interrupt {
        self.irq
    }
}

impl InterruptLine for SwiLine {
    fn register(&mut self, handler: IrqHandler, priority: IrqPriority) -> Result<(), HalError> {
        let level = nvic_priority(priority)?;
        critical_section::with(|cs| HANDLERS.borrow(cs)[self.index].set(Some(handler)));
        self.irq.set_priority(level);
        // SAFETY: the handler is installed before unmasking, and a software
        // line only fires once something pends it
        unsafe { self.irq.enable() };
        self.priority = Some(priority);
        Ok(())
    }

    fn unregister(&mut self) {
        self.irq.disable();
        critical_section::with(|cs| HANDLERS.borrow(cs)[self.index].set(None));
        self.priority = None;
    }

    fn priority(&self) -> Option<IrqPriority> {
        self.priority
    }
}

/// Run the handler registered on software line `index`
///
/// Called from the `SWI_IRQ_n` vector. An unregistered line is ignored.
pub fn dispatch(index: usize) {
    let handler = critical_section::with(|cs| HANDLERS.borrow(cs).get(index).and_then(Cell::get));
    if let Some(handler) = handler {
        handler();
    }
}
