//! Simulated peripherals for host-side testing
//!
//! Every HAB trait has a deterministic implementation here. Time is
//! virtual: it only moves when a test advances the [`SimClock`] or when a
//! simulated peripheral charges latency to it. All peripherals built from
//! one [`SimBoard`] share the clock and a [`SimTrace`], so tests can assert
//! on the global order of pin writes, bus transfers and watchdog activity.
//!
//! The inspection methods (`transfers`, `writes`, `trips`, ...) are only
//! reachable through the concrete simulation types, never through the HAB
//! traits the kernel sees.

pub mod bus;
pub mod clock;
pub mod gpio;
pub mod irq;
pub mod trace;
pub mod watchdog;

pub use bus::{SimBus, Transfer};
pub use clock::SimClock;
pub use gpio::SimPin;
pub use irq::{SimInterruptControl, SimInterruptLine};
pub use trace::{SimTrace, TraceEntry};
pub use watchdog::SimWatchdog;

use tandem_hal::Level;

/// Complete simulated board for the dual-stepper platform
///
/// Clones of the contained handles share state with the board, so a test
/// can hand `board.bus.clone()` to the kernel and keep inspecting `board.bus`.
pub struct SimBoard {
    /// Virtual time base
    pub clock: SimClock,
    /// Global ordered record of peripheral activity
    pub trace: SimTrace,
    /// Shared driver/encoder bus
    pub bus: SimBus,
    /// Driver enable outputs, one per motor (active low)
    pub enable_pins: [SimPin; 2],
    /// Emergency-stop button input (active low)
    pub estop_input: SimPin,
    /// Emergency-stop interrupt line
    pub estop_line: SimInterruptLine,
    /// Control-loop timer interrupt line
    pub control_timer_line: SimInterruptLine,
    /// Global interrupt mask
    pub irq_control: SimInterruptControl,
    /// Independent watchdog
    pub watchdog: SimWatchdog,
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBoard {
    /// Create a board with all outputs de-energized and the clock at zero
    pub fn new() -> Self {
        let clock = SimClock::new();
        let trace = SimTrace::new();
        Self {
            bus: SimBus::new(clock.clone(), trace.clone()),
            enable_pins: [
                SimPin::new("enable0", Level::High, trace.clone()),
                SimPin::new("enable1", Level::High, trace.clone()),
            ],
            estop_input: SimPin::new("estop", Level::High, trace.clone()),
            estop_line: SimInterruptLine::new("estop_irq", trace.clone()),
            control_timer_line: SimInterruptLine::new("control_timer_irq", trace.clone()),
            irq_control: SimInterruptControl::new(),
            watchdog: SimWatchdog::new(clock.clone(), trace.clone()),
            clock,
            trace,
        }
    }

    /// Advance virtual time in `step_us` increments, polling the watchdog
    /// after every step as the independent hardware would
    ///
    /// Returns the number of watchdog trips observed during the advance.
    pub fn advance_with_watchdog(&self, total_us: u64, step_us: u64) -> u32 {
        let step = step_us.max(1);
        let mut remaining = total_us;
        let mut trips = 0;
        while remaining > 0 {
            let delta = remaining.min(step);
            self.clock.advance(delta);
            remaining -= delta;
            if self.watchdog.poll() {
                trips += 1;
            }
        }
        trips
    }

    /// Press (assert) the emergency-stop button and fire its interrupt line
    pub fn press_estop(&self) -> bool {
        self.estop_input.drive(Level::Low);
        self.estop_line.fire()
    }

    /// Release the emergency-stop button
    pub fn release_estop(&self) {
        self.estop_input.drive(Level::High);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_hal::{InputPin, Timer, WatchdogTimer};

    #[test]
    fn test_board_shares_clock() {
        let board = SimBoard::new();
        let clock = board.clock.clone();
        board.clock.advance(250);
        assert_eq!(clock.now_micros(), 250);
    }

    #[test]
    fn test_estop_button_levels() {
        let board = SimBoard::new();
        assert!(board.estop_input.is_high());
        // No handler registered yet
        assert!(!board.press_estop());
        assert!(board.estop_input.is_low());
        board.release_estop();
        assert!(board.estop_input.is_high());
    }

    #[test]
    fn test_advance_with_watchdog_counts_single_trip() {
        let board = SimBoard::new();
        let mut wd = board.watchdog.clone();
        wd.start(1_000);
        let trips = board.advance_with_watchdog(10_000, 100);
        assert_eq!(trips, 1);
        assert_eq!(board.watchdog.trips(), 1);
    }
}
