//! Shared wiring for the integration tests
#![allow(dead_code)]

use tandem_core::config::SystemConfig;
use tandem_core::ipc::{NoBoost, PiMutex};
use tandem_core::motor::driver::{mdeg_to_microsteps, reg, WRITE_BIT};
use tandem_core::safety::{EnableOutputs, SafetyEvent, SharedOutputs};
use tandem_core::tasks::{MotorControlTask, SafetyMonitorTask};
use tandem_core::Kernel;
use tandem_hal::{DeviceId, Level};
use tandem_hal_sim::{SimBoard, SimBus, SimClock, SimPin, SimWatchdog, TraceEntry};

pub static NO_BOOST: NoBoost = NoBoost;

pub type Monitor = SafetyMonitorTask<'static, SimBus, SimPin, SimPin, SimClock, SimWatchdog>;
pub type Control = MotorControlTask<'static, SimBus, SimPin, SimClock>;

/// Kernel wired to a simulated board
///
/// The kernel and the shared resources are leaked so tasks built from the
/// rig can outlive the test's stack frame, as they would in firmware.
pub struct Rig {
    pub board: SimBoard,
    pub kernel: &'static Kernel,
    pub bus: &'static PiMutex<SimBus>,
    pub outputs: &'static SharedOutputs<SimPin>,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_config(SystemConfig::default())
    }

    pub fn with_config(config: SystemConfig) -> Self {
        let board = SimBoard::new();
        let kernel: &'static Kernel = Box::leak(Box::new(Kernel::new(config, &NO_BOOST).unwrap()));
        let bus: &'static PiMutex<SimBus> = Box::leak(Box::new(PiMutex::new("bus", board.bus.clone(), &NO_BOOST)));
        let outputs: &'static SharedOutputs<SimPin> =
            Box::leak(Box::new(EnableOutputs::new(board.enable_pins.clone(), true).shared()));
        Self {
            board,
            kernel,
            bus,
            outputs,
        }
    }

    pub fn safety_monitor(&self) -> Monitor {
        SafetyMonitorTask::new(
            self.kernel,
            self.bus,
            self.outputs,
            self.board.estop_input.clone(),
            true,
            self.board.clock.clone(),
            self.board.watchdog.clone(),
        )
        .unwrap()
    }

    pub fn motor_control(&self) -> Control {
        MotorControlTask::new(self.kernel, self.bus, self.outputs, self.board.clock.clone())
    }

    /// Both enable outputs driven to their active (energized) level
    pub fn energized(&self) -> bool {
        self.board.enable_pins.iter().all(|p| p.level() == Level::Low)
    }

    /// Pull every pending safety event out of the queue
    pub fn drain_events(&self) -> Vec<SafetyEvent> {
        std::iter::from_fn(|| self.kernel.safety_events.try_receive().ok()).collect()
    }
}

/// Microstep targets written to the XTARGET register of `device`
pub fn xtarget_writes(bus: &SimBus, device: DeviceId) -> Vec<i32> {
    bus.transfers_to(device)
        .into_iter()
        .filter(|t| t.result.is_ok() && t.tx[0] == reg::XTARGET | WRITE_BIT)
        .map(|t| i32::from_be_bytes([t.tx[1], t.tx[2], t.tx[3], t.tx[4]]))
        .collect()
}

pub fn microsteps(mdeg: i32) -> i32 {
    mdeg_to_microsteps(mdeg)
}

/// Check if a trace entry is an XTARGET write to any device
pub fn is_xtarget(entry: &TraceEntry) -> bool {
    matches!(entry, TraceEntry::Transfer { tx, .. } if tx[0] == reg::XTARGET | WRITE_BIT)
}
