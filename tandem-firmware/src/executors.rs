//! Interrupt executors, one per real-time tier
//!
//! Each tier runs on its own `InterruptExecutor` bound to a software
//! interrupt line. The line's priority comes from the kernel's tier
//! levels, which sit below every hardware interrupt source, so interrupt
//! handlers preempt both tiers and the monitor tier preempts the control
//! tier mid-poll. The host link tasks stay on the thread executor below
//! all of them.

use embassy_executor::{InterruptExecutor, SendSpawner};
use embassy_rp::interrupt;
use embassy_rp::interrupt::Interrupt;
use tandem_core::config::TaskSet;
use tandem_core::interrupt::TierLevels;
use tandem_core::tasks::{Priority, TaskId};
use tandem_hal::{HalError, IrqHandler};
use tandem_hal_rp2040::irq::{dispatch, nvic_priority};
use tandem_hal_rp2040::{NvicBoost, SwiLine, Tier};

static CONTROL_EXECUTOR: InterruptExecutor = InterruptExecutor::new();
static MONITOR_EXECUTOR: InterruptExecutor = InterruptExecutor::new();

const CONTROL_LINE: usize = 0;
const MONITOR_LINE: usize = 1;

#[interrupt]
unsafe fn SWI_IRQ_0() {
    dispatch(CONTROL_LINE)
}

#[interrupt]
unsafe fn SWI_IRQ_1() {
    dispatch(MONITOR_LINE)
}

fn poll_control() {
    // SAFETY: only dispatched from SWI_IRQ_0, which the executor owns
    unsafe { CONTROL_EXECUTOR.on_interrupt() }
}

fn poll_monitor() {
    // SAFETY: only dispatched from SWI_IRQ_1, which the executor owns
    unsafe { MONITOR_EXECUTOR.on_interrupt() }
}

/// Real-time executor tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ExecTier {
    /// Safety Monitor Task and the e-stop re-arm
    Monitor,
    /// Motor Control Task
    Control,
}

impl ExecTier {
    fn executor(self) -> &'static InterruptExecutor {
        match self {
            ExecTier::Monitor => &MONITOR_EXECUTOR,
            ExecTier::Control => &CONTROL_EXECUTOR,
        }
    }

    fn line(self) -> usize {
        match self {
            ExecTier::Monitor => MONITOR_LINE,
            ExecTier::Control => CONTROL_LINE,
        }
    }

    fn handler(self) -> IrqHandler {
        match self {
            ExecTier::Monitor => poll_monitor,
            ExecTier::Control => poll_control,
        }
    }

    /// Task whose configured priority ranks the tier
    pub fn task(self) -> TaskId {
        match self {
            ExecTier::Monitor => TaskId::SafetyMonitor,
            ExecTier::Control => TaskId::MotorControl,
        }
    }

    fn interrupt(self) -> Interrupt {
        match self {
            ExecTier::Monitor => Interrupt::SWI_IRQ_1,
            ExecTier::Control => Interrupt::SWI_IRQ_0,
        }
    }

    /// Register the tier's line at its level and start the executor
    pub fn start(self, tiers: &TierLevels) -> Result<SendSpawner, HalError> {
        let mut line = SwiLine::new(self.line()).ok_or(HalError::InvalidParameter)?;
        tiers.register(&mut line, self.task(), self.handler())?;
        Ok(self.executor().start(line.interrupt()))
    }
}

/// Priority inheritance map for the configured task set
///
/// Tasks on the thread executor have no line to raise.
pub fn boost_tiers(tasks: &TaskSet, tiers: &TierLevels) -> NvicBoost<4> {
    let line = |tier: ExecTier| {
        tiers
            .priority(tier.task())
            .and_then(|p| nvic_priority(p).ok())
            .map(|level| (tier.interrupt(), level))
    };
    NvicBoost::new([
        Tier {
            task: TaskId::SafetyMonitor,
            priority: Priority(tasks.safety_monitor.priority),
            line: line(ExecTier::Monitor),
        },
        Tier {
            task: TaskId::MotorControl,
            priority: Priority(tasks.motor_control.priority),
            line: line(ExecTier::Control),
        },
        Tier {
            task: TaskId::CommandRx,
            priority: Priority(tasks.command_rx.priority),
            line: None,
        },
        Tier {
            task: TaskId::Telemetry,
            priority: Priority(tasks.telemetry.priority),
            line: None,
        },
    ])
}
