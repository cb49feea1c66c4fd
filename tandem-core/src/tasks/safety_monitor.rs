//! Safety Monitor Task
//!
//! Highest-priority task and sole owner of the fail-safe state machine.
//! Each activation it handles a pending reset request, drains the safety
//! event queue, runs the health checks, publishes the resulting state and
//! refreshes the hardware watchdog.
//!
//! A fatal event is acted on as soon as it is drained: the safe stop runs
//! before the remaining events are looked at.

use embassy_time::Duration;
use tandem_hal::{BusTransaction, InputPin, OutputPin, Timer, WatchdogTimer};

use crate::ipc::PiMutex;
use crate::kernel::{Counters, Kernel};
use crate::motor::{CommandKind, DriverLink, MotorId};
use crate::safety::{
    Action, EventSource, FailSafeMachine, FailSafeState, HealthInputs, HealthMonitor, ResetError,
    SafetyEvent, SafetyEventKind, Severity, SharedOutputs, StopSource, WatchdogConfigError,
    WatchdogSupervisor,
};
use crate::tasks::TaskHandle;
use crate::timing::{micros, PeriodicSchedule};

pub struct SafetyMonitorTask<'k, B, P, I, T, W>
where
    B: BusTransaction,
    P: OutputPin,
    I: InputPin,
    T: Timer,
    W: WatchdogTimer,
{
    kernel: &'k Kernel,
    bus: &'k PiMutex<B>,
    outputs: &'k SharedOutputs<P>,
    estop_input: I,
    estop_active_low: bool,
    timer: T,
    watchdog: WatchdogSupervisor<W>,
    machine: FailSafeMachine,
    health: HealthMonitor,
    drivers: DriverLink,
    me: TaskHandle,
    last_reset: Option<Result<(), ResetError>>,
}

impl<'k, B, P, I, T, W> SafetyMonitorTask<'k, B, P, I, T, W>
where
    B: BusTransaction,
    P: OutputPin,
    I: InputPin,
    T: Timer,
    W: WatchdogTimer,
{
    pub fn new(
        kernel: &'k Kernel,
        bus: &'k PiMutex<B>,
        outputs: &'k SharedOutputs<P>,
        estop_input: I,
        estop_active_low: bool,
        timer: T,
        watchdog: W,
    ) -> Result<Self, WatchdogConfigError> {
        let t = &kernel.config.timeouts;
        let watchdog = WatchdogSupervisor::new(watchdog, t.watchdog_window_us, t.watchdog_refresh_us)?;
        Ok(Self {
            kernel,
            bus,
            outputs,
            estop_input,
            estop_active_low,
            timer,
            watchdog,
            machine: FailSafeMachine::new(t.warning_timeout_us),
            health: HealthMonitor::new(t.comms_liveness_us),
            drivers: DriverLink::new(kernel.config.devices.driver_ids(), t.bus_transfer_us),
            me: kernel.tasks.safety_monitor,
            last_reset: None,
        })
    }

    /// Arm the watchdog and leave INIT
    ///
    /// A watchdog reset in the previous run is reported as a fatal event,
    /// so the system comes up in FAULT.
    pub fn start(&mut self) {
        let now = self.timer.now_micros();
        self.watchdog.start(now);
        if self.watchdog.caused_last_reset() {
            error!("previous run ended in a watchdog reset");
            let _ = self
                .kernel
                .raise(SafetyEvent::new(SafetyEventKind::WatchdogMiss, EventSource::Boot, now));
        }
        // Nothing reaches the machine before this point, so there is no
        // deferred fault to act on yet
        let _ = self.machine.init_complete(now);
        self.kernel.publish_state(self.machine.state());
    }

    pub fn state(&self) -> FailSafeState {
        self.machine.state()
    }

    pub fn machine(&self) -> &FailSafeMachine {
        &self.machine
    }

    /// Outcome of the most recent reset request
    pub fn last_reset(&self) -> Option<Result<(), ResetError>> {
        self.last_reset
    }

    /// Run one monitor period
    pub async fn run_period(&mut self) -> FailSafeState {
        let k = self.kernel;
        let now = self.timer.now_micros();

        if let Some(key) = k.reset_request.try_take() {
            self.last_reset = Some(self.handle_reset(key, now));
        }

        while let Ok(event) = k.safety_events.try_receive() {
            debug!("safety event {:?} from {:?}", event.kind, event.source);
            if self.machine.evaluate(&event, now) == Action::SafeStop {
                self.safe_stop(now).await;
            }
        }

        let watchdog = self.watchdog.status(now);
        let timeout = micros(k.config.timeouts.monitor_mutex_us);
        let motors = match k.motor_state.acquire(self.me, timeout).await {
            Ok(states) => Some(*states),
            Err(_) => None,
        };
        let action = match motors {
            Some(motors) => {
                let inputs = HealthInputs {
                    motors,
                    link_silent_us: k.link.silent_for(now),
                    watchdog,
                    estop_latched: k.estop.is_latched(),
                };
                let in_fault = self.machine.state() == FailSafeState::Fault;
                let report = self.health.check(&inputs, in_fault);
                self.machine.update(&report, now)
            }
            None => {
                Counters::bump(&k.counters.mutex_timeouts);
                self.machine.report(Severity::Fatal, SafetyEventKind::MutexTimeout, now)
            }
        };
        if action == Action::SafeStop {
            self.safe_stop(now).await;
        }

        k.publish_state(self.machine.state());
        self.watchdog.refresh(self.timer.now_micros());
        self.machine.state()
    }

    /// Controlled stop where the bus allows it, then the emergency stop
    async fn safe_stop(&mut self, now_us: u64) {
        let k = self.kernel;
        let bus_mutex = self.bus;
        match bus_mutex.acquire(self.me, micros(k.config.timeouts.monitor_mutex_us)).await {
            Ok(mut bus) => {
                for motor in MotorId::ALL {
                    if self.drivers.set_target(&mut *bus, motor, CommandKind::Stop, 0).is_err() {
                        Counters::bump(&k.counters.bus_faults);
                    }
                }
            }
            Err(_) => {
                Counters::bump(&k.counters.mutex_timeouts);
                warn!("safe stop: bus busy, skipping controlled stop");
            }
        }
        k.emergency_stop(self.outputs, StopSource::Fault, now_us);
    }

    fn handle_reset(&mut self, key: u32, now_us: u64) -> Result<(), ResetError> {
        let k = self.kernel;
        if let Err(e) = k.estop.check_reset(key, &self.estop_input, self.estop_active_low) {
            warn!("reset refused: {:?}", e);
            return Err(e);
        }
        let faulted = self.machine.state() == FailSafeState::Fault;
        if !faulted && !k.estop.is_latched() {
            return Err(ResetError::NotFaulted);
        }

        k.estop.clear();
        if faulted {
            self.machine.manual_reset()?;
        }
        k.motor_task.resume();
        self.watchdog.refresh(now_us);
        k.publish_state(self.machine.state());
        info!("manual reset accepted");
        Ok(())
    }

    /// Run forever; an interrupt can request an extra activation through
    /// the kernel's monitor wake signal
    pub async fn run(&mut self) -> ! {
        let period_us = self.kernel.config.tasks.safety_monitor.period_us;
        let mut schedule = PeriodicSchedule::new(period_us, self.timer.now_micros());
        loop {
            let now = self.timer.now_micros();
            if now < schedule.deadline() {
                let wait = Duration::from_micros(schedule.deadline() - now);
                if self.kernel.monitor_wake.wait(wait).await.is_ok() {
                    self.run_period().await;
                    continue;
                }
            }
            self.run_period().await;
            let skipped = schedule.advance(self.timer.now_micros());
            if skipped > 0 {
                Counters::add(&self.kernel.counters.overruns, skipped);
            }
        }
    }
}
