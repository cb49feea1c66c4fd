//! Motor Control Task
//!
//! Runs at the control rate (1 kHz by default). Each period it:
//!
//! 1. takes at most one queued command and passes its target through the
//!    position enforcer
//! 2. holds the bus mutex for one bounded exchange: the command, then a
//!    status and an encoder read per axis
//! 3. publishes the result into the shared motor state
//!
//! While suspended by the emergency stop the task only flushes the queue
//! and commands a hold on both drivers, once per latch.

use tandem_hal::{BusTransaction, OutputPin, Timer};

use crate::config::NUM_MOTORS;
use crate::ipc::PiMutex;
use crate::kernel::{Counters, Kernel};
use crate::motor::{
    CommandKind, DriverError, DriverLink, DriverStatus, EncoderLink, EncoderTracker, MotorCommand, MotorId,
};
use crate::safety::{EventPayload, MotorFault, SafetyEvent, SafetyEventKind, SensorFault, SharedOutputs};
use crate::tasks::{TaskHandle, TaskId};
use crate::timing::{micros, sleep_until, ExecutionBudget, PeriodicSchedule, Stopwatch};

/// What one period did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PeriodOutcome {
    /// Normal period; the command applied, if any
    Ran { executed: Option<MotorCommand> },
    /// Commands are held until the fail-safe state allows motion
    Idle,
    /// Emergency stop latched; pending commands were discarded
    Suspended { discarded: u32 },
    /// Bus mutex not acquired in time; the command is retried next period
    BusUnavailable,
}

pub struct MotorControlTask<'k, B: BusTransaction, P: OutputPin, T: Timer> {
    kernel: &'k Kernel,
    bus: &'k PiMutex<B>,
    outputs: &'k SharedOutputs<P>,
    timer: T,
    me: TaskHandle,
    drivers: DriverLink,
    encoders: EncoderLink,
    trackers: [EncoderTracker; NUM_MOTORS],
    budget: ExecutionBudget,
    pending: Option<MotorCommand>,
}

impl<'k, B: BusTransaction, P: OutputPin, T: Timer> MotorControlTask<'k, B, P, T> {
    pub fn new(kernel: &'k Kernel, bus: &'k PiMutex<B>, outputs: &'k SharedOutputs<P>, timer: T) -> Self {
        let config = &kernel.config;
        let transfer_us = config.timeouts.bus_transfer_us;
        Self {
            kernel,
            bus,
            outputs,
            timer,
            me: kernel.tasks.motor_control,
            drivers: DriverLink::new(config.devices.driver_ids(), transfer_us),
            encoders: EncoderLink::new(config.devices.encoder_ids(), transfer_us),
            trackers: [EncoderTracker::new(); NUM_MOTORS],
            budget: ExecutionBudget::new(
                config.tasks.motor_control.period_us,
                config.timeouts.overrun_warn_percent,
            ),
            pending: None,
        }
    }

    fn raise(&self, event: SafetyEvent) {
        let _ = self.kernel.raise(event);
    }

    fn event(&self, kind: SafetyEventKind, now_us: u64) -> SafetyEvent {
        SafetyEvent::from_task(kind, TaskId::MotorControl, now_us)
    }

    /// Run one control period
    pub async fn run_period(&mut self) -> PeriodOutcome {
        let k = self.kernel;
        let watch = Stopwatch::start(&self.timer);
        let now = watch.started_us();

        if k.motor_task.is_suspended() {
            return self.hold().await;
        }
        let motion = k.fail_safe_state().motion_allowed();
        if motion {
            self.energize();
        }

        let command = match (self.pending.take(), motion) {
            (Some(c), _) => Some(c),
            (None, true) => k.commands.try_receive().ok(),
            (None, false) => None,
        };

        let bus_mutex = self.bus;
        let mut bus = match bus_mutex.acquire(self.me, micros(k.config.timeouts.bus_mutex_us)).await {
            Ok(guard) => guard,
            Err(_) => {
                self.pending = command;
                Counters::bump(&k.counters.mutex_timeouts);
                self.raise(self.event(SafetyEventKind::MutexTimeout, now));
                return PeriodOutcome::BusUnavailable;
            }
        };

        // An e-stop may have latched while waiting for the bus
        if k.motor_task.is_suspended() {
            drop(bus);
            if command.is_some() {
                Counters::bump(&k.counters.discarded_commands);
            }
            return self.hold().await;
        }

        let mut fault: Option<SafetyEvent> = None;
        let mut executed = None;
        if let Some(cmd) = command {
            if let Some(target) = self.checked_target(&cmd, now) {
                match self.drivers.set_target(&mut *bus, cmd.motor_id, cmd.kind, target) {
                    Ok(()) => {
                        trace!("motor {} {:?} -> {}", cmd.motor_id.raw(), cmd.kind, target);
                        executed = Some(MotorCommand { target_value: target, ..cmd });
                    }
                    Err(e) => {
                        fault.get_or_insert(self.driver_fault(cmd.motor_id, e, cmd.target_value, now));
                    }
                }
            }
        }

        let mut statuses: [Option<DriverStatus>; NUM_MOTORS] = [None; NUM_MOTORS];
        for motor in MotorId::ALL {
            match self.drivers.read_status(&mut *bus, motor) {
                Ok(status) => statuses[motor.index()] = Some(status),
                Err(e) => {
                    fault.get_or_insert(self.driver_fault(motor, e, 0, now));
                }
            }
            match self.encoders.read_position(&mut *bus, motor) {
                Ok(sample) => {
                    let now_sample = self.timer.now_micros();
                    self.trackers[motor.index()].update(sample.angle_mdeg, now_sample);
                }
                Err(e) => {
                    fault.get_or_insert(self.sensor_fault(motor, e, now));
                }
            }
        }
        drop(bus);

        if let Some(event) = fault {
            self.raise(event);
        }
        self.publish(statuses, now).await;

        let elapsed = watch.elapsed_us(&self.timer);
        if self.budget.exceeded(elapsed) {
            Counters::bump(&k.counters.overruns);
            warn!("control period overran: {} us", elapsed);
            self.raise(self.event(SafetyEventKind::ControlOverrun, now));
        }
        if motion {
            PeriodOutcome::Ran { executed }
        } else {
            PeriodOutcome::Idle
        }
    }

    /// Target to apply after enforcement, `None` if the command is rejected
    fn checked_target(&self, cmd: &MotorCommand, now_us: u64) -> Option<i32> {
        let k = self.kernel;
        match cmd.kind {
            CommandKind::MoveToPosition => k
                .enforcer
                .enforce(cmd.motor_id, cmd.target_value, now_us, &k.safety_events)
                .ok(),
            CommandKind::MoveToVelocity => {
                let position = self.trackers[cmd.motor_id.index()].position();
                Some(k.enforcer.enforce_velocity(
                    cmd.motor_id,
                    cmd.target_value,
                    position,
                    now_us,
                    &k.safety_events,
                ))
            }
            CommandKind::Stop | CommandKind::Configure => Some(cmd.target_value),
        }
    }

    fn driver_fault(&self, motor: MotorId, err: DriverError, requested: i32, now_us: u64) -> SafetyEvent {
        Counters::bump(&self.kernel.counters.bus_faults);
        warn!("driver {} exchange failed: {:?}", motor.raw(), err);
        self.event(SafetyEventKind::BusFault, now_us)
            .with_detail(err.code() as u8)
            .with_payload(EventPayload::Motor(MotorFault {
                motor,
                requested,
                applied: 0,
                driver_flags: DriverStatus::empty(),
            }))
    }

    fn sensor_fault(&self, encoder: MotorId, err: DriverError, now_us: u64) -> SafetyEvent {
        Counters::bump(&self.kernel.counters.bus_faults);
        warn!("encoder {} read failed: {:?}", encoder.raw(), err);
        self.event(SafetyEventKind::BusFault, now_us)
            .with_detail(err.code() as u8)
            .with_payload(EventPayload::Sensor(SensorFault {
                encoder,
                code: err.code(),
            }))
    }

    async fn publish(&self, statuses: [Option<DriverStatus>; NUM_MOTORS], now_us: u64) {
        let k = self.kernel;
        match k.motor_state.acquire(self.me, micros(k.config.timeouts.state_mutex_us)).await {
            Ok(mut states) => {
                for motor in MotorId::ALL {
                    let i = motor.index();
                    if let Some(status) = statuses[i] {
                        states[i].apply_status(status);
                    }
                    states[i].position = self.trackers[i].position();
                    states[i].velocity = self.trackers[i].velocity();
                }
            }
            Err(_) => {
                Counters::bump(&k.counters.mutex_timeouts);
                self.raise(self.event(SafetyEventKind::MutexTimeout, now_us));
            }
        }
    }

    fn energize(&self) {
        let estop = &self.kernel.estop;
        critical_section::with(|cs| {
            let mut outputs = self.outputs.borrow_ref_mut(cs);
            // Checked under the same critical section the e-stop handler takes
            if !outputs.is_energized() && !estop.is_latched() {
                outputs.energize();
                info!("driver outputs energized");
            }
        });
    }

    async fn hold(&mut self) -> PeriodOutcome {
        let k = self.kernel;
        let mut discarded = k.commands.clear();
        if self.pending.take().is_some() {
            discarded += 1;
        }
        if discarded > 0 {
            Counters::add(&k.counters.discarded_commands, discarded);
            debug!("discarded {} commands while stopped", discarded);
        }

        if k.estop.take_hold_request() {
            let now = self.timer.now_micros();
            let bus_mutex = self.bus;
            match bus_mutex.acquire(self.me, micros(k.config.timeouts.bus_mutex_us)).await {
                Ok(mut bus) => {
                    let mut fault: Option<SafetyEvent> = None;
                    for motor in MotorId::ALL {
                        if let Err(e) = self.drivers.hard_stop(&mut *bus, motor) {
                            fault.get_or_insert(self.driver_fault(motor, e, 0, now));
                        }
                    }
                    drop(bus);
                    // Both drivers get the hold again next period
                    if let Some(event) = fault {
                        k.estop.defer_hold_request();
                        self.raise(event);
                    }
                }
                Err(_) => {
                    Counters::bump(&k.counters.mutex_timeouts);
                    k.estop.defer_hold_request();
                }
            }
        }
        PeriodOutcome::Suspended { discarded }
    }

    /// Run forever on absolute deadlines
    pub async fn run(&mut self) -> ! {
        let period_us = self.kernel.config.tasks.motor_control.period_us;
        let mut schedule = PeriodicSchedule::new(period_us, self.timer.now_micros());
        loop {
            sleep_until(schedule.deadline()).await;
            self.run_period().await;
            let now = self.timer.now_micros();
            let skipped = schedule.advance(now);
            if skipped > 0 {
                Counters::add(&self.kernel.counters.overruns, skipped);
                self.raise(
                    self.event(SafetyEventKind::ControlOverrun, now)
                        .with_detail(skipped.min(u8::MAX as u32) as u8),
                );
            }
        }
    }
}
