//! Safety events
//!
//! Every safety-relevant fact in the system travels as a [`SafetyEvent`]
//! to the Safety Monitor Task, the only component allowed to decide on
//! escalation. Producers never block: the event queue is written with
//! non-blocking sends, also from interrupt context.

use core::cell::Cell;

use crate::ipc::{BoundedQueue, IpcError};
use crate::motor::{DriverStatus, MotorId};
use crate::tasks::TaskId;

/// How far outside its limits a position request was
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LimitClass {
    /// Outside `[min, max]` but within the hard margin; clamped
    Soft,
    /// Beyond the hard margin
    Hard,
    /// Soft violations repeated past the configured limit
    Persistent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SafetyEventKind {
    PositionLimit(LimitClass),
    /// Driver over-temperature pre-warning
    ThermalWarning,
    /// Driver over-temperature shutdown
    OverTemperature,
    Stall,
    /// Coil short reported by the driver
    DriverFault,
    /// Control period used more than its budget
    ControlOverrun,
    /// Bus transfer or device exchange failed
    BusFault,
    QueueOverflow,
    MutexTimeout,
    /// Host link silent past the liveness timeout
    CommLoss,
    /// Watchdog refreshed later than its refresh period
    WatchdogLate,
    /// Hardware watchdog expired (reported at the next boot)
    WatchdogMiss,
    EmergencyStop,
}

impl SafetyEventKind {
    /// High byte of [`SafetyEvent::error_code`]
    pub fn code(self) -> u8 {
        match self {
            SafetyEventKind::PositionLimit(LimitClass::Soft) => 0x10,
            SafetyEventKind::PositionLimit(LimitClass::Hard) => 0x11,
            SafetyEventKind::PositionLimit(LimitClass::Persistent) => 0x12,
            SafetyEventKind::ThermalWarning => 0x20,
            SafetyEventKind::OverTemperature => 0x21,
            SafetyEventKind::Stall => 0x22,
            SafetyEventKind::DriverFault => 0x23,
            SafetyEventKind::ControlOverrun => 0x30,
            SafetyEventKind::WatchdogLate => 0x31,
            SafetyEventKind::WatchdogMiss => 0x32,
            SafetyEventKind::BusFault => 0x40,
            SafetyEventKind::QueueOverflow => 0x50,
            SafetyEventKind::MutexTimeout => 0x51,
            SafetyEventKind::CommLoss => 0x60,
            SafetyEventKind::EmergencyStop => 0x70,
        }
    }
}

/// Escalation level of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Severity {
    /// Logged and counted only
    Info,
    /// Degraded; recoverable while it clears before the warning timeout
    Warning,
    /// Forces FAULT and a safe stop
    Fatal,
}

/// Who raised an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventSource {
    Task(TaskId),
    Interrupt,
    Boot,
}

/// Motor-side details
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorFault {
    pub motor: MotorId,
    /// Value asked for (position or velocity)
    pub requested: i32,
    /// Value actually applied after mitigation
    pub applied: i32,
    pub driver_flags: DriverStatus,
}

/// Sensor-side details
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorFault {
    pub encoder: MotorId,
    pub code: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventPayload {
    None,
    Motor(MotorFault),
    Sensor(SensorFault),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SafetyEvent {
    pub kind: SafetyEventKind,
    /// Kind code in the high byte, producer detail in the low byte
    pub error_code: u16,
    pub source: EventSource,
    pub timestamp_us: u64,
    pub payload: EventPayload,
}

impl SafetyEvent {
    pub fn new(kind: SafetyEventKind, source: EventSource, timestamp_us: u64) -> Self {
        Self {
            kind,
            error_code: (kind.code() as u16) << 8,
            source,
            timestamp_us,
            payload: EventPayload::None,
        }
    }

    pub fn from_task(kind: SafetyEventKind, task: TaskId, timestamp_us: u64) -> Self {
        Self::new(kind, EventSource::Task(task), timestamp_us)
    }

    pub fn with_detail(mut self, detail: u8) -> Self {
        self.error_code = (self.error_code & 0xFF00) | detail as u16;
        self
    }

    pub fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = payload;
        self
    }

    pub fn motor(&self) -> Option<MotorId> {
        match self.payload {
            EventPayload::Motor(m) => Some(m.motor),
            EventPayload::Sensor(s) => Some(s.encoder),
            EventPayload::None => None,
        }
    }

    /// Escalation level for this event
    ///
    /// Resource exhaustion is only fatal on the Safety Monitor's own path.
    pub fn severity(&self) -> Severity {
        use SafetyEventKind::*;
        match self.kind {
            PositionLimit(LimitClass::Soft) => Severity::Warning,
            PositionLimit(_) => Severity::Fatal,
            ThermalWarning | ControlOverrun | CommLoss | WatchdogLate => Severity::Warning,
            OverTemperature | Stall | DriverFault | WatchdogMiss | EmergencyStop => Severity::Fatal,
            BusFault => Severity::Info,
            QueueOverflow | MutexTimeout => {
                if self.source == EventSource::Task(TaskId::SafetyMonitor) {
                    Severity::Fatal
                } else {
                    Severity::Info
                }
            }
        }
    }
}

/// Anything that accepts safety events without blocking
pub trait SafetyEventSink {
    fn raise(&self, event: SafetyEvent) -> Result<(), IpcError>;
}

/// Safety event queue that never loses a fatal event
///
/// The queue itself is small. When it is full, non-fatal events are
/// dropped and counted like on any [`BoundedQueue`]; the first fatal event
/// that does not fit is parked in a side slot and handed out once the
/// queue drains, so the monitor always sees it.
pub struct SafetyEventQueue<const N: usize> {
    queue: BoundedQueue<SafetyEvent, N>,
    parked: critical_section::Mutex<Cell<Option<SafetyEvent>>>,
}

impl<const N: usize> SafetyEventQueue<N> {
    pub const fn new() -> Self {
        Self {
            queue: BoundedQueue::new("safety_events"),
            parked: critical_section::Mutex::new(Cell::new(None)),
        }
    }

    /// Next event, oldest first, then a parked fatal event if any
    pub fn try_receive(&self) -> Result<SafetyEvent, IpcError> {
        match self.queue.try_receive() {
            Ok(ev) => Ok(ev),
            Err(_) => critical_section::with(|cs| self.parked.borrow(cs).take())
                .ok_or(IpcError::Empty),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty() && critical_section::with(|cs| self.parked.borrow(cs).get().is_none())
    }

    /// Events dropped because the queue was full
    pub fn dropped(&self) -> u32 {
        self.queue.dropped()
    }
}

impl<const N: usize> Default for SafetyEventQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> SafetyEventSink for SafetyEventQueue<N> {
    fn raise(&self, event: SafetyEvent) -> Result<(), IpcError> {
        let result = self.queue.send_from_interrupt(event);
        if result.is_err() && event.severity() == Severity::Fatal {
            critical_section::with(|cs| {
                let slot = self.parked.borrow(cs);
                if slot.get().is_none() {
                    slot.set(Some(event));
                }
            });
        }
        result
    }
}

impl<const N: usize> SafetyEventSink for BoundedQueue<SafetyEvent, N> {
    fn raise(&self, event: SafetyEvent) -> Result<(), IpcError> {
        self.send_from_interrupt(event)
    }
}
