//! Position limit enforcement
//!
//! Every motion target passes through [`PositionSafetyEnforcer::enforce`]
//! before it reaches a driver. Targets inside `[min, max]` pass unchanged.
//! Targets outside are clamped; how far outside, and how often in a row,
//! decides whether the request is mitigated with a warning or rejected as
//! fatal. Each violation raises exactly one safety event.
//!
//! The enforcer keeps its per-axis streak counters in atomics so it can be
//! shared by reference and called from any task.

use portable_atomic::{AtomicU32, AtomicU8, Ordering};

use super::events::{EventPayload, LimitClass, MotorFault, SafetyEvent, SafetyEventKind, SafetyEventSink};
use crate::config::{PositionLimits, NUM_MOTORS};
use crate::motor::{DriverStatus, MotorId};
use crate::tasks::TaskId;

/// A target that could not be safely mitigated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PositionLimitViolation {
    pub motor: MotorId,
    pub requested: i32,
    /// Nearest permitted target
    pub clamped: i32,
    pub class: LimitClass,
}

pub struct PositionSafetyEnforcer {
    limits: [PositionLimits; NUM_MOTORS],
    persistent_limit: u8,
    streaks: [AtomicU8; NUM_MOTORS],
    violations: AtomicU32,
    /// Task named as the source of raised events
    caller: TaskId,
}

impl PositionSafetyEnforcer {
    pub const fn new(limits: [PositionLimits; NUM_MOTORS], persistent_limit: u8) -> Self {
        Self {
            limits,
            persistent_limit,
            streaks: [AtomicU8::new(0), AtomicU8::new(0)],
            violations: AtomicU32::new(0),
            caller: TaskId::MotorControl,
        }
    }

    pub fn limits(&self, motor: MotorId) -> &PositionLimits {
        &self.limits[motor.index()]
    }

    /// Consecutive out-of-range targets on `motor`
    pub fn streak(&self, motor: MotorId) -> u8 {
        self.streaks[motor.index()].load(Ordering::Acquire)
    }

    /// Violations seen since boot
    pub fn violations(&self) -> u32 {
        self.violations.load(Ordering::Relaxed)
    }

    /// Check a position target
    ///
    /// Returns the target to apply: unchanged when in range, clamped on a
    /// soft violation. Hard and persistent violations are returned as
    /// errors carrying the clamped value; the caller must not apply the
    /// original target.
    pub fn enforce(
        &self,
        motor: MotorId,
        target: i32,
        now_us: u64,
        sink: &dyn SafetyEventSink,
    ) -> Result<i32, PositionLimitViolation> {
        let limits = &self.limits[motor.index()];
        let streak = &self.streaks[motor.index()];
        if limits.contains(target) {
            streak.store(0, Ordering::Release);
            return Ok(target);
        }

        let clamped = limits.clamp(target);
        let count = streak
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_add(1)))
            .unwrap_or(u8::MAX)
            .saturating_add(1);
        self.violations.fetch_add(1, Ordering::Relaxed);

        let class = if limits.beyond_hard(target) {
            LimitClass::Hard
        } else if count >= self.persistent_limit {
            LimitClass::Persistent
        } else {
            LimitClass::Soft
        };
        self.raise(motor, class, target, clamped, now_us, sink);

        if class == LimitClass::Soft {
            warn!("motor {} target {} clamped to {}", motor.raw(), target, clamped);
            Ok(clamped)
        } else {
            error!("motor {} target {} rejected ({:?})", motor.raw(), target, class);
            Err(PositionLimitViolation {
                motor,
                requested: target,
                clamped,
                class,
            })
        }
    }

    /// Check a velocity command against the axis' current position
    ///
    /// Motion further out from an axis already at or past a limit is
    /// replaced by zero velocity.
    pub fn enforce_velocity(
        &self,
        motor: MotorId,
        velocity: i32,
        position: i32,
        now_us: u64,
        sink: &dyn SafetyEventSink,
    ) -> i32 {
        let limits = &self.limits[motor.index()];
        let outward = (position >= limits.max && velocity > 0) || (position <= limits.min && velocity < 0);
        if !outward {
            return velocity;
        }
        self.violations.fetch_add(1, Ordering::Relaxed);
        self.raise(motor, LimitClass::Soft, velocity, 0, now_us, sink);
        warn!("motor {} velocity {} zeroed at limit", motor.raw(), velocity);
        0
    }

    fn raise(
        &self,
        motor: MotorId,
        class: LimitClass,
        requested: i32,
        applied: i32,
        now_us: u64,
        sink: &dyn SafetyEventSink,
    ) {
        let event = SafetyEvent::from_task(SafetyEventKind::PositionLimit(class), self.caller, now_us)
            .with_detail(motor.raw())
            .with_payload(EventPayload::Motor(MotorFault {
                motor,
                requested,
                applied,
                driver_flags: DriverStatus::empty(),
            }));
        // A full queue is counted by the queue itself
        let _ = sink.raise(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::BoundedQueue;
    use crate::safety::events::Severity;
    use proptest::prelude::*;

    fn enforcer() -> PositionSafetyEnforcer {
        PositionSafetyEnforcer::new([PositionLimits::from_degrees(0, 180); NUM_MOTORS], 3)
    }

    #[test]
    fn test_in_range_passes_silently() {
        let e = enforcer();
        let q: BoundedQueue<SafetyEvent, 4> = BoundedQueue::new("events");
        assert_eq!(e.enforce(MotorId::M0, 90_000, 0, &q), Ok(90_000));
        assert!(q.is_empty());
    }

    #[test]
    fn test_soft_violation_clamps_with_one_event() {
        let e = enforcer();
        let q: BoundedQueue<SafetyEvent, 4> = BoundedQueue::new("events");
        assert_eq!(e.enforce(MotorId::M0, 200_000, 5, &q), Ok(180_000));
        assert_eq!(q.len(), 1);

        let ev = q.try_receive().unwrap();
        assert_eq!(ev.kind, SafetyEventKind::PositionLimit(LimitClass::Soft));
        assert_eq!(ev.severity(), Severity::Warning);
        assert_eq!(ev.timestamp_us, 5);
        match ev.payload {
            EventPayload::Motor(m) => {
                assert_eq!(m.requested, 200_000);
                assert_eq!(m.applied, 180_000);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_hard_violation_rejected() {
        let e = enforcer();
        let q: BoundedQueue<SafetyEvent, 4> = BoundedQueue::new("events");
        let err = e.enforce(MotorId::M1, -40_000, 0, &q).unwrap_err();
        assert_eq!(err.class, LimitClass::Hard);
        assert_eq!(err.clamped, 0);
        assert_eq!(q.try_receive().unwrap().severity(), Severity::Fatal);
    }

    #[test]
    fn test_repeated_soft_becomes_persistent() {
        let e = enforcer();
        let q: BoundedQueue<SafetyEvent, 4> = BoundedQueue::new("events");
        assert!(e.enforce(MotorId::M0, 190_000, 0, &q).is_ok());
        assert!(e.enforce(MotorId::M0, 190_000, 0, &q).is_ok());
        // Other axis keeps its own streak
        assert!(e.enforce(MotorId::M1, 190_000, 0, &q).is_ok());
        let err = e.enforce(MotorId::M0, 190_000, 0, &q).unwrap_err();
        assert_eq!(err.class, LimitClass::Persistent);
        assert_eq!(q.len(), 4);

        assert_eq!(e.enforce(MotorId::M0, 10_000, 0, &q), Ok(10_000));
        assert_eq!(e.streak(MotorId::M0), 0);
    }

    #[test]
    fn test_velocity_zeroed_outward_only() {
        let e = enforcer();
        let q: BoundedQueue<SafetyEvent, 4> = BoundedQueue::new("events");
        assert_eq!(e.enforce_velocity(MotorId::M0, 5_000, 180_000, 0, &q), 0);
        assert_eq!(q.len(), 1);
        assert_eq!(e.enforce_velocity(MotorId::M0, -5_000, 180_000, 0, &q), -5_000);
        assert_eq!(e.enforce_velocity(MotorId::M0, 5_000, 90_000, 0, &q), 5_000);
        assert_eq!(q.len(), 1);
    }

    proptest! {
        #[test]
        fn test_out_of_range_target_lands_inside_limits(
            target in prop_oneof![i32::MIN..0i32, 180_001i32..=i32::MAX],
            axis in 0usize..2,
        ) {
            let e = enforcer();
            let q: BoundedQueue<SafetyEvent, 4> = BoundedQueue::new("events");
            let motor = [MotorId::M0, MotorId::M1][axis];
            let applied = match e.enforce(motor, target, 0, &q) {
                Ok(v) => v,
                Err(violation) => violation.clamped,
            };
            prop_assert!(e.limits(motor).contains(applied));
            prop_assert_eq!(q.len(), 1);
        }
    }
}
