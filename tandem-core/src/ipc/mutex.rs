//! Mutex with acquire timeout and priority inheritance
//!
//! Each task runs on an executor tier with a fixed priority. When a more
//! urgent task blocks on a mutex held by a less urgent one, the holder's
//! tier is boosted to the waiter's priority through [`PriorityBoost`] until
//! the holder releases, which bounds the inversion to the holder's critical
//! region. A waiter that times out withdraws its boost.
//!
//! The boost bookkeeping assumes at most one waiter per mutex at a time,
//! which holds for the kernel's two mutexes (each is contended by at most
//! two tasks). A second waiter still gets the mutex in FIFO order, it just
//! does not raise the boost further.

use core::cell::Cell;
use core::ops::{Deref, DerefMut};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use embassy_time::{with_timeout, Duration};
use portable_atomic::{AtomicU32, Ordering};

use super::IpcError;
use crate::tasks::{Priority, TaskHandle};

/// Raise and restore the priority a task runs at
///
/// Called with a critical section held; implementations only write
/// interrupt-controller registers.
pub trait PriorityBoost: Sync {
    /// Run `holder` at no less than `to` until [`restore`](Self::restore)
    fn boost(&self, holder: TaskHandle, to: Priority);

    /// Return `holder` to its base priority
    fn restore(&self, holder: TaskHandle);
}

/// Boost that does nothing, for single-tier setups and tests
pub struct NoBoost;

impl PriorityBoost for NoBoost {
    fn boost(&self, _holder: TaskHandle, _to: Priority) {}

    fn restore(&self, _holder: TaskHandle) {}
}

#[derive(Debug, Clone, Copy)]
struct Ownership {
    holder: TaskHandle,
    inherited: Option<Priority>,
}

pub struct PiMutex<T> {
    name: &'static str,
    inner: Mutex<CriticalSectionRawMutex, T>,
    owner: critical_section::Mutex<Cell<Option<Ownership>>>,
    boost: &'static dyn PriorityBoost,
    timeouts: AtomicU32,
}

impl<T> PiMutex<T> {
    pub const fn new(name: &'static str, value: T, boost: &'static dyn PriorityBoost) -> Self {
        Self {
            name,
            inner: Mutex::new(value),
            owner: critical_section::Mutex::new(Cell::new(None)),
            boost,
            timeouts: AtomicU32::new(0),
        }
    }

    /// Acquire, waiting at most `timeout`
    ///
    /// Returns [`IpcError::Timeout`] if the mutex is still held when the
    /// timeout expires.
    pub async fn acquire(&self, who: TaskHandle, timeout: Duration) -> Result<PiGuard<'_, T>, IpcError> {
        if let Ok(guard) = self.inner.try_lock() {
            return Ok(self.claim(guard, who));
        }

        self.inherit(who);
        match with_timeout(timeout, self.inner.lock()).await {
            Ok(guard) => Ok(self.claim(guard, who)),
            Err(_) => {
                self.withdraw(who);
                self.timeouts.fetch_add(1, Ordering::Relaxed);
                warn!("mutex {} acquire timed out for task {}", self.name, who.id);
                Err(IpcError::Timeout)
            }
        }
    }

    /// Acquire only if free
    pub fn try_acquire(&self, who: TaskHandle) -> Result<PiGuard<'_, T>, IpcError> {
        self.inner
            .try_lock()
            .map(|guard| self.claim(guard, who))
            .map_err(|_| IpcError::Busy)
    }

    /// Task currently holding the mutex
    pub fn holder(&self) -> Option<TaskHandle> {
        critical_section::with(|cs| self.owner.borrow(cs).get().map(|o| o.holder))
    }

    /// Priority the holder was boosted to, if any
    pub fn inherited(&self) -> Option<Priority> {
        critical_section::with(|cs| self.owner.borrow(cs).get().and_then(|o| o.inherited))
    }

    /// Acquire attempts that timed out since creation
    pub fn timeouts(&self) -> u32 {
        self.timeouts.load(Ordering::Relaxed)
    }

    fn claim<'a>(
        &'a self,
        guard: MutexGuard<'a, CriticalSectionRawMutex, T>,
        who: TaskHandle,
    ) -> PiGuard<'a, T> {
        critical_section::with(|cs| {
            self.owner.borrow(cs).set(Some(Ownership {
                holder: who,
                inherited: None,
            }))
        });
        PiGuard {
            mutex: self,
            guard,
        }
    }

    fn inherit(&self, waiter: TaskHandle) {
        critical_section::with(|cs| {
            let cell = self.owner.borrow(cs);
            let Some(mut own) = cell.get() else {
                return;
            };
            let effective = own.inherited.unwrap_or(own.holder.priority);
            if waiter.priority > effective {
                own.inherited = Some(waiter.priority);
                cell.set(Some(own));
                self.boost.boost(own.holder, waiter.priority);
            }
        });
    }

    fn withdraw(&self, waiter: TaskHandle) {
        critical_section::with(|cs| {
            let cell = self.owner.borrow(cs);
            if let Some(mut own) = cell.get() {
                if own.inherited == Some(waiter.priority) {
                    own.inherited = None;
                    cell.set(Some(own));
                    self.boost.restore(own.holder);
                }
            }
        });
    }

    fn release(&self) {
        critical_section::with(|cs| {
            if let Some(own) = self.owner.borrow(cs).take() {
                if own.inherited.is_some() {
                    self.boost.restore(own.holder);
                }
            }
        });
    }
}

/// Exclusive access to the value inside a [`PiMutex`]
///
/// Dropping the guard restores any boosted priority, then unlocks.
pub struct PiGuard<'a, T> {
    mutex: &'a PiMutex<T>,
    guard: MutexGuard<'a, CriticalSectionRawMutex, T>,
}

impl<T> Deref for PiGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for PiGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for PiGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskId;
    use embassy_futures::block_on;
    use std::sync::Mutex as StdMutex;

    struct RecordingBoost {
        log: StdMutex<Vec<(TaskId, Option<u8>)>>,
    }

    impl PriorityBoost for RecordingBoost {
        fn boost(&self, holder: TaskHandle, to: Priority) {
            self.log.lock().unwrap().push((holder.id, Some(to.0)));
        }

        fn restore(&self, holder: TaskHandle) {
            self.log.lock().unwrap().push((holder.id, None));
        }
    }

    fn leak_boost() -> &'static RecordingBoost {
        Box::leak(Box::new(RecordingBoost {
            log: StdMutex::new(Vec::new()),
        }))
    }

    const LOW: TaskHandle = TaskHandle::new(TaskId::Telemetry, Priority(1));
    const HIGH: TaskHandle = TaskHandle::new(TaskId::SafetyMonitor, Priority(4));

    #[test]
    fn test_uncontended_acquire() {
        let m = PiMutex::new("t", 5u32, &NoBoost);
        let mut g = block_on(m.acquire(LOW, Duration::from_millis(1))).unwrap();
        *g += 1;
        assert_eq!(m.holder().map(|h| h.id), Some(TaskId::Telemetry));
        drop(g);
        assert!(m.holder().is_none());
        assert_eq!(*m.try_acquire(HIGH).unwrap(), 6);
    }

    #[test]
    fn test_timeout_while_held() {
        let m = PiMutex::new("t", (), &NoBoost);
        let _held = m.try_acquire(LOW).unwrap();
        let r = block_on(m.acquire(HIGH, Duration::from_millis(2)));
        assert_eq!(r.err(), Some(IpcError::Timeout));
        assert_eq!(m.timeouts(), 1);
        assert_eq!(m.try_acquire(HIGH).err(), Some(IpcError::Busy));
    }

    #[test]
    fn test_boost_applied_then_withdrawn_on_timeout() {
        let boost = leak_boost();
        let m = PiMutex::new("t", (), boost);
        let held = m.try_acquire(LOW).unwrap();
        let _ = block_on(m.acquire(HIGH, Duration::from_millis(1)));
        assert!(m.inherited().is_none());
        drop(held);
        let log = boost.log.lock().unwrap().clone();
        assert_eq!(
            log,
            vec![(TaskId::Telemetry, Some(4)), (TaskId::Telemetry, None)]
        );
    }

    #[test]
    fn test_lower_waiter_does_not_boost() {
        let boost = leak_boost();
        let m = PiMutex::new("t", (), boost);
        let _held = m.try_acquire(HIGH).unwrap();
        let _ = block_on(m.acquire(LOW, Duration::from_millis(1)));
        assert!(boost.log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_release_restores_boost() {
        let boost = leak_boost();
        let m = PiMutex::new("t", (), boost);
        let held = m.try_acquire(LOW).unwrap();
        m.inherit(HIGH);
        assert_eq!(m.inherited(), Some(Priority(4)));
        drop(held);
        assert_eq!(
            boost.log.lock().unwrap().last().copied(),
            Some((TaskId::Telemetry, None))
        );
    }
}
