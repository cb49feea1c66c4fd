//! Interrupt-to-task signaling

use core::future::poll_fn;
use core::task::Poll;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_sync::waitqueue::AtomicWaker;
use embassy_time::{with_timeout, Duration};
use portable_atomic::{AtomicU32, Ordering};

use super::IpcError;

/// Binary signal: any number of raises before a wait collapse into one
pub struct BinarySignal {
    inner: Signal<CriticalSectionRawMutex, ()>,
}

impl Default for BinarySignal {
    fn default() -> Self {
        Self::new()
    }
}

impl BinarySignal {
    pub const fn new() -> Self {
        Self {
            inner: Signal::new(),
        }
    }

    /// Raise from interrupt context
    pub fn signal_from_interrupt(&self) {
        self.inner.signal(());
    }

    /// Raise from task context
    pub fn signal(&self) {
        self.inner.signal(());
    }

    /// Wait up to `timeout` for the signal, consuming it
    pub async fn wait(&self, timeout: Duration) -> Result<(), IpcError> {
        with_timeout(timeout, self.inner.wait())
            .await
            .map_err(|_| IpcError::Timeout)
    }

    /// Consume a pending signal without waiting
    pub fn try_take(&self) -> bool {
        self.inner.try_take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.inner.signaled()
    }
}

/// Counting signal: each raise is consumed by exactly one wait
///
/// The count saturates at `max` so a runaway interrupt cannot wrap it.
pub struct CountingSignal {
    count: AtomicU32,
    max: u32,
    waker: AtomicWaker,
}

impl CountingSignal {
    pub const fn new(max: u32) -> Self {
        Self {
            count: AtomicU32::new(0),
            max,
            waker: AtomicWaker::new(),
        }
    }

    /// Raise from interrupt context
    ///
    /// Returns `false` if the count was already saturated.
    pub fn signal_from_interrupt(&self) -> bool {
        let max = self.max;
        let raised = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                (c < max).then_some(c + 1)
            })
            .is_ok();
        self.waker.wake();
        raised
    }

    /// Consume one pending raise without waiting
    pub fn try_take(&self) -> bool {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1))
            .is_ok()
    }

    /// Wait up to `timeout` for one raise
    pub async fn wait(&self, timeout: Duration) -> Result<(), IpcError> {
        let take = poll_fn(|cx| {
            if self.try_take() {
                return Poll::Ready(());
            }
            self.waker.register(cx.waker());
            // A raise between the first check and registering would be lost
            if self.try_take() {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        });
        with_timeout(timeout, take).await.map_err(|_| IpcError::Timeout)
    }

    pub fn pending(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    #[test]
    fn test_binary_collapses() {
        let s = BinarySignal::new();
        s.signal_from_interrupt();
        s.signal_from_interrupt();
        assert!(s.is_pending());
        assert_eq!(block_on(s.wait(Duration::from_millis(1))), Ok(()));
        assert_eq!(
            block_on(s.wait(Duration::from_millis(1))),
            Err(IpcError::Timeout)
        );
    }

    #[test]
    fn test_counting_counts() {
        let s = CountingSignal::new(8);
        s.signal_from_interrupt();
        s.signal_from_interrupt();
        assert_eq!(s.pending(), 2);
        assert_eq!(block_on(s.wait(Duration::from_millis(1))), Ok(()));
        assert!(s.try_take());
        assert!(!s.try_take());
        assert_eq!(
            block_on(s.wait(Duration::from_millis(1))),
            Err(IpcError::Timeout)
        );
    }

    #[test]
    fn test_counting_saturates() {
        let s = CountingSignal::new(2);
        assert!(s.signal_from_interrupt());
        assert!(s.signal_from_interrupt());
        assert!(!s.signal_from_interrupt());
        assert_eq!(s.pending(), 2);
    }
}
