//! Bounded FIFO queue

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use embassy_time::{with_timeout, Duration};
use portable_atomic::{AtomicU32, Ordering};

use super::IpcError;

/// Fixed-capacity FIFO with a drop counter
///
/// A send that finds the queue full drops the item, increments the drop
/// counter by one and returns [`IpcError::QueueFull`]. Producers on the
/// safety path use the non-blocking sends so they never stall.
pub struct BoundedQueue<T, const N: usize> {
    name: &'static str,
    channel: Channel<CriticalSectionRawMutex, T, N>,
    dropped: AtomicU32,
}

impl<T, const N: usize> BoundedQueue<T, N> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            channel: Channel::new(),
            dropped: AtomicU32::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn record_drop(&self) -> IpcError {
        let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        warn!("queue {} full, item dropped (total {})", self.name, total);
        IpcError::QueueFull
    }

    /// Enqueue without waiting
    pub fn try_send(&self, item: T) -> Result<(), IpcError> {
        match self.channel.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(self.record_drop()),
        }
    }

    /// Enqueue from interrupt context; never blocks
    pub fn send_from_interrupt(&self, item: T) -> Result<(), IpcError> {
        self.try_send(item)
    }

    /// Enqueue, waiting up to `timeout` for space
    ///
    /// A zero timeout behaves like [`try_send`](Self::try_send).
    pub async fn send(&self, item: T, timeout: Duration) -> Result<(), IpcError> {
        let item = match self.channel.try_send(item) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(item)) => item,
        };
        if timeout.as_ticks() == 0 {
            return Err(self.record_drop());
        }
        with_timeout(timeout, self.channel.send(item))
            .await
            .map_err(|_| self.record_drop())
    }

    /// Dequeue, waiting up to `timeout` for an item
    pub async fn receive(&self, timeout: Duration) -> Result<T, IpcError> {
        with_timeout(timeout, self.channel.receive())
            .await
            .map_err(|_| IpcError::Timeout)
    }

    /// Dequeue without waiting
    pub fn try_receive(&self) -> Result<T, IpcError> {
        self.channel.try_receive().map_err(|_| IpcError::Empty)
    }

    /// Discard everything queued, returning how many items were removed
    pub fn clear(&self) -> u32 {
        let mut n = 0;
        while self.channel.try_receive().is_ok() {
            n += 1;
        }
        n
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.channel.is_full()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Items dropped on a full queue since creation
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}
