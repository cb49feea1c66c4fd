//! Telemetry Task
//!
//! Lowest priority. Periodically snapshots the motor state and kernel
//! counters and hands a [`Telemetry`] record to the link. Never sends more
//! often than the configured minimum interval.

use tandem_hal::Timer;
use tandem_protocol::{DeviceMessage, Telemetry};

use crate::kernel::{Counters, Kernel};
use crate::tasks::TaskHandle;
use crate::timing::{micros, sleep_until, PeriodicSchedule};

pub struct TelemetryTask<'k, T: Timer> {
    kernel: &'k Kernel,
    timer: T,
    me: TaskHandle,
    last_sent_us: Option<u64>,
    sent: u32,
}

impl<'k, T: Timer> TelemetryTask<'k, T> {
    pub fn new(kernel: &'k Kernel, timer: T) -> Self {
        Self {
            kernel,
            timer,
            me: kernel.tasks.telemetry,
            last_sent_us: None,
            sent: 0,
        }
    }

    pub fn sent(&self) -> u32 {
        self.sent
    }

    /// Build a record if the rate limit allows one now
    ///
    /// Returns `None` when rate limited or when the motor state could not
    /// be read in time.
    pub async fn snapshot(&mut self) -> Option<Telemetry> {
        let k = self.kernel;
        let now = self.timer.now_micros();
        let min_interval = k.config.timeouts.telemetry_min_interval_us as u64;
        if self
            .last_sent_us
            .is_some_and(|last| now.saturating_sub(last) < min_interval)
        {
            return None;
        }

        let motors = match k.motor_state.acquire(self.me, micros(k.config.timeouts.state_mutex_us)).await {
            Ok(states) => *states,
            Err(_) => {
                Counters::bump(&k.counters.mutex_timeouts);
                return None;
            }
        };
        self.last_sent_us = Some(now);
        self.sent = self.sent.wrapping_add(1);
        Some(k.telemetry(&motors, now))
    }

    /// Run forever, passing each record to `send`
    pub async fn run(&mut self, mut send: impl FnMut(DeviceMessage)) -> ! {
        let period_us = self.kernel.config.tasks.telemetry.period_us;
        let mut schedule = PeriodicSchedule::new(period_us, self.timer.now_micros());
        loop {
            sleep_until(schedule.deadline()).await;
            if let Some(t) = self.snapshot().await {
                send(DeviceMessage::Telemetry(t));
            }
            schedule.advance(self.timer.now_micros());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SystemConfig;
    use crate::ipc::NoBoost;
    use embassy_futures::block_on;
    use tandem_hal_sim::SimClock;

    static NO_BOOST: NoBoost = NoBoost;

    #[test]
    fn test_rate_limited() {
        let kernel = Kernel::new(SystemConfig::default(), &NO_BOOST).unwrap();
        let clock = SimClock::new();
        let mut task = TelemetryTask::new(&kernel, clock.clone());

        clock.advance(2_000_000);
        let t = block_on(task.snapshot()).unwrap();
        assert_eq!(t.uptime_ms, 2_000);
        assert_eq!(t.fail_safe, 0);

        clock.advance(10_000);
        assert!(block_on(task.snapshot()).is_none());
        clock.advance(40_000);
        assert!(block_on(task.snapshot()).is_some());
        assert_eq!(task.sent(), 2);
    }
}
