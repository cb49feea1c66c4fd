//! Safety Monitor Task

use defmt::*;

use crate::board::Monitor;

#[embassy_executor::task]
pub async fn safety_monitor_task(mut monitor: Monitor) {
    info!("Safety monitor task started");
    monitor.start();
    monitor.run().await
}
