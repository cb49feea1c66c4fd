//! Host link tasks: command receive, telemetry and the shared transmitter

use defmt::*;
use embassy_rp::uart::{BufferedUartRx, BufferedUartTx};
use embedded_io_async::Write;
use tandem_core::tasks::{CommandRxTask, TelemetryTask};
use tandem_core::Kernel;
use tandem_hal_rp2040::RpTimer;

use crate::link::{send, OUTBOX};

/// Parse host frames and queue the replies
#[embassy_executor::task]
pub async fn command_rx_task(mut rx: BufferedUartRx, kernel: &'static Kernel) {
    info!("Command RX task started");

    let mut task = CommandRxTask::new(kernel, RpTimer);
    task.run(&mut rx, send).await
}

/// Periodic status snapshots to the host
#[embassy_executor::task]
pub async fn telemetry_task(kernel: &'static Kernel) {
    info!("Telemetry task started");

    let mut task = TelemetryTask::new(kernel, RpTimer);
    task.run(send).await
}

/// Drain the outbox onto the UART
#[embassy_executor::task]
pub async fn link_tx_task(mut tx: BufferedUartTx) {
    info!("Link TX task started");

    loop {
        let msg = OUTBOX.receive().await;
        let bytes = match msg.to_frame().and_then(|f| f.encode_to_vec()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Dropping unencodable message: {:?}", e);
                continue;
            }
        };
        if let Err(e) = tx.write_all(&bytes).await {
            warn!("Link write failed: {:?}", e);
        }
    }
}
