//! Motor Control Task

use defmt::*;

use crate::board::Control;

#[embassy_executor::task]
pub async fn motor_control_task(mut control: Control) {
    info!("Motor control task started");
    control.run().await
}
