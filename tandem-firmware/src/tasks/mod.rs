//! Embassy tasks
//!
//! Thin wrappers that pin each kernel task body to an executor. The
//! bodies themselves live in `tandem-core` and are host-tested there.

pub mod estop;
pub mod link;
pub mod motor_control;
pub mod safety_monitor;

pub use estop::estop_task;
pub use link::{command_rx_task, link_tx_task, telemetry_task};
pub use motor_control::motor_control_task;
pub use safety_monitor::safety_monitor_task;
