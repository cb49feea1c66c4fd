//! Tandem - Dual-Axis Positioning Firmware
//!
//! Firmware binary for RP2040-based controllers driving two closed-loop
//! stepper axes. The safety kernel in `tandem-core` owns every motion
//! command and every fault; this crate only wires it to the hardware.
//!
//! Interrupt and executor layout, most urgent first:
//!
//! | Level | Runs on                  | Work                              |
//! |-------|--------------------------|-----------------------------------|
//! | P0    | `IO_IRQ_BANK0`           | e-stop: outputs off, latch        |
//! | P1    | `TIMER_IRQ_0`            | control timer, wakes the tiers    |
//! | P2    | `UART0_IRQ`              | host link FIFO                    |
//! | P2    | `SWI_IRQ_1` executor     | `safety_monitor`, `estop_task`    |
//! | P3    | `SWI_IRQ_0` executor     | `motor_control`                   |
//! | -     | thread executor          | rx, telemetry, tx                 |
//!
//! Hardware sources take their levels from the interrupt priority table,
//! executor tiers from the task priorities below them. The NVIC's four
//! levels fold the host link onto the monitor tier.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Input, Level as PinLevel, Output, Pull};
use embassy_rp::interrupt::{self, InterruptExt};
use embassy_rp::peripherals::UART0;
use embassy_rp::spi::Spi;
use embassy_rp::uart::{BufferedInterruptHandler, Config as UartConfig, Uart};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use tandem_core::interrupt::{IrqSource, PriorityTable, TierLevels};
use tandem_core::ipc::{PiMutex, PriorityBoost};
use tandem_core::safety::{EnableOutputs, SharedOutputs};
use tandem_core::tasks::{MotorControlTask, SafetyMonitorTask};
use tandem_core::Kernel;
use tandem_hal::{BusConfig, Level};
use tandem_hal_rp2040::irq::nvic_priority;
use tandem_hal_rp2040::spi::spi_config;
use tandem_hal_rp2040::{ChipSelectBus, NvicBoost, RpOutput, RpTimer, RpWatchdog, SioInput};

use crate::board::{Bus, EnablePin, ENABLE_ACTIVE_LOW, ESTOP_ACTIVE_LOW, ESTOP_GPIO, LINK_BAUD};
use crate::executors::ExecTier;

mod board;
mod config;
mod critical;
mod executors;
mod link;
mod tasks;

bind_interrupts!(struct Irqs {
    UART0_IRQ => BufferedInterruptHandler<UART0>;
});

// Static cells for UART buffers (must live forever)
static TX_BUF: StaticCell<[u8; 256]> = StaticCell::new();
static RX_BUF: StaticCell<[u8; 256]> = StaticCell::new();

// Kernel context and the resources shared between tiers
static BOOST: StaticCell<NvicBoost<4>> = StaticCell::new();
static KERNEL: StaticCell<Kernel> = StaticCell::new();
static BUS: StaticCell<PiMutex<Bus>> = StaticCell::new();
static OUTPUTS: StaticCell<SharedOutputs<EnablePin>> = StaticCell::new();

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Tandem firmware starting...");

    let p = embassy_rp::init(Default::default());
    info!("Peripherals initialized");

    // Driver enables go inactive before anything else can run
    let enables = [
        RpOutput::new(Output::new(p.PIN_10, PinLevel::High), Level::inactive(ENABLE_ACTIVE_LOW)),
        RpOutput::new(Output::new(p.PIN_11, PinLevel::High), Level::inactive(ENABLE_ACTIVE_LOW)),
    ];
    let outputs: &'static SharedOutputs<EnablePin> =
        OUTPUTS.init(EnableOutputs::new(enables, ENABLE_ACTIVE_LOW).shared());

    let config = config::load();
    let table = PriorityTable::new();
    let tiers = TierLevels::new(&table, &config.tasks);
    let boost: &'static NvicBoost<4> = BOOST.init(executors::boost_tiers(&config.tasks, &tiers));
    let boost: &'static dyn PriorityBoost = boost;
    let kernel: &'static Kernel = KERNEL.init(unwrap!(Kernel::new(config, boost)));
    info!("Kernel initialized");

    // Motor drivers and encoders on SPI0, one chip select each
    let spi = Spi::new_blocking(
        p.SPI0,
        p.PIN_18,
        p.PIN_19,
        p.PIN_16,
        spi_config(&BusConfig::default()),
    );
    let selects = [
        Output::new(p.PIN_17, PinLevel::High),
        Output::new(p.PIN_20, PinLevel::High),
        Output::new(p.PIN_21, PinLevel::High),
        Output::new(p.PIN_22, PinLevel::High),
    ];
    let bus: &'static PiMutex<Bus> = BUS.init(PiMutex::new("bus", ChipSelectBus::new(spi, selects), boost));
    info!("SPI bus initialized");

    // Host link
    let mut uart_config = UartConfig::default();
    uart_config.baudrate = LINK_BAUD;

    let tx_buf = TX_BUF.init([0u8; 256]);
    let rx_buf = RX_BUF.init([0u8; 256]);

    let uart = Uart::new_blocking(p.UART0, p.PIN_0, p.PIN_1, uart_config);
    let uart = uart.into_buffered(Irqs, tx_buf, rx_buf);
    let (tx, rx) = uart.split();
    info!("UART initialized for host link at {} baud", LINK_BAUD);

    // Hardware interrupt levels from the priority table
    // The SPI is polled, so nothing raises the bus-complete level
    let estop_level = unwrap!(nvic_priority(table.priority(IrqSource::EmergencyStop)));
    let timer_level = unwrap!(nvic_priority(table.priority(IrqSource::ControlTimer)));
    let link_level = unwrap!(nvic_priority(table.priority(IrqSource::Communication)));
    interrupt::IO_IRQ_BANK0.set_priority(estop_level);
    interrupt::TIMER_IRQ_0.set_priority(timer_level);
    interrupt::UART0_IRQ.set_priority(link_level);

    let estop_pull = if ESTOP_ACTIVE_LOW { Pull::Up } else { Pull::Down };
    let button = Input::new(p.PIN_15, estop_pull);
    let estop_input = unwrap!(SioInput::new(ESTOP_GPIO));

    let watchdog = RpWatchdog::new(p.WATCHDOG);

    let monitor = unwrap!(SafetyMonitorTask::new(
        kernel,
        bus,
        outputs,
        estop_input,
        ESTOP_ACTIVE_LOW,
        RpTimer,
        watchdog,
    ));
    let control = MotorControlTask::new(kernel, bus, outputs, RpTimer);

    // Real-time tiers, most urgent first
    let monitor_spawner = unwrap!(ExecTier::Monitor.start(&tiers));
    let control_spawner = unwrap!(ExecTier::Control.start(&tiers));
    info!("Interrupt executors started");

    unwrap!(monitor_spawner.spawn(tasks::estop_task(button, kernel, outputs)));
    unwrap!(monitor_spawner.spawn(tasks::safety_monitor_task(monitor)));
    unwrap!(control_spawner.spawn(tasks::motor_control_task(control)));
    unwrap!(spawner.spawn(tasks::command_rx_task(rx, kernel)));
    unwrap!(spawner.spawn(tasks::telemetry_task(kernel)));
    unwrap!(spawner.spawn(tasks::link_tx_task(tx)));

    info!("All tasks spawned, firmware running");

    // Main task has nothing else to do - all work happens in spawned tasks
    loop {
        embassy_time::Timer::after_secs(10).await;
        let c = kernel.counters();
        debug!(
            "state {}, drops {}, bus faults {}, overruns {}, unbalanced cs {}",
            kernel.fail_safe_state(),
            c.command_drops,
            c.bus_faults,
            c.overruns,
            critical::unbalanced_releases()
        );
    }
}
