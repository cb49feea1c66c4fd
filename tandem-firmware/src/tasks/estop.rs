//! Emergency-stop button
//!
//! The stop runs inside the GPIO bank interrupt. embassy-rp owns the
//! `IO_IRQ_BANK0` vector and its handler calls the waker registered for
//! the pin, so the press future is armed with a waker whose `wake` is the
//! stop sequence itself. The line sits at the e-stop level of the
//! priority table; no executor poll happens between the edge and the
//! enable outputs going inactive.
//!
//! This task only arms the line, logs, and waits for release.

use core::cell::Cell;
use core::future::Future;
use core::pin::pin;
use core::task::{Context, RawWaker, RawWakerVTable, Waker};

use critical_section::Mutex;
use defmt::*;
use embassy_rp::gpio::Input;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use tandem_core::safety::{SharedOutputs, StopSource};
use tandem_core::Kernel;
use tandem_hal::Timer;
use tandem_hal_rp2040::RpTimer;

use crate::board::{EnablePin, ESTOP_ACTIVE_LOW};

type StopTarget = (&'static Kernel, &'static SharedOutputs<EnablePin>);

static TARGET: Mutex<Cell<Option<StopTarget>>> = Mutex::new(Cell::new(None));

/// Set once the stop sequence has run for the current press
static TRIPPED: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Stop sequence, in whatever context wakes the press future
fn trip() {
    if let Some((kernel, outputs)) = critical_section::with(|cs| TARGET.borrow(cs).get()) {
        kernel.emergency_stop(outputs, StopSource::Button, RpTimer.now_micros());
    }
    TRIPPED.signal(());
}

fn trip_clone(_: *const ()) -> RawWaker {
    RawWaker::new(core::ptr::null(), &TRIP_VTABLE)
}

fn trip_wake(_: *const ()) {
    trip()
}

fn trip_drop(_: *const ()) {}

static TRIP_VTABLE: RawWakerVTable = RawWakerVTable::new(trip_clone, trip_wake, trip_wake, trip_drop);

fn trip_waker() -> Waker {
    // SAFETY: the vtable ignores the data pointer and every entry is safe
    // to call from interrupt context
    unsafe { Waker::from_raw(trip_clone(core::ptr::null())) }
}

async fn wait_pressed(button: &mut Input<'static>) {
    if ESTOP_ACTIVE_LOW {
        button.wait_for_low().await
    } else {
        button.wait_for_high().await
    }
}

async fn wait_released(button: &mut Input<'static>) {
    if ESTOP_ACTIVE_LOW {
        button.wait_for_high().await
    } else {
        button.wait_for_low().await
    }
}

#[embassy_executor::task]
pub async fn estop_task(
    mut button: Input<'static>,
    kernel: &'static Kernel,
    outputs: &'static SharedOutputs<EnablePin>,
) {
    critical_section::with(|cs| TARGET.borrow(cs).set(Some((kernel, outputs))));
    let waker = trip_waker();
    info!("E-stop armed");

    loop {
        TRIPPED.reset();
        {
            let mut press = pin!(wait_pressed(&mut button));
            // Ready on the first poll when the button is already held, or
            // when the edge fired before the waker was registered
            if press.as_mut().poll(&mut Context::from_waker(&waker)).is_ready() {
                trip();
            }
            TRIPPED.wait().await;
        }
        error!("Emergency stop button pressed");

        wait_released(&mut button).await;
        info!("Emergency stop button released");
    }
}
