//! # Blinker Firmware
//!
//! Brings up the selected board, then hands off to an application that
//! creates one task from the static arena and starts FreeRTOS:
//!
//! | Task      | Priority | Stack     | Behavior                         |
//! |-----------|----------|-----------|----------------------------------|
//! | `blinker` | 4        | 128 words | Toggles the LED every 500 ms     |
//!
//! The scheduler's own idle and timer tasks get their memory from the same
//! arena through the static-allocation callbacks.
//!
//! Build for the board with, e.g.
//! `FREERTOS_LIB_DIR=... cargo build --release --target thumbv7em-none-eabihf`
//! (LPC4078, default) or
//! `cargo build --release --target thumbv7m-none-eabi --no-default-features --features stm32f103c8`.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod firmware {
    use core::ffi::c_void;

    use cortex_m_rt::entry;
    use panic_halt as _;
    use spin::Once;

    use rtos_bringup::board::Board;
    use rtos_bringup::bringup::{BringUp, HardwareMap};
    use rtos_bringup::drivers::OutputPin;
    use rtos_bringup::error::FatalError;
    use rtos_bringup::fault;
    use rtos_bringup::memory::{TaskId, TASK_MEMORY};
    use rtos_bringup::rtos::{ms_to_ticks, FreeRtos, SchedulerService, TaskSpec};

    /// Set once by the application before the scheduler starts.
    static HARDWARE: Once<HardwareMap<Board>> = Once::new();

    const BLINK_HALF_PERIOD_MS: u32 = 500;

    const BLINKER: TaskSpec = TaskSpec::new(blinker, c"blinker", 4);

    extern "C" fn blinker(_: *mut c_void) {
        let Some(hardware) = HARDWARE.get() else {
            fault::halt()
        };
        loop {
            hardware.led.toggle();
            FreeRtos::delay(ms_to_ticks(BLINK_HALF_PERIOD_MS));
        }
    }

    fn application(hardware: HardwareMap<Board>) -> Result<(), FatalError> {
        HARDWARE.call_once(|| hardware);
        TASK_MEMORY.spawn::<FreeRtos>(TaskId::User(0), &BLINKER)?;
        match FreeRtos::start()? {}
    }

    #[entry]
    fn main() -> ! {
        #[cfg(feature = "semihosting")]
        let _ = rtos_bringup::logger::init(log::LevelFilter::Debug);

        let Some(board) = Board::take() else {
            fault::fatal(FatalError::DeviceUnavailable("core peripherals"))
        };
        let mut bringup = BringUp::<Board, FreeRtos>::new(board);
        if let Err(err) = bringup.initialize_processor() {
            fault::fatal(err)
        }
        let hardware = match bringup.initialize_platform() {
            Ok(hardware) => hardware,
            Err(err) => fault::fatal(err),
        };
        bringup.handoff(hardware, application)
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    println!(
        "rtos-bringup is firmware for ARM Cortex-M; build it for a thumbv7m/thumbv7em target. \
         Run `cargo test` to exercise the bring-up logic on the host."
    );
}
