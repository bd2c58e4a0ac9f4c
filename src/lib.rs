//! # rtos-bringup
//!
//! Static-allocation task bring-up and interrupt integration for running
//! FreeRTOS on ARM Cortex-M microcontrollers.
//!
//! ## Overview
//!
//! The scheduler itself is an external C library. This crate does
//! everything around it that has to be right before the first context
//! switch:
//!
//! - **No heap**: every task's stack and control block comes from one
//!   arena reserved at link time, including the scheduler's idle and timer
//!   service tasks.
//! - **Vector binding**: fault vectors get handlers that never return;
//!   SVCall, PendSV and SysTick are bound to the scheduler's entry points
//!   at the lowest priority the interrupt controller implements.
//! - **Tick**: the tick period is computed from the measured core clock and
//!   validated against the 24-bit SysTick before it is armed. Ticks that
//!   arrive before the scheduler has started are dropped.
//! - **Ordered bring-up**: interrupts stay masked until all of the above is
//!   in place.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │              Application (main.rs: blinker)             │
//! ├────────────────────────────────────────────────────────┤
//! │           Bring-up Sequencer (bringup.rs)               │
//! │  initialize_processor · initialize_platform · handoff   │
//! ├─────────────┬──────────────┬─────────────┬────────────┤
//! │ Task Memory │ Vector Binder│ Tick Source │  Faults    │
//! │ memory.rs   │ vector.rs    │ tick.rs     │  fault.rs  │
//! │ ─ idle()    │ ─ bind()     │ ─ configure │  ─ traps   │
//! │ ─ timer()   │ ─ unbind()   │             │  ─ halt()  │
//! │ ─ claim()   │              │             │            │
//! ├─────────────┴──────────────┴─────────────┴────────────┤
//! │   Scheduler Service (rtos.rs) ⇄ FreeRTOS (C, linked)    │
//! │   spawn · start · delay · static-memory callbacks       │
//! ├────────────────────────────────────────────────────────┤
//! │   Boards (board/)          │  Arch Port (arch/armv7m.rs) │
//! │   lpc4078 · stm32f103c8    │  RAM IVT · NVIC · SysTick   │
//! ├────────────────────────────────────────────────────────┤
//! │              ARM Cortex-M3 / M4F Hardware               │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Priorities
//!
//! Priorities are logical, `0` being the most urgent:
//!
//! | Vector                  | Priority                   |
//! |-------------------------|----------------------------|
//! | HardFault               | fixed (-1)                 |
//! | MemManage/Bus/Usage     | `0`                        |
//! | Peripheral IRQs         | board-defined              |
//! | SVCall, PendSV, SysTick | `(1 << priority_bits) - 1` |
//!
//! ## Memory Model
//!
//! - **No `alloc`**: pure `core`
//! - **Task arena**: [`memory::TASK_MEMORY`], sized from [`config`]
//! - **RAM vector table**: one per board, 512-byte aligned
//! - **Critical sections**: `critical-section` (PRIMASK on the target)
//!
//! ## Host testing
//!
//! Register access is compiled only for `target_os = "none"`. Everything
//! else builds with `std` under `cargo test`, using the doubles in the
//! `testing` module.

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod board;
pub mod bringup;
pub mod config;
pub mod drivers;
pub mod error;
pub mod fault;
pub mod memory;
pub mod rtos;
pub mod sync;
pub mod tick;
pub mod vector;

#[cfg(all(target_os = "none", feature = "semihosting"))]
pub mod logger;

#[cfg(test)]
mod testing;
