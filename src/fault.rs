//! # Fault Isolation
//!
//! Processor faults and scheduler-detected stack overflows are terminal.
//! Each trap records what happened, then parks the core in a low-power loop
//! so a debugger can attach and inspect the state. Execution never returns
//! to the faulting code.

use core::sync::atomic::{AtomicU8, Ordering};

use log::error;

use crate::arch;
use crate::error::FatalError;
use crate::vector::{Handler, Vector};

/// Cause of the last trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FaultKind {
    HardFault = 1,
    MemoryManagement = 2,
    BusFault = 3,
    UsageFault = 4,
    StackOverflow = 5,
    /// Bring-up or handoff failed.
    Fatal = 6,
}

impl FaultKind {
    const fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            1 => FaultKind::HardFault,
            2 => FaultKind::MemoryManagement,
            3 => FaultKind::BusFault,
            4 => FaultKind::UsageFault,
            5 => FaultKind::StackOverflow,
            6 => FaultKind::Fatal,
            _ => return None,
        })
    }
}

static LAST_FAULT: AtomicU8 = AtomicU8::new(0);

/// The fault that stopped the system, if any.
pub fn last_fault() -> Option<FaultKind> {
    FaultKind::from_raw(LAST_FAULT.load(Ordering::Acquire))
}

/// Handlers bound to the four fault vectors during bring-up.
pub const FAULT_HANDLERS: [(Vector, Handler); 4] = [
    (Vector::HardFault, Handler::Diverging(hard_fault_trap)),
    (Vector::MemoryManagement, Handler::Diverging(memory_management_trap)),
    (Vector::BusFault, Handler::Diverging(bus_fault_trap)),
    (Vector::UsageFault, Handler::Diverging(usage_fault_trap)),
];

pub unsafe extern "C" fn hard_fault_trap() -> ! {
    trap(FaultKind::HardFault)
}

pub unsafe extern "C" fn memory_management_trap() -> ! {
    trap(FaultKind::MemoryManagement)
}

pub unsafe extern "C" fn bus_fault_trap() -> ! {
    trap(FaultKind::BusFault)
}

pub unsafe extern "C" fn usage_fault_trap() -> ! {
    trap(FaultKind::UsageFault)
}

/// Record `kind` and stop. No logging here: the fault may have hit inside
/// the logger or with a corrupted stack.
pub fn trap(kind: FaultKind) -> ! {
    LAST_FAULT.store(kind as u8, Ordering::Release);
    halt()
}

/// Park the core forever.
pub fn halt() -> ! {
    loop {
        arch::wait_for_interrupt();
    }
}

/// Report an unrecoverable bring-up error and halt.
pub fn fatal(err: FatalError) -> ! {
    error!("fatal: {err}");
    trap(FaultKind::Fatal)
}
