//! Error types for every bring-up step.
//!
//! Each component reports its own enum; [`FatalError`] collects them so the
//! sequencer can propagate with `?` and halt on the first failure.

use thiserror::Error;

use crate::bringup::Phase;
use crate::vector::{Priority, Vector};

/// Failures while binding a handler to a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("{0:?} already has a handler")]
    AlreadyBound(Vector),
    #[error("priority {priority} of {vector:?} exceeds the lowest level {lowest}")]
    PriorityOutOfRange {
        vector: Vector,
        priority: Priority,
        lowest: Priority,
    },
    #[error("{0:?} does not exist on this controller")]
    InvalidVector(Vector),
    #[error("fault vector {0:?} needs a handler that never returns")]
    ReturningFaultHandler(Vector),
    #[error("scheduler vector {vector:?} must sit at priority {required}")]
    SchedulerPriority { vector: Vector, required: Priority },
    #[error("{0:?} cannot be unbound")]
    Protected(Vector),
    #[error("{0:?} has no handler")]
    NotBound(Vector),
}

/// Failures while computing or arming the tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TickError {
    #[error("tick frequency is zero")]
    ZeroRate,
    #[error("tick period of {period} cycles exceeds the timer maximum of {max}")]
    Overflow { period: u32, max: u32 },
    #[error("tick period of {period} cycles is below the timer minimum of {min}")]
    Underflow { period: u32, min: u32 },
    #[error("tick frequency is above the source clock")]
    RateAboveSource,
    #[error("tick timer is already armed")]
    AlreadyArmed,
}

/// Failures while handing out task memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("no memory block reserved for this task")]
    UnknownTask,
    #[error("memory block already handed to the scheduler")]
    AlreadyClaimed,
    #[error("idle and timer memory belong to the scheduler")]
    SchedulerOwned,
}

/// Failures while creating a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SpawnError {
    #[error("task priority {priority} is not below {max}")]
    PriorityOutOfRange { priority: u32, max: u32 },
    #[error("task name is longer than {max} bytes")]
    NameTooLong { max: usize },
    #[error("scheduler rejected the task")]
    Rejected,
}

/// Scheduler options this layer cannot honor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("a kernel heap is configured")]
    HeapReserved,
    #[error("static allocation is disabled")]
    StaticAllocationDisabled,
    #[error("tick rate is zero")]
    ZeroTickRate,
    #[error("tick rate is above the core clock")]
    TickRateAboveClock,
    #[error("tick period does not fit SysTick")]
    TickPeriodTooLong,
    #[error("tick period is shorter than SysTick can interrupt on")]
    TickPeriodTooShort,
    #[error("no task priorities")]
    NoPriorities,
    #[error("task stack below the minimum depth")]
    StackTooSmall,
    #[error("timer task priority out of range")]
    TimerPriorityOutOfRange,
    #[error("stack overflow check must be 0, 1 or 2")]
    InvalidOverflowCheck,
    #[error("StaticTask_t does not fit the reserved control block")]
    ControlBlockTooSmall,
}

/// Unrecoverable bring-up failure. The caller halts the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FatalError {
    #[error("data/bss sections were not initialized")]
    MemoryUninitialized,
    #[error("cpu frequency could not be resolved")]
    ClockUnresolved,
    #[error("{0} is unavailable")]
    DeviceUnavailable(&'static str),
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error(transparent)]
    Tick(#[from] TickError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error("scheduler vectors are not all bound")]
    SchedulerVectorsUnbound,
    #[error("bring-up step expected {expected:?}, found {found:?}")]
    OutOfOrder { expected: Phase, found: Phase },
    #[error("scheduler returned")]
    SchedulerReturned,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_errors_convert() {
        let err: FatalError = TickError::ZeroRate.into();
        assert_eq!(err, FatalError::Tick(TickError::ZeroRate));

        let err: FatalError = BindError::AlreadyBound(Vector::SysTick).into();
        assert_eq!(err, FatalError::Bind(BindError::AlreadyBound(Vector::SysTick)));
    }

    #[test]
    fn test_display_is_transparent() {
        let err = FatalError::from(TickError::Overflow { period: 100_000_000, max: 1 << 24 });
        assert_eq!(
            err.to_string(),
            "tick period of 100000000 cycles exceeds the timer maximum of 16777216"
        );
    }
}
