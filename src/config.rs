//! # Bring-up Configuration
//!
//! Compile-time constants for the scheduler and the static task arena.
//! These mirror the `FreeRTOSConfig.h` the linked kernel was built with, so
//! both sides agree on stack depths, priority counts and the tick rate.
//! All limits are fixed at compile time; there is no dynamic allocation.

use crate::error::ConfigError;
use crate::tick::{SYSTICK_MAX_PERIOD, SYSTICK_MIN_PERIOD};

/// Scheduler build options, one field per `configXXX` switch that the
/// bring-up layer depends on or must agree with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Preemptive (`true`) or cooperative scheduling.
    pub preemption: bool,
    /// Scheduler tick frequency in Hz.
    pub tick_rate_hz: u32,
    /// Nominal core clock. The real value is read back from the clock tree
    /// during bring-up; this one only feeds the compile-time checks.
    pub cpu_clock_hz: u32,
    /// Number of task priority levels. Valid priorities are `0..max_priorities`.
    pub max_priorities: u32,
    /// Stack depth of the idle task, in words.
    pub minimal_stack_words: usize,
    /// Longest task name including the terminating NUL.
    pub max_task_name_len: usize,
    pub use_trace_facility: bool,
    pub use_16_bit_ticks: bool,
    pub idle_should_yield: bool,
    /// The idle task calls `vApplicationIdleHook`.
    pub use_idle_hook: bool,
    pub use_tick_hook: bool,
    pub use_mutexes: bool,
    /// Direct-to-task notifications, one index.
    pub use_task_notifications: bool,
    /// Software timers (and therefore the timer service task).
    pub use_timers: bool,
    pub timer_task_priority: u32,
    pub timer_queue_length: u32,
    /// Stack depth of the timer service task, in words.
    pub timer_stack_words: usize,
    /// `configCHECK_FOR_STACK_OVERFLOW`: 0 (off), 1 or 2.
    pub check_for_stack_overflow: u8,
    pub static_allocation: bool,
    pub dynamic_allocation: bool,
    /// Size of the kernel heap in bytes. Must be zero.
    pub total_heap_size: usize,
}

impl SchedulerConfig {
    /// Check the options against what this bring-up layer can honor.
    ///
    /// `const` so [`SCHEDULER`] is rejected at build time rather than on the
    /// target.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.dynamic_allocation || self.total_heap_size != 0 {
            return Err(ConfigError::HeapReserved);
        }
        if !self.static_allocation {
            return Err(ConfigError::StaticAllocationDisabled);
        }
        if self.tick_rate_hz == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        if self.tick_rate_hz > self.cpu_clock_hz {
            return Err(ConfigError::TickRateAboveClock);
        }
        if self.cpu_clock_hz / self.tick_rate_hz > SYSTICK_MAX_PERIOD {
            return Err(ConfigError::TickPeriodTooLong);
        }
        if self.cpu_clock_hz / self.tick_rate_hz < SYSTICK_MIN_PERIOD {
            return Err(ConfigError::TickPeriodTooShort);
        }
        if self.max_priorities == 0 {
            return Err(ConfigError::NoPriorities);
        }
        if self.minimal_stack_words < MIN_STACK_WORDS || self.timer_stack_words < MIN_STACK_WORDS {
            return Err(ConfigError::StackTooSmall);
        }
        if self.use_timers && self.timer_task_priority >= self.max_priorities {
            return Err(ConfigError::TimerPriorityOutOfRange);
        }
        if self.check_for_stack_overflow > 2 {
            return Err(ConfigError::InvalidOverflowCheck);
        }
        if self.static_task_bytes() > CONTROL_BLOCK_WORDS * TARGET_WORD_BYTES {
            return Err(ConfigError::ControlBlockTooSmall);
        }
        Ok(())
    }

    /// `sizeof(StaticTask_t)` on a 32-bit port for these options.
    ///
    /// Fixed part: stack top pointer, state and event list items (a tick
    /// count plus four pointers each), priority and stack base. Then the
    /// name, padded to a word, and the optional trace, mutex and
    /// notification fields.
    pub const fn static_task_bytes(&self) -> usize {
        const LIST_ITEM: usize = 5 * TARGET_WORD_BYTES;
        let mut bytes = 2 * LIST_ITEM + 4 * TARGET_WORD_BYTES;
        bytes += self.max_task_name_len.next_multiple_of(TARGET_WORD_BYTES);
        if self.use_trace_facility {
            bytes += 2 * TARGET_WORD_BYTES;
        }
        if self.use_mutexes {
            bytes += 2 * TARGET_WORD_BYTES;
        }
        if self.use_task_notifications {
            // notified value + state byte
            bytes += TARGET_WORD_BYTES + 1;
        }
        bytes.next_multiple_of(TARGET_WORD_BYTES)
    }

    /// Tick period in core cycles for the nominal clock.
    pub const fn nominal_tick_period(&self) -> u32 {
        self.cpu_clock_hz / self.tick_rate_hz
    }
}

/// Smallest stack any task may be given: exception frame, callee-saved
/// registers, the FPU context and a little headroom.
pub const MIN_STACK_WORDS: usize = 128;

/// Pointer and `UBaseType_t` width on ARMv7-M.
pub const TARGET_WORD_BYTES: usize = 4;

/// Words in the opaque control block handed to the scheduler.
///
/// [`SchedulerConfig::validate`] checks it against
/// [`SchedulerConfig::static_task_bytes`], so a configuration that outgrows
/// it fails the build. The size model is the V10/V11 `StaticTask_t` of the
/// `ARM_CM3` and `ARM_CM4F` ports built without MPU wrappers, list
/// integrity check bytes, thread-local storage pointers, task tags,
/// run-time stats, newlib reentrancy or `INCLUDE_xTaskAbortDelay`. Enabling
/// any of those in the kernel build means updating the model first.
pub const CONTROL_BLOCK_WORDS: usize = 48;

/// The options the linked kernel was built with.
pub const SCHEDULER: SchedulerConfig = SchedulerConfig {
    preemption: true,
    tick_rate_hz: 1000,
    cpu_clock_hz: 100_000_000,
    max_priorities: 5,
    minimal_stack_words: 500,
    max_task_name_len: 16,
    use_trace_facility: true,
    use_16_bit_ticks: false,
    idle_should_yield: true,
    use_idle_hook: true,
    use_tick_hook: false,
    use_mutexes: true,
    use_task_notifications: true,
    use_timers: true,
    timer_task_priority: 2,
    timer_queue_length: 10,
    timer_stack_words: 500 * 2,
    check_for_stack_overflow: 2,
    static_allocation: true,
    dynamic_allocation: false,
    total_heap_size: 0,
};

const _: () = match SCHEDULER.validate() {
    Ok(()) => {}
    Err(_) => panic!("invalid scheduler configuration"),
};

/// Idle task stack depth in words.
pub const IDLE_STACK_WORDS: usize = SCHEDULER.minimal_stack_words;

/// Timer service task stack depth in words.
pub const TIMER_STACK_WORDS: usize = SCHEDULER.timer_stack_words;

/// Stack depth of every application task slot, in words.
pub const USER_STACK_WORDS: usize = 128;

/// Number of application task slots in the arena.
pub const MAX_USER_TASKS: usize = 4;

/// Exception/interrupt priority given to the fault vectors (most urgent).
pub const FAULT_PRIORITY: u8 = 0;
