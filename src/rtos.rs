//! # Scheduler Service
//!
//! The preemptive scheduler is FreeRTOS, linked as a static C library and
//! built with `configSUPPORT_STATIC_ALLOCATION = 1` and no heap. This module
//! is the contract between it and the bring-up layer:
//!
//! - [`SchedulerService`]: what bring-up and the application need from the
//!   scheduler (its exception entry points, task creation, start, delay).
//! - [`on_tick`]: the SysTick handler. The tick is armed and interrupts are
//!   unmasked at the end of bring-up, before the application starts the
//!   scheduler; ticks in that window are dropped.
//! - [`FreeRtos`]: the implementation over the C API (target only).
//! - The C-ABI callbacks the kernel expects the application to define:
//!   static idle/timer task memory, the idle hook, the stack overflow hook
//!   and the tick timer setup (target only).
//!
//! Everything the scheduler does after `vTaskStartScheduler` is opaque here.

use core::convert::Infallible;
use core::ffi::{c_void, CStr};
use core::ptr::NonNull;

use log::info;

use crate::config::{SchedulerConfig, SCHEDULER};
use crate::error::{FatalError, SpawnError};
use crate::memory::{TaskArena, TaskId, TaskMemory};
use crate::vector::Handler;

/// Task function. Receives the `parameter` of its [`TaskSpec`].
pub type TaskEntry = extern "C" fn(*mut c_void);

/// A task to create.
#[derive(Debug, Clone, Copy)]
pub struct TaskSpec {
    pub entry: TaskEntry,
    pub name: &'static CStr,
    /// `0..max_priorities`, higher is more urgent.
    pub priority: u32,
    pub parameter: *mut c_void,
}

impl TaskSpec {
    pub const fn new(entry: TaskEntry, name: &'static CStr, priority: u32) -> Self {
        Self {
            entry,
            name,
            priority,
            parameter: core::ptr::null_mut(),
        }
    }

    /// Check priority and name length against the scheduler configuration.
    pub fn validate(&self, config: &SchedulerConfig) -> Result<(), SpawnError> {
        if self.priority >= config.max_priorities {
            return Err(SpawnError::PriorityOutOfRange {
                priority: self.priority,
                max: config.max_priorities,
            });
        }
        if self.name.to_bytes_with_nul().len() > config.max_task_name_len {
            return Err(SpawnError::NameTooLong {
                max: config.max_task_name_len - 1,
            });
        }
        Ok(())
    }
}

/// Opaque scheduler task handle (`TaskHandle_t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskHandle(NonNull<c_void>);

impl TaskHandle {
    pub fn from_raw(raw: *mut c_void) -> Option<Self> {
        NonNull::new(raw).map(Self)
    }
}

/// The external scheduler as seen by bring-up and the application.
pub trait SchedulerService {
    /// Supervisor call entry (starts the first task).
    const SUPERVISOR_CALL: Handler;
    /// Pending service call entry (context switch).
    const PENDING_SERVICE_CALL: Handler;

    /// Whether [`start`](Self::start) has run the first task.
    fn is_started() -> bool;

    /// Advance the scheduler by one tick. Interrupt context only, and only
    /// once started.
    fn tick();

    /// Create a task in `memory`, which the scheduler owns from then on.
    fn spawn(task: &TaskSpec, memory: TaskMemory) -> Result<TaskHandle, SpawnError>;

    /// Start scheduling. Only returns if the scheduler could not start.
    fn start() -> Result<Infallible, FatalError>;

    /// Block the calling task for `ticks` tick periods.
    fn delay(ticks: u32);
}

impl<const IDLE: usize, const TIMER: usize, const USER: usize, const TASKS: usize>
    TaskArena<IDLE, TIMER, USER, TASKS>
{
    /// Claim slot `id` and create `task` in it. The task is validated first
    /// so a rejected task does not use up its slot.
    pub fn spawn<S: SchedulerService>(
        &self,
        id: TaskId,
        task: &TaskSpec,
    ) -> Result<TaskHandle, FatalError> {
        task.validate(&SCHEDULER)?;
        let memory = self.claim(id)?;
        let handle = S::spawn(task, memory)?;
        info!(
            "spawned {:?} ({id:?}, priority {}, {} words)",
            task.name, task.priority, memory.stack_words
        );
        Ok(handle)
    }
}

/// SysTick handler. Forwards to [`SchedulerService::tick`] once the
/// scheduler has started; before that there is no current task to account
/// the tick to.
///
/// # Safety
/// Only to be entered from the SysTick exception.
pub unsafe extern "C" fn on_tick<S: SchedulerService>() {
    if S::is_started() {
        S::tick();
    }
}

/// Convert milliseconds to scheduler ticks, rounding down.
pub const fn ms_to_ticks(ms: u32) -> u32 {
    ((ms as u64 * SCHEDULER.tick_rate_hz as u64) / 1000) as u32
}

#[cfg(target_os = "none")]
pub use self::freertos::FreeRtos;

#[cfg(target_os = "none")]
#[allow(non_snake_case)]
mod freertos {
    use core::convert::Infallible;
    use core::ffi::{c_char, c_long, c_void};

    use log::info;

    use super::{SchedulerService, TaskEntry, TaskHandle, TaskSpec};
    use crate::arch::{self, armv7m};
    use crate::config::SCHEDULER;
    use crate::error::{FatalError, SpawnError};
    use crate::fault::{self, FaultKind};
    use crate::memory::{ControlBlock, StackWord, TaskMemory, TASK_MEMORY};
    use crate::vector::Handler;

    extern "C" {
        fn xTaskCreateStatic(
            code: TaskEntry,
            name: *const c_char,
            stack_depth: u32,
            parameters: *mut c_void,
            priority: u32,
            stack: *mut StackWord,
            control_block: *mut ControlBlock,
        ) -> *mut c_void;
        fn vTaskStartScheduler();
        fn vTaskDelay(ticks: u32);
        fn xTaskGetSchedulerState() -> c_long;

        fn vPortSVCHandler();
        fn xPortPendSVHandler();
        fn xPortSysTickHandler();
    }

    /// `taskSCHEDULER_NOT_STARTED`
    const SCHEDULER_NOT_STARTED: c_long = 1;

    /// FreeRTOS over its C API.
    pub struct FreeRtos;

    impl SchedulerService for FreeRtos {
        const SUPERVISOR_CALL: Handler = Handler::Returning(vPortSVCHandler);
        const PENDING_SERVICE_CALL: Handler = Handler::Returning(xPortPendSVHandler);

        fn spawn(task: &TaskSpec, memory: TaskMemory) -> Result<TaskHandle, SpawnError> {
            task.validate(&SCHEDULER)?;
            // SAFETY: the name is NUL-terminated and 'static; `memory` comes
            // from the static arena and is handed over exactly once.
            let raw = unsafe {
                xTaskCreateStatic(
                    task.entry,
                    task.name.as_ptr(),
                    memory.stack_words,
                    task.parameter,
                    task.priority,
                    memory.stack.as_ptr(),
                    memory.control_block.as_ptr(),
                )
            };
            TaskHandle::from_raw(raw).ok_or(SpawnError::Rejected)
        }

        fn is_started() -> bool {
            // SAFETY: reads kernel state only; INCLUDE_xTaskGetSchedulerState
            // is set in the kernel build.
            unsafe { xTaskGetSchedulerState() != SCHEDULER_NOT_STARTED }
        }

        fn tick() {
            // SAFETY: called from the SysTick exception after the scheduler
            // started, which is where the port expects it.
            unsafe { xPortSysTickHandler() }
        }

        fn start() -> Result<Infallible, FatalError> {
            info!("starting scheduler");
            // SAFETY: bring-up bound the port's vectors and armed the tick.
            unsafe { vTaskStartScheduler() };
            Err(FatalError::SchedulerReturned)
        }

        fn delay(ticks: u32) {
            // SAFETY: only called from task context.
            unsafe { vTaskDelay(ticks) }
        }
    }

    // -----------------------------------------------------------------------
    // Callbacks required by configSUPPORT_STATIC_ALLOCATION
    // -----------------------------------------------------------------------

    #[no_mangle]
    unsafe extern "C" fn vApplicationGetIdleTaskMemory(
        control_block: *mut *mut ControlBlock,
        stack: *mut *mut StackWord,
        stack_words: *mut u32,
    ) {
        write_task_memory(TASK_MEMORY.idle(), control_block, stack, stack_words);
    }

    #[no_mangle]
    unsafe extern "C" fn vApplicationGetTimerTaskMemory(
        control_block: *mut *mut ControlBlock,
        stack: *mut *mut StackWord,
        stack_words: *mut u32,
    ) {
        write_task_memory(TASK_MEMORY.timer(), control_block, stack, stack_words);
    }

    unsafe fn write_task_memory(
        memory: TaskMemory,
        control_block: *mut *mut ControlBlock,
        stack: *mut *mut StackWord,
        stack_words: *mut u32,
    ) {
        *control_block = memory.control_block.as_ptr();
        *stack = memory.stack.as_ptr();
        *stack_words = memory.stack_words;
    }

    // -----------------------------------------------------------------------
    // Hooks
    // -----------------------------------------------------------------------

    /// Nothing to do when idle: sleep until the next interrupt.
    #[no_mangle]
    extern "C" fn vApplicationIdleHook() {
        arch::wait_for_interrupt();
    }

    #[no_mangle]
    extern "C" fn vApplicationStackOverflowHook(_task: *mut c_void, _name: *mut c_char) -> ! {
        fault::trap(FaultKind::StackOverflow)
    }

    /// Replaces the port's weak definition. Bring-up has already armed
    /// SysTick at the configured rate; reprogramming it here would use the
    /// nominal `configCPU_CLOCK_HZ` instead of the measured clock.
    #[no_mangle]
    extern "C" fn vPortSetupTimerInterrupt() {
        if !armv7m::systick_armed() {
            fault::trap(FaultKind::Fatal);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PoolError;
    use crate::testing::{self, MockScheduler};

    type Arena = TaskArena<128, 128, 128, 2>;

    fn task_spec(name: &'static CStr, priority: u32) -> TaskSpec {
        TaskSpec::new(testing::task_entry, name, priority)
    }

    #[test]
    fn test_task_validation() {
        assert_eq!(task_spec(c"blinker", 4).validate(&SCHEDULER), Ok(()));
        assert_eq!(
            task_spec(c"blinker", 5).validate(&SCHEDULER),
            Err(SpawnError::PriorityOutOfRange { priority: 5, max: 5 })
        );
        // 15 characters + NUL fit, 16 do not
        assert_eq!(task_spec(c"abcdefghijklmno", 1).validate(&SCHEDULER), Ok(()));
        assert_eq!(
            task_spec(c"abcdefghijklmnop", 1).validate(&SCHEDULER),
            Err(SpawnError::NameTooLong { max: 15 })
        );
    }

    #[test]
    fn test_spawn_claims_slot() {
        let arena = Arena::new();
        let task = task_spec(c"blinker", 4);
        let handle = arena.spawn::<MockScheduler>(TaskId::User(0), &task);
        assert!(handle.is_ok());
        assert!(arena.is_claimed(TaskId::User(0)));

        let spawned = MockScheduler::spawned();
        assert_eq!(spawned.len(), 1);
        assert_eq!(spawned[0].name, "blinker");
        assert_eq!(spawned[0].priority, 4);
        assert_eq!(spawned[0].memory, arena.block(TaskId::User(0)).unwrap());

        assert_eq!(
            arena.spawn::<MockScheduler>(TaskId::User(0), &task),
            Err(FatalError::Pool(PoolError::AlreadyClaimed))
        );
    }

    #[test]
    fn test_rejected_task_keeps_slot() {
        let arena = Arena::new();
        let result = arena.spawn::<MockScheduler>(TaskId::User(1), &task_spec(c"x", 9));
        assert_eq!(
            result,
            Err(FatalError::Spawn(SpawnError::PriorityOutOfRange { priority: 9, max: 5 }))
        );
        assert!(!arena.is_claimed(TaskId::User(1)));
        assert!(MockScheduler::spawned().is_empty());
    }

    #[test]
    fn test_scheduler_memory_cannot_be_spawned_into() {
        let arena = Arena::new();
        assert_eq!(
            arena.spawn::<MockScheduler>(TaskId::Idle, &task_spec(c"x", 1)),
            Err(FatalError::Pool(PoolError::SchedulerOwned))
        );
    }

    #[test]
    fn test_tick_before_start_is_dropped() {
        let tick = on_tick::<MockScheduler>;
        unsafe { tick() };
        unsafe { tick() };
        assert_eq!(MockScheduler::ticks(), 0);

        assert_eq!(MockScheduler::start(), Err(FatalError::SchedulerReturned));
        unsafe { tick() };
        assert_eq!(MockScheduler::ticks(), 1);
    }

    #[test]
    fn test_ms_to_ticks() {
        assert_eq!(ms_to_ticks(500), 500);
        assert_eq!(ms_to_ticks(0), 0);
    }
}
