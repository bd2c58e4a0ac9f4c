//! # Static Memory Pool
//!
//! Every task the scheduler runs gets its stack and control block from a
//! single arena reserved at link time. The idle and timer service tasks have
//! fixed slots the scheduler asks for through its memory callbacks;
//! application tasks claim a slot once and hand it to the scheduler, which
//! owns it for the rest of the run.
//!
//! ```text
//! TASK_MEMORY
//! ├── idle   : ControlBlock + [StackWord; IDLE_STACK_WORDS]
//! ├── timer  : ControlBlock + [StackWord; TIMER_STACK_WORDS]
//! └── user[] : ControlBlock + [StackWord; USER_STACK_WORDS]   × MAX_USER_TASKS
//! ```
//!
//! Nothing here allocates; sizes are const generics derived from
//! [`config`](crate::config), so a mismatch is a build error.

use core::cell::UnsafeCell;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::config::{
    CONTROL_BLOCK_WORDS, IDLE_STACK_WORDS, MAX_USER_TASKS, TIMER_STACK_WORDS, USER_STACK_WORDS,
};
use crate::error::PoolError;

/// One stack slot, as the port's `StackType_t`.
pub type StackWord = u32;

/// Task stack. AAPCS requires 8-byte alignment at every public interface.
#[repr(C, align(8))]
pub struct Stack<const WORDS: usize>([StackWord; WORDS]);

/// Scheduler-private task state (`StaticTask_t`). Never read by this crate.
#[repr(C, align(8))]
pub struct ControlBlock([usize; CONTROL_BLOCK_WORDS]);

/// Stack and control block of a single task.
pub struct TaskMemoryBlock<const WORDS: usize> {
    control_block: UnsafeCell<ControlBlock>,
    stack: UnsafeCell<Stack<WORDS>>,
}

// SAFETY: the block is only ever written by the scheduler, which receives
// the pointers exactly once per task (see `TaskArena::claim`).
unsafe impl<const WORDS: usize> Sync for TaskMemoryBlock<WORDS> {}

impl<const WORDS: usize> TaskMemoryBlock<WORDS> {
    pub const EMPTY: Self = Self {
        control_block: UnsafeCell::new(ControlBlock([0; CONTROL_BLOCK_WORDS])),
        stack: UnsafeCell::new(Stack([0; WORDS])),
    };

    /// Pointers the scheduler needs. Stable for the lifetime of the block.
    pub fn memory(&self) -> TaskMemory {
        TaskMemory {
            control_block: NonNull::from(&self.control_block).cast(),
            stack: NonNull::from(&self.stack).cast(),
            stack_words: WORDS as u32,
        }
    }
}

/// Raw view of a [`TaskMemoryBlock`] in the form `xTaskCreateStatic` and the
/// static-memory callbacks take it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskMemory {
    pub control_block: NonNull<ControlBlock>,
    pub stack: NonNull<StackWord>,
    /// Stack depth in words.
    pub stack_words: u32,
}

/// Which arena slot a request refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskId {
    Idle,
    Timer,
    /// Application task slot `0..MAX_USER_TASKS`.
    User(usize),
}

/// Fixed-capacity arena of task memory blocks.
pub struct TaskArena<const IDLE: usize, const TIMER: usize, const USER: usize, const TASKS: usize>
{
    idle: TaskMemoryBlock<IDLE>,
    timer: TaskMemoryBlock<TIMER>,
    user: [TaskMemoryBlock<USER>; TASKS],
    /// Bit `n` set once user slot `n` has been handed out.
    claimed: AtomicU32,
}

/// The arena sized by the crate configuration.
pub type TaskPool = TaskArena<IDLE_STACK_WORDS, TIMER_STACK_WORDS, USER_STACK_WORDS, MAX_USER_TASKS>;

/// Process-wide task memory. Lives in `.bss`.
pub static TASK_MEMORY: TaskPool = TaskArena::new();

impl<const IDLE: usize, const TIMER: usize, const USER: usize, const TASKS: usize>
    TaskArena<IDLE, TIMER, USER, TASKS>
{
    pub const fn new() -> Self {
        assert!(TASKS <= 32, "claim bitmap holds at most 32 user tasks");
        Self {
            idle: TaskMemoryBlock::<IDLE>::EMPTY,
            timer: TaskMemoryBlock::<TIMER>::EMPTY,
            user: [const { TaskMemoryBlock::<USER>::EMPTY }; TASKS],
            claimed: AtomicU32::new(0),
        }
    }

    /// Memory of the idle task.
    pub fn idle(&self) -> TaskMemory {
        self.idle.memory()
    }

    /// Memory of the timer service task.
    pub fn timer(&self) -> TaskMemory {
        self.timer.memory()
    }

    /// Look up a block without claiming it. Repeated calls return the same
    /// addresses.
    pub fn block(&self, id: TaskId) -> Result<TaskMemory, PoolError> {
        match id {
            TaskId::Idle => Ok(self.idle()),
            TaskId::Timer => Ok(self.timer()),
            TaskId::User(n) => self
                .user
                .get(n)
                .map(TaskMemoryBlock::memory)
                .ok_or(PoolError::UnknownTask),
        }
    }

    /// Take a user block for a new task. Each slot can be claimed once; the
    /// idle and timer blocks are reserved for the scheduler's callbacks.
    pub fn claim(&self, id: TaskId) -> Result<TaskMemory, PoolError> {
        let n = match id {
            TaskId::Idle | TaskId::Timer => return Err(PoolError::SchedulerOwned),
            TaskId::User(n) if n < TASKS => n,
            TaskId::User(_) => return Err(PoolError::UnknownTask),
        };
        let bit = 1 << n;
        if self.claimed.fetch_or(bit, Ordering::AcqRel) & bit != 0 {
            return Err(PoolError::AlreadyClaimed);
        }
        self.block(id)
    }

    pub fn is_claimed(&self, id: TaskId) -> bool {
        match id {
            TaskId::Idle | TaskId::Timer => true,
            TaskId::User(n) if n < TASKS => self.claimed.load(Ordering::Acquire) & (1 << n) != 0,
            TaskId::User(_) => false,
        }
    }

    pub const fn capacity(&self) -> usize {
        TASKS
    }
}

impl<const IDLE: usize, const TIMER: usize, const USER: usize, const TASKS: usize> Default
    for TaskArena<IDLE, TIMER, USER, TASKS>
{
    fn default() -> Self {
        Self::new()
    }
}
