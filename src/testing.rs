//! Host test doubles for the bring-up interfaces.

use core::convert::Infallible;
use core::ffi::c_void;
use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::bringup::Platform;
use crate::drivers::{OutputPin, SteadyClock};
use crate::error::{FatalError, SpawnError};
use crate::memory::TaskMemory;
use crate::rtos::{SchedulerService, TaskHandle, TaskSpec};
use crate::tick::{TickTimer, SYSTICK_MAX_PERIOD, SYSTICK_MIN_PERIOD};
use crate::vector::{Handler, InterruptController, Priority, Vector, VectorBinder};

pub unsafe extern "C" fn noop_handler() {}

pub unsafe extern "C" fn diverging_handler() -> ! {
    loop {
        std::thread::park();
    }
}

pub extern "C" fn task_entry(_: *mut c_void) {}

// ---------------------------------------------------------------------------
// Interrupt controller
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerEvent {
    Install(Vector),
    SetPriority(Vector, Priority),
    Enable(Vector),
    Disable(Vector),
}

/// Records every register write in order.
pub struct MockController {
    priority_bits: u8,
    vector_count: usize,
    pub events: Vec<ControllerEvent>,
    handlers: Vec<(Vector, Handler)>,
}

impl MockController {
    pub fn new(priority_bits: u8, vector_count: usize) -> Self {
        Self {
            priority_bits,
            vector_count,
            events: Vec::new(),
            handlers: Vec::new(),
        }
    }

    /// Last handler installed for `vector`.
    pub fn handler(&self, vector: Vector) -> Option<Handler> {
        self.handlers
            .iter()
            .rev()
            .find(|(v, _)| *v == vector)
            .map(|(_, h)| *h)
    }

    /// Last priority programmed for `vector`.
    pub fn priority_of(&self, vector: Vector) -> Option<Priority> {
        self.events.iter().rev().find_map(|event| match *event {
            ControllerEvent::SetPriority(v, p) if v == vector => Some(p),
            _ => None,
        })
    }
}

impl InterruptController for MockController {
    fn vector_count(&self) -> usize {
        self.vector_count
    }

    fn priority_bits(&self) -> u8 {
        self.priority_bits
    }

    fn install(&mut self, vector: Vector, handler: Handler) {
        self.handlers.push((vector, handler));
        self.events.push(ControllerEvent::Install(vector));
    }

    fn set_priority(&mut self, vector: Vector, priority: Priority) {
        self.events.push(ControllerEvent::SetPriority(vector, priority));
    }

    fn enable(&mut self, vector: Vector) {
        self.events.push(ControllerEvent::Enable(vector));
    }

    fn disable(&mut self, vector: Vector) {
        self.events.push(ControllerEvent::Disable(vector));
    }
}

// ---------------------------------------------------------------------------
// Tick timer
// ---------------------------------------------------------------------------

pub struct MockTimer {
    max_period: u32,
    pub armed_with: Option<u32>,
    pub arm_calls: u32,
}

impl MockTimer {
    /// 24-bit timer like SysTick.
    pub fn systick() -> Self {
        Self {
            max_period: SYSTICK_MAX_PERIOD,
            armed_with: None,
            arm_calls: 0,
        }
    }
}

impl TickTimer for MockTimer {
    fn min_period(&self) -> u32 {
        SYSTICK_MIN_PERIOD
    }

    fn max_period(&self) -> u32 {
        self.max_period
    }

    fn arm(&mut self, period: u32) {
        self.armed_with = Some(period);
        self.arm_calls += 1;
    }

    fn is_running(&self) -> bool {
        self.armed_with.is_some()
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SpawnRecord {
    pub name: String,
    pub priority: u32,
    pub memory: TaskMemory,
}

std::thread_local! {
    static SPAWNED: RefCell<Vec<SpawnRecord>> = const { RefCell::new(Vec::new()) };
    static STARTED: Cell<bool> = const { Cell::new(false) };
    static TICKS: Cell<u32> = const { Cell::new(0) };
}

/// Records spawned tasks and delivered ticks per test thread. `start`
/// marks the scheduler started and returns.
pub struct MockScheduler;

impl MockScheduler {
    pub fn spawned() -> Vec<SpawnRecord> {
        SPAWNED.with(|spawned| spawned.borrow().clone())
    }

    /// Ticks that reached the scheduler.
    pub fn ticks() -> u32 {
        TICKS.with(Cell::get)
    }
}

impl SchedulerService for MockScheduler {
    const SUPERVISOR_CALL: Handler = Handler::Returning(noop_handler);
    const PENDING_SERVICE_CALL: Handler = Handler::Returning(noop_handler);

    fn is_started() -> bool {
        STARTED.with(Cell::get)
    }

    fn tick() {
        TICKS.with(|ticks| ticks.set(ticks.get() + 1));
    }

    fn spawn(task: &TaskSpec, memory: TaskMemory) -> Result<TaskHandle, SpawnError> {
        SPAWNED.with(|spawned| {
            spawned.borrow_mut().push(SpawnRecord {
                name: task.name.to_string_lossy().into_owned(),
                priority: task.priority,
                memory,
            })
        });
        TaskHandle::from_raw(memory.control_block.as_ptr().cast()).ok_or(SpawnError::Rejected)
    }

    fn start() -> Result<Infallible, FatalError> {
        STARTED.with(|started| started.set(true));
        Err(FatalError::SchedulerReturned)
    }

    fn delay(_ticks: u32) {}
}

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

pub struct MockClock {
    frequency: AtomicU32,
}

impl SteadyClock for MockClock {
    fn frequency(&self) -> u32 {
        self.frequency.load(Ordering::Relaxed)
    }

    fn uptime(&self) -> u64 {
        0
    }
}

pub struct MockPin {
    level: AtomicBool,
}

impl MockPin {
    pub const fn new() -> Self {
        Self {
            level: AtomicBool::new(false),
        }
    }
}

impl OutputPin for MockPin {
    fn set_level(&self, high: bool) {
        self.level.store(high, Ordering::Relaxed);
    }

    fn level(&self) -> bool {
        self.level.load(Ordering::Relaxed)
    }
}

static CLOCK: MockClock = MockClock {
    frequency: AtomicU32::new(0),
};

static LED: MockPin = MockPin::new();

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformEvent {
    InterruptsDisabled,
    ProcessorInitialized,
    InterruptsEnabled,
}

pub struct MockPlatform {
    pub cpu_hz: u32,
    priority_bits: u8,
    vector_count: usize,
    pub events: Vec<PlatformEvent>,
    pub processor_fails: bool,
    pub led_missing: bool,
    /// Board binds SysTick itself, clashing with the scheduler.
    pub steal_systick: bool,
    clock_claimed: bool,
    led_claimed: bool,
}

impl MockPlatform {
    fn new(cpu_hz: u32, priority_bits: u8, vector_count: usize) -> Self {
        Self {
            cpu_hz,
            priority_bits,
            vector_count,
            events: Vec::new(),
            processor_fails: false,
            led_missing: false,
            steal_systick: false,
            clock_claimed: false,
            led_claimed: false,
        }
    }

    pub fn lpc4078() -> Self {
        Self::new(100_000_000, 5, 57)
    }

    pub fn stm32f103c8() -> Self {
        Self::new(72_000_000, 4, 59)
    }
}

impl Platform for MockPlatform {
    const NAME: &'static str = "mock";

    type Clock = MockClock;
    type Pin = MockPin;
    type Interrupts = MockController;
    type Timer = MockTimer;

    fn initialize_processor(&mut self) -> Result<(), FatalError> {
        if self.processor_fails {
            return Err(FatalError::DeviceUnavailable("fpu"));
        }
        self.events.push(PlatformEvent::ProcessorInitialized);
        Ok(())
    }

    fn cpu_frequency(&self) -> u32 {
        self.cpu_hz
    }

    fn claim_clock(&mut self, cpu_hz: u32) -> Result<&'static MockClock, FatalError> {
        if self.clock_claimed {
            return Err(FatalError::DeviceUnavailable("clock"));
        }
        self.clock_claimed = true;
        CLOCK.frequency.store(cpu_hz, Ordering::Relaxed);
        Ok(&CLOCK)
    }

    fn claim_led(&mut self) -> Result<&'static MockPin, FatalError> {
        if self.led_missing || self.led_claimed {
            return Err(FatalError::DeviceUnavailable("led"));
        }
        self.led_claimed = true;
        Ok(&LED)
    }

    fn take_interrupts(&mut self) -> Result<MockController, FatalError> {
        Ok(MockController::new(self.priority_bits, self.vector_count))
    }

    fn take_tick_timer(&mut self) -> Result<MockTimer, FatalError> {
        Ok(MockTimer::systick())
    }

    fn bind_peripherals(
        &mut self,
        binder: &mut VectorBinder<MockController>,
    ) -> Result<(), FatalError> {
        if self.steal_systick {
            let lowest = binder.lowest_priority();
            binder.bind(Vector::SysTick, Handler::Returning(noop_handler), lowest)?;
        }
        Ok(())
    }

    fn disable_interrupts(&mut self) {
        self.events.push(PlatformEvent::InterruptsDisabled);
    }

    fn enable_interrupts(&mut self) {
        self.events.push(PlatformEvent::InterruptsEnabled);
    }

    fn reset() -> ! {
        panic!("mock platform reset");
    }
}
