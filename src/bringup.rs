//! # Platform Bring-up Sequencer
//!
//! Brings a board from reset to the point where the scheduler can take
//! over, in two phases plus a handoff:
//!
//! ```text
//! reset_handler (cortex-m-rt: .data/.bss)
//!   └─► BringUp::new()                   ← interrupts masked
//!         ├─► initialize_processor()     ← sections verified, FPU on
//!         ├─► initialize_platform()      ← clock, devices, vectors, tick
//!         │     ├─► resolve cpu frequency
//!         │     ├─► claim steady clock + LED
//!         │     ├─► bind HardFault/MemManage/BusFault/UsageFault (prio 0)
//!         │     ├─► bind SVCall/PendSV/SysTick (lowest prio)
//!         │     ├─► arm tick
//!         │     └─► unmask interrupts
//!         └─► handoff(map, application)  ← never returns
//!               ├─► Err → reset
//!               └─► Ok  → halt
//! ```
//!
//! Every step must run in order and exactly once. The first error moves the
//! sequencer to [`Phase::Failed`]; the caller is expected to halt through
//! [`fault::fatal`](crate::fault::fatal).

use core::fmt;
use core::marker::PhantomData;

use heapless::Vec;
use log::{error, info};

use crate::arch;
use crate::config::{FAULT_PRIORITY, SCHEDULER};
use crate::drivers::{OutputPin, SteadyClock};
use crate::error::FatalError;
use crate::fault::{self, FAULT_HANDLERS};
use crate::rtos::{self, SchedulerService};
use crate::tick::{TickConfig, TickSource, TickTimer};
use crate::vector::{Handler, InterruptController, Vector, VectorBinder};

/// Everything a board has to provide for bring-up.
pub trait Platform {
    /// Board name for log output.
    const NAME: &'static str;

    type Clock: SteadyClock + 'static;
    type Pin: OutputPin + 'static;
    type Interrupts: InterruptController;
    type Timer: TickTimer;

    /// Core setup that has to happen before anything touches peripherals:
    /// FPU access on parts that have one, anything the runtime did not do.
    fn initialize_processor(&mut self) -> Result<(), FatalError>;

    /// Core clock frequency in Hz, decoded from the clock tree. `0` when it
    /// cannot be determined.
    fn cpu_frequency(&self) -> u32;

    /// Start the steady clock. Can be claimed once.
    fn claim_clock(&mut self, cpu_hz: u32) -> Result<&'static Self::Clock, FatalError>;

    /// Configure the status LED as an output. Can be claimed once.
    fn claim_led(&mut self) -> Result<&'static Self::Pin, FatalError>;

    /// Hand over the interrupt controller (relocating the vector table where
    /// needed).
    fn take_interrupts(&mut self) -> Result<Self::Interrupts, FatalError>;

    fn take_tick_timer(&mut self) -> Result<Self::Timer, FatalError>;

    /// Bind board-specific peripheral interrupts. None by default.
    fn bind_peripherals(
        &mut self,
        _binder: &mut VectorBinder<Self::Interrupts>,
    ) -> Result<(), FatalError> {
        Ok(())
    }

    fn disable_interrupts(&mut self);

    fn enable_interrupts(&mut self);

    fn reset() -> !;
}

/// Devices and controls the application receives after bring-up.
pub struct HardwareMap<P: Platform> {
    pub clock: &'static P::Clock,
    pub led: &'static P::Pin,
    pub reset: fn() -> !,
}

impl<P: Platform> Clone for HardwareMap<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: Platform> Copy for HardwareMap<P> {}

impl<P: Platform> fmt::Debug for HardwareMap<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwareMap")
            .field("clock", &(self.clock as *const P::Clock))
            .field("led", &(self.led as *const P::Pin))
            .finish()
    }
}

/// Where the sequencer stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Reset,
    ProcessorReady,
    PlatformReady,
    HandedOff,
    /// A step failed. Terminal.
    Failed,
}

/// Completed bring-up steps, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    InterruptsMasked,
    ProcessorReady,
    ClockResolved(u32),
    DevicesClaimed,
    VectorBound(Vector),
    TickArmed(u32),
    InterruptsEnabled,
    HandedOff,
}

pub const TRACE_CAPACITY: usize = 16;

pub struct BringUp<P: Platform, S> {
    platform: P,
    phase: Phase,
    tick_rate_hz: u32,
    trace: Vec<Stage, TRACE_CAPACITY>,
    binder: Option<VectorBinder<P::Interrupts>>,
    tick: Option<TickSource<P::Timer>>,
    _scheduler: PhantomData<fn() -> S>,
}

impl<P: Platform, S: SchedulerService> BringUp<P, S> {
    /// Take the board and mask interrupts until bring-up completes.
    pub fn new(mut platform: P) -> Self {
        platform.disable_interrupts();
        let mut this = Self {
            platform,
            phase: Phase::Reset,
            tick_rate_hz: SCHEDULER.tick_rate_hz,
            trace: Vec::new(),
            binder: None,
            tick: None,
            _scheduler: PhantomData,
        };
        this.record(Stage::InterruptsMasked);
        this
    }

    /// Override the configured tick rate.
    pub fn with_tick_rate(mut self, tick_rate_hz: u32) -> Self {
        self.tick_rate_hz = tick_rate_hz;
        self
    }

    /// Phase 1: verify the runtime initialized memory, then let the board
    /// finish core setup.
    pub fn initialize_processor(&mut self) -> Result<(), FatalError> {
        self.expect(Phase::Reset)?;
        let result = if arch::memory_initialized() {
            self.platform.initialize_processor()
        } else {
            Err(FatalError::MemoryUninitialized)
        };
        self.settle(result, Phase::ProcessorReady)?;
        self.record(Stage::ProcessorReady);
        info!("{}: processor ready", P::NAME);
        Ok(())
    }

    /// Phase 2: clock, devices, vectors and tick. Interrupts are unmasked
    /// only once all of them are in place.
    pub fn initialize_platform(&mut self) -> Result<HardwareMap<P>, FatalError> {
        self.expect(Phase::ProcessorReady)?;
        let result = self.bring_up_platform();
        let map = self.settle(result, Phase::PlatformReady)?;
        info!("{}: platform ready", P::NAME);
        Ok(map)
    }

    /// Run the application with the hardware map. An error resets the
    /// processor; a normal return halts it.
    pub fn handoff<F>(mut self, map: HardwareMap<P>, application: F) -> !
    where
        F: FnOnce(HardwareMap<P>) -> Result<(), FatalError>,
    {
        match self.enter(map, application) {
            Ok(()) => {
                info!("{}: application finished", P::NAME);
                fault::halt()
            }
            Err(err) => {
                error!("{}: application failed: {err}; resetting", P::NAME);
                (map.reset)()
            }
        }
    }

    /// The handoff without its terminal action.
    pub(crate) fn enter<F>(&mut self, map: HardwareMap<P>, application: F) -> Result<(), FatalError>
    where
        F: FnOnce(HardwareMap<P>) -> Result<(), FatalError>,
    {
        self.expect(Phase::PlatformReady)?;
        self.phase = Phase::HandedOff;
        self.record(Stage::HandedOff);
        application(map)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Steps completed so far.
    pub fn trace(&self) -> &[Stage] {
        &self.trace
    }

    pub fn binder(&self) -> Option<&VectorBinder<P::Interrupts>> {
        self.binder.as_ref()
    }

    pub fn tick(&self) -> Option<&TickSource<P::Timer>> {
        self.tick.as_ref()
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    fn bring_up_platform(&mut self) -> Result<HardwareMap<P>, FatalError> {
        let cpu_hz = self.platform.cpu_frequency();
        if cpu_hz == 0 {
            return Err(FatalError::ClockUnresolved);
        }
        self.record(Stage::ClockResolved(cpu_hz));
        info!("{}: core clock {cpu_hz} Hz", P::NAME);

        let clock = self.platform.claim_clock(cpu_hz)?;
        let led = self.platform.claim_led()?;
        self.record(Stage::DevicesClaimed);

        let mut binder = VectorBinder::new(self.platform.take_interrupts()?);
        for (vector, handler) in FAULT_HANDLERS {
            binder.bind(vector, handler, FAULT_PRIORITY)?;
            self.record(Stage::VectorBound(vector));
        }

        // Scheduler vectors go in before the tick is armed, so the first
        // tick always lands on a handler. `on_tick` drops it until the
        // application has started the scheduler.
        let lowest = binder.lowest_priority();
        let scheduler_handlers = [
            (Vector::SupervisorCall, S::SUPERVISOR_CALL),
            (Vector::PendingServiceCall, S::PENDING_SERVICE_CALL),
            (Vector::SysTick, Handler::Returning(rtos::on_tick::<S>)),
        ];
        for (vector, handler) in scheduler_handlers {
            binder.bind(vector, handler, lowest)?;
            self.record(Stage::VectorBound(vector));
        }
        self.platform.bind_peripherals(&mut binder)?;
        if !binder.scheduler_vectors_bound() {
            return Err(FatalError::SchedulerVectorsUnbound);
        }
        self.binder = Some(binder);

        let mut tick = TickSource::new(self.platform.take_tick_timer()?);
        let period = tick.configure(TickConfig::new(self.tick_rate_hz, cpu_hz))?;
        self.tick = Some(tick);
        self.record(Stage::TickArmed(period));

        self.platform.enable_interrupts();
        self.record(Stage::InterruptsEnabled);

        Ok(HardwareMap {
            clock,
            led,
            reset: P::reset,
        })
    }

    fn expect(&mut self, expected: Phase) -> Result<(), FatalError> {
        if self.phase == expected {
            return Ok(());
        }
        let err = FatalError::OutOfOrder {
            expected,
            found: self.phase,
        };
        self.phase = Phase::Failed;
        Err(err)
    }

    fn settle<T>(&mut self, result: Result<T, FatalError>, next: Phase) -> Result<T, FatalError> {
        match result {
            Ok(value) => {
                self.phase = next;
                Ok(value)
            }
            Err(err) => {
                error!("{}: bring-up failed in {:?}: {err}", P::NAME, self.phase);
                self.phase = Phase::Failed;
                Err(err)
            }
        }
    }

    fn record(&mut self, stage: Stage) {
        // The capacity covers a full bring-up; later stages are dropped.
        let _ = self.trace.push(stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BindError, TickError};
    use crate::testing::{MockPlatform, MockScheduler, PlatformEvent};
    use core::ptr;

    type TestBringUp = BringUp<MockPlatform, MockScheduler>;

    fn position(trace: &[Stage], stage: Stage) -> usize {
        trace
            .iter()
            .position(|s| *s == stage)
            .unwrap_or_else(|| panic!("{stage:?} missing from {trace:?}"))
    }

    fn bring_up(platform: MockPlatform) -> (TestBringUp, HardwareMap<MockPlatform>) {
        let mut bringup = TestBringUp::new(platform);
        bringup.initialize_processor().unwrap();
        let map = bringup.initialize_platform().unwrap();
        (bringup, map)
    }

    #[test]
    fn test_full_bring_up() {
        let (bringup, _map) = bring_up(MockPlatform::lpc4078());
        assert_eq!(bringup.phase(), Phase::PlatformReady);
        assert_eq!(bringup.tick().and_then(TickSource::period), Some(100_000));

        let binder = bringup.binder().unwrap();
        assert!(binder.scheduler_vectors_bound());
        for vector in Vector::FAULTS {
            assert!(binder.is_bound(vector));
        }
        assert_eq!(binder.controller().priority_of(Vector::SysTick), Some(31));
        assert_eq!(binder.controller().priority_of(Vector::HardFault), Some(0));
    }

    #[test]
    fn test_scheduler_vectors_bound_before_tick_before_interrupts() {
        let (bringup, _map) = bring_up(MockPlatform::lpc4078());
        let trace = bringup.trace();
        let armed = position(trace, Stage::TickArmed(100_000));
        let enabled = position(trace, Stage::InterruptsEnabled);
        for vector in Vector::SCHEDULER {
            assert!(position(trace, Stage::VectorBound(vector)) < armed);
        }
        assert!(armed < enabled);
        assert_eq!(trace[0], Stage::InterruptsMasked);
        assert_eq!(trace.last(), Some(&Stage::InterruptsEnabled));

        // interrupts stay masked for the whole sequence
        let events = &bringup.platform().events;
        assert_eq!(events.first(), Some(&PlatformEvent::InterruptsDisabled));
        assert_eq!(events.last(), Some(&PlatformEvent::InterruptsEnabled));
        assert_eq!(
            events.iter().filter(|e| **e == PlatformEvent::InterruptsEnabled).count(),
            1
        );
    }

    #[test]
    fn test_ticks_before_scheduler_start_are_dropped() {
        let (bringup, _map) = bring_up(MockPlatform::lpc4078());
        let tick = match bringup.binder().unwrap().controller().handler(Vector::SysTick) {
            Some(Handler::Returning(f)) => f,
            other => panic!("unexpected SysTick handler {other:?}"),
        };
        // interrupts are already unmasked here
        unsafe { tick() };
        assert_eq!(MockScheduler::ticks(), 0);

        let _ = MockScheduler::start();
        unsafe { tick() };
        assert_eq!(MockScheduler::ticks(), 1);
    }

    #[test]
    fn test_cold_bring_ups_produce_same_map() {
        let (_first, a) = bring_up(MockPlatform::lpc4078());
        let (_second, b) = bring_up(MockPlatform::lpc4078());
        assert!(ptr::eq(a.clock, b.clock));
        assert!(ptr::eq(a.led, b.led));
        assert_eq!(a.reset as usize, b.reset as usize);
    }

    #[test]
    fn test_narrow_priority_controller() {
        let (bringup, _map) = bring_up(MockPlatform::stm32f103c8());
        let controller = bringup.binder().unwrap().controller();
        assert_eq!(controller.priority_of(Vector::PendingServiceCall), Some(15));
        assert_eq!(bringup.tick().and_then(TickSource::period), Some(72_000));
    }

    #[test]
    fn test_unresolved_clock_is_fatal() {
        let mut platform = MockPlatform::lpc4078();
        platform.cpu_hz = 0;
        let mut bringup = TestBringUp::new(platform);
        bringup.initialize_processor().unwrap();
        assert_eq!(
            bringup.initialize_platform().unwrap_err(),
            FatalError::ClockUnresolved
        );
        assert_eq!(bringup.phase(), Phase::Failed);
        assert!(bringup.binder().is_none());
    }

    #[test]
    fn test_unrepresentable_tick_leaves_interrupts_masked() {
        let mut bringup = TestBringUp::new(MockPlatform::lpc4078()).with_tick_rate(1);
        bringup.initialize_processor().unwrap();
        assert_eq!(
            bringup.initialize_platform().unwrap_err(),
            FatalError::Tick(TickError::Overflow {
                period: 100_000_000,
                max: 1 << 24
            })
        );
        assert!(bringup.tick().is_none());
        assert!(!bringup.platform().events.contains(&PlatformEvent::InterruptsEnabled));
        assert!(!bringup.trace().contains(&Stage::InterruptsEnabled));
    }

    #[test]
    fn test_zero_tick_rate_is_fatal() {
        let mut bringup = TestBringUp::new(MockPlatform::lpc4078()).with_tick_rate(0);
        bringup.initialize_processor().unwrap();
        assert_eq!(
            bringup.initialize_platform().unwrap_err(),
            FatalError::Tick(TickError::ZeroRate)
        );
        assert_eq!(bringup.phase(), Phase::Failed);
    }

    #[test]
    fn test_board_binding_scheduler_vector_fails() {
        let mut platform = MockPlatform::lpc4078();
        platform.steal_systick = true;
        let mut bringup = TestBringUp::new(platform);
        bringup.initialize_processor().unwrap();
        assert_eq!(
            bringup.initialize_platform().unwrap_err(),
            FatalError::Bind(BindError::AlreadyBound(Vector::SysTick))
        );
    }

    #[test]
    fn test_missing_led_is_fatal() {
        let mut platform = MockPlatform::lpc4078();
        platform.led_missing = true;
        let mut bringup = TestBringUp::new(platform);
        bringup.initialize_processor().unwrap();
        assert_eq!(
            bringup.initialize_platform().unwrap_err(),
            FatalError::DeviceUnavailable("led")
        );
        assert!(!bringup.trace().contains(&Stage::DevicesClaimed));
    }

    #[test]
    fn test_steps_must_run_in_order() {
        let mut bringup = TestBringUp::new(MockPlatform::lpc4078());
        assert_eq!(
            bringup.initialize_platform().unwrap_err(),
            FatalError::OutOfOrder {
                expected: Phase::ProcessorReady,
                found: Phase::Reset
            }
        );
        assert_eq!(bringup.phase(), Phase::Failed);
        assert!(bringup.initialize_processor().is_err());
    }

    #[test]
    fn test_processor_failure_stops_sequence() {
        let mut platform = MockPlatform::lpc4078();
        platform.processor_fails = true;
        let mut bringup = TestBringUp::new(platform);
        assert_eq!(
            bringup.initialize_processor().unwrap_err(),
            FatalError::DeviceUnavailable("fpu")
        );
        assert_eq!(bringup.phase(), Phase::Failed);
    }

    #[test]
    fn test_handoff_runs_application_once() {
        let (mut bringup, map) = bring_up(MockPlatform::lpc4078());
        let mut runs = 0;
        let result = bringup.enter(map, |m| {
            runs += 1;
            m.led.set_level(true);
            Ok(())
        });
        assert_eq!(result, Ok(()));
        assert_eq!(runs, 1);
        assert!(map.led.level());
        assert_eq!(bringup.phase(), Phase::HandedOff);
        assert_eq!(bringup.trace().last(), Some(&Stage::HandedOff));

        // a second handoff is out of order
        assert!(bringup.enter(map, |_| Ok(())).is_err());
    }

    #[test]
    fn test_handoff_propagates_application_error() {
        let (mut bringup, map) = bring_up(MockPlatform::lpc4078());
        let result = bringup.enter(map, |_| Err(FatalError::SchedulerReturned));
        assert_eq!(result, Err(FatalError::SchedulerReturned));
    }
}
