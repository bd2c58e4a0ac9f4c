//! # ARMv7-M Port Layer
//!
//! Register-level implementations of the bring-up interfaces for Cortex-M3
//! and Cortex-M4(F):
//!
//! - [`RamVectorTable`]: copy of the exception table in SRAM, selected
//!   through `VTOR`, so handlers can be bound at run time.
//! - [`NvicController`]: [`InterruptController`] over the RAM table, the
//!   NVIC and the SCB system handler registers.
//! - [`SysTickTimer`]: [`TickTimer`] over SysTick, clocked from the core.
//! - [`DwtClock`]: [`SteadyClock`] over the DWT cycle counter.
//!
//! ## Priorities
//!
//! HardFault runs at a fixed priority of -1 and cannot be programmed. The
//! configurable faults, SVCall, PendSV and SysTick are programmed through
//! `SHPR1..3`, external interrupts through `NVIC_IPRn`. Only the upper
//! `priority_bits` of each 8-bit field are implemented.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m::asm;
use cortex_m::interrupt::InterruptNumber;
use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{DCB, DWT, NVIC, SCB, SYST};

use crate::arch::encode_priority;
use crate::drivers::{CounterExtender, SteadyClock};
use crate::error::FatalError;
use crate::tick::{TickTimer, SYSTICK_MAX_PERIOD, SYSTICK_MIN_PERIOD};
use crate::vector::{Handler, InterruptController, Priority, Vector};

// ---------------------------------------------------------------------------
// RAM vector table
// ---------------------------------------------------------------------------

/// Exception table in SRAM.
///
/// `VTOR` requires the table to be aligned to its size rounded up to a power
/// of two; 512 bytes covers up to 128 entries.
#[repr(C, align(512))]
pub struct RamVectorTable<const N: usize> {
    slots: UnsafeCell<[usize; N]>,
}

// SAFETY: slots are written only through `NvicController`, inside a
// critical section, and read by the hardware.
unsafe impl<const N: usize> Sync for RamVectorTable<N> {}

impl<const N: usize> RamVectorTable<N> {
    pub const fn new() -> Self {
        assert!(N >= 16 && N <= 128, "vector table must hold 16..=128 entries");
        Self {
            slots: UnsafeCell::new([0; N]),
        }
    }

    /// Copy the active table (entry 0 is the initial stack pointer, which
    /// the scheduler's first-task start reads back through `VTOR`) and make
    /// this copy the active one.
    ///
    /// # Safety
    /// Must run once, with interrupts masked, before anything is installed.
    pub unsafe fn relocate(&'static self, scb: &mut SCB) {
        let active = scb.vtor.read() as *const usize;
        let slots = self.slots.get().cast::<usize>();
        for i in 0..N {
            slots.add(i).write_volatile(active.add(i).read_volatile());
        }
        asm::dsb();
        scb.vtor.write(slots as u32);
        asm::dsb();
        asm::isb();
    }

    fn write(&self, index: usize, address: usize) {
        if index < N {
            // SAFETY: in bounds; the table outlives every writer.
            unsafe { self.slots.get().cast::<usize>().add(index).write_volatile(address) };
        }
    }
}

// ---------------------------------------------------------------------------
// Interrupt controller
// ---------------------------------------------------------------------------

/// External interrupt number for the `cortex-m` NVIC API.
#[derive(Debug, Clone, Copy)]
struct Irq(u16);

// SAFETY: `Irq` is only built from `Vector::Irq`, which the binder has
// checked against the controller's vector count.
unsafe impl InterruptNumber for Irq {
    #[inline]
    fn number(self) -> u16 {
        self.0
    }
}

/// Configurable-fault enable bits in `SHCSR`.
const MEMFAULTENA: u32 = 1 << 16;
const BUSFAULTENA: u32 = 1 << 17;
const USGFAULTENA: u32 = 1 << 18;

pub struct NvicController<const N: usize> {
    table: &'static RamVectorTable<N>,
    nvic: NVIC,
    scb: SCB,
    priority_bits: u8,
}

impl<const N: usize> NvicController<N> {
    /// Relocate the vector table into `table` and take over the NVIC.
    ///
    /// # Safety
    /// Interrupts must be masked; `table` must not be in use yet.
    pub unsafe fn new(
        table: &'static RamVectorTable<N>,
        nvic: NVIC,
        mut scb: SCB,
        priority_bits: u8,
    ) -> Self {
        table.relocate(&mut scb);
        Self {
            table,
            nvic,
            scb,
            priority_bits,
        }
    }

    fn system_handler(vector: Vector) -> Option<SystemHandler> {
        Some(match vector {
            Vector::MemoryManagement => SystemHandler::MemoryManagement,
            Vector::BusFault => SystemHandler::BusFault,
            Vector::UsageFault => SystemHandler::UsageFault,
            Vector::SupervisorCall => SystemHandler::SVCall,
            Vector::PendingServiceCall => SystemHandler::PendSV,
            Vector::SysTick => SystemHandler::SysTick,
            Vector::HardFault | Vector::Irq(_) => return None,
        })
    }

    fn fault_enable_bit(vector: Vector) -> Option<u32> {
        match vector {
            Vector::MemoryManagement => Some(MEMFAULTENA),
            Vector::BusFault => Some(BUSFAULTENA),
            Vector::UsageFault => Some(USGFAULTENA),
            _ => None,
        }
    }
}

impl<const N: usize> InterruptController for NvicController<N> {
    fn vector_count(&self) -> usize {
        N
    }

    fn priority_bits(&self) -> u8 {
        self.priority_bits
    }

    fn install(&mut self, vector: Vector, handler: Handler) {
        self.table.write(usize::from(vector.exception_number()), handler.address());
        asm::dsb();
    }

    fn set_priority(&mut self, vector: Vector, priority: Priority) {
        let hw = encode_priority(priority, self.priority_bits);
        if let Some(handler) = Self::system_handler(vector) {
            // SAFETY: no priority-based critical sections are in use.
            unsafe { self.scb.set_priority(handler, hw) };
        } else if let Vector::Irq(n) = vector {
            // SAFETY: as above.
            unsafe { self.nvic.set_priority(Irq(n), hw) };
        }
    }

    fn enable(&mut self, vector: Vector) {
        if let Some(bit) = Self::fault_enable_bit(vector) {
            // SAFETY: only the enable bits of SHCSR are touched.
            unsafe { self.scb.shcsr.modify(|r| r | bit) };
        } else if let Vector::Irq(n) = vector {
            // SAFETY: a handler has been installed for this line.
            unsafe { NVIC::unmask(Irq(n)) };
        }
    }

    fn disable(&mut self, vector: Vector) {
        if let Some(bit) = Self::fault_enable_bit(vector) {
            // SAFETY: as in `enable`.
            unsafe { self.scb.shcsr.modify(|r| r & !bit) };
        } else if let Vector::Irq(n) = vector {
            NVIC::mask(Irq(n));
        }
    }
}

// ---------------------------------------------------------------------------
// SysTick
// ---------------------------------------------------------------------------

const SYST_CSR_ENABLE: u32 = 1 << 0;
const SYST_CSR_TICKINT: u32 = 1 << 1;

pub struct SysTickTimer {
    syst: SYST,
}

impl SysTickTimer {
    pub const fn new(syst: SYST) -> Self {
        Self { syst }
    }
}

impl TickTimer for SysTickTimer {
    fn min_period(&self) -> u32 {
        SYSTICK_MIN_PERIOD
    }

    fn max_period(&self) -> u32 {
        SYSTICK_MAX_PERIOD
    }

    fn arm(&mut self, period: u32) {
        self.syst.set_clock_source(SystClkSource::Core);
        self.syst.set_reload(period - 1);
        self.syst.clear_current();
        self.syst.enable_interrupt();
        self.syst.enable_counter();
    }

    fn is_running(&self) -> bool {
        self.syst.csr.read() & SYST_CSR_ENABLE != 0
    }
}

/// Whether SysTick is counting with its interrupt enabled. Usable from
/// contexts that do not own the peripheral.
pub fn systick_armed() -> bool {
    // SAFETY: read-only access to a memory-mapped register.
    let csr = unsafe { (*SYST::PTR).csr.read() };
    csr & (SYST_CSR_ENABLE | SYST_CSR_TICKINT) == SYST_CSR_ENABLE | SYST_CSR_TICKINT
}

// ---------------------------------------------------------------------------
// DWT steady clock
// ---------------------------------------------------------------------------

/// Core-clock cycle counter, extended to 64 bits.
pub struct DwtClock {
    frequency: AtomicU32,
    counter: CounterExtender,
}

impl DwtClock {
    pub const fn new() -> Self {
        Self {
            frequency: AtomicU32::new(0),
            counter: CounterExtender::new(),
        }
    }

    /// Enable trace and start the cycle counter.
    pub fn start(&self, dcb: &mut DCB, dwt: &mut DWT, frequency: u32) {
        dcb.enable_trace();
        dwt.enable_cycle_counter();
        self.frequency.store(frequency, Ordering::Release);
    }
}

impl SteadyClock for DwtClock {
    fn frequency(&self) -> u32 {
        self.frequency.load(Ordering::Acquire)
    }

    fn uptime(&self) -> u64 {
        self.counter.extend(DWT::cycle_count())
    }
}

// ---------------------------------------------------------------------------
// Core peripherals
// ---------------------------------------------------------------------------

/// The core peripherals a board hands out during bring-up, each at most
/// once.
pub struct CorePeripherals {
    nvic: Option<NVIC>,
    scb: Option<SCB>,
    syst: Option<SYST>,
    dcb: DCB,
    dwt: DWT,
    clock_started: bool,
}

impl CorePeripherals {
    /// `None` if the peripherals were already taken.
    pub fn take() -> Option<Self> {
        let p = cortex_m::Peripherals::take()?;
        Some(Self {
            nvic: Some(p.NVIC),
            scb: Some(p.SCB),
            syst: Some(p.SYST),
            dcb: p.DCB,
            dwt: p.DWT,
            clock_started: false,
        })
    }

    pub fn scb(&mut self) -> Result<&mut SCB, FatalError> {
        self.scb.as_mut().ok_or(FatalError::DeviceUnavailable("scb"))
    }

    pub fn start_clock(
        &mut self,
        clock: &'static DwtClock,
        frequency: u32,
    ) -> Result<&'static DwtClock, FatalError> {
        if self.clock_started {
            return Err(FatalError::DeviceUnavailable("dwt"));
        }
        clock.start(&mut self.dcb, &mut self.dwt, frequency);
        self.clock_started = true;
        Ok(clock)
    }

    /// Relocate the vector table into `table` and build the controller.
    pub fn take_controller<const N: usize>(
        &mut self,
        table: &'static RamVectorTable<N>,
        priority_bits: u8,
    ) -> Result<NvicController<N>, FatalError> {
        let (nvic, scb) = match (self.nvic.take(), self.scb.take()) {
            (Some(nvic), Some(scb)) => (nvic, scb),
            _ => return Err(FatalError::DeviceUnavailable("nvic")),
        };
        // SAFETY: bring-up runs with interrupts masked and this is the only
        // place the table is handed out.
        Ok(unsafe { NvicController::new(table, nvic, scb, priority_bits) })
    }

    pub fn take_systick(&mut self) -> Result<SysTickTimer, FatalError> {
        self.syst
            .take()
            .map(SysTickTimer::new)
            .ok_or(FatalError::DeviceUnavailable("systick"))
    }
}

// ---------------------------------------------------------------------------
// Core control
// ---------------------------------------------------------------------------

/// Grant full access to CP10/CP11.
pub fn enable_fpu(scb: &mut SCB) {
    // SAFETY: only the CP10/CP11 access fields of CPACR are touched.
    unsafe { scb.cpacr.modify(|r| r | (0b1111 << 20)) };
    asm::dsb();
    asm::isb();
}

#[inline]
pub fn mask_interrupts() {
    cortex_m::interrupt::disable();
}

/// # Safety
/// Every enabled vector must have a handler installed.
#[inline]
pub unsafe fn unmask_interrupts() {
    cortex_m::interrupt::enable();
}

pub fn reset() -> ! {
    SCB::sys_reset()
}
