//! # Interrupt Vector Binder
//!
//! Associates exception and interrupt sources with handlers and priorities
//! on an [`InterruptController`], enforcing the rules the scheduler depends
//! on:
//!
//! - one handler per vector, bound once;
//! - the fault vectors take only handlers that never return;
//! - SVCall, PendSV and SysTick (the scheduler's own vectors) sit at the
//!   lowest priority the controller implements, so they never preempt an
//!   application interrupt, and they can never be unbound.
//!
//! Priorities are logical: `0` is the most urgent, `lowest_priority()` the
//! least. The controller shifts them into the implemented bits of its
//! 8-bit priority registers (see [`encode_priority`](crate::arch::encode_priority)).

use core::fmt;

use log::debug;

use crate::error::BindError;
use crate::sync;

/// Logical priority, `0..=lowest_priority()`.
pub type Priority = u8;

/// Exception numbers below this are system exceptions; external IRQ `n` is
/// exception `IRQ_BASE + n`.
pub const IRQ_BASE: u16 = 16;

/// A bindable exception or interrupt source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vector {
    HardFault,
    MemoryManagement,
    BusFault,
    UsageFault,
    SupervisorCall,
    PendingServiceCall,
    SysTick,
    /// External (NVIC) interrupt line.
    Irq(u16),
}

impl Vector {
    /// Vectors the scheduler port drives.
    pub const SCHEDULER: [Vector; 3] =
        [Vector::SupervisorCall, Vector::PendingServiceCall, Vector::SysTick];

    /// Unrecoverable processor faults.
    pub const FAULTS: [Vector; 4] = [
        Vector::HardFault,
        Vector::MemoryManagement,
        Vector::BusFault,
        Vector::UsageFault,
    ];

    /// Position in the vector table.
    pub const fn exception_number(self) -> u16 {
        match self {
            Vector::HardFault => 3,
            Vector::MemoryManagement => 4,
            Vector::BusFault => 5,
            Vector::UsageFault => 6,
            Vector::SupervisorCall => 11,
            Vector::PendingServiceCall => 14,
            Vector::SysTick => 15,
            Vector::Irq(n) => IRQ_BASE.saturating_add(n),
        }
    }

    pub const fn is_fault(self) -> bool {
        matches!(
            self,
            Vector::HardFault | Vector::MemoryManagement | Vector::BusFault | Vector::UsageFault
        )
    }

    pub const fn is_scheduler_critical(self) -> bool {
        matches!(
            self,
            Vector::SupervisorCall | Vector::PendingServiceCall | Vector::SysTick
        )
    }
}

/// An interrupt service routine.
#[derive(Clone, Copy)]
pub enum Handler {
    /// Ordinary handler; the interrupted code resumes afterwards.
    Returning(unsafe extern "C" fn()),
    /// Never returns. Required for fault vectors.
    Diverging(unsafe extern "C" fn() -> !),
}

impl Handler {
    /// Address to store in the vector table.
    pub fn address(self) -> usize {
        match self {
            Handler::Returning(f) => f as usize,
            Handler::Diverging(f) => f as usize,
        }
    }

    pub const fn diverges(self) -> bool {
        matches!(self, Handler::Diverging(_))
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Handler::Returning(_) => "Returning",
            Handler::Diverging(_) => "Diverging",
        };
        write!(f, "{kind}({:#010x})", self.address())
    }
}

/// Dispatch and masking hardware of a target (vector table + NVIC/SCB on
/// ARMv7-M).
pub trait InterruptController {
    /// Number of vector table entries, system exceptions included.
    fn vector_count(&self) -> usize;

    /// Implemented priority bits (`__NVIC_PRIO_BITS`).
    fn priority_bits(&self) -> u8;

    /// Store `handler` in the dispatch slot of `vector`.
    fn install(&mut self, vector: Vector, handler: Handler);

    /// Program the logical `priority` of `vector`.
    fn set_priority(&mut self, vector: Vector, priority: Priority);

    fn enable(&mut self, vector: Vector);

    fn disable(&mut self, vector: Vector);
}

/// Binds handlers to vectors through an [`InterruptController`], tracking
/// which vectors already have one.
pub struct VectorBinder<C> {
    controller: C,
    /// One bit per exception number.
    bound: [u32; 8],
}

impl<C: InterruptController> VectorBinder<C> {
    pub const fn new(controller: C) -> Self {
        Self {
            controller,
            bound: [0; 8],
        }
    }

    /// Least urgent priority the controller implements.
    pub fn lowest_priority(&self) -> Priority {
        lowest_priority(self.controller.priority_bits())
    }

    /// Bind `handler` to `vector` at `priority` and enable it.
    ///
    /// The slot, the priority register and the enable bit are written inside
    /// one critical section. Nothing is written if any check fails.
    pub fn bind(
        &mut self,
        vector: Vector,
        handler: Handler,
        priority: Priority,
    ) -> Result<(), BindError> {
        let slot = self.slot(vector)?;

        let lowest = self.lowest_priority();
        if priority > lowest {
            return Err(BindError::PriorityOutOfRange {
                vector,
                priority,
                lowest,
            });
        }
        if vector.is_fault() && !handler.diverges() {
            return Err(BindError::ReturningFaultHandler(vector));
        }
        if vector.is_scheduler_critical() && priority != lowest {
            return Err(BindError::SchedulerPriority {
                vector,
                required: lowest,
            });
        }
        if self.test_bit(slot) {
            return Err(BindError::AlreadyBound(vector));
        }

        let controller = &mut self.controller;
        sync::critical_section(|_| {
            controller.install(vector, handler);
            controller.set_priority(vector, priority);
            controller.enable(vector);
        });
        self.bound[slot / 32] |= 1 << (slot % 32);

        debug!("bound {vector:?} -> {handler:?} at priority {priority}");
        Ok(())
    }

    /// Mask a peripheral interrupt and forget its handler. Fault and
    /// scheduler vectors stay bound for the whole run.
    pub fn unbind(&mut self, vector: Vector) -> Result<(), BindError> {
        if vector.is_fault() || vector.is_scheduler_critical() {
            return Err(BindError::Protected(vector));
        }
        let slot = self.slot(vector)?;
        if !self.test_bit(slot) {
            return Err(BindError::NotBound(vector));
        }

        let controller = &mut self.controller;
        sync::critical_section(|_| controller.disable(vector));
        self.bound[slot / 32] &= !(1 << (slot % 32));

        debug!("unbound {vector:?}");
        Ok(())
    }

    pub fn is_bound(&self, vector: Vector) -> bool {
        self.slot(vector).map_or(false, |slot| self.test_bit(slot))
    }

    /// Whether SVCall, PendSV and SysTick all have handlers.
    pub fn scheduler_vectors_bound(&self) -> bool {
        Vector::SCHEDULER.iter().all(|&v| self.is_bound(v))
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    fn slot(&self, vector: Vector) -> Result<usize, BindError> {
        let slot = usize::from(vector.exception_number());
        if slot >= self.controller.vector_count() || slot >= self.bound.len() * 32 {
            return Err(BindError::InvalidVector(vector));
        }
        Ok(slot)
    }

    fn test_bit(&self, slot: usize) -> bool {
        self.bound[slot / 32] & (1 << (slot % 32)) != 0
    }
}

/// `(1 << bits) - 1`, for 1 to 8 implemented bits.
pub const fn lowest_priority(bits: u8) -> Priority {
    ((1u16 << bits) - 1) as Priority
}
