//! # Synchronization Primitives
//!
//! Interrupt-safe critical sections. On the target the `cortex-m` crate
//! provides the single-core implementation (PRIMASK); host tests link the
//! `std` implementation so the same code paths run under `cargo test`.

pub use ::critical_section::{CriticalSection, Mutex};

/// Execute a closure within a critical section (interrupts disabled).
///
/// Every write to the vector table, the interrupt controller and the tick
/// timer goes through here, so an interrupt can never observe a
/// half-configured vector.
///
/// # Usage
/// ```ignore
/// sync::critical_section(|cs| {
///     STATE.borrow(cs).set(1);
/// });
/// ```
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    ::critical_section::with(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    static COUNTER: Mutex<Cell<u32>> = Mutex::new(Cell::new(0));

    #[test]
    fn test_closure_result_is_returned() {
        let value = critical_section(|cs| {
            let counter = COUNTER.borrow(cs);
            counter.set(counter.get() + 1);
            counter.get()
        });
        assert!(value >= 1);
    }
}
