//! Narrow device interfaces handed to the application through the
//! [`HardwareMap`](crate::bringup::HardwareMap).
//!
//! The bring-up layer only needs a monotonic clock and one output pin (the
//! status LED); the boards provide register-level implementations.

use core::cell::Cell;

use crate::sync::{self, Mutex};

/// Monotonic time source.
pub trait SteadyClock: Sync {
    /// Counting frequency in Hz.
    fn frequency(&self) -> u32;

    /// Ticks since the clock was started.
    fn uptime(&self) -> u64;
}

/// Digital output.
pub trait OutputPin: Sync {
    fn set_level(&self, high: bool);

    fn level(&self) -> bool;

    fn toggle(&self) {
        self.set_level(!self.level());
    }
}

/// Extends a free-running 32-bit up-counter to 64 bits.
///
/// The counter must be sampled at least once per wrap (about 42 s at
/// 100 MHz) for the extension to stay correct.
pub struct CounterExtender {
    /// (last raw sample, wrap count)
    state: Mutex<Cell<(u32, u32)>>,
}

impl CounterExtender {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(Cell::new((0, 0))),
        }
    }

    pub fn extend(&self, raw: u32) -> u64 {
        sync::critical_section(|cs| {
            let state = self.state.borrow(cs);
            let (last, mut wraps) = state.get();
            if raw < last {
                wraps = wraps.wrapping_add(1);
            }
            state.set((raw, wraps));
            (u64::from(wraps) << 32) | u64::from(raw)
        })
    }
}

impl Default for CounterExtender {
    fn default() -> Self {
        Self::new()
    }
}
