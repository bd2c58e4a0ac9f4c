//! # Tick Source Configurator
//!
//! Turns a tick frequency and the clock feeding the timer into a reload
//! period, validates it against the timer width and arms the timer once.
//!
//! The physical timer is behind [`TickTimer`]: SysTick on Cortex-M
//! (`arch::armv7m::SysTickTimer`), a recording mock in tests.

use log::{info, warn};

use crate::error::TickError;
use crate::sync;

/// SysTick counts a 24-bit reload value, and the register holds
/// `period - 1`, so the longest period is 2^24 cycles.
pub const SYSTICK_MAX_PERIOD: u32 = 1 << 24;

/// A reload value of 0 stops SysTick from raising its interrupt, so the
/// shortest usable period is 2 cycles.
pub const SYSTICK_MIN_PERIOD: u32 = 2;

/// Requested tick frequency and the frequency of the clock driving the
/// timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickConfig {
    pub frequency_hz: u32,
    pub source_clock_hz: u32,
}

impl TickConfig {
    pub const fn new(frequency_hz: u32, source_clock_hz: u32) -> Self {
        Self {
            frequency_hz,
            source_clock_hz,
        }
    }

    /// Tick period in source cycles, i.e. the reload value the timer counts
    /// down from. 1000 Hz on a 100 MHz clock gives 100 000.
    pub const fn reload(&self, min_period: u32, max_period: u32) -> Result<u32, TickError> {
        if self.frequency_hz == 0 {
            return Err(TickError::ZeroRate);
        }
        if self.frequency_hz > self.source_clock_hz {
            return Err(TickError::RateAboveSource);
        }
        let period = self.source_clock_hz / self.frequency_hz;
        if period < min_period {
            return Err(TickError::Underflow {
                period,
                min: min_period,
            });
        }
        if period > max_period {
            return Err(TickError::Overflow {
                period,
                max: max_period,
            });
        }
        Ok(period)
    }

    /// Whether the source clock divides evenly into ticks.
    pub const fn is_exact(&self) -> bool {
        self.frequency_hz != 0 && self.source_clock_hz % self.frequency_hz == 0
    }
}

/// A down-counting periodic timer that raises the tick interrupt.
pub trait TickTimer {
    /// Shortest period that still raises an interrupt, in source cycles.
    fn min_period(&self) -> u32;

    /// Longest period the timer can count, in source cycles.
    fn max_period(&self) -> u32;

    /// Load `period` cycles, clear the counter, enable the interrupt and
    /// start counting.
    fn arm(&mut self, period: u32);

    /// Whether the counter is running.
    fn is_running(&self) -> bool;
}

/// Owns the tick timer and arms it exactly once.
pub struct TickSource<T> {
    timer: T,
    period: Option<u32>,
}

impl<T: TickTimer> TickSource<T> {
    pub const fn new(timer: T) -> Self {
        Self {
            timer,
            period: None,
        }
    }

    /// Validate `config` and arm the timer. On error the timer is left
    /// untouched and unarmed. Returns the programmed period.
    pub fn configure(&mut self, config: TickConfig) -> Result<u32, TickError> {
        if self.period.is_some() {
            return Err(TickError::AlreadyArmed);
        }
        let period = config.reload(self.timer.min_period(), self.timer.max_period())?;
        if !config.is_exact() {
            warn!(
                "{} Hz does not divide {} Hz; tick runs at {} Hz",
                config.frequency_hz,
                config.source_clock_hz,
                config.source_clock_hz / period
            );
        }

        let timer = &mut self.timer;
        sync::critical_section(|_| timer.arm(period));
        self.period = Some(period);

        info!(
            "tick armed: {} Hz from {} Hz, period {period}",
            config.frequency_hz, config.source_clock_hz
        );
        Ok(period)
    }

    /// Programmed period, once armed.
    pub fn period(&self) -> Option<u32> {
        self.period
    }

    pub fn is_armed(&self) -> bool {
        self.period.is_some()
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }
}
