//! NXP LPC4078 (Cortex-M4F, up to 120 MHz).
//!
//! The core clock is `CCLK = source / CCLKDIV`, where the source is either
//! `sysclk` (IRC or main oscillator, both 12 MHz) or the main PLL output
//! `sysclk × (MSEL + 1)`. The status LED is on P1.10.

/// Implemented NVIC priority bits.
pub const PRIORITY_BITS: u8 = 5;

/// 16 system exceptions + 41 peripheral interrupts.
pub const VECTOR_COUNT: usize = 16 + 41;

/// Internal RC oscillator.
pub const IRC_HZ: u32 = 12_000_000;

/// Main crystal oscillator fitted on the board.
pub const OSC_HZ: u32 = 12_000_000;

const CLKSRCSEL_OSC: u32 = 1 << 0;
const PLL0STAT_MSEL: u32 = 0x1F;
const PLL0STAT_PLLE: u32 = 1 << 8;
const PLL0STAT_PLOCK: u32 = 1 << 10;
const CCLKSEL_DIV: u32 = 0x1F;
const CCLKSEL_PLL: u32 = 1 << 8;

/// Decode the core clock from `CLKSRCSEL`, `PLL0STAT` and `CCLKSEL`.
/// Returns 0 when the CPU clock is gated or selects an unlocked PLL.
pub const fn cpu_frequency(clksrcsel: u32, pll0stat: u32, cclksel: u32) -> u32 {
    let sysclk = if clksrcsel & CLKSRCSEL_OSC != 0 {
        OSC_HZ
    } else {
        IRC_HZ
    };
    let divider = cclksel & CCLKSEL_DIV;
    if divider == 0 {
        return 0;
    }
    let source = if cclksel & CCLKSEL_PLL != 0 {
        let running = PLL0STAT_PLLE | PLL0STAT_PLOCK;
        if pll0stat & running != running {
            return 0;
        }
        sysclk * ((pll0stat & PLL0STAT_MSEL) + 1)
    } else {
        sysclk
    };
    source / divider
}

#[cfg(all(target_os = "none", feature = "lpc4078"))]
pub use self::target::{Lpc4078, Lpc40Pin};

#[cfg(all(target_os = "none", feature = "lpc4078"))]
mod target {
    use core::sync::atomic::{AtomicBool, Ordering};

    use super::{cpu_frequency, PRIORITY_BITS, VECTOR_COUNT};
    use crate::arch::armv7m::{
        self, CorePeripherals, DwtClock, NvicController, RamVectorTable, SysTickTimer,
    };
    use crate::board::reg;
    use crate::bringup::Platform;
    use crate::drivers::OutputPin;
    use crate::error::FatalError;

    const SYSCON: usize = 0x400F_C000;
    const PLL0STAT: usize = SYSCON + 0x088;
    const CCLKSEL: usize = SYSCON + 0x104;
    const CLKSRCSEL: usize = SYSCON + 0x10C;
    const PCONP: usize = SYSCON + 0x0C4;
    const PCONP_PCGPIO: u32 = 1 << 15;

    const IOCON: usize = 0x4002_C000;
    const IOCON_FUNC: u32 = 0b111;

    const GPIO: usize = 0x2009_8000;
    const GPIO_DIR: usize = 0x00;
    const GPIO_PIN: usize = 0x14;
    const GPIO_SET: usize = 0x18;
    const GPIO_CLR: usize = 0x1C;

    /// A GPIO pin configured as a push-pull output.
    pub struct Lpc40Pin {
        port: usize,
        pin: u32,
        claimed: AtomicBool,
    }

    impl Lpc40Pin {
        const fn new(port: usize, pin: u32) -> Self {
            Self {
                port,
                pin,
                claimed: AtomicBool::new(false),
            }
        }

        fn base(&self) -> usize {
            GPIO + 0x20 * self.port
        }

        fn mask(&self) -> u32 {
            1 << self.pin
        }

        fn claim(&'static self) -> Result<&'static Self, FatalError> {
            if self.claimed.swap(true, Ordering::AcqRel) {
                return Err(FatalError::DeviceUnavailable("led"));
            }
            let iocon = IOCON + 0x80 * self.port + 4 * self.pin as usize;
            // SAFETY: bring-up owns the GPIO block and this pin's IOCON.
            unsafe {
                reg::modify(PCONP, |r| r | PCONP_PCGPIO);
                reg::modify(iocon, |r| r & !IOCON_FUNC);
                reg::write(self.base() + GPIO_CLR, self.mask());
                reg::modify(self.base() + GPIO_DIR, |r| r | self.mask());
            }
            Ok(self)
        }
    }

    impl OutputPin for Lpc40Pin {
        fn set_level(&self, high: bool) {
            let offset = if high { GPIO_SET } else { GPIO_CLR };
            // SAFETY: SET/CLR writes only affect the masked pin.
            unsafe { reg::write(self.base() + offset, self.mask()) };
        }

        fn level(&self) -> bool {
            // SAFETY: read-only.
            unsafe { reg::read(self.base() + GPIO_PIN) & self.mask() != 0 }
        }
    }

    static VECTORS: RamVectorTable<VECTOR_COUNT> = RamVectorTable::new();
    static CLOCK: DwtClock = DwtClock::new();
    static LED: Lpc40Pin = Lpc40Pin::new(1, 10);

    pub struct Lpc4078 {
        core: CorePeripherals,
    }

    impl Lpc4078 {
        /// `None` if the core peripherals were already taken.
        pub fn take() -> Option<Self> {
            CorePeripherals::take().map(|core| Self { core })
        }
    }

    impl Platform for Lpc4078 {
        const NAME: &'static str = "lpc4078";

        type Clock = DwtClock;
        type Pin = Lpc40Pin;
        type Interrupts = NvicController<VECTOR_COUNT>;
        type Timer = SysTickTimer;

        fn initialize_processor(&mut self) -> Result<(), FatalError> {
            armv7m::enable_fpu(self.core.scb()?);
            Ok(())
        }

        fn cpu_frequency(&self) -> u32 {
            // SAFETY: read-only access to SYSCON.
            unsafe { cpu_frequency(reg::read(CLKSRCSEL), reg::read(PLL0STAT), reg::read(CCLKSEL)) }
        }

        fn claim_clock(&mut self, cpu_hz: u32) -> Result<&'static DwtClock, FatalError> {
            self.core.start_clock(&CLOCK, cpu_hz)
        }

        fn claim_led(&mut self) -> Result<&'static Lpc40Pin, FatalError> {
            LED.claim()
        }

        fn take_interrupts(&mut self) -> Result<Self::Interrupts, FatalError> {
            self.core.take_controller(&VECTORS, PRIORITY_BITS)
        }

        fn take_tick_timer(&mut self) -> Result<SysTickTimer, FatalError> {
            self.core.take_systick()
        }

        fn disable_interrupts(&mut self) {
            armv7m::mask_interrupts();
        }

        fn enable_interrupts(&mut self) {
            // SAFETY: only called once every enabled vector has a handler.
            unsafe { armv7m::unmask_interrupts() };
        }

        fn reset() -> ! {
            armv7m::reset()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_clock_is_irc() {
        // CCLKSEL resets to sysclk / 1
        assert_eq!(cpu_frequency(0, 0, 0x01), 12_000_000);
    }

    #[test]
    fn test_pll_clock() {
        // M = 10 from the main oscillator
        let pll0stat = PLL0STAT_PLLE | PLL0STAT_PLOCK | 9;
        assert_eq!(cpu_frequency(1, pll0stat, CCLKSEL_PLL | 1), 120_000_000);
        assert_eq!(cpu_frequency(1, pll0stat, CCLKSEL_PLL | 2), 60_000_000);
    }

    #[test]
    fn test_unusable_clock_reads_zero() {
        // PLL enabled but not locked
        assert_eq!(cpu_frequency(1, PLL0STAT_PLLE | 9, CCLKSEL_PLL | 1), 0);
        // divider 0 gates the CPU clock
        assert_eq!(cpu_frequency(0, 0, 0), 0);
    }

    #[test]
    fn test_vector_table_fits_relocation_alignment() {
        assert!(VECTOR_COUNT * 4 <= 512);
        assert_eq!(crate::vector::lowest_priority(PRIORITY_BITS), 31);
    }
}
