//! ST STM32F103C8 "blue pill" (Cortex-M3, up to 72 MHz, no FPU).
//!
//! The system clock is selected by `RCC_CFGR.SWS` from HSI (8 MHz), HSE
//! (8 MHz crystal) or the PLL, then divided by the AHB prescaler. The
//! status LED is on PC13.

/// Implemented NVIC priority bits.
pub const PRIORITY_BITS: u8 = 4;

/// 16 system exceptions + 43 peripheral interrupts (medium density).
pub const VECTOR_COUNT: usize = 16 + 43;

pub const HSI_HZ: u32 = 8_000_000;

/// Crystal fitted on the board.
pub const HSE_HZ: u32 = 8_000_000;

const CFGR_SWS_SHIFT: u32 = 2;
const CFGR_HPRE_SHIFT: u32 = 4;
const CFGR_PLLSRC: u32 = 1 << 16;
const CFGR_PLLXTPRE: u32 = 1 << 17;
const CFGR_PLLMUL_SHIFT: u32 = 18;

/// Decode the core (HCLK) frequency from `RCC_CFGR`. Returns 0 for a
/// reserved clock switch status.
pub const fn cpu_frequency(cfgr: u32) -> u32 {
    let sysclk = match (cfgr >> CFGR_SWS_SHIFT) & 0b11 {
        0b00 => HSI_HZ,
        0b01 => HSE_HZ,
        0b10 => {
            let input = if cfgr & CFGR_PLLSRC == 0 {
                HSI_HZ / 2
            } else if cfgr & CFGR_PLLXTPRE != 0 {
                HSE_HZ / 2
            } else {
                HSE_HZ
            };
            // PLLMUL 0b0000 is x2, saturating at x16
            let mul = (cfgr >> CFGR_PLLMUL_SHIFT) & 0b1111;
            let factor = if mul >= 0b1110 { 16 } else { mul + 2 };
            input * factor
        }
        _ => return 0,
    };
    let hpre = (cfgr >> CFGR_HPRE_SHIFT) & 0b1111;
    let shift = match hpre {
        0b1000 => 1,
        0b1001 => 2,
        0b1010 => 3,
        0b1011 => 4,
        0b1100 => 6,
        0b1101 => 7,
        0b1110 => 8,
        0b1111 => 9,
        _ => 0,
    };
    sysclk >> shift
}

#[cfg(all(target_os = "none", feature = "stm32f103c8"))]
pub use self::target::{Stm32Pin, Stm32f103c8};

#[cfg(all(target_os = "none", feature = "stm32f103c8"))]
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

    const RCC: usize = 0x4002_1000;
    const RCC_CFGR: usize = RCC + 0x04;
    const RCC_APB2ENR: usize = RCC + 0x18;

    const GPIOA: usize = 0x4001_0800;
    const GPIO_CRL: usize = 0x00;
    const GPIO_ODR: usize = 0x0C;
    const GPIO_BSRR: usize = 0x10;
    const GPIO_BRR: usize = 0x14;

    /// General-purpose output, push-pull, 2 MHz.
    const MODE_OUTPUT_2MHZ: u32 = 0b0010;

    /// A GPIO pin configured as a push-pull output.
    pub struct Stm32Pin {
        /// Port index, A = 0.
        port: usize,
        pin: u32,
        claimed: AtomicBool,
    }

    impl Stm32Pin {
        const fn new(port: usize, pin: u32) -> Self {
            Self {
                port,
                pin,
                claimed: AtomicBool::new(false),
            }
        }

        fn base(&self) -> usize {
            GPIOA + 0x400 * self.port
        }

        fn mask(&self) -> u32 {
            1 << self.pin
        }

        fn claim(&'static self) -> Result<&'static Self, FatalError> {
            if self.claimed.swap(true, Ordering::AcqRel) {
                return Err(FatalError::DeviceUnavailable("led"));
            }
            // CRL covers pins 0-7, CRH pins 8-15, four bits each
            let config = self.base() + GPIO_CRL + 4 * (self.pin as usize / 8);
            let shift = 4 * (self.pin % 8);
            // SAFETY: bring-up owns RCC and this pin's configuration bits.
            unsafe {
                reg::modify(RCC_APB2ENR, |r| r | (1 << (2 + self.port)));
                reg::modify(config, |r| (r & !(0b1111 << shift)) | (MODE_OUTPUT_2MHZ << shift));
            }
            Ok(self)
        }
    }

    impl OutputPin for Stm32Pin {
        fn set_level(&self, high: bool) {
            let offset = if high { GPIO_BSRR } else { GPIO_BRR };
            // SAFETY: BSRR/BRR writes only affect the masked pin.
            unsafe { reg::write(self.base() + offset, self.mask()) };
        }

        fn level(&self) -> bool {
            // SAFETY: read-only.
            unsafe { reg::read(self.base() + GPIO_ODR) & self.mask() != 0 }
        }
    }

    static VECTORS: RamVectorTable<VECTOR_COUNT> = RamVectorTable::new();
    static CLOCK: DwtClock = DwtClock::new();
    static LED: Stm32Pin = Stm32Pin::new(2, 13);

    pub struct Stm32f103c8 {
        core: CorePeripherals,
    }

    impl Stm32f103c8 {
        /// `None` if the core peripherals were already taken.
        pub fn take() -> Option<Self> {
            CorePeripherals::take().map(|core| Self { core })
        }
    }

    impl Platform for Stm32f103c8 {
        const NAME: &'static str = "stm32f103c8";

        type Clock = DwtClock;
        type Pin = Stm32Pin;
        type Interrupts = NvicController<VECTOR_COUNT>;
        type Timer = SysTickTimer;

        /// No FPU, and the runtime already set up `.data` and `.bss`.
        fn initialize_processor(&mut self) -> Result<(), FatalError> {
            Ok(())
        }

        fn cpu_frequency(&self) -> u32 {
            // SAFETY: read-only access to RCC.
            unsafe { cpu_frequency(reg::read(RCC_CFGR)) }
        }

        fn claim_clock(&mut self, cpu_hz: u32) -> Result<&'static DwtClock, FatalError> {
            self.core.start_clock(&CLOCK, cpu_hz)
        }

        fn claim_led(&mut self) -> Result<&'static Stm32Pin, FatalError> {
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

    const SWS_PLL: u32 = 0b10 << CFGR_SWS_SHIFT;

    #[test]
    fn test_reset_clock_is_hsi() {
        assert_eq!(cpu_frequency(0), 8_000_000);
        assert_eq!(cpu_frequency(0b01 << CFGR_SWS_SHIFT), 8_000_000);
    }

    #[test]
    fn test_pll_from_hse() {
        // HSE x9
        let cfgr = SWS_PLL | CFGR_PLLSRC | (7 << CFGR_PLLMUL_SHIFT);
        assert_eq!(cpu_frequency(cfgr), 72_000_000);
        // AHB /2
        assert_eq!(cpu_frequency(cfgr | (0b1000 << CFGR_HPRE_SHIFT)), 36_000_000);
        // HSE/2 x9
        assert_eq!(cpu_frequency(cfgr | CFGR_PLLXTPRE), 36_000_000);
    }

    #[test]
    fn test_pll_from_hsi() {
        // HSI/2 x16
        let cfgr = SWS_PLL | (0b1110 << CFGR_PLLMUL_SHIFT);
        assert_eq!(cpu_frequency(cfgr), 64_000_000);
        assert_eq!(cpu_frequency(SWS_PLL | (0b1111 << CFGR_PLLMUL_SHIFT)), 64_000_000);
    }

    #[test]
    fn test_reserved_switch_status_reads_zero() {
        assert_eq!(cpu_frequency(0b11 << CFGR_SWS_SHIFT), 0);
    }

    #[test]
    fn test_lowest_priority() {
        assert_eq!(crate::vector::lowest_priority(PRIORITY_BITS), 15);
    }
}
