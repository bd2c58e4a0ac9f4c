//! # Boards
//!
//! Each board implements [`Platform`](crate::bringup::Platform). The one the
//! firmware runs on is picked with a cargo feature and exported as `Board`:
//!
//! | Feature       | Part        | Core        | Prio bits | IRQs | LED   |
//! |---------------|-------------|-------------|-----------|------|-------|
//! | `lpc4078`     | LPC4078     | Cortex-M4F  | 5         | 41   | P1.10 |
//! | `stm32f103c8` | STM32F103C8 | Cortex-M3   | 4         | 43   | PC13  |
//!
//! Clock-tree decoding is plain arithmetic and is tested on the host; the
//! register access is compiled only for the target.

pub mod lpc4078;
pub mod stm32f103c8;

#[cfg(all(target_os = "none", feature = "lpc4078", feature = "stm32f103c8"))]
compile_error!("enable exactly one board feature (`lpc4078` is on by default)");

#[cfg(all(target_os = "none", not(any(feature = "lpc4078", feature = "stm32f103c8"))))]
compile_error!("no board selected: enable `lpc4078` or `stm32f103c8`");

#[cfg(all(target_os = "none", feature = "lpc4078", not(feature = "stm32f103c8")))]
pub use self::lpc4078::Lpc4078 as Board;

#[cfg(all(target_os = "none", feature = "stm32f103c8", not(feature = "lpc4078")))]
pub use self::stm32f103c8::Stm32f103c8 as Board;

/// Volatile access to memory-mapped peripheral registers.
#[cfg(target_os = "none")]
pub(crate) mod reg {
    #[inline]
    pub unsafe fn read(addr: usize) -> u32 {
        (addr as *const u32).read_volatile()
    }

    #[inline]
    pub unsafe fn write(addr: usize, value: u32) {
        (addr as *mut u32).write_volatile(value)
    }

    #[inline]
    pub unsafe fn modify(addr: usize, f: impl FnOnce(u32) -> u32) {
        write(addr, f(read(addr)))
    }
}
