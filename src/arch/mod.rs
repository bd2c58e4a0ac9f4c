//! # Architecture Port
//!
//! Processor-level helpers shared by every board. The register-level
//! ARMv7-M implementation lives in [`armv7m`] and is only compiled for
//! bare-metal targets; the helpers here have host fallbacks so the
//! bring-up logic runs under `cargo test`.

#[cfg(target_os = "none")]
pub mod armv7m;

use core::sync::atomic::AtomicU32;

const DATA_PATTERN: u32 = 0x5AFE_C0DE;

/// Initialized from flash by the runtime's `.data` copy.
static DATA_SENTINEL: AtomicU32 = AtomicU32::new(DATA_PATTERN);

/// Zeroed by the runtime's `.bss` clear.
static BSS_SENTINEL: AtomicU32 = AtomicU32::new(0);

/// Whether the runtime copied `.data` and zeroed `.bss` before `main`.
///
/// Read volatile so the sentinels are never folded to their initializers.
pub fn memory_initialized() -> bool {
    // SAFETY: both pointers come from live statics.
    let (data, bss) = unsafe {
        (
            core::ptr::read_volatile(DATA_SENTINEL.as_ptr()),
            core::ptr::read_volatile(BSS_SENTINEL.as_ptr()),
        )
    };
    data == DATA_PATTERN && bss == 0
}

/// Sleep until the next interrupt.
#[inline]
pub fn wait_for_interrupt() {
    #[cfg(target_os = "none")]
    cortex_m::asm::wfi();

    #[cfg(all(not(target_os = "none"), test))]
    std::thread::sleep(std::time::Duration::from_millis(10));

    #[cfg(all(not(target_os = "none"), not(test)))]
    core::hint::spin_loop();
}

/// Shift a logical priority into the implemented (upper) bits of an 8-bit
/// priority register.
pub const fn encode_priority(priority: u8, bits: u8) -> u8 {
    priority << (8 - bits)
}
