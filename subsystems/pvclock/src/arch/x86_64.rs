//! # x86_64 Time Stamp Counter
//!
//! The hypervisor calibrates `tsc_to_system_mul` against the raw TSC, so
//! this is a plain `rdtsc`. It is fenced on both sides: speculative
//! execution must not move it ahead of the version read that opens the
//! snapshot, nor past the one that closes it.

use crate::platform::CycleCounter;

/// Serialized TSC reader
#[derive(Debug, Clone, Copy, Default)]
pub struct Tsc;

impl Tsc {
    /// Read the TSC without serialization
    #[inline]
    pub fn read() -> u64 {
        let low: u32;
        let high: u32;
        // SAFETY: rdtsc is unprivileged unless CR4.TSD is set, which we never do.
        unsafe {
            core::arch::asm!(
                "rdtsc",
                out("eax") low,
                out("edx") high,
                options(nostack, nomem, preserves_flags),
            );
        }
        ((high as u64) << 32) | (low as u64)
    }

    /// Read the TSC with `lfence` on both sides
    #[inline]
    pub fn read_serialized() -> u64 {
        // SAFETY: lfence has no side effects beyond ordering.
        unsafe {
            core::arch::asm!("lfence", options(nostack, preserves_flags));
        }
        let tsc = Self::read();
        // SAFETY: as above.
        unsafe {
            core::arch::asm!("lfence", options(nostack, preserves_flags));
        }
        tsc
    }
}

impl CycleCounter for Tsc {
    #[inline]
    fn read_cycles(&self) -> u64 {
        Self::read_serialized()
    }
}
