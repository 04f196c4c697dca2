//! # AArch64 Virtual Counter
//!
//! `cntvct_el0`, bracketed by `isb` so it is not read early or late
//! relative to the snapshot's version loads.

use crate::platform::CycleCounter;

/// Serialized virtual counter reader
#[derive(Debug, Clone, Copy, Default)]
pub struct VirtualCounter;

impl VirtualCounter {
    /// Read `cntvct_el0` with `isb` on both sides
    #[inline]
    pub fn read_serialized() -> u64 {
        let cnt: u64;
        // SAFETY: EL0 access to the virtual counter is enabled by the kernel.
        unsafe {
            core::arch::asm!(
                "isb",
                "mrs {}, cntvct_el0",
                "isb",
                out(reg) cnt,
                options(nostack)
            );
        }
        cnt
    }
}

impl CycleCounter for VirtualCounter {
    #[inline]
    fn read_cycles(&self) -> u64 {
        Self::read_serialized()
    }
}
