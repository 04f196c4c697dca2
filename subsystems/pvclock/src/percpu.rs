//! # Per-CPU Clock State
//!
//! Clock state owned by a single core lives in a [`PerCpu`] arena indexed
//! by [`CpuId`]. The owning core reaches its slot only through a
//! [`CpuGuard`], which keeps the calling thread pinned for as long as it
//! lives. Other cores get a read-only view for diagnostics.
//!
//! ```text
//!   PerCpu<T>
//!   ┌────────┬────────┬────────┬─────┬──────────────┐
//!   │ cpu 0  │ cpu 1  │ cpu 2  │ ... │ cpu MAX-1    │
//!   └────────┴────────┴────────┴─────┴──────────────┘
//!        ▲
//!        └── local(&CpuGuard { cpu: 0 })
//! ```

use core::fmt;
use core::marker::PhantomData;

use crate::platform::CpuPinning;

/// Maximum number of cores tracked
pub const MAX_CPUS: usize = 64;

// =============================================================================
// CPU Identifier
// =============================================================================

/// Logical core (vCPU) identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct CpuId(pub u32);

impl CpuId {
    /// Index into per-CPU arrays
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpu{}", self.0)
    }
}

// =============================================================================
// Pinning Guard
// =============================================================================

#[cold]
fn cpu_out_of_range(cpu: CpuId) -> ! {
    log::error!("{}: beyond the {} cores the clock supports", cpu, MAX_CPUS);
    panic!("{}: beyond the {} cores the clock supports", cpu, MAX_CPUS);
}

/// Proof that the current thread cannot migrate
///
/// Created by pinning the caller to its current core; unpins on drop.
/// Not `Send`: it is only meaningful on the core that created it.
pub struct CpuGuard<'a> {
    cpu: CpuId,
    pinning: &'a dyn CpuPinning,
    _not_send: PhantomData<*const ()>,
}

impl<'a> CpuGuard<'a> {
    /// Pin the current thread
    ///
    /// # Panics
    ///
    /// If the platform reports a core at or beyond [`MAX_CPUS`].
    pub fn new(pinning: &'a dyn CpuPinning) -> Self {
        let cpu = pinning.pin_current();
        if cpu.index() >= MAX_CPUS {
            pinning.unpin(cpu);
            cpu_out_of_range(cpu);
        }
        Self {
            cpu,
            pinning,
            _not_send: PhantomData,
        }
    }

    /// The core we are pinned to
    #[inline]
    pub fn cpu(&self) -> CpuId {
        self.cpu
    }
}

impl Drop for CpuGuard<'_> {
    fn drop(&mut self) {
        self.pinning.unpin(self.cpu);
    }
}

impl fmt::Debug for CpuGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpuGuard").field("cpu", &self.cpu).finish()
    }
}

// =============================================================================
// Per-CPU Arena
// =============================================================================

/// One `T` per core
#[derive(Debug)]
pub struct PerCpu<T> {
    slots: [T; MAX_CPUS],
}

impl<T> PerCpu<T> {
    /// Wrap pre-built slots
    pub const fn from_slots(slots: [T; MAX_CPUS]) -> Self {
        Self { slots }
    }

    /// The calling core's slot
    #[inline]
    pub fn local(&self, guard: &CpuGuard<'_>) -> &T {
        &self.slots[guard.cpu().index()]
    }

    /// Another core's slot, read-only use only
    #[inline]
    pub fn remote(&self, cpu: CpuId) -> Option<&T> {
        self.slots.get(cpu.index())
    }
}
