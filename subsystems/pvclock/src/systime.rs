//! # System Time
//!
//! Two layers:
//!
//! 1. **Per-core estimate**: the vCPU record plus the TSC delta since the
//!    hypervisor sampled it. Clamped so it never decreases on one core.
//! 2. **Global time**: per-core estimates merged into one monotonic
//!    sequence through a shared watermark updated by compare-and-swap.
//!    Each core carries a skew so that, once corrected, its later
//!    estimates already clear the watermark.
//!
//! ```text
//!   core A: estimate + skew_A ─┐
//!                              ├──▶ max(local, watermark + 1) ──CAS──▶ watermark
//!   core B: estimate + skew_B ─┘
//! ```

use core::sync::atomic::Ordering;

use crate::convert::scale_delta;
use crate::percpu::CpuGuard;
use crate::platform::Platform;
use crate::seqlock::read_consistent;
use crate::PvClock;

impl<P: Platform> PvClock<P> {
    // =========================================================================
    // Per-Core Estimate
    // =========================================================================

    /// Best estimate of system time on the pinned core, in nanoseconds
    ///
    /// Successive calls on one core never return a smaller value.
    pub fn estimate_local_ns(&self, guard: &CpuGuard<'_>) -> u64 {
        let vcpu = self.vcpu(guard);
        let vt = self.platform.vcpu_time_info(guard.cpu());

        let (snap, tsc) = read_consistent(vt, |vt| (vt.snapshot(), self.platform.read_cycles()));

        // Only possible if we raced a migration between TSC domains.
        let delta_ns = if tsc < snap.tsc_timestamp {
            vcpu.counters.tsc_backwards.incr();
            0
        } else {
            scale_delta(
                tsc - snap.tsc_timestamp,
                snap.tsc_to_system_mul,
                snap.tsc_shift,
            )
        };

        let (mut systime_ns, wrapped) = snap.system_time.overflowing_add(delta_ns);
        if wrapped {
            // Bad calibration; keep the wrapped value so it shows up.
            vcpu.counters.raw_systime_wraparound.incr();
        }

        // The timer interrupt estimates on this core too and may land
        // anywhere in here; fetch_max keeps its bookmark from being undone.
        let last = vcpu.last_raw_systime_ns.fetch_max(systime_ns, Ordering::Relaxed);
        if systime_ns < last {
            vcpu.counters.raw_systime_backwards.incr();
            systime_ns = last.saturating_add(1);
            vcpu.last_raw_systime_ns.fetch_max(systime_ns, Ordering::Relaxed);
        }

        systime_ns
    }

    /// The vCPU record's system time, without TSC extrapolation
    ///
    /// Coarse (hypervisor update granularity) but cheap.
    pub fn estimate_local_raw_ns(&self, guard: &CpuGuard<'_>) -> u64 {
        let vt = self.platform.vcpu_time_info(guard.cpu());
        read_consistent(vt, |vt| vt.system_time.load(Ordering::Relaxed))
    }

    // =========================================================================
    // Global Time
    // =========================================================================

    /// System time, monotonic across all cores
    pub fn global_now_ns(&self) -> u64 {
        let guard = self.pin();
        self.global_now_ns_pinned(&guard)
    }

    /// [`PvClock::global_now_ns`] for callers already pinned
    pub fn global_now_ns_pinned(&self, guard: &CpuGuard<'_>) -> u64 {
        let vcpu = self.vcpu(guard);

        loop {
            let skew = vcpu.systime_ns_skew.load(Ordering::Relaxed);
            let local = self.estimate_local_ns(guard).wrapping_add(skew);
            let global = self.global_systime_ns.load(Ordering::Acquire);

            let result = if local <= global {
                let result = global + 1;
                vcpu.systime_ns_skew
                    .store(skew + (result - local), Ordering::Relaxed);
                result
            } else {
                local
            };

            if self
                .global_systime_ns
                .compare_exchange(global, result, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return result;
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
