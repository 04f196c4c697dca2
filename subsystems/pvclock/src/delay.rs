//! # Calibrated Delay
//!
//! Short waits spin on the cycle counter, scaled with the vCPU record's
//! calibration. The record's system time only moves when the hypervisor
//! refreshes it, too coarse for them. Long waits yield the CPU to the
//! hypervisor and poll that system time, which cannot be fooled by a
//! recalibration during the wait.

use core::sync::atomic::Ordering;

use crate::convert::scale_delta;
use crate::platform::Platform;
use crate::seqlock::read_consistent;
use crate::{PvClock, NS_PER_US};

impl<P: Platform> PvClock<P> {
    /// Wait at least `ns` nanoseconds
    ///
    /// Long waits may overshoot: the hypervisor decides when we run again.
    pub fn delay_ns(&self, ns: u64) {
        let guard = self.pin();

        if ns < self.config.short_delay_ns {
            let vt = self.platform.vcpu_time_info(guard.cpu());
            let (mul, shift, start) = read_consistent(vt, |vt| {
                (
                    vt.tsc_to_system_mul.load(Ordering::Relaxed),
                    vt.tsc_shift.load(Ordering::Relaxed),
                    self.platform.read_cycles(),
                )
            });

            loop {
                let tsc = self.platform.read_cycles();
                // Migrated despite pinning; good enough.
                if tsc < start {
                    break;
                }
                if scale_delta(tsc - start, mul, shift) >= ns {
                    break;
                }
                core::hint::spin_loop();
            }
        } else {
            let start = self.estimate_local_raw_ns(&guard);
            while self.estimate_local_raw_ns(&guard).wrapping_sub(start) < ns {
                self.platform.sched_yield();
            }
        }
    }

    /// Wait at least `us` microseconds
    #[inline]
    pub fn delay_us(&self, us: u64) {
        self.delay_ns(us.saturating_mul(NS_PER_US));
    }
}
