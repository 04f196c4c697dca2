//! # Clock Instance
//!
//! [`PvClock`] ties the platform, the configuration, the per-core state
//! arena and the global watermark together. Operations are spread over
//! the modules that implement them:
//!
//! | Module | Operations |
//! |--------|------------|
//! | [`crate::systime`] | `estimate_local_ns`, `estimate_local_raw_ns`, `global_now_ns` |
//! | [`crate::wallclock`] | `wallclock_now` |
//! | [`crate::timecounter`] | `get_timecount`, `todr_get`, `todr_set` |
//! | [`crate::hardclock`] | `resume_clocks`, `timer_interrupt`, `suspend_clocks` |
//! | [`crate::delay`] | `delay_ns`, `delay_us` |
//! | [`crate::timepush`] | `timepush_init` |

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;

use crate::abi::PvclockFlags;
use crate::config::ClockConfig;
use crate::counters::ClockCounters;
use crate::error::{ClockError, ClockResult};
use crate::hardclock::TimerBinding;
use crate::percpu::{CpuGuard, CpuId, PerCpu, MAX_CPUS};
use crate::platform::Platform;
use crate::timecounter::TimecounterInfo;

// =============================================================================
// Per-Core State
// =============================================================================

/// Clock state of one core, mutated only by that core
#[derive(Debug)]
pub(crate) struct VcpuClock {
    /// Last value returned by `estimate_local_ns` on this core
    pub(crate) last_raw_systime_ns: AtomicU64,
    /// Correction added to this core's estimate before it meets the watermark
    pub(crate) systime_ns_skew: AtomicU64,
    /// Local time of the last `hardclock`; moves in whole tick intervals
    pub(crate) hardclock_systime_ns: AtomicU64,
    /// Timer interrupt binding while armed
    pub(crate) timer: Mutex<Option<TimerBinding>>,
    pub(crate) counters: ClockCounters,
}

impl VcpuClock {
    const fn new() -> Self {
        Self {
            last_raw_systime_ns: AtomicU64::new(0),
            systime_ns_skew: AtomicU64::new(0),
            hardclock_systime_ns: AtomicU64::new(0),
            timer: Mutex::new(None),
            counters: ClockCounters::new(),
        }
    }
}

// =============================================================================
// Clock
// =============================================================================

/// The paravirtualized clock
pub struct PvClock<P: Platform> {
    pub(crate) platform: P,
    pub(crate) config: ClockConfig,
    pub(crate) vcpus: PerCpu<VcpuClock>,
    /// Highest system time ever handed out, by any core
    pub(crate) global_systime_ns: AtomicU64,
}

impl<P: Platform> fmt::Debug for PvClock<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PvClock")
            .field("config", &self.config)
            .field("global_systime_ns", &self.global_systime_ns)
            .finish_non_exhaustive()
    }
}

impl<P: Platform> PvClock<P> {
    /// Create a clock on `platform`
    pub fn new(platform: P, config: ClockConfig) -> ClockResult<Self> {
        config.validate()?;

        let cpus = platform.cpu_count();
        if cpus as usize > MAX_CPUS {
            log::error!("pvclock: {} cores, at most {} supported", cpus, MAX_CPUS);
            return Err(ClockError::TooManyCpus(cpus));
        }

        Ok(Self {
            platform,
            config,
            vcpus: PerCpu::from_slots([const { VcpuClock::new() }; MAX_CPUS]),
            global_systime_ns: AtomicU64::new(0),
        })
    }

    /// The underlying platform
    #[inline]
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Active configuration
    #[inline]
    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    /// Pin the calling thread to its current core
    #[inline]
    pub fn pin(&self) -> CpuGuard<'_> {
        CpuGuard::new(&self.platform)
    }

    /// Anomaly counters of any core (read-only)
    pub fn counters(&self, cpu: CpuId) -> Option<&ClockCounters> {
        self.vcpus.remote(cpu).map(|v| &v.counters)
    }

    /// Current global watermark, without advancing it
    #[inline]
    pub fn global_watermark_ns(&self) -> u64 {
        self.global_systime_ns.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn vcpu(&self, guard: &CpuGuard<'_>) -> &VcpuClock {
        self.vcpus.local(guard)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Boot-core clock initialization
    ///
    /// Starts this core's tick and returns the timecounter descriptor for
    /// registration with the time framework.
    pub fn init_clocks(&self, guard: &CpuGuard<'_>) -> TimecounterInfo {
        let flags = self.platform.vcpu_time_info(guard.cpu()).flags();
        log::info!(
            "pvclock: hypervisor {}, {} tsc, {} Hz tick",
            self.platform.version(),
            if flags.contains(PvclockFlags::TSC_STABLE) {
                "stable"
            } else {
                "per-vcpu"
            },
            self.config.hz
        );

        self.cpu_init_clocks(guard);

        let info = self.timecounter_info();
        log::info!(
            "pvclock: timecounter {} at {} Hz, quality {}",
            info.name,
            info.frequency,
            info.quality
        );
        info
    }

    /// Per-core clock initialization (boot and secondary cores)
    pub fn cpu_init_clocks(&self, guard: &CpuGuard<'_>) {
        for counter in self.vcpu(guard).counters.iter() {
            log::debug!("{}: attached event counter \"{}\"", guard.cpu(), counter.name());
        }
        self.resume_clocks(guard);
    }

    /// Idle until the hypervisor delivers the next event
    #[inline]
    pub fn idle_block(&self) {
        self.platform.sched_block();
    }
}
