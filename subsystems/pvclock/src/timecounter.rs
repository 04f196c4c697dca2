//! # Timecounter and Time-of-Day Adapters
//!
//! Glue to the kernel's generic time frameworks. The timecounter samples
//! the low 32 bits of global system time; the framework extends them
//! itself. The time-of-day device reads the hypervisor wall clock and,
//! in the privileged domain, pushes a new time back to the hypervisor.

#[cfg(feature = "dom0ops")]
use crate::abi::SetTime64;
use crate::error::ClockResult;
use crate::platform::Platform;
use crate::wallclock::TimeVal;
use crate::{PvClock, NS_PER_SEC};

/// Name the timecounter registers under
pub const TIMECOUNTER_NAME: &str = "xen_system_time";

// =============================================================================
// Framework Contracts
// =============================================================================

/// Timecounter descriptor handed to the time framework
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimecounterInfo {
    /// Registered name
    pub name: &'static str,
    /// Valid bits of [`Timecounter::get_timecount`]
    pub counter_mask: u32,
    /// Counter frequency in Hz
    pub frequency: u64,
    /// Preference relative to other timecounters
    pub quality: i32,
}

/// A free-running counter the time framework can sample
pub trait Timecounter {
    /// Current counter value
    fn get_timecount(&self) -> u32;

    /// Static description of the counter
    fn info(&self) -> TimecounterInfo;
}

/// A battery-backed or hypervisor-backed time-of-day source
pub trait TimeOfDay {
    /// Read the time of day
    fn todr_get(&self) -> ClockResult<TimeVal>;

    /// Set the time of day
    fn todr_set(&self, tv: &TimeVal) -> ClockResult<()>;
}

// =============================================================================
// Adapters
// =============================================================================

impl<P: Platform> PvClock<P> {
    /// Descriptor for the `xen_system_time` timecounter
    pub fn timecounter_info(&self) -> TimecounterInfo {
        TimecounterInfo {
            name: TIMECOUNTER_NAME,
            counter_mask: u32::MAX,
            frequency: NS_PER_SEC,
            quality: self.config.timecounter_quality,
        }
    }
}

impl<P: Platform> Timecounter for PvClock<P> {
    #[inline]
    fn get_timecount(&self) -> u32 {
        self.global_now_ns() as u32
    }

    fn info(&self) -> TimecounterInfo {
        self.timecounter_info()
    }
}

impl<P: Platform> TimeOfDay for PvClock<P> {
    fn todr_get(&self) -> ClockResult<TimeVal> {
        Ok(TimeVal::from(self.wallclock_now()))
    }

    fn todr_set(&self, tv: &TimeVal) -> ClockResult<()> {
        // Only the control domain owns the hardware clock.
        if !self.platform.is_privileged() {
            return Ok(());
        }

        if let Err(e) = self.platform.rtc_set(tv) {
            log::warn!("pvclock: failed to set local RTC: {}", e);
        }

        #[cfg(feature = "dom0ops")]
        {
            let op = SetTime64 {
                secs: tv.sec,
                nsecs: tv.usec.saturating_mul(crate::NS_PER_US as u32),
                mbz: 0,
                system_time: self.global_now_ns(),
            };
            self.platform.platform_settime(&op)?;
        }

        Ok(())
    }
}
