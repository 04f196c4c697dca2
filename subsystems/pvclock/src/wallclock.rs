//! # Wall-Clock Time
//!
//! The hypervisor's wall-clock record gives the calendar time at system
//! time zero. Calendar time now is that plus the global system time.

use crate::platform::Platform;
use crate::seqlock::read_consistent;
use crate::{PvClock, NS_PER_SEC, NS_PER_US};

/// Calendar time with nanosecond resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timespec {
    /// Seconds since the epoch
    pub sec: u64,
    /// Nanoseconds within the second
    pub nsec: u32,
}

/// Calendar time with microsecond resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeVal {
    /// Seconds since the epoch
    pub sec: u64,
    /// Microseconds within the second
    pub usec: u32,
}

impl Timespec {
    /// Build from seconds plus a (possibly large) nanosecond count
    #[inline]
    pub const fn from_sec_plus_ns(sec: u64, ns: u64) -> Self {
        Self {
            sec: sec + ns / NS_PER_SEC,
            nsec: (ns % NS_PER_SEC) as u32,
        }
    }
}

impl From<Timespec> for TimeVal {
    fn from(ts: Timespec) -> Self {
        Self {
            sec: ts.sec,
            usec: ts.nsec / NS_PER_US as u32,
        }
    }
}

impl<P: Platform> PvClock<P> {
    /// Current calendar time
    pub fn wallclock_now(&self) -> Timespec {
        let wc = self.platform.wall_clock_info();
        let (sec, nsec) = read_consistent(wc, |wc| wc.snapshot());

        // Sampled after the record so the sum cannot lag it.
        let systime_ns = self.global_now_ns();

        Timespec::from_sec_plus_ns(sec, systime_ns + nsec as u64)
    }
}
