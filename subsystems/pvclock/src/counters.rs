//! # Anomaly Counters
//!
//! Per-core event counters bumped whenever a clamp or correction fires.
//! Control logic never reads them; they exist for diagnostics and are
//! handed to the kernel's event-counter framework by name.

use core::sync::atomic::{AtomicU64, Ordering};

/// A named monotonic event counter
#[derive(Debug)]
pub struct EventCounter {
    name: &'static str,
    count: AtomicU64,
}

impl EventCounter {
    /// Create a counter at zero
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            count: AtomicU64::new(0),
        }
    }

    /// Counter name
    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Current value
    #[inline]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn incr(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }
}

/// The anomaly counters kept for each core
#[derive(Debug)]
pub struct ClockCounters {
    /// TSC read lower than the record's `tsc_timestamp`
    pub tsc_backwards: EventCounter,
    /// `system_time + delta` wrapped around
    pub raw_systime_wraparound: EventCounter,
    /// Estimate fell below this core's previous estimate
    pub raw_systime_backwards: EventCounter,
    /// Tick handler saw time before its last tick bookmark
    pub systime_backwards_hardclock: EventCounter,
    /// A tick was replayed late because delivery was delayed
    pub missed_hardclock: EventCounter,
}

impl ClockCounters {
    /// All counters at zero
    pub const fn new() -> Self {
        Self {
            tsc_backwards: EventCounter::new("cpu tsc ran backwards"),
            raw_systime_wraparound: EventCounter::new("raw systime wrapped around"),
            raw_systime_backwards: EventCounter::new("raw systime went backwards"),
            systime_backwards_hardclock: EventCounter::new("systime went backwards in hardclock"),
            missed_hardclock: EventCounter::new("missed hardclock"),
        }
    }

    /// Every counter, for registration or dumping
    pub fn iter(&self) -> impl Iterator<Item = &EventCounter> {
        [
            &self.tsc_backwards,
            &self.raw_systime_wraparound,
            &self.raw_systime_backwards,
            &self.systime_backwards_hardclock,
            &self.missed_hardclock,
        ]
        .into_iter()
    }
}
