//! # Clock Configuration
//!
//! Boot-time tunables. Only the push-back interval can change later, via
//! its sysctl node (see [`crate::timepush`]).

use crate::error::{ClockError, ClockResult};
use crate::NS_PER_SEC;

// =============================================================================
// Constants
// =============================================================================

/// Default `hardclock` rate
pub const DEFAULT_HZ: u32 = 100;

/// Default push-back interval, in callout ticks per `hz`
pub const DEFAULT_TIMEPUSH_SECS: u32 = 53;

/// Default timecounter quality
pub const DEFAULT_TIMECOUNTER_QUALITY: i32 = 10_000;

/// Delays below this use the TSC; longer ones yield on system time
pub const DEFAULT_SHORT_DELAY_NS: u64 = 500_000;

// =============================================================================
// Configuration
// =============================================================================

/// Clock configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockConfig {
    /// `hardclock` frequency in Hz
    pub hz: u32,
    /// Wall-clock push-back interval in callout ticks (0 disables)
    pub timepush_ticks: u32,
    /// Quality advertised to the timecounter framework
    pub timecounter_quality: i32,
    /// Threshold between the TSC spin and the yielding delay
    pub short_delay_ns: u64,
}

impl ClockConfig {
    /// Default configuration
    pub const fn new() -> Self {
        Self {
            hz: DEFAULT_HZ,
            timepush_ticks: DEFAULT_TIMEPUSH_SECS * DEFAULT_HZ,
            timecounter_quality: DEFAULT_TIMECOUNTER_QUALITY,
            short_delay_ns: DEFAULT_SHORT_DELAY_NS,
        }
    }

    /// Set the tick rate; also rescales the default push-back interval
    pub const fn with_hz(mut self, hz: u32) -> Self {
        self.hz = hz;
        self.timepush_ticks = DEFAULT_TIMEPUSH_SECS.saturating_mul(hz);
        self
    }

    /// Set the push-back interval
    pub const fn with_timepush_ticks(mut self, ticks: u32) -> Self {
        self.timepush_ticks = ticks;
        self
    }

    /// Set the timecounter quality
    pub const fn with_timecounter_quality(mut self, quality: i32) -> Self {
        self.timecounter_quality = quality;
        self
    }

    /// Set the short/long delay threshold
    pub const fn with_short_delay_ns(mut self, ns: u64) -> Self {
        self.short_delay_ns = ns;
        self
    }

    /// Nanoseconds between two `hardclock` ticks
    #[inline]
    pub const fn tick_interval_ns(&self) -> u64 {
        NS_PER_SEC / self.hz as u64
    }

    /// Check the configuration
    pub fn validate(&self) -> ClockResult<()> {
        if self.hz == 0 || self.hz as u64 > NS_PER_SEC {
            return Err(ClockError::InvalidConfiguration);
        }
        if self.timepush_ticks > i32::MAX as u32 {
            return Err(ClockError::InvalidConfiguration);
        }
        Ok(())
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self::new()
    }
}
