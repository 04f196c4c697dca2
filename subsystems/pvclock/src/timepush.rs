//! # Wall-Clock Push-Back
//!
//! In the privileged domain the kernel's time of day is authoritative.
//! A periodic callout runs the kernel's resync entry point (which ends up
//! in [`crate::TimeOfDay::todr_set`]) so the hypervisor's wall clock does
//! not drift from it. The interval is a sysctl; zero disables.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::error::{ClockError, ClockResult};
use crate::platform::Platform;
use crate::PvClock;

/// A one-shot kernel callout
pub trait Callout {
    /// (Re)schedule the callout `ticks` ticks from now
    fn schedule(&self, ticks: u32);

    /// Cancel a pending run
    fn stop(&self);
}

/// Sysctl node descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SysctlNode {
    /// Full dotted name
    pub name: &'static str,
    /// Help text
    pub description: &'static str,
}

/// The push-back interval node
pub const TIMEPUSH_SYSCTL: SysctlNode = SysctlNode {
    name: "machdep.xen.timepush_ticks",
    description: "How often to update the hypervisor's time-of-day; 0 to disable",
};

/// Periodic push of the kernel's time of day to the hypervisor
#[derive(Debug)]
pub struct TimePush<C: Callout> {
    callout: C,
    ticks: AtomicU32,
}

impl<C: Callout> TimePush<C> {
    fn new(callout: C, ticks: u32) -> Self {
        Self {
            callout,
            ticks: AtomicU32::new(ticks),
        }
    }

    /// The sysctl node to register
    pub const fn sysctl_node(&self) -> SysctlNode {
        TIMEPUSH_SYSCTL
    }

    /// Schedule the first run
    pub fn start(&self) {
        let ticks = self.ticks.load(Ordering::Relaxed);
        if ticks > 0 {
            self.callout.schedule(ticks);
        }
    }

    /// Callout body: resync, then schedule the next run
    pub fn fire(&self, resettodr: impl FnOnce()) {
        resettodr();

        let ticks = self.ticks.load(Ordering::Relaxed);
        if ticks > 0 {
            self.callout.schedule(ticks);
        }
    }

    /// Sysctl read handler
    pub fn sysctl_read(&self) -> i32 {
        self.ticks.load(Ordering::Relaxed) as i32
    }

    /// Sysctl write handler
    ///
    /// The callout is only touched when the interval actually changes.
    pub fn sysctl_write(&self, value: i32) -> ClockResult<()> {
        let ticks = u32::try_from(value).map_err(|_| ClockError::InvalidArgument)?;

        let old = self.ticks.swap(ticks, Ordering::Relaxed);
        if ticks == old {
            return Ok(());
        }

        if ticks == 0 {
            self.callout.stop();
        } else {
            self.callout.schedule(ticks);
        }
        log::debug!("pvclock: {} = {}", TIMEPUSH_SYSCTL.name, ticks);
        Ok(())
    }

    /// The underlying callout
    pub fn callout(&self) -> &C {
        &self.callout
    }
}

impl<P: Platform> PvClock<P> {
    /// Set up push-back; `None` outside the privileged domain
    pub fn timepush_init<C: Callout>(&self, callout: C) -> Option<TimePush<C>> {
        if !self.platform.is_privileged() {
            return None;
        }
        log::info!(
            "pvclock: pushing time of day to the hypervisor every {} ticks",
            self.config.timepush_ticks
        );
        Some(TimePush::new(callout, self.config.timepush_ticks))
    }
}
