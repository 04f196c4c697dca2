//! # Periodic Tick Driver
//!
//! The hypervisor offers a one-shot timer per vCPU, delivered on the
//! `Timer` VIRQ. Each core turns it into a periodic `hardclock` by
//! re-arming it one tick interval past its tick bookmark every time it
//! fires.
//!
//! ## State Machine
//!
//! ```text
//!            resume_clocks                 timer_interrupt
//!   ┌──────────┐ ─────────▶ ┌──────────┐ ◀───────────────┐
//!   │ Detached │            │  Armed   │ ────────────────┘
//!   └──────────┘ ◀───────── └──────────┘
//!            suspend_clocks
//! ```
//!
//! ## Catch-up
//!
//! The bookmark only ever advances by whole intervals. If delivery was
//! late by several intervals, the handler calls `hardclock` once per
//! elapsed interval, so the tick count stays in step with system time.
//! Every replayed tick beyond the first is counted as missed.

use core::sync::atomic::Ordering;

use crate::abi::{EventChannel, IntrHandle, Virq};
use crate::error::ClockError;
use crate::percpu::{CpuGuard, CpuId};
use crate::platform::Platform;
use crate::PvClock;

/// Timer interrupt wiring of one core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TimerBinding {
    pub(crate) channel: EventChannel,
    pub(crate) handle: IntrHandle,
}

/// Tick driver state of one core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// No timer interrupt; the core does not tick
    Detached,
    /// Timer interrupt established and a deadline pending
    Armed,
}

/// A core that cannot tick cannot schedule; there is no way to continue.
#[cold]
fn timer_setup_failed(cpu: CpuId, what: &str, err: ClockError) -> ! {
    log::error!("{}: unable to {} timer interrupt: {}", cpu, what, err);
    panic!("{}: unable to {} timer interrupt: {}", cpu, what, err);
}

impl<P: Platform> PvClock<P> {
    /// Tick driver state of the pinned core
    pub fn timer_state(&self, guard: &CpuGuard<'_>) -> TimerState {
        if self.vcpu(guard).timer.lock().is_some() {
            TimerState::Armed
        } else {
            TimerState::Detached
        }
    }

    // =========================================================================
    // Resume
    // =========================================================================

    /// Start ticking on the pinned core
    ///
    /// # Panics
    ///
    /// If the timer VIRQ cannot be bound or its handler established.
    pub fn resume_clocks(&self, guard: &CpuGuard<'_>) {
        let cpu = guard.cpu();
        let vcpu = self.vcpu(guard);

        let mut timer = vcpu.timer.lock();
        if let Some(binding) = *timer {
            log::warn!("{}: timer already resumed on {}", cpu, binding.channel);
            return;
        }

        let channel = self
            .platform
            .bind_virq(Virq::Timer, cpu)
            .unwrap_or_else(|e| timer_setup_failed(cpu, "bind", e));
        let handle = self
            .platform
            .establish(channel, cpu)
            .unwrap_or_else(|e| timer_setup_failed(cpu, "establish", e));
        self.platform.unmask(channel);

        let version = self.platform.version();
        if version.has_periodic_timer() {
            if let Err(e) = self.platform.stop_periodic_timer(cpu) {
                log::warn!("{}: failed to stop periodic timer: {}", cpu, e);
            }
        }

        *timer = Some(TimerBinding { channel, handle });
        drop(timer);

        let interval = self.config.tick_interval_ns();
        loop {
            let now = self.estimate_local_ns(guard);
            vcpu.hardclock_systime_ns.store(now, Ordering::Relaxed);
            if self.platform.set_timer_op(now + interval).is_ok() {
                break;
            }
        }

        log::debug!("{}: timer interrupt on {}", cpu, channel);
    }

    // =========================================================================
    // Fire
    // =========================================================================

    /// Timer VIRQ handler for the pinned core
    ///
    /// Calls `hardclock` once for every whole tick interval elapsed since
    /// the last tick, then arms the next deadline. Does not return until a
    /// deadline has been accepted.
    pub fn timer_interrupt(&self, guard: &CpuGuard<'_>, mut hardclock: impl FnMut()) {
        let vcpu = self.vcpu(guard);
        let interval = self.config.tick_interval_ns();

        loop {
            let mut now = self.estimate_local_ns(guard);
            let mut bookmark = vcpu.hardclock_systime_ns.load(Ordering::Relaxed);

            if now < bookmark {
                vcpu.counters.systime_backwards_hardclock.incr();
                now = bookmark;
            }

            while now - bookmark >= interval {
                bookmark += interval;
                vcpu.hardclock_systime_ns.store(bookmark, Ordering::Relaxed);
                hardclock();
                if now - bookmark >= interval {
                    vcpu.counters.missed_hardclock.incr();
                }
            }

            // Fails only if the deadline went by meanwhile; run again.
            if self.platform.set_timer_op(bookmark + interval).is_ok() {
                return;
            }
        }
    }

    // =========================================================================
    // Suspend
    // =========================================================================

    /// Stop ticking on the pinned core
    pub fn suspend_clocks(&self, guard: &CpuGuard<'_>) {
        let cpu = guard.cpu();
        let Some(binding) = self.vcpu(guard).timer.lock().take() else {
            return;
        };

        let channel = self
            .platform
            .unbind_virq(Virq::Timer, cpu)
            .unwrap_or(binding.channel);
        self.platform.mask(channel);
        self.platform.disestablish(binding.handle);

        log::debug!("{}: timer interrupt released", cpu);
    }
}

// =============================================================================
// TESTS
// =============================================================================
