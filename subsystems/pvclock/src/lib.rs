//! # Helix Paravirtualized Guest Clock
//!
//! Guest-side timekeeping for Helix running under a Xen-style hypervisor.
//! The hypervisor publishes a per-vCPU time record and a global wall-clock
//! record in shared memory; this crate turns them into:
//!
//! - a per-core nanosecond estimate that never runs backwards,
//! - a single cross-core monotonic system time (lock-free, CAS watermark),
//! - calendar time for the time-of-day framework,
//! - the periodic `hardclock` tick, driven from a one-shot virtual timer
//!   interrupt with catch-up when delivery is late,
//! - calibrated short and long delays.
//!
//! ## Data Flow
//!
//! ```text
//! ┌──────────────────────────── hypervisor shared memory ───────────────────────┐
//! │   VcpuTimeInfo (per vCPU)                         WallClockInfo (global)     │
//! └───────────┬───────────────────────────────────────────────┬─────────────────┘
//!             │ seqlock read                                  │ seqlock read
//!             ▼                                               │
//!   ┌───────────────────┐   scale_delta(tsc)                  │
//!   │ estimate_local_ns │◀──────────── rdtsc                  │
//!   └─────────┬─────────┘                                     │
//!             │ + per-core skew                               │
//!             ▼                                               ▼
//!   ┌───────────────────┐    CAS watermark          ┌───────────────────┐
//!   │   global_now_ns   │──────────────────────────▶│   wallclock_now   │
//!   └─────────┬─────────┘                           └─────────┬─────────┘
//!             │                                               │
//!     timecounter / delay / tick driver                 todr get / set
//! ```
//!
//! ## Pinning
//!
//! Anything that reads the per-vCPU record or the cycle counter must not
//! migrate mid-read. Such functions take a [`CpuGuard`], obtained from
//! [`PvClock::pin`], as a capability.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![allow(clippy::new_without_default)]

#[cfg(test)]
extern crate std;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod abi;
pub mod arch;
pub mod clock;
pub mod config;
pub mod convert;
pub mod counters;
pub mod delay;
pub mod error;
pub mod hardclock;
pub mod percpu;
pub mod platform;
pub mod seqlock;
pub mod systime;
pub mod timecounter;
pub mod timepush;
pub mod wallclock;

#[cfg(test)]
pub(crate) mod sim;

// Re-exports for convenience
pub use abi::{EventChannel, IntrHandle, VcpuTimeInfo, Virq, WallClockInfo, XenVersion};
pub use clock::PvClock;
pub use config::ClockConfig;
pub use convert::scale_delta;
pub use counters::{ClockCounters, EventCounter};
pub use error::{ClockError, ClockResult};
pub use hardclock::TimerState;
pub use percpu::{CpuGuard, CpuId, PerCpu, MAX_CPUS};
pub use platform::{CpuPinning, CycleCounter, EventChannels, Hypervisor, Platform, RtcDevice};
pub use timecounter::{TimeOfDay, Timecounter, TimecounterInfo};
pub use timepush::{Callout, SysctlNode, TimePush};
pub use wallclock::{TimeVal, Timespec};

/// Nanoseconds per second
pub const NS_PER_SEC: u64 = 1_000_000_000;

/// Nanoseconds per microsecond
pub const NS_PER_US: u64 = 1_000;
