//! # Clock Errors
//!
//! Anomalies in the hypervisor's time data are never errors: they are
//! corrected in place and counted (see [`crate::counters`]). What remains
//! here are hypercall and setup failures.
//!
//! | Failure | Where | Handling |
//! |---------|-------|----------|
//! | Timer deadline already passed | tick re-arm | retried in the handler |
//! | Event channel / handler setup | resume | fatal (`panic!`) |
//! | Platform settime rejected | `todr_set` | returned to the caller |
//! | Bad sysctl / config value | setters | returned to the caller |
//! | More cores than `MAX_CPUS` | `PvClock::new` | returned to the caller |

use core::fmt;

use crate::percpu::MAX_CPUS;

/// Clock subsystem error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    /// Hypercall failed with the given (negative) errno
    Hypercall(i32),
    /// One-shot timer deadline had already passed when it reached the hypervisor
    DeadlinePassed,
    /// No event channel could be bound to the timer VIRQ
    EventChannelUnavailable,
    /// The timer interrupt handler could not be established
    InterruptUnavailable,
    /// Local real-time clock could not be written
    RtcWrite,
    /// Invalid argument (e.g. negative sysctl value)
    InvalidArgument,
    /// Invalid configuration
    InvalidConfiguration,
    /// The guest has more cores than the clock can track
    TooManyCpus(u32),
}

/// Result type for clock operations
pub type ClockResult<T> = Result<T, ClockError>;

impl fmt::Display for ClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockError::Hypercall(errno) => write!(f, "Hypercall failed (errno {})", errno),
            ClockError::DeadlinePassed => write!(f, "Timer deadline already passed"),
            ClockError::EventChannelUnavailable => write!(f, "Timer event channel unavailable"),
            ClockError::InterruptUnavailable => write!(f, "Timer interrupt handler unavailable"),
            ClockError::RtcWrite => write!(f, "Real-time clock write failed"),
            ClockError::InvalidArgument => write!(f, "Invalid argument"),
            ClockError::InvalidConfiguration => write!(f, "Invalid clock configuration"),
            ClockError::TooManyCpus(n) => {
                write!(f, "{} cores exceed the supported maximum of {}", n, MAX_CPUS)
            },
        }
    }
}
