//! # Hypervisor ABI
//!
//! Shared-memory records and hypercall argument blocks exchanged with the
//! hypervisor. Layouts are bit-exact and checked at compile time.
//!
//! ## Per-vCPU Time Record
//!
//! ```text
//! ┌────────┬──────────────────────────────────────────────┐
//! │ 0x00   │ version             (u32, odd = mid-update)  │
//! │ 0x04   │ pad0                (u32)                    │
//! │ 0x08   │ tsc_timestamp       (u64)                    │
//! │ 0x10   │ system_time         (u64, ns)                │
//! │ 0x18   │ tsc_to_system_mul   (u32, 32.32 fixed point) │
//! │ 0x1C   │ tsc_shift           (i8)                     │
//! │ 0x1D   │ flags               (u8)                     │
//! │ 0x1E   │ pad1                ([u8; 2])                │
//! └────────┴──────────────────────────────────────────────┘
//! ```
//!
//! ## Wall-Clock Record
//!
//! ```text
//! ┌────────┬──────────────────────────────────────────────┐
//! │ 0x00   │ version             (u32, odd = mid-update)  │
//! │ 0x04   │ sec                 (u32, low half)          │
//! │ 0x08   │ nsec                (u32)                    │
//! │ 0x0C   │ sec_hi              (u32, high half)         │
//! └────────┴──────────────────────────────────────────────┘
//! ```
//!
//! Fields are declared as atomics of the same size and alignment as the
//! C types. The hypervisor writes them underneath us, so every guest read
//! goes through an atomic load.

use core::fmt;
use core::mem::offset_of;
use core::sync::atomic::{AtomicI8, AtomicU32, AtomicU64, AtomicU8, Ordering};

use static_assertions::{assert_eq_size, const_assert_eq};

use crate::seqlock::VersionedRecord;

// =============================================================================
// Per-vCPU Time Record
// =============================================================================

bitflags::bitflags! {
    /// Flags published in [`VcpuTimeInfo::flags`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PvclockFlags: u8 {
        /// TSC is synchronized across all vCPUs
        const TSC_STABLE = 1 << 0;
        /// vCPU was paused by the hypervisor
        const GUEST_STOPPED = 1 << 1;
    }
}

/// Per-vCPU time record, owned and written by the hypervisor
#[repr(C)]
#[derive(Debug)]
pub struct VcpuTimeInfo {
    /// Update generation; odd while the hypervisor is writing
    pub version: AtomicU32,
    /// Padding
    pub pad0: AtomicU32,
    /// TSC value at which `system_time` was sampled
    pub tsc_timestamp: AtomicU64,
    /// Nanoseconds since boot at `tsc_timestamp`
    pub system_time: AtomicU64,
    /// TSC to nanosecond multiplier (scaled by 2^32)
    pub tsc_to_system_mul: AtomicU32,
    /// Pre-multiplication shift applied to TSC deltas
    pub tsc_shift: AtomicI8,
    /// [`PvclockFlags`]
    pub flags: AtomicU8,
    /// Padding
    pub pad1: [AtomicU8; 2],
}

assert_eq_size!(VcpuTimeInfo, [u8; 32]);
const_assert_eq!(offset_of!(VcpuTimeInfo, version), 0x00);
const_assert_eq!(offset_of!(VcpuTimeInfo, tsc_timestamp), 0x08);
const_assert_eq!(offset_of!(VcpuTimeInfo, system_time), 0x10);
const_assert_eq!(offset_of!(VcpuTimeInfo, tsc_to_system_mul), 0x18);
const_assert_eq!(offset_of!(VcpuTimeInfo, tsc_shift), 0x1C);
const_assert_eq!(offset_of!(VcpuTimeInfo, flags), 0x1D);

/// Fields of a [`VcpuTimeInfo`] captured inside one stable read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VcpuTimeSnapshot {
    /// TSC value at which `system_time` was sampled
    pub tsc_timestamp: u64,
    /// Nanoseconds since boot at `tsc_timestamp`
    pub system_time: u64,
    /// TSC to nanosecond multiplier
    pub tsc_to_system_mul: u32,
    /// TSC shift
    pub tsc_shift: i8,
}

impl VcpuTimeInfo {
    /// Create a zeroed record
    pub const fn zeroed() -> Self {
        Self {
            version: AtomicU32::new(0),
            pad0: AtomicU32::new(0),
            tsc_timestamp: AtomicU64::new(0),
            system_time: AtomicU64::new(0),
            tsc_to_system_mul: AtomicU32::new(0),
            tsc_shift: AtomicI8::new(0),
            flags: AtomicU8::new(0),
            pad1: [AtomicU8::new(0), AtomicU8::new(0)],
        }
    }

    /// Read the protected fields
    ///
    /// Only meaningful between [`crate::seqlock::read_begin`] and a
    /// successful [`crate::seqlock::read_validate`].
    #[inline]
    pub fn snapshot(&self) -> VcpuTimeSnapshot {
        VcpuTimeSnapshot {
            tsc_timestamp: self.tsc_timestamp.load(Ordering::Relaxed),
            system_time: self.system_time.load(Ordering::Relaxed),
            tsc_to_system_mul: self.tsc_to_system_mul.load(Ordering::Relaxed),
            tsc_shift: self.tsc_shift.load(Ordering::Relaxed),
        }
    }

    /// Current flags (advisory, not version-protected)
    #[inline]
    pub fn flags(&self) -> PvclockFlags {
        PvclockFlags::from_bits_truncate(self.flags.load(Ordering::Relaxed))
    }
}

impl VersionedRecord for VcpuTimeInfo {
    #[inline]
    fn load_version(&self, order: Ordering) -> u32 {
        self.version.load(order)
    }
}

// =============================================================================
// Wall-Clock Record
// =============================================================================

/// Global wall-clock record, owned and written by the hypervisor
///
/// Holds the calendar time that corresponds to system time zero.
#[repr(C)]
#[derive(Debug)]
pub struct WallClockInfo {
    /// Update generation; odd while the hypervisor is writing
    pub version: AtomicU32,
    /// Seconds since the epoch, low 32 bits
    pub sec: AtomicU32,
    /// Nanoseconds within the second
    pub nsec: AtomicU32,
    /// Seconds since the epoch, high 32 bits
    pub sec_hi: AtomicU32,
}

assert_eq_size!(WallClockInfo, [u8; 16]);
const_assert_eq!(offset_of!(WallClockInfo, sec), 0x04);
const_assert_eq!(offset_of!(WallClockInfo, nsec), 0x08);
const_assert_eq!(offset_of!(WallClockInfo, sec_hi), 0x0C);

impl WallClockInfo {
    /// Create a zeroed record
    pub const fn zeroed() -> Self {
        Self {
            version: AtomicU32::new(0),
            sec: AtomicU32::new(0),
            nsec: AtomicU32::new(0),
            sec_hi: AtomicU32::new(0),
        }
    }

    /// Read `(seconds, nanoseconds)`; same caveat as [`VcpuTimeInfo::snapshot`]
    #[inline]
    pub fn snapshot(&self) -> (u64, u32) {
        let lo = self.sec.load(Ordering::Relaxed) as u64;
        let hi = self.sec_hi.load(Ordering::Relaxed) as u64;
        ((hi << 32) | lo, self.nsec.load(Ordering::Relaxed))
    }
}

impl VersionedRecord for WallClockInfo {
    #[inline]
    fn load_version(&self, order: Ordering) -> u32 {
        self.version.load(order)
    }
}

// =============================================================================
// Hypercall Arguments
// =============================================================================

/// `platform_op` settime argument block (64-bit seconds variant)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetTime64 {
    /// Seconds since the epoch
    pub secs: u64,
    /// Nanoseconds within the second
    pub nsecs: u32,
    /// Must be zero
    pub mbz: u32,
    /// System time at which `secs`/`nsecs` was valid
    pub system_time: u64,
}

assert_eq_size!(SetTime64, [u8; 24]);

/// Virtual interrupt lines the guest can bind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Virq {
    /// Per-vCPU timer
    Timer = 0,
}

/// Guest-visible event channel port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct EventChannel(pub u32);

impl fmt::Display for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evtchn {}", self.0)
    }
}

/// Opaque handle to an established interrupt handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct IntrHandle(pub u64);

/// Hypervisor version as reported by the version hypercall
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct XenVersion {
    /// Major version
    pub major: u16,
    /// Minor version
    pub minor: u16,
}

impl XenVersion {
    /// Create a version
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Whether the built-in periodic timer must be stopped
    ///
    /// Releases after 3.0 enable a periodic timer per vCPU which is
    /// unreliable and would double-deliver alongside our one-shot timer.
    pub const fn has_periodic_timer(&self) -> bool {
        self.major > 3 || self.minor > 0
    }
}

impl fmt::Display for XenVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

// =============================================================================
// TESTS
// =============================================================================
