//! # Versioned Snapshot Reads
//!
//! Lock-free read side of the hypervisor's update protocol. The writer
//! bumps the version to an odd value, rewrites the record, then bumps it
//! to the next even value. A reader that sees the same even version
//! before and after reading the fields has a consistent snapshot.
//!
//! ```text
//!   reader                         hypervisor
//!   ──────                         ──────────
//!   v0 = version (Acquire)  ◀──┐   version += 1      (odd)
//!   spin while v0 odd          │   write fields
//!   read fields (Relaxed)      │   version += 1      (even, Release)
//!   fence(Acquire)             │
//!   v1 = version               │
//!   retry unless v1 == v0 ─────┘
//! ```
//!
//! No guest-side lock exists here: the writer cannot honor one.

use core::sync::atomic::{fence, Ordering};

// =============================================================================
// Versioned Record
// =============================================================================

/// A shared record protected by an even/odd version counter
pub trait VersionedRecord {
    /// Load the version field with the given ordering
    fn load_version(&self, order: Ordering) -> u32;
}

/// Version observed at the start of a read section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a read section must be validated"]
pub struct ReadTicket {
    version: u32,
}

impl ReadTicket {
    /// The stable version this section started from
    #[inline]
    pub const fn version(&self) -> u32 {
        self.version
    }
}

// =============================================================================
// Read Protocol
// =============================================================================

/// Start a read section
///
/// Spins until the record is not being written. The acquire load keeps
/// the field reads that follow from being hoisted above it.
#[inline]
pub fn read_begin<R: VersionedRecord + ?Sized>(record: &R) -> ReadTicket {
    loop {
        let version = record.load_version(Ordering::Acquire);
        if version & 1 == 0 {
            return ReadTicket { version };
        }
        core::hint::spin_loop();
    }
}

/// Finish a read section
///
/// Returns `true` if the fields read since [`read_begin`] form a
/// consistent snapshot. The fence keeps those reads from sinking below
/// the version re-read.
#[inline]
pub fn read_validate<R: VersionedRecord + ?Sized>(record: &R, ticket: ReadTicket) -> bool {
    fence(Ordering::Acquire);
    record.load_version(Ordering::Relaxed) == ticket.version
}

/// Run `read` inside read sections until one validates
#[inline]
pub fn read_consistent<R, T, F>(record: &R, mut read: F) -> T
where
    R: VersionedRecord + ?Sized,
    F: FnMut(&R) -> T,
{
    loop {
        let ticket = read_begin(record);
        let value = read(record);
        if read_validate(record, ticket) {
            return value;
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
