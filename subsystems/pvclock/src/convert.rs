//! # TSC to Nanosecond Conversion
//!
//! The hypervisor publishes a scale factor as a shift and a 32.32 fixed
//! point multiplier:
//!
//! ```text
//!   ns = ((tsc_delta << shift) * mul) >> 32        (shift >= 0)
//!   ns = ((tsc_delta >> -shift) * mul) >> 32       (shift <  0)
//! ```
//!
//! The 64x32 multiply is split into two 32x32 products so that no 128-bit
//! intermediate is needed and no bits of the product are lost.

/// Convert a TSC delta to nanoseconds
#[inline]
pub const fn scale_delta(delta: u64, mul: u32, shift: i8) -> u64 {
    let shifted = if shift >= 0 {
        match delta.checked_shl(shift as u32) {
            Some(v) => v,
            None => 0,
        }
    } else {
        match delta.checked_shr(shift.unsigned_abs() as u32) {
            Some(v) => v,
            None => 0,
        }
    };

    let mul = mul as u64;
    let hi = shifted >> 32;
    let lo = shifted & 0xFFFF_FFFF;

    // hi * mul <= (2^32 - 1)^2 and the low term is < 2^32: no overflow.
    hi * mul + ((lo * mul) >> 32)
}

// =============================================================================
// TESTS
// =============================================================================
