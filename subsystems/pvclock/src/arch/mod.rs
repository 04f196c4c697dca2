//! # Architecture Support
//!
//! The native [`CycleCounter`](crate::CycleCounter) of the build target.
//! Platforms embed it and forward `read_cycles` to it.

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        mod x86_64;
        pub use self::x86_64::Tsc as NativeCycleCounter;
    } else if #[cfg(target_arch = "aarch64")] {
        mod aarch64;
        pub use self::aarch64::VirtualCounter as NativeCycleCounter;
    }
}
