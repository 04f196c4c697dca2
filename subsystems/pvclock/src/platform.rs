//! # Platform Interfaces
//!
//! Everything the clock needs from the machine, the hypervisor and the
//! rest of the kernel. Hypercall transport, event-channel plumbing and
//! the interrupt framework live behind these traits.

use crate::abi::{EventChannel, IntrHandle, SetTime64, VcpuTimeInfo, Virq, WallClockInfo, XenVersion};
use crate::error::ClockResult;
use crate::percpu::CpuId;
use crate::wallclock::TimeVal;

/// Per-core cycle counter
pub trait CycleCounter {
    /// Read the current core's counter
    ///
    /// Must not be reordered with the surrounding shared-memory reads.
    fn read_cycles(&self) -> u64;
}

/// Thread-to-core binding
pub trait CpuPinning {
    /// Number of cores the guest may ever run on
    fn cpu_count(&self) -> u32;

    /// Disable migration of the current thread and return its core
    fn pin_current(&self) -> CpuId;

    /// Undo one [`CpuPinning::pin_current`]
    fn unpin(&self, cpu: CpuId);
}

/// Hypervisor shared memory and hypercalls
pub trait Hypervisor {
    /// Time record of a vCPU
    fn vcpu_time_info(&self, cpu: CpuId) -> &VcpuTimeInfo;

    /// Global wall-clock record
    fn wall_clock_info(&self) -> &WallClockInfo;

    /// Hypervisor version
    fn version(&self) -> XenVersion;

    /// Whether this guest is the privileged control domain
    fn is_privileged(&self) -> bool;

    /// Arm the calling vCPU's one-shot timer at an absolute system time
    ///
    /// Fails with [`crate::ClockError::DeadlinePassed`] if the deadline
    /// is already behind the hypervisor's clock.
    fn set_timer_op(&self, deadline_ns: u64) -> ClockResult<()>;

    /// Stop the built-in periodic timer of a vCPU
    fn stop_periodic_timer(&self, cpu: CpuId) -> ClockResult<()>;

    /// Set the hypervisor's wall clock (privileged only)
    fn platform_settime(&self, op: &SetTime64) -> ClockResult<()>;

    /// Give up the physical CPU
    fn sched_yield(&self);

    /// Halt until the next event
    fn sched_block(&self);
}

/// Event channels and interrupt handler establishment
pub trait EventChannels {
    /// Bind a virtual IRQ of `cpu` to a new event channel
    fn bind_virq(&self, virq: Virq, cpu: CpuId) -> ClockResult<EventChannel>;

    /// Release the binding; returns the channel that was bound
    fn unbind_virq(&self, virq: Virq, cpu: CpuId) -> Option<EventChannel>;

    /// Route `channel` to the clock interrupt handler on `cpu`
    fn establish(&self, channel: EventChannel, cpu: CpuId) -> ClockResult<IntrHandle>;

    /// Remove an established handler
    fn disestablish(&self, handle: IntrHandle);

    /// Mask a channel
    fn mask(&self, channel: EventChannel);

    /// Unmask a channel
    fn unmask(&self, channel: EventChannel);
}

/// Local battery-backed real-time clock
pub trait RtcDevice {
    /// Program the RTC
    fn rtc_set(&self, tv: &TimeVal) -> ClockResult<()>;
}

/// Everything [`crate::PvClock`] runs on
pub trait Platform: CycleCounter + CpuPinning + Hypervisor + EventChannels + RtcDevice + Sync {}

impl<T> Platform for T where T: CycleCounter + CpuPinning + Hypervisor + EventChannels + RtcDevice + Sync {}
