//! Simulated hypervisor and machine for unit tests.
//!
//! Each test thread plays one core, selected with [`set_current_cpu`].
//! Every cycle counter read returns the current value, then adds the
//! configured step to it.

use core::cell::Cell;
use core::sync::atomic::{fence, AtomicU32, AtomicU64, Ordering};
use std::boxed::Box;
use std::sync::Mutex;
use std::vec::Vec;

use crate::abi::{EventChannel, IntrHandle, SetTime64, VcpuTimeInfo, Virq, WallClockInfo, XenVersion};
use crate::error::{ClockError, ClockResult};
use crate::percpu::CpuId;
use crate::platform::{CpuPinning, CycleCounter, EventChannels, Hypervisor, RtcDevice};
use crate::wallclock::TimeVal;

/// Cores the simulator backs
pub const SIM_CPUS: usize = 8;

/// With [`IDENTITY_SHIFT`], one cycle is one nanosecond
pub const IDENTITY_MUL: u32 = 0x8000_0000;
/// See [`IDENTITY_MUL`]
pub const IDENTITY_SHIFT: i8 = 1;

std::thread_local! {
    static CURRENT_CPU: Cell<u32> = const { Cell::new(0) };
}

/// Make the calling thread run as `cpu`
pub fn set_current_cpu(cpu: u32) {
    assert!((cpu as usize) < SIM_CPUS);
    CURRENT_CPU.with(|c| c.set(cpu));
}

fn current_cpu() -> u32 {
    CURRENT_CPU.with(Cell::get)
}

pub struct SimPlatform {
    vcpus: [VcpuTimeInfo; SIM_CPUS],
    wallclock: WallClockInfo,
    tsc: [AtomicU64; SIM_CPUS],
    tsc_step: [AtomicU64; SIM_CPUS],
    tsc_rewind: [AtomicU64; SIM_CPUS],
    read_hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    pin_depth: AtomicU32,
    cpu_count: AtomicU32,
    pin_override: Mutex<Option<u32>>,

    version: Mutex<XenVersion>,
    privileged: Mutex<bool>,

    deadlines: Mutex<Vec<u64>>,
    timer_failures: AtomicU32,
    stop_periodic: AtomicU32,

    bind_fails: Mutex<bool>,
    establish_fails: Mutex<bool>,
    next_channel: AtomicU32,
    bound: Mutex<[Option<EventChannel>; SIM_CPUS]>,
    masked: Mutex<Vec<EventChannel>>,
    unmasked: Mutex<Vec<EventChannel>>,
    disestablished: AtomicU32,

    settime_calls: Mutex<Vec<SetTime64>>,
    settime_result: Mutex<ClockResult<()>>,
    rtc_calls: AtomicU32,
    rtc_result: Mutex<ClockResult<()>>,

    yield_advance_ns: AtomicU64,
    yields: AtomicU32,
    blocks: AtomicU32,
}

impl SimPlatform {
    pub fn new() -> Self {
        Self {
            vcpus: [const { VcpuTimeInfo::zeroed() }; SIM_CPUS],
            wallclock: WallClockInfo::zeroed(),
            tsc: [const { AtomicU64::new(0) }; SIM_CPUS],
            tsc_step: [const { AtomicU64::new(0) }; SIM_CPUS],
            tsc_rewind: [const { AtomicU64::new(0) }; SIM_CPUS],
            read_hook: Mutex::new(None),
            pin_depth: AtomicU32::new(0),
            cpu_count: AtomicU32::new(SIM_CPUS as u32),
            pin_override: Mutex::new(None),
            version: Mutex::new(XenVersion::new(4, 17)),
            privileged: Mutex::new(false),
            deadlines: Mutex::new(Vec::new()),
            timer_failures: AtomicU32::new(0),
            stop_periodic: AtomicU32::new(0),
            bind_fails: Mutex::new(false),
            establish_fails: Mutex::new(false),
            next_channel: AtomicU32::new(1),
            bound: Mutex::new([None; SIM_CPUS]),
            masked: Mutex::new(Vec::new()),
            unmasked: Mutex::new(Vec::new()),
            disestablished: AtomicU32::new(0),
            settime_calls: Mutex::new(Vec::new()),
            settime_result: Mutex::new(Ok(())),
            rtc_calls: AtomicU32::new(0),
            rtc_result: Mutex::new(Ok(())),
            yield_advance_ns: AtomicU64::new(0),
            yields: AtomicU32::new(0),
            blocks: AtomicU32::new(0),
        }
    }

    // ----- hypervisor side of the shared records -----

    /// Publish a new vCPU record the way the hypervisor does
    pub fn write_vcpu_time(&self, cpu: u32, tsc_timestamp: u64, system_time: u64, mul: u32, shift: i8) {
        let vt = &self.vcpus[cpu as usize];
        let v = vt.version.load(Ordering::Relaxed);
        vt.version.store(v.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        vt.tsc_timestamp.store(tsc_timestamp, Ordering::Relaxed);
        vt.system_time.store(system_time, Ordering::Relaxed);
        vt.tsc_to_system_mul.store(mul, Ordering::Relaxed);
        vt.tsc_shift.store(shift, Ordering::Relaxed);
        vt.version.store(v.wrapping_add(2), Ordering::Release);
    }

    fn advance_system_time(&self, cpu: u32, ns: u64) {
        let vt = &self.vcpus[cpu as usize];
        let v = vt.version.load(Ordering::Relaxed);
        vt.version.store(v.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        vt.system_time.fetch_add(ns, Ordering::Relaxed);
        vt.version.store(v.wrapping_add(2), Ordering::Release);
    }

    /// Publish a new wall-clock record
    pub fn write_wallclock(&self, sec: u64, nsec: u32) {
        let wc = &self.wallclock;
        let v = wc.version.load(Ordering::Relaxed);
        wc.version.store(v.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        wc.sec.store(sec as u32, Ordering::Relaxed);
        wc.sec_hi.store((sec >> 32) as u32, Ordering::Relaxed);
        wc.nsec.store(nsec, Ordering::Relaxed);
        wc.version.store(v.wrapping_add(2), Ordering::Release);
    }

    // ----- cycle counter -----

    pub fn set_tsc(&self, cpu: u32, value: u64) {
        self.tsc[cpu as usize].store(value, Ordering::Relaxed);
    }

    pub fn set_tsc_step(&self, cpu: u32, step: u64) {
        self.tsc_step[cpu as usize].store(step, Ordering::Relaxed);
    }

    /// After the next read, move the counter back by `by`
    pub fn set_tsc_rewind(&self, cpu: u32, by: u64) {
        self.tsc_rewind[cpu as usize].store(by, Ordering::Relaxed);
    }

    /// Run `hook` once, right after the next cycle counter read, the way
    /// an interrupt would land on the reading core
    pub fn set_read_hook(&self, hook: impl FnOnce() + Send + 'static) {
        *self.read_hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn tsc(&self, cpu: u32) -> u64 {
        self.tsc[cpu as usize].load(Ordering::Relaxed)
    }

    // ----- knobs -----

    pub fn set_cpu_count(&self, cpus: u32) {
        self.cpu_count.store(cpus, Ordering::Relaxed);
    }

    /// Report `cpu` from every pin instead of the thread's own core
    pub fn set_pin_override(&self, cpu: Option<u32>) {
        *self.pin_override.lock().unwrap() = cpu;
    }

    fn pinned_cpu(&self) -> u32 {
        self.pin_override.lock().unwrap().unwrap_or_else(current_cpu)
    }

    pub fn set_version(&self, version: XenVersion) {
        *self.version.lock().unwrap() = version;
    }

    pub fn set_privileged(&self, privileged: bool) {
        *self.privileged.lock().unwrap() = privileged;
    }

    /// Reject the next `n` timer deadlines as already passed
    pub fn fail_next_timer_ops(&self, n: u32) {
        self.timer_failures.store(n, Ordering::Relaxed);
    }

    pub fn set_bind_fails(&self, fails: bool) {
        *self.bind_fails.lock().unwrap() = fails;
    }

    pub fn set_establish_fails(&self, fails: bool) {
        *self.establish_fails.lock().unwrap() = fails;
    }

    pub fn set_settime_result(&self, result: ClockResult<()>) {
        *self.settime_result.lock().unwrap() = result;
    }

    pub fn set_rtc_result(&self, result: ClockResult<()>) {
        *self.rtc_result.lock().unwrap() = result;
    }

    /// Each yield lets the current core's system time run this far
    pub fn set_yield_advance_ns(&self, ns: u64) {
        self.yield_advance_ns.store(ns, Ordering::Relaxed);
    }

    // ----- observations -----

    /// Every deadline passed to the timer hypercall, accepted or not
    pub fn deadlines(&self) -> Vec<u64> {
        self.deadlines.lock().unwrap().clone()
    }

    pub fn last_deadline(&self) -> Option<u64> {
        self.deadlines.lock().unwrap().last().copied()
    }

    pub fn stop_periodic_calls(&self) -> u32 {
        self.stop_periodic.load(Ordering::Relaxed)
    }

    pub fn bound_channels(&self) -> u32 {
        self.next_channel.load(Ordering::Relaxed) - 1
    }

    pub fn masked(&self) -> Vec<EventChannel> {
        self.masked.lock().unwrap().clone()
    }

    pub fn unmasked(&self) -> Vec<EventChannel> {
        self.unmasked.lock().unwrap().clone()
    }

    pub fn disestablished(&self) -> u32 {
        self.disestablished.load(Ordering::Relaxed)
    }

    pub fn settime_calls(&self) -> Vec<SetTime64> {
        self.settime_calls.lock().unwrap().clone()
    }

    pub fn rtc_calls(&self) -> u32 {
        self.rtc_calls.load(Ordering::Relaxed)
    }

    pub fn yields(&self) -> u32 {
        self.yields.load(Ordering::Relaxed)
    }

    pub fn blocks(&self) -> u32 {
        self.blocks.load(Ordering::Relaxed)
    }
}

impl CycleCounter for SimPlatform {
    fn read_cycles(&self) -> u64 {
        let cpu = current_cpu() as usize;
        let step = self.tsc_step[cpu].load(Ordering::Relaxed);
        let value = self.tsc[cpu].fetch_add(step, Ordering::Relaxed);
        let rewind = self.tsc_rewind[cpu].swap(0, Ordering::Relaxed);
        if rewind != 0 {
            self.tsc[cpu].store(value.saturating_sub(rewind), Ordering::Relaxed);
        }
        let hook = self.read_hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        value
    }
}

impl CpuPinning for SimPlatform {
    fn cpu_count(&self) -> u32 {
        self.cpu_count.load(Ordering::Relaxed)
    }

    fn pin_current(&self) -> CpuId {
        self.pin_depth.fetch_add(1, Ordering::Relaxed);
        CpuId(self.pinned_cpu())
    }

    fn unpin(&self, cpu: CpuId) {
        assert_eq!(cpu, CpuId(self.pinned_cpu()), "unpinned from another core");
        self.pin_depth.fetch_sub(1, Ordering::Relaxed);
    }
}

impl Hypervisor for SimPlatform {
    fn vcpu_time_info(&self, cpu: CpuId) -> &VcpuTimeInfo {
        &self.vcpus[cpu.index()]
    }

    fn wall_clock_info(&self) -> &WallClockInfo {
        &self.wallclock
    }

    fn version(&self) -> XenVersion {
        *self.version.lock().unwrap()
    }

    fn is_privileged(&self) -> bool {
        *self.privileged.lock().unwrap()
    }

    fn set_timer_op(&self, deadline_ns: u64) -> ClockResult<()> {
        self.deadlines.lock().unwrap().push(deadline_ns);
        let failing = self
            .timer_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            Err(ClockError::DeadlinePassed)
        } else {
            Ok(())
        }
    }

    fn stop_periodic_timer(&self, _cpu: CpuId) -> ClockResult<()> {
        self.stop_periodic.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn platform_settime(&self, op: &SetTime64) -> ClockResult<()> {
        self.settime_calls.lock().unwrap().push(*op);
        *self.settime_result.lock().unwrap()
    }

    fn sched_yield(&self) {
        self.yields.fetch_add(1, Ordering::Relaxed);
        let ns = self.yield_advance_ns.load(Ordering::Relaxed);
        self.advance_system_time(current_cpu(), ns);
    }

    fn sched_block(&self) {
        self.blocks.fetch_add(1, Ordering::Relaxed);
    }
}

impl EventChannels for SimPlatform {
    fn bind_virq(&self, _virq: Virq, cpu: CpuId) -> ClockResult<EventChannel> {
        if *self.bind_fails.lock().unwrap() {
            return Err(ClockError::EventChannelUnavailable);
        }
        let channel = EventChannel(self.next_channel.fetch_add(1, Ordering::Relaxed));
        self.bound.lock().unwrap()[cpu.index()] = Some(channel);
        Ok(channel)
    }

    fn unbind_virq(&self, _virq: Virq, cpu: CpuId) -> Option<EventChannel> {
        self.bound.lock().unwrap()[cpu.index()].take()
    }

    fn establish(&self, channel: EventChannel, _cpu: CpuId) -> ClockResult<IntrHandle> {
        if *self.establish_fails.lock().unwrap() {
            return Err(ClockError::InterruptUnavailable);
        }
        Ok(IntrHandle(channel.0 as u64))
    }

    fn disestablish(&self, _handle: IntrHandle) {
        self.disestablished.fetch_add(1, Ordering::Relaxed);
    }

    fn mask(&self, channel: EventChannel) {
        self.masked.lock().unwrap().push(channel);
    }

    fn unmask(&self, channel: EventChannel) {
        self.unmasked.lock().unwrap().push(channel);
    }
}

impl RtcDevice for SimPlatform {
    fn rtc_set(&self, _tv: &TimeVal) -> ClockResult<()> {
        self.rtc_calls.fetch_add(1, Ordering::Relaxed);
        *self.rtc_result.lock().unwrap()
    }
}
