//! In-kernel probe: attaches to `tracepoint/sched/sched_switch` and streams
//! one [`RawSwitchEvent`] per context switch into a ring buffer consumed by
//! the host recorder.
//!
//! No allocation, no blocking, no state beyond a per-CPU scratch slot and a
//! global sequence counter. A failed ring submit (ring full) is silently
//! dropped; the sequence counter still advances, so the consumer can
//! compute the drop count downstream.

#![no_std]
#![no_main]

use aya_ebpf::{
    helpers::bpf_ktime_get_ns,
    macros::{map, tracepoint},
    maps::{PerCpuArray, RingBuf},
    programs::TracePointContext,
};
use core::sync::atomic::{AtomicU64, Ordering};
use ctxtrace_common::RawSwitchEvent;

/// Per-CPU single-slot scratch buffer for the event under construction.
///
/// The probe runs with a restricted stack budget, so the 64-byte event is
/// staged here rather than as a local on the BPF stack.
#[map]
static SCRATCH: PerCpuArray<RawSwitchEvent> = PerCpuArray::with_max_entries(1, 0);

/// Kernel→user ring. Sized generously; a full ring causes silent drops,
/// not a rejected probe invocation.
#[map]
static EVENTS: RingBuf = RingBuf::with_byte_size(4 * 1024 * 1024, 0);

/// Global monotone sequence counter, incremented once per observed switch
/// regardless of whether the ring submit succeeds. Downstream consumers use
/// gaps in this sequence to detect drops.
static SEQ: AtomicU64 = AtomicU64::new(0);

/// Layout of the `sched_switch` tracepoint as exposed under
/// `/sys/kernel/debug/tracing/events/sched/sched_switch/format`. Pinned
/// exactly, including the common tracepoint header, since we read it by
/// raw offset rather than through CO-RE relocations.
#[repr(C)]
struct SchedSwitchArgs {
    _common_type: u16,
    _common_flags: u8,
    _common_preempt_count: u8,
    _common_pid: i32,
    prev_comm: [u8; 16],
    prev_pid: i32,
    prev_prio: i32,
    _prev_state: i64,
    next_comm: [u8; 16],
    next_pid: i32,
    next_prio: i32,
}

#[tracepoint]
pub fn sched_switch(ctx: TracePointContext) -> u32 {
    match try_sched_switch(&ctx) {
        Ok(()) => 0,
        Err(()) => 0,
    }
}

fn try_sched_switch(ctx: &TracePointContext) -> Result<(), ()> {
    // SAFETY: the tracepoint buffer is at least sizeof(SchedSwitchArgs)
    // bytes for `sched_switch`; the verifier has already bounds-checked ctx.
    let args = unsafe { &*(ctx.as_ptr() as *const SchedSwitchArgs) };

    let Some(slot) = SCRATCH.get_ptr_mut(0) else {
        return Err(());
    };
    // SAFETY: slot is a valid pointer into the per-CPU scratch map, and we
    // are the only accessor for the duration of this invocation.
    let event = unsafe { &mut *slot };

    event.old_tid = args.prev_pid;
    event.old_prio = args.prev_prio;
    event.old_comm = args.prev_comm;
    event.new_tid = args.next_pid;
    event.new_prio = args.next_prio;
    event.new_comm = args.next_comm;
    event.ns = unsafe { bpf_ktime_get_ns() };
    event.seq = SEQ.fetch_add(1, Ordering::Relaxed);

    // A full ring silently drops this event; `seq` has already advanced.
    let _ = EVENTS.output(event, 0);

    Ok(())
}

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
