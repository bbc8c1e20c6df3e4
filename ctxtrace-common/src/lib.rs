//! Types shared between the ctxtrace kernel probe (`ctxtrace-ebpf`) and the
//! host recorder (`ctxtrace`).
//!
//! This crate is `no_std` by default so it can be linked into the eBPF
//! program; the host recorder enables the `std` feature for the
//! conveniences it needs (none of which change the wire layout below).
//!
//! The only type that crosses the kernel/user boundary is [`RawSwitchEvent`].
//! Its layout must match byte-for-byte between both sides: fixed-width
//! fields, no implicit padding, `repr(C)`.

#![cfg_attr(not(any(feature = "std", test)), no_std)]

use bytemuck::{Pod, Zeroable};

/// Length of a kernel `comm` field (`TASK_COMM_LEN` in the kernel).
pub const COMM_LEN: usize = 16;

/// Kernel thread id.
pub type Tid = i32;

/// Kernel process (thread-group) id.
pub type Pid = i32;

/// Sentinel used wherever a pid could not be resolved.
pub const UNKNOWN_PID: Pid = -1;

/// One context-switch event as captured by the kernel probe and carried
/// across the kernel→user ring, unmodified, to the host consumer.
///
/// Exactly 64 bytes with no implicit padding: every field is naturally
/// aligned at its own offset (4, 4, 16, 4, 4, 16, 8, 8).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct RawSwitchEvent {
    /// tid of the thread being switched off.
    pub old_tid: Tid,
    /// scheduling priority of the thread being switched off.
    pub old_prio: i32,
    /// comm of the thread being switched off, NUL-padded/truncated.
    pub old_comm: [u8; COMM_LEN],
    /// tid of the thread being switched on.
    pub new_tid: Tid,
    /// scheduling priority of the thread being switched on.
    pub new_prio: i32,
    /// comm of the thread being switched on, NUL-padded/truncated.
    pub new_comm: [u8; COMM_LEN],
    /// kernel monotonic timestamp, in nanoseconds.
    pub ns: u64,
    /// monotone producer sequence number, for downstream gap detection.
    pub seq: u64,
}

/// Byte size of [`RawSwitchEvent`] on the wire. The ring consumer rejects
/// any payload whose size does not equal this.
pub const RAW_SWITCH_EVENT_SIZE: usize = core::mem::size_of::<RawSwitchEvent>();

// SAFETY: RawSwitchEvent is `repr(C)`, has no padding, and every bit
// pattern is valid, satisfying aya's map-value contract. This impl lives
// here rather than in ctxtrace-ebpf because neither that crate nor
// aya_ebpf owns this type; only the crate defining RawSwitchEvent can
// implement a foreign trait for it.
#[cfg(feature = "ebpf")]
unsafe impl aya_ebpf::Pod for RawSwitchEvent {}

/// Strips trailing NUL padding from a fixed-width kernel `comm` buffer and
/// returns the valid prefix as a `&str`, lossily if the buffer is not (or no
/// longer) valid UTF-8 up to the first NUL.
///
/// Kernel comm buffers are always ASCII in practice, but the capture path
/// never assumes that.
pub fn comm_str(comm: &[u8; COMM_LEN]) -> &str {
    let len = comm.iter().position(|&b| b == 0).unwrap_or(COMM_LEN);
    core::str::from_utf8(&comm[..len]).unwrap_or("")
}

/// Copies `src` into a fixed `COMM_LEN`-byte buffer, truncating if `src` is
/// longer and NUL-padding if shorter.
pub fn comm_from_bytes(src: &[u8]) -> [u8; COMM_LEN] {
    let mut out = [0u8; COMM_LEN];
    let n = src.len().min(COMM_LEN);
    out[..n].copy_from_slice(&src[..n]);
    out
}
