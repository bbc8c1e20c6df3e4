//! The 64-byte log entry wire format.
//!
//! Mirrors the byte-cursor wire format used elsewhere in this codebase
//! (see the perf trace encoder/decoder): fields are written and read at
//! fixed offsets with explicit `to_le_bytes`/`from_le_bytes` conversions
//! rather than cast through a `#[repr(C)]` union. A union wide enough to
//! hold an 8-byte-aligned field would force 8-byte alignment onto the
//! whole entry and push the payload past the 4-byte header the format
//! calls for; a flat byte array sidesteps the question entirely and
//! needs no `unsafe`.

use anyhow::{bail, Result};
use ctxtrace_common::{comm_from_bytes, comm_str, Pid, RawSwitchEvent, Tid, COMM_LEN};

/// Total size of a log entry, per the external shared-memory layout.
pub const ENTRY_SIZE: usize = 64;

/// Width of a name field inside a `Process` or `Thread` payload.
pub const NAME_LEN: usize = 32;

const KIND_OFFSET: usize = 0;
const PAYLOAD_OFFSET: usize = 4;

mod process_offset {
    pub const PID: usize = 4;
    pub const NAME: usize = 8;
}

mod thread_offset {
    pub const TID: usize = 4;
    pub const PID: usize = 8;
    pub const NAME: usize = 12;
}

mod sched_switch_offset {
    pub const OLD_TID: usize = 4;
    pub const OLD_PRIO: usize = 8;
    pub const OLD_COMM: usize = 12;
    pub const NEW_TID: usize = 28;
    pub const NEW_PRIO: usize = 32;
    pub const NEW_COMM: usize = 36;
    pub const NS: usize = 52;
}

/// Discriminant of a [`LogEntry`]'s payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Unused = 0,
    SchedSwitch = 1,
    Process = 2,
    Thread = 3,
}

impl EntryKind {
    fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(EntryKind::Unused),
            1 => Ok(EntryKind::SchedSwitch),
            2 => Ok(EntryKind::Process),
            3 => Ok(EntryKind::Thread),
            other => bail!("unrecognized log entry kind byte {other}"),
        }
    }
}

/// A fixed 64-byte log entry: a one-byte kind tag, three reserved
/// padding bytes, and a kind-specific payload occupying the remaining
/// 60 bytes. Any bytes beyond a payload's used fields are zero.
#[derive(Clone, Copy)]
pub struct LogEntry([u8; ENTRY_SIZE]);

impl LogEntry {
    /// Verifies the in-language type and the wire constant agree on
    /// size, per the startup invariant that the entry is exactly 64
    /// bytes. Always trivially true for this representation, but
    /// checked explicitly so the assumption is never silently violated
    /// by a future change to this module.
    pub fn verify_layout() -> Result<()> {
        if core::mem::size_of::<LogEntry>() != ENTRY_SIZE {
            bail!(
                "log entry type is {} bytes, expected {ENTRY_SIZE}",
                core::mem::size_of::<LogEntry>()
            );
        }
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8; ENTRY_SIZE] {
        &self.0
    }

    pub fn kind(&self) -> Result<EntryKind> {
        EntryKind::from_u8(self.0[KIND_OFFSET])
    }

    fn zeroed(kind: EntryKind) -> Self {
        let mut bytes = [0u8; ENTRY_SIZE];
        bytes[KIND_OFFSET] = kind as u8;
        Self(bytes)
    }

    fn write_name(&mut self, offset: usize, name: &str) {
        let src = name.as_bytes();
        let n = src.len().min(NAME_LEN);
        self.0[offset..offset + n].copy_from_slice(&src[..n]);
    }

    fn read_name(&self, offset: usize) -> &str {
        let field = &self.0[offset..offset + NAME_LEN];
        let end = field.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        core::str::from_utf8(&field[..end]).unwrap_or("")
    }

    /// Builds a `Process` entry: the process id and its name as read
    /// from `/proc/<pid>/stat` (or the synthetic "died" placeholder).
    pub fn process(pid: Pid, name: &str) -> Self {
        let mut entry = Self::zeroed(EntryKind::Process);
        entry.0[process_offset::PID..process_offset::PID + 4]
            .copy_from_slice(&pid.to_le_bytes());
        entry.write_name(process_offset::NAME, name);
        entry
    }

    pub fn as_process(&self) -> Result<(Pid, &str)> {
        if self.kind()? != EntryKind::Process {
            bail!("entry is not a Process entry");
        }
        let pid = Pid::from_le_bytes(
            self.0[process_offset::PID..process_offset::PID + 4]
                .try_into()
                .unwrap(),
        );
        Ok((pid, self.read_name(process_offset::NAME)))
    }

    /// Builds a `Thread` entry. `name` is the 16-byte `comm` captured by
    /// the probe at the moment of the switch, not a fresh `/proc` read.
    pub fn thread(tid: Tid, pid: Pid, comm: &[u8; COMM_LEN]) -> Self {
        let mut entry = Self::zeroed(EntryKind::Thread);
        entry.0[thread_offset::TID..thread_offset::TID + 4]
            .copy_from_slice(&tid.to_le_bytes());
        entry.0[thread_offset::PID..thread_offset::PID + 4]
            .copy_from_slice(&pid.to_le_bytes());
        entry.write_name(thread_offset::NAME, comm_str(comm));
        entry
    }

    pub fn as_thread(&self) -> Result<(Tid, Pid, &str)> {
        if self.kind()? != EntryKind::Thread {
            bail!("entry is not a Thread entry");
        }
        let tid = Tid::from_le_bytes(
            self.0[thread_offset::TID..thread_offset::TID + 4]
                .try_into()
                .unwrap(),
        );
        let pid = Pid::from_le_bytes(
            self.0[thread_offset::PID..thread_offset::PID + 4]
                .try_into()
                .unwrap(),
        );
        Ok((tid, pid, self.read_name(thread_offset::NAME)))
    }

    /// Builds a `SchedSwitch` entry directly from the raw probe event.
    pub fn sched_switch(event: &RawSwitchEvent) -> Self {
        use sched_switch_offset as off;
        let mut entry = Self::zeroed(EntryKind::SchedSwitch);
        entry.0[off::OLD_TID..off::OLD_TID + 4].copy_from_slice(&event.old_tid.to_le_bytes());
        entry.0[off::OLD_PRIO..off::OLD_PRIO + 4].copy_from_slice(&event.old_prio.to_le_bytes());
        entry.0[off::OLD_COMM..off::OLD_COMM + COMM_LEN].copy_from_slice(&event.old_comm);
        entry.0[off::NEW_TID..off::NEW_TID + 4].copy_from_slice(&event.new_tid.to_le_bytes());
        entry.0[off::NEW_PRIO..off::NEW_PRIO + 4].copy_from_slice(&event.new_prio.to_le_bytes());
        entry.0[off::NEW_COMM..off::NEW_COMM + COMM_LEN].copy_from_slice(&event.new_comm);
        entry.0[off::NS..off::NS + 8].copy_from_slice(&event.ns.to_le_bytes());
        entry
    }

    pub fn as_sched_switch(&self) -> Result<RawSwitchEvent> {
        use sched_switch_offset as off;
        if self.kind()? != EntryKind::SchedSwitch {
            bail!("entry is not a SchedSwitch entry");
        }
        let old_comm = comm_from_bytes(&self.0[off::OLD_COMM..off::OLD_COMM + COMM_LEN]);
        let new_comm = comm_from_bytes(&self.0[off::NEW_COMM..off::NEW_COMM + COMM_LEN]);
        Ok(RawSwitchEvent {
            old_tid: Tid::from_le_bytes(self.0[off::OLD_TID..off::OLD_TID + 4].try_into().unwrap()),
            old_prio: i32::from_le_bytes(
                self.0[off::OLD_PRIO..off::OLD_PRIO + 4].try_into().unwrap(),
            ),
            old_comm,
            new_tid: Tid::from_le_bytes(self.0[off::NEW_TID..off::NEW_TID + 4].try_into().unwrap()),
            new_prio: i32::from_le_bytes(
                self.0[off::NEW_PRIO..off::NEW_PRIO + 4].try_into().unwrap(),
            ),
            new_comm,
            ns: u64::from_le_bytes(self.0[off::NS..off::NS + 8].try_into().unwrap()),
            seq: 0,
        })
    }

    /// Reconstructs an entry from 64 raw bytes, as an external reader
    /// mapping the region would. Used by tests and by
    /// [`crate::shared_log::SharedLog::read_entry`].
    pub fn from_bytes(bytes: [u8; ENTRY_SIZE]) -> Self {
        Self(bytes)
    }
}

// PAYLOAD_OFFSET documents where a payload begins; referenced only in
// doc comments and tests above, kept as a named constant rather than a
// magic `4` scattered through the offset tables.
#[allow(dead_code)]
const _: usize = PAYLOAD_OFFSET;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_is_exactly_64_bytes() {
        LogEntry::verify_layout().unwrap();
        assert_eq!(core::mem::size_of::<LogEntry>(), 64);
    }

    #[test]
    fn process_entry_roundtrips() {
        let entry = LogEntry::process(42, "nginx");
        assert_eq!(entry.kind().unwrap(), EntryKind::Process);
        let (pid, name) = entry.as_process().unwrap();
        assert_eq!(pid, 42);
        assert_eq!(name, "nginx");
    }

    #[test]
    fn process_entry_truncates_overlong_names() {
        let long = "a".repeat(NAME_LEN + 10);
        let entry = LogEntry::process(1, &long);
        let (_, name) = entry.as_process().unwrap();
        assert_eq!(name.len(), NAME_LEN);
    }

    #[test]
    fn thread_entry_roundtrips() {
        let comm = comm_from_bytes(b"worker");
        let entry = LogEntry::thread(100, 42, &comm);
        assert_eq!(entry.kind().unwrap(), EntryKind::Thread);
        let (tid, pid, name) = entry.as_thread().unwrap();
        assert_eq!(tid, 100);
        assert_eq!(pid, 42);
        assert_eq!(name, "worker");
    }

    #[test]
    fn thread_entry_records_unknown_pid() {
        let comm = comm_from_bytes(b"ghost");
        let entry = LogEntry::thread(7, ctxtrace_common::UNKNOWN_PID, &comm);
        let (_, pid, _) = entry.as_thread().unwrap();
        assert_eq!(pid, ctxtrace_common::UNKNOWN_PID);
    }

    #[test]
    fn sched_switch_entry_roundtrips() {
        let event = RawSwitchEvent {
            old_tid: 1,
            old_prio: 20,
            old_comm: comm_from_bytes(b"a"),
            new_tid: 2,
            new_prio: 19,
            new_comm: comm_from_bytes(b"b"),
            ns: 123_456_789,
            seq: 7,
        };
        let entry = LogEntry::sched_switch(&event);
        assert_eq!(entry.kind().unwrap(), EntryKind::SchedSwitch);
        let decoded = entry.as_sched_switch().unwrap();
        assert_eq!(decoded.old_tid, 1);
        assert_eq!(decoded.new_tid, 2);
        assert_eq!(decoded.ns, 123_456_789);
        assert_eq!(comm_str(&decoded.old_comm), "a");
        assert_eq!(comm_str(&decoded.new_comm), "b");
    }

    #[test]
    fn wrong_accessor_rejects_mismatched_kind() {
        let entry = LogEntry::process(1, "x");
        assert!(entry.as_thread().is_err());
        assert!(entry.as_sched_switch().is_err());
    }

    #[test]
    fn reserved_bytes_beyond_payload_are_zero() {
        let entry = LogEntry::thread(1, 2, &comm_from_bytes(b"x"));
        let bytes = entry.as_bytes();
        assert!(bytes[thread_offset::NAME + NAME_LEN..].iter().all(|&b| b == 0));
    }

    #[test]
    fn unrecognized_kind_byte_is_rejected() {
        let mut bytes = [0u8; ENTRY_SIZE];
        bytes[KIND_OFFSET] = 0xff;
        let entry = LogEntry::from_bytes(bytes);
        assert!(entry.kind().is_err());
    }
}
