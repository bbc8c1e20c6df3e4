//! The persistent shared-memory log: a fixed-size header followed by a
//! flat array of 64-byte [`LogEntry`] slots, backed by a memory-mapped
//! file an external reader can open independently.
//!
//! The producer (this process) is the sole mutator. Cross-process
//! visibility is the only ordering concern: a reader must never observe
//! `num_entries` advance past a slot whose bytes are not yet fully
//! written. We get that from plain `Release`/`Acquire` atomics on the
//! header fields, the same tool a `SeqLock` uses to order writer and
//! reader, except the "reader" here lives in another address space
//! entirely, so the fence has to cross a memory-mapped file rather than
//! a cache line shared between threads.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

use anyhow::{bail, Context, Result};
use memmap2::MmapMut;

use crate::log_entry::{LogEntry, ENTRY_SIZE};

mod header_offset {
    pub const SIZE: usize = 0;
    pub const NUM_ENTRIES: usize = 8;
    pub const ENTRY_START_OFFSET: usize = 16;
    pub const ENTRY_SIZE: usize = 20;
    pub const DONE: usize = 24;
    /// Header is padded out to a multiple of the entry size so the first
    /// entry starts at a round offset; nothing relies on this beyond
    /// readability.
    pub const LEN: usize = 64;
}

/// Outcome of an append attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendResult {
    /// The entry was written; the log now holds this many entries.
    Appended(u64),
    /// The region has no room left; nothing was written.
    Full,
}

/// A memory-mapped, append-only log of fixed-size entries, shared with
/// external readers via a backing file.
pub struct SharedLog {
    mmap: MmapMut,
    /// Kept alive for the mapping's lifetime and closed on drop by the
    /// ordinary `File` destructor. Never unlinked: per the shutdown
    /// protocol, a leftover region from a crashed session is a visible
    /// warning sign, and `create`'s `create_new` guard turns it into a
    /// hard startup failure for the next run rather than silent data loss.
    file: File,
    path: std::path::PathBuf,
    capacity: u64,
    /// Producer-private mirror of `num_entries`. The header field is the
    /// one a reader trusts; this one lets us avoid an atomic load on our
    /// own write path.
    cursor: u64,
}

impl SharedLog {
    /// Creates a brand-new region at `path`, refusing to touch anything
    /// if it already exists. `region_size` must be large enough to hold
    /// the header and at least one entry.
    pub fn create(path: &Path, region_size: u64) -> Result<Self> {
        LogEntry::verify_layout()?;

        if region_size <= header_offset::LEN as u64 {
            bail!("region size {region_size} too small to hold the header");
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .mode(0o644)
            .open(path)
            .with_context(|| format!("creating shared log region at {}", path.display()))?;
        file.set_len(region_size)
            .context("sizing shared log region")?;

        let mut mmap =
            unsafe { MmapMut::map_mut(&file) }.context("mapping shared log region")?;

        let capacity = (region_size - header_offset::LEN as u64) / ENTRY_SIZE as u64;

        // Startup protocol: every header field except `size` is written
        // first, in any order, with ordinary (non-atomic) stores. No
        // reader can observe this file yet, since `size` is still zero
        // from `set_len`. `size` is the publication signal and is
        // written last, behind a release fence.
        Self::atomic_u64_at(&mut mmap, header_offset::NUM_ENTRIES).store(0, Ordering::Relaxed);
        Self::atomic_u32_at(&mut mmap, header_offset::ENTRY_START_OFFSET)
            .store(header_offset::LEN as u32, Ordering::Relaxed);
        Self::atomic_u32_at(&mut mmap, header_offset::ENTRY_SIZE)
            .store(ENTRY_SIZE as u32, Ordering::Relaxed);
        Self::atomic_u8_at(&mut mmap, header_offset::DONE).store(0, Ordering::Relaxed);

        Self::atomic_u64_at(&mut mmap, header_offset::SIZE).store(region_size, Ordering::Release);

        log::info!(
            "shared log created at {} ({region_size} bytes, capacity {capacity} entries)",
            path.display()
        );

        Ok(Self {
            mmap,
            file,
            path: path.to_path_buf(),
            capacity,
            cursor: 0,
        })
    }

    fn atomic_u64_at(mmap: &mut MmapMut, offset: usize) -> &AtomicU64 {
        let ptr = mmap[offset..offset + 8].as_mut_ptr() as *const AtomicU64;
        // SAFETY: offset is 8-byte aligned by construction (all header
        // offsets used with this helper are multiples of 8) and within
        // the mapped region.
        unsafe { &*ptr }
    }

    fn atomic_u32_at(mmap: &mut MmapMut, offset: usize) -> &AtomicU32 {
        let ptr = mmap[offset..offset + 4].as_mut_ptr() as *const AtomicU32;
        // SAFETY: offset is 4-byte aligned by construction and within
        // the mapped region.
        unsafe { &*ptr }
    }

    fn atomic_u8_at(mmap: &mut MmapMut, offset: usize) -> &AtomicU8 {
        let ptr = mmap[offset..offset + 1].as_mut_ptr() as *const AtomicU8;
        // SAFETY: within the mapped region; u8 has no alignment requirement.
        unsafe { &*ptr }
    }

    fn entry_slot(&mut self, index: u64) -> &mut [u8] {
        let start = header_offset::LEN + (index as usize) * ENTRY_SIZE;
        &mut self.mmap[start..start + ENTRY_SIZE]
    }

    /// Appends one entry. Returns [`AppendResult::Full`] without writing
    /// anything if the region has no remaining capacity.
    pub fn append(&mut self, entry: &LogEntry) -> Result<AppendResult> {
        if self.cursor >= self.capacity {
            return Ok(AppendResult::Full);
        }

        let index = self.cursor;
        self.entry_slot(index).copy_from_slice(entry.as_bytes());

        // Release fence: the entry bytes above must be visible to any
        // reader that observes the incremented count below.
        let next = index + 1;
        Self::atomic_u64_at(&mut self.mmap, header_offset::NUM_ENTRIES)
            .store(next, Ordering::Release);
        self.cursor = next;

        Ok(AppendResult::Appended(next))
    }

    /// Number of entries appended so far.
    pub fn len(&self) -> u64 {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Marks the region as finished: readers that observe `done == 1`
    /// know `num_entries` has reached its final value and will not
    /// advance further.
    pub fn mark_done(&mut self) -> Result<()> {
        Self::atomic_u8_at(&mut self.mmap, header_offset::DONE).store(1, Ordering::Release);
        self.mmap.flush().context("flushing shared log on shutdown")?;
        Ok(())
    }

    /// Reads back entry `index` as an external reader mapping the file
    /// would: an acquire load of `num_entries` gates which indices are
    /// safe to read. Used by tests and integration scenarios.
    pub fn read_entry(&self, index: u64) -> Option<LogEntry> {
        let published = {
            let ptr = self.mmap[header_offset::NUM_ENTRIES..header_offset::NUM_ENTRIES + 8]
                .as_ptr() as *const AtomicU64;
            // SAFETY: within the mapped region, 8-byte aligned.
            unsafe { (*ptr).load(Ordering::Acquire) }
        };
        if index >= published {
            return None;
        }
        let start = header_offset::LEN + (index as usize) * ENTRY_SIZE;
        let mut bytes = [0u8; ENTRY_SIZE];
        bytes.copy_from_slice(&self.mmap[start..start + ENTRY_SIZE]);
        Some(LogEntry::from_bytes(bytes))
    }

    /// Reads the `done` flag as an external reader would.
    pub fn is_done(&self) -> bool {
        let ptr =
            self.mmap[header_offset::DONE..header_offset::DONE + 1].as_ptr() as *const AtomicU8;
        // SAFETY: within the mapped region.
        unsafe { (*ptr).load(Ordering::Acquire) != 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_entry::LogEntry;
    use tempfile::tempdir;

    #[test]
    fn refuses_to_overwrite_existing_region() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("region");
        let _first = SharedLog::create(&path, 4096).unwrap();
        let second = SharedLog::create(&path, 4096);
        assert!(second.is_err());
    }

    #[test]
    fn append_then_read_back_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("region");
        let mut log = SharedLog::create(&path, 4096).unwrap();
        assert!(log.is_empty());
        let entry = LogEntry::process(42, "nginx");
        match log.append(&entry).unwrap() {
            AppendResult::Appended(1) => {}
            other => panic!("unexpected append result {other:?}"),
        }
        assert_eq!(log.len(), 1);
        let read_back = log.read_entry(0).unwrap();
        let (pid, name) = read_back.as_process().unwrap();
        assert_eq!(pid, 42);
        assert_eq!(name, "nginx");
    }

    #[test]
    fn append_reports_full_without_writing_past_capacity() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("region");
        let region_size = header_offset::LEN as u64 + 2 * ENTRY_SIZE as u64;
        let mut log = SharedLog::create(&path, region_size).unwrap();
        assert_eq!(log.capacity(), 2);

        let entry = LogEntry::process(1, "a");
        assert_eq!(log.append(&entry).unwrap(), AppendResult::Appended(1));
        assert_eq!(log.append(&entry).unwrap(), AppendResult::Appended(2));
        assert_eq!(log.append(&entry).unwrap(), AppendResult::Full);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn unread_entries_are_not_visible_until_appended() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("region");
        let mut log = SharedLog::create(&path, 4096).unwrap();
        assert!(log.read_entry(0).is_none());
        log.append(&LogEntry::process(1, "a")).unwrap();
        assert!(log.read_entry(0).is_some());
        assert!(log.read_entry(1).is_none());
    }

    #[test]
    fn mark_done_is_observable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("region");
        let mut log = SharedLog::create(&path, 4096).unwrap();
        assert!(!log.is_done());
        log.mark_done().unwrap();
        assert!(log.is_done());
    }
}
