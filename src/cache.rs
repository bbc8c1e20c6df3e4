//! Producer-private identity caches.
//!
//! Bounded, append-only, linear-scan arrays. "An implementer may
//! substitute a hash set provided the append-only semantics and the
//! ordering invariant [visibility order] are preserved" (spec §9). A
//! linear scan over at most a few thousand entries is cheap once the
//! working set has warmed up, since cache hits dominate after the first
//! few hundred switches.

use ctxtrace_common::{Pid, Tid};

/// Capacity of both identity caches, per spec §3.
pub const MAX_ENTRIES: usize = 4096;

/// Known thread ids and the process id each belongs to, in parallel arrays.
pub struct ThreadCache {
    tids: Vec<Tid>,
    pids: Vec<Pid>,
}

impl ThreadCache {
    pub fn new() -> Self {
        Self {
            tids: Vec::with_capacity(MAX_ENTRIES),
            pids: Vec::with_capacity(MAX_ENTRIES),
        }
    }

    /// Index of `tid` in the cache, or `None` if not yet seen.
    fn index_of(&self, tid: Tid) -> Option<usize> {
        self.tids.iter().position(|&t| t == tid)
    }

    pub fn contains(&self, tid: Tid) -> bool {
        self.index_of(tid).is_some()
    }

    pub fn is_full(&self) -> bool {
        self.tids.len() >= MAX_ENTRIES
    }

    /// Inserts `tid`/`pid`. Caller must check [`is_full`](Self::is_full)
    /// first; this never evicts.
    pub fn insert(&mut self, tid: Tid, pid: Pid) {
        debug_assert!(!self.is_full());
        self.tids.push(tid);
        self.pids.push(pid);
    }

    pub fn len(&self) -> usize {
        self.tids.len()
    }
}

impl Default for ThreadCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Known process ids.
pub struct ProcessCache {
    pids: Vec<Pid>,
}

impl ProcessCache {
    pub fn new() -> Self {
        Self {
            pids: Vec::with_capacity(MAX_ENTRIES),
        }
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.pids.iter().any(|&p| p == pid)
    }

    pub fn is_full(&self) -> bool {
        self.pids.len() >= MAX_ENTRIES
    }

    pub fn insert(&mut self, pid: Pid) {
        debug_assert!(!self.is_full());
        self.pids.push(pid);
    }

    pub fn len(&self) -> usize {
        self.pids.len()
    }
}

impl Default for ProcessCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_cache_roundtrip() {
        let mut cache = ThreadCache::new();
        assert!(!cache.contains(100));
        cache.insert(100, 42);
        assert!(cache.contains(100));
        assert!(!cache.contains(200));
    }

    #[test]
    fn process_cache_roundtrip() {
        let mut cache = ProcessCache::new();
        assert!(!cache.contains(42));
        cache.insert(42);
        assert!(cache.contains(42));
    }

    #[test]
    fn thread_cache_reports_full_at_capacity() {
        let mut cache = ThreadCache::new();
        for tid in 0..MAX_ENTRIES as Tid {
            assert!(!cache.is_full());
            cache.insert(tid, 1);
        }
        assert!(cache.is_full());
        assert_eq!(cache.len(), MAX_ENTRIES);
    }
}
