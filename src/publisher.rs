//! Publisher: owns the shared log and the identity caches, and is the
//! only thing that turns a [`RawSwitchEvent`] into log entries.
//!
//! Runs entirely on the consumer's thread: there is exactly one
//! mutator, so nothing here needs interior synchronization beyond what
//! [`SharedLog`] already does for cross-process visibility.

use anyhow::{Context, Result};
use ctxtrace_common::{Pid, RawSwitchEvent, Tid, UNKNOWN_PID};

use crate::cache::{ProcessCache, ThreadCache};
use crate::config::Config;
use crate::identity::IdentityResolver;
use crate::log_entry::LogEntry;
use crate::shared_log::{AppendResult, SharedLog};
use crate::signals;

/// Mandated stderr line, not routed through `log`: a reader of the
/// historical output greps for this exact wording.
fn report_buffer_full() {
    eprintln!("shared mem buffer full, no further entries can be appended");
}

/// Result of publishing one raw event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Ok,
    /// The shared log has no room left; nothing further will be
    /// appended by this or any later call.
    Full,
    /// A shutdown signal arrived mid-event; the remaining appends for
    /// this event were skipped.
    Cancelled,
}

pub struct Publisher {
    log: SharedLog,
    threads: ThreadCache,
    processes: ProcessCache,
    resolver: IdentityResolver,
}

impl Publisher {
    /// Runs the startup protocol: verifies the entry layout, then
    /// creates the shared log region. Fails, without creating any
    /// reader-visible state, if the region already exists or cannot be
    /// sized/mapped.
    pub fn create(config: &Config) -> Result<Self> {
        LogEntry::verify_layout().context("log entry layout check failed")?;
        let log = SharedLog::create(&config.region_path, config.region_size)
            .context("failed to create shared log region")?;
        Ok(Self {
            log,
            threads: ThreadCache::new(),
            processes: ProcessCache::new(),
            resolver: IdentityResolver::new(&config.proc_root),
        })
    }

    /// Publishes one context switch: introduces Process/Thread entries
    /// for either side not already known, then a SchedSwitch entry.
    /// Process/Thread entries for a given tid/pid are always appended
    /// before the SchedSwitch entry that references them.
    pub fn handle_raw_event(&mut self, event: &RawSwitchEvent) -> Result<PublishOutcome> {
        for (tid, comm) in [
            (event.old_tid, &event.old_comm),
            (event.new_tid, &event.new_comm),
        ] {
            match self.ensure_identity(tid, comm)? {
                PublishOutcome::Ok => {}
                outcome @ (PublishOutcome::Full | PublishOutcome::Cancelled) => {
                    return Ok(outcome);
                }
            }
        }

        if signals::exit_requested() {
            return Ok(PublishOutcome::Cancelled);
        }

        let entry = LogEntry::sched_switch(event);
        match self.log.append(&entry)? {
            AppendResult::Full => {
                report_buffer_full();
                Ok(PublishOutcome::Full)
            }
            AppendResult::Appended(count) => {
                if count.is_power_of_two() {
                    eprintln!(
                        "switch #{count}: {} (tid {}) -> {} (tid {})",
                        ctxtrace_common::comm_str(&event.old_comm),
                        event.old_tid,
                        ctxtrace_common::comm_str(&event.new_comm),
                        event.new_tid,
                    );
                }
                Ok(PublishOutcome::Ok)
            }
        }
    }

    /// Ensures `tid` (and, transitively, its owning process) has a
    /// Thread/Process entry in the log, unless the relevant cache is
    /// already full, in which case the switch will still be recorded
    /// but no new identity entries are introduced, per the cache-overflow
    /// policy.
    fn ensure_identity(&mut self, tid: Tid, comm: &[u8; ctxtrace_common::COMM_LEN]) -> Result<PublishOutcome> {
        if self.threads.contains(tid) {
            return Ok(PublishOutcome::Ok);
        }
        if self.threads.is_full() {
            return Ok(PublishOutcome::Ok);
        }

        let pid = self.resolver.owning_process(tid).unwrap_or(UNKNOWN_PID);

        if pid != UNKNOWN_PID && !self.processes.contains(pid) && !self.processes.is_full() {
            if signals::exit_requested() {
                return Ok(PublishOutcome::Cancelled);
            }
            let (name, _resolved) = self.resolver.process_name(pid);
            match self.log.append(&LogEntry::process(pid, &name))? {
                AppendResult::Full => {
                    report_buffer_full();
                    return Ok(PublishOutcome::Full);
                }
                AppendResult::Appended(_) => {}
            }
            self.processes.insert(pid);
        }

        if signals::exit_requested() {
            return Ok(PublishOutcome::Cancelled);
        }
        match self.log.append(&LogEntry::thread(tid, pid, comm))? {
            AppendResult::Full => {
                report_buffer_full();
                return Ok(PublishOutcome::Full);
            }
            AppendResult::Appended(_) => {}
        }
        self.threads.insert(tid, pid);

        Ok(PublishOutcome::Ok)
    }

    /// Shutdown protocol: marks the region done so a reader stops
    /// expecting further entries, then flushes. The backing file is
    /// closed (via `Drop`) but never unlinked.
    pub fn shutdown(&mut self) -> Result<()> {
        self.log.mark_done().context("marking shared log done")?;
        log::info!(
            "shut down after {} entries at {}",
            self.log.len(),
            self.log.path().display()
        );
        Ok(())
    }

    /// A read-only view of the shared log, for introspection and tests.
    pub fn log(&self) -> &SharedLog {
        &self.log
    }

    pub fn process_cache_len(&self) -> usize {
        self.processes.len()
    }

    pub fn thread_cache_len(&self) -> usize {
        self.threads.len()
    }
}
