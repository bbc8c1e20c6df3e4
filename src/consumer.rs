//! Ring Consumer: polls the kernel ring buffer and hands each event to
//! the [`Publisher`].
//!
//! A negative `poll` is treated as fatal (something is badly wrong with
//! the fd); a timeout is routine. The exit flag is checked before every
//! poll and before handling every individual ring item, per the
//! shutdown-latency requirement.

use std::time::Duration;

use anyhow::{bail, Result};
use ctxtrace_common::{RawSwitchEvent, RAW_SWITCH_EVENT_SIZE};

use crate::probe::Probe;
use crate::publisher::{PublishOutcome, Publisher};
use crate::signals;

const POLL_TIMEOUT_MS: i32 = 100;
const IDLE_SLEEP: Duration = Duration::from_secs(1);

/// Why the consumer loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// A signal requested an orderly shutdown.
    Signal,
    /// The shared log region is full.
    RegionFull,
}

pub struct RingConsumer<'a> {
    probe: Probe,
    publisher: &'a mut Publisher,
}

impl<'a> RingConsumer<'a> {
    pub fn new(probe: Probe, publisher: &'a mut Publisher) -> Self {
        Self { probe, publisher }
    }

    pub fn run(mut self) -> Result<ShutdownReason> {
        loop {
            if signals::exit_requested() {
                return Ok(ShutdownReason::Signal);
            }

            let ready = self.poll_ring()?;
            if ready {
                if let Some(reason) = self.drain_ready_events()? {
                    return Ok(reason);
                }
            }

            std::thread::sleep(IDLE_SLEEP);
        }
    }

    /// Polls the ring's fd with a bounded timeout. Returns whether data
    /// is ready to read.
    fn poll_ring(&mut self) -> Result<bool> {
        use std::os::fd::AsRawFd;
        let mut pollfd = libc::pollfd {
            fd: self.probe.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let ret = unsafe { libc::poll(&mut pollfd, 1, POLL_TIMEOUT_MS) };
        if ret < 0 {
            let err = std::io::Error::last_os_error();
            bail!("polling kernel ring buffer: {err}");
        }
        Ok(ret > 0)
    }

    /// Drains every item currently available in the ring. Returns
    /// `Some(reason)` if the consumer should stop.
    fn drain_ready_events(&mut self) -> Result<Option<ShutdownReason>> {
        while let Some(item) = self.probe.ring_mut().next() {
            if signals::exit_requested() {
                return Ok(Some(ShutdownReason::Signal));
            }

            if item.len() != RAW_SWITCH_EVENT_SIZE {
                log::warn!(
                    "dropping ring payload of {} bytes, expected {RAW_SWITCH_EVENT_SIZE}",
                    item.len()
                );
                continue;
            }

            let event: RawSwitchEvent = *bytemuck::from_bytes(&item);
            match self.publisher.handle_raw_event(&event)? {
                PublishOutcome::Ok => {}
                PublishOutcome::Full => return Ok(Some(ShutdownReason::RegionFull)),
                PublishOutcome::Cancelled => return Ok(Some(ShutdownReason::Signal)),
            }
        }
        Ok(None)
    }
}
