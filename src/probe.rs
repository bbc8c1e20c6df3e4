//! Loads and attaches the in-kernel probe, and exposes the ring buffer
//! it feeds for [`crate::consumer::RingConsumer`] to poll.

use std::os::fd::{AsRawFd, RawFd};

use anyhow::{Context, Result};
use aya::maps::{MapData, RingBuf};
use aya::programs::TracePoint;
use aya::Ebpf;

/// The loaded eBPF object plus the ring buffer map it writes into.
///
/// `_ebpf` has no accessors but must outlive the ring buffer and the
/// attached program, so it stays alive for as long as this struct does.
pub struct Probe {
    _ebpf: Ebpf,
    ring: RingBuf<MapData>,
}

impl Probe {
    /// Loads the probe bytecode embedded at build time, loads and
    /// attaches the `sched_switch` tracepoint program, and takes
    /// ownership of the `EVENTS` ring buffer map.
    pub fn load() -> Result<Self> {
        let mut ebpf = Ebpf::load(aya::include_bytes_aligned!(concat!(
            env!("OUT_DIR"),
            "/ctxtrace"
        )))
        .context("loading eBPF object")?;

        let program: &mut TracePoint = ebpf
            .program_mut("sched_switch")
            .context("sched_switch program missing from eBPF object")?
            .try_into()
            .context("sched_switch program is not a tracepoint program")?;
        program.load().context("loading sched_switch program")?;
        program
            .attach("sched", "sched_switch")
            .context("attaching to tracepoint/sched/sched_switch")?;

        let events_map = ebpf
            .take_map("EVENTS")
            .context("EVENTS ring buffer map missing from eBPF object")?;
        let ring = RingBuf::try_from(events_map).context("EVENTS map is not a ring buffer")?;

        log::info!("kernel probe attached to tracepoint/sched/sched_switch");

        Ok(Self { _ebpf: ebpf, ring })
    }

    pub fn ring_mut(&mut self) -> &mut RingBuf<MapData> {
        &mut self.ring
    }
}

impl AsRawFd for Probe {
    fn as_raw_fd(&self) -> RawFd {
        self.ring.as_raw_fd()
    }
}
