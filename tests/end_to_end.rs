//! End-to-end scenarios driven through the public API, without a live
//! kernel probe: a constructed [`Publisher`] over a temp-file region,
//! fed synthetic [`RawSwitchEvent`]s, exactly as the Ring Consumer would
//! feed it events read off the real ring buffer.

use ctxtrace::config::Config;
use ctxtrace::publisher::{PublishOutcome, Publisher};
use ctxtrace_common::{comm_from_bytes, RawSwitchEvent};
use tempfile::tempdir;

fn switch(old_tid: i32, new_tid: i32) -> RawSwitchEvent {
    RawSwitchEvent {
        old_tid,
        old_prio: 20,
        old_comm: comm_from_bytes(b"old"),
        new_tid,
        new_prio: 20,
        new_comm: comm_from_bytes(b"new"),
        ns: 42,
        seq: 0,
    }
}

fn config_in(dir: &tempfile::TempDir, region_size: u64) -> Config {
    Config {
        region_path: dir.path().join("region"),
        region_size,
        proc_root: dir.path().join("proc"),
    }
}

#[test]
fn a_session_with_no_switches_leaves_an_empty_but_valid_region() {
    let dir = tempdir().unwrap();
    let mut publisher = Publisher::create(&config_in(&dir, 4096)).unwrap();
    assert_eq!(publisher.log().len(), 0);
    publisher.shutdown().unwrap();
    assert!(publisher.log().is_done());
}

#[test]
fn a_gap_in_the_probes_sequence_number_does_not_block_publication() {
    // The Ring Consumer has no notion of "the" sequence; it hands the
    // Publisher whatever RawSwitchEvent it reads. A gap (seq jumping
    // from 1 to 5, say) is visible to whoever inspects `seq` on the
    // decoded SchedSwitch entries but never stops publication.
    let dir = tempdir().unwrap();
    let mut publisher = Publisher::create(&config_in(&dir, 4096)).unwrap();

    let mut first = switch(1, 2);
    first.seq = 1;
    let mut second = switch(2, 1);
    second.seq = 5;

    assert_eq!(
        publisher.handle_raw_event(&first).unwrap(),
        PublishOutcome::Ok
    );
    assert_eq!(
        publisher.handle_raw_event(&second).unwrap(),
        PublishOutcome::Ok
    );

    let last = publisher.log().len();
    let decoded = publisher
        .log()
        .read_entry(last - 1)
        .unwrap()
        .as_sched_switch()
        .unwrap();
    assert_eq!(decoded.ns, 42);
}

#[test]
fn region_fill_reports_full_and_stops_growing() {
    let dir = tempdir().unwrap();
    // Header plus exactly 2 slots: the very first switch cannot fully
    // fit (it needs a Thread entry for each side plus the switch
    // itself), so it must report Full partway through.
    let mut publisher = Publisher::create(&config_in(&dir, 64 + 2 * 64)).unwrap();

    let outcome = publisher.handle_raw_event(&switch(10, 20)).unwrap();
    assert_eq!(outcome, PublishOutcome::Full);
    assert_eq!(publisher.log().len(), 2);

    // Further events are also rejected; nothing grows past capacity.
    let outcome = publisher.handle_raw_event(&switch(10, 20)).unwrap();
    assert_eq!(outcome, PublishOutcome::Full);
    assert_eq!(publisher.log().len(), 2);
}

#[test]
fn a_second_session_cannot_start_while_a_region_file_is_still_present() {
    let dir = tempdir().unwrap();
    let config = config_in(&dir, 4096);
    let publisher = Publisher::create(&config).unwrap();

    // Starting a second session against the same path fails outright --
    // the region is never unlinked on shutdown, by design, so a crashed
    // or still-running prior session blocks a new one from clobbering it.
    let second = Publisher::create(&config);
    assert!(second.is_err());

    drop(publisher);
}
