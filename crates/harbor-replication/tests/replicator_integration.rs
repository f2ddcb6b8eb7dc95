//! End-to-end replication scenarios against the in-memory log.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use harbor_buffer::PageBuffer;
use harbor_common::config::ReplicationConfig;
use harbor_common::types::{BtreeId, Lsa, MvccId, UniqueStats, Vpid};
use harbor_log::memory::MemoryLog;
use harbor_log::record::{LogData, RcvIndex};
use harbor_log::source::LogSource;
use harbor_replication::btree;
use harbor_replication::metrics::{MetricsSink, Stat};
use harbor_replication::mvcc::MvccTracker;
use harbor_replication::Replicator;

/// Sink that records every replication delay sample.
#[derive(Default)]
struct RecordingSink {
    delays: Mutex<Vec<i64>>,
}

impl RecordingSink {
    fn delays(&self) -> Vec<i64> {
        self.delays.lock().clone()
    }
}

impl MetricsSink for RecordingSink {
    fn set_stat(&self, stat: Stat, value: i64) {
        if stat == Stat::RedoReplDelay {
            self.delays.lock().push(value);
        }
    }

    fn add_duration(&self, _stat: Stat, _elapsed: Duration) {}
}

struct Fixture {
    buffer: Arc<PageBuffer>,
    mvcc: Arc<MvccTracker>,
    sink: Arc<RecordingSink>,
    replicator: Replicator,
}

fn start_replicator(log: Arc<MemoryLog>, parallel_count: usize) -> Fixture {
    let buffer = Arc::new(PageBuffer::with_page_size(1024));
    let mvcc = Arc::new(MvccTracker::new());
    let sink = Arc::new(RecordingSink::default());

    let replicator = Replicator::new(
        log as Arc<dyn LogSource>,
        Arc::clone(&buffer),
        Arc::clone(&mvcc),
        Arc::clone(&sink) as Arc<dyn MetricsSink>,
        ReplicationConfig::new().with_parallel_count(parallel_count),
        Lsa::new(0, 0),
    );

    Fixture {
        buffer,
        mvcc,
        sink,
        replicator,
    }
}

fn now_msec() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

fn heap_write(vpid: Vpid, offset: u16) -> LogData {
    LogData::new(RcvIndex::HeapRecordWrite, vpid, offset)
}

fn counter_add(vpid: Vpid, offset: u16) -> LogData {
    LogData::new(RcvIndex::PageCounterAdd, vpid, offset)
}

#[test]
fn synchronous_commit_only_log() {
    let log = Arc::new(MemoryLog::new());
    let fixture = start_replicator(Arc::clone(&log), 0);

    let page = Vpid::new(1, 7);
    let redo_lsa = log.append_redo(1, heap_write(page, 0), b"A", false);
    let _commit_lsa = log.append_commit(1, now_msec() - 5);
    let state_lsa = log.append_ha_server_state(0, 1, now_msec() - 2);

    fixture.replicator.wait_past_target_lsa(state_lsa);

    let fixed = fixture.buffer.fix_for_read(page).unwrap();
    assert_eq!(fixed.data()[0], b'A');
    assert_eq!(fixed.page_lsa(), redo_lsa);
    drop(fixed);

    let delays = fixture.sink.delays();
    assert_eq!(delays.len(), 2);
    assert!(delays[0] >= 5 && delays[0] < 60_000, "delays = {delays:?}");
    assert!(delays[1] >= 2 && delays[1] < 60_000, "delays = {delays:?}");

    fixture.replicator.shutdown().unwrap();
}

#[test]
fn parallel_cross_page_interleaving() {
    let log = Arc::new(MemoryLog::new());
    let fixture = start_replicator(Arc::clone(&log), 4);

    let pages = [Vpid::new(1, 7), Vpid::new(1, 8)];
    let mut last_lsa = [Lsa::NULL, Lsa::NULL];
    let mut last_value = [0u8, 0u8];
    let mut final_lsa = Lsa::NULL;

    for i in 0..2000u32 {
        let which = (i % 2) as usize;
        let value = (i % 251) as u8;
        let rec_lsa = log.append_redo(i, heap_write(pages[which], 0), &[value], false);
        last_lsa[which] = rec_lsa;
        last_value[which] = value;
        final_lsa = rec_lsa;
    }

    fixture.replicator.wait_past_target_lsa(final_lsa);

    for which in 0..2 {
        let fixed = fixture.buffer.fix_for_read(pages[which]).unwrap();
        assert_eq!(fixed.page_lsa(), last_lsa[which]);
        assert_eq!(fixed.data()[0], last_value[which]);
    }

    fixture.replicator.shutdown().unwrap();
}

#[test]
fn parallel_same_page_contention() {
    let log = Arc::new(MemoryLog::new());
    let fixture = start_replicator(Arc::clone(&log), 4);

    let page = Vpid::new(1, 7);
    let delta = 1i64.to_le_bytes();
    let mut final_lsa = Lsa::NULL;
    for i in 0..1000u32 {
        final_lsa = log.append_redo(i, counter_add(page, 64), &delta, false);
    }

    fixture.replicator.wait_past_target_lsa(final_lsa);

    let fixed = fixture.buffer.fix_for_read(page).unwrap();
    assert_eq!(fixed.i64_at(64), 1000);
    assert_eq!(fixed.page_lsa(), final_lsa);
    drop(fixed);

    fixture.replicator.shutdown().unwrap();
}

#[test]
fn btree_stats_materialize_into_root_page() {
    let log = Arc::new(MemoryLog::new());
    let fixture = start_replicator(Arc::clone(&log), 0);

    let btid = BtreeId::new(2, 10, 42);
    let stats = UniqueStats::new(5, 10, 0);
    let payload = btree::encode_stats_payload(btid, stats);
    let stats_data = LogData::new(RcvIndex::BtreeStatsCommit, Vpid::NULL, 0);
    let rec_lsa = log.append_redo(1, stats_data, &payload, true);

    fixture.replicator.wait_past_target_lsa(rec_lsa);

    let root = Vpid::new(2, 42);
    assert_eq!(btree::read_root_stats(&fixture.buffer, root).unwrap(), stats);
    let fixed = fixture.buffer.fix_for_read(root).unwrap();
    assert_eq!(fixed.page_lsa(), rec_lsa);
    drop(fixed);

    fixture.replicator.shutdown().unwrap();
}

#[test]
fn btree_stats_in_parallel_mode() {
    let log = Arc::new(MemoryLog::new());
    let fixture = start_replicator(Arc::clone(&log), 2);

    let btid = BtreeId::new(3, 11, 9);
    let mut final_lsa = Lsa::NULL;
    for i in 1..=20i64 {
        let payload = btree::encode_stats_payload(btid, UniqueStats::new(i, 2 * i, 0));
        let stats_data = LogData::new(RcvIndex::BtreeStatsCommit, Vpid::NULL, 0);
        final_lsa = log.append_redo(i as u32, stats_data, &payload, false);
    }

    fixture.replicator.wait_past_target_lsa(final_lsa);

    assert_eq!(
        btree::read_root_stats(&fixture.buffer, btid.root_vpid()).unwrap(),
        UniqueStats::new(20, 40, 0)
    );

    fixture.replicator.shutdown().unwrap();
}

#[test]
fn bogus_timestamp_is_skipped() {
    let log = Arc::new(MemoryLog::new());
    let fixture = start_replicator(Arc::clone(&log), 0);

    let page = Vpid::new(1, 7);
    log.append_commit(1, -1);
    let redo_lsa = log.append_redo(2, heap_write(page, 0), b"Z", false);

    fixture.replicator.wait_past_target_lsa(redo_lsa);

    // No delay sample, but replay continued past the commit.
    assert!(fixture.sink.delays().is_empty());
    let fixed = fixture.buffer.fix_for_read(page).unwrap();
    assert_eq!(fixed.data()[0], b'Z');
    drop(fixed);

    fixture.replicator.shutdown().unwrap();
}

#[test]
fn shutdown_drains_pending_records() {
    let log = Arc::new(MemoryLog::new());

    // The log is already 200 records ahead when the replicator starts.
    let page = Vpid::new(1, 7);
    let delta = 1i64.to_le_bytes();
    for i in 0..200u32 {
        log.append_redo(i, counter_add(page, 0), &delta, false);
    }

    let fixture = start_replicator(Arc::clone(&log), 4);
    fixture.replicator.wait_replication_finish_during_shutdown();

    assert_eq!(fixture.replicator.redo_lsa(), log.nxio_lsa());
    let fixed = fixture.buffer.fix_for_read(page).unwrap();
    assert_eq!(fixed.i64_at(0), 200);
    drop(fixed);

    fixture.replicator.shutdown().unwrap();
}

#[test]
fn empty_log_shuts_down_immediately() {
    for parallel_count in [0, 2] {
        let log = Arc::new(MemoryLog::new());
        let fixture = start_replicator(log, parallel_count);

        fixture.replicator.wait_replication_finish_during_shutdown();
        assert_eq!(fixture.replicator.redo_lsa(), Lsa::new(0, 0));
        assert_eq!(fixture.buffer.resident_count(), 0);

        fixture.replicator.shutdown().unwrap();
    }
}

#[test]
fn mvcc_ids_stay_ahead_of_the_log() {
    let log = Arc::new(MemoryLog::new());
    let fixture = start_replicator(Arc::clone(&log), 0);

    let page = Vpid::new(1, 7);
    let rec_lsa = log.append_mvcc_redo(1, heap_write(page, 0), MvccId::new(77), b"M", false);

    fixture.replicator.wait_past_target_lsa(rec_lsa);

    assert_eq!(fixture.mvcc.next_id(), MvccId::new(78));

    fixture.replicator.shutdown().unwrap();
}

#[test]
fn unknown_record_types_are_skipped() {
    let log = Arc::new(MemoryLog::new());
    let fixture = start_replicator(Arc::clone(&log), 0);

    let page = Vpid::new(1, 7);
    log.append_other(1, 200);
    log.append_other(1, 250);
    let redo_lsa = log.append_redo(1, heap_write(page, 0), b"K", false);

    fixture.replicator.wait_past_target_lsa(redo_lsa);

    let fixed = fixture.buffer.fix_for_read(page).unwrap();
    assert_eq!(fixed.data()[0], b'K');
    drop(fixed);

    fixture.replicator.shutdown().unwrap();
}

#[test]
fn dbextern_redo_runs_synchronously() {
    let log = Arc::new(MemoryLog::new());
    let fixture = start_replicator(Arc::clone(&log), 2);

    log.append_dbextern_redo(1, RcvIndex::VolumeExpand, b"volume grown");
    let page = Vpid::new(1, 7);
    let redo_lsa = log.append_redo(1, heap_write(page, 0), b"E", false);

    fixture.replicator.wait_past_target_lsa(redo_lsa);

    let fixed = fixture.buffer.fix_for_read(page).unwrap();
    assert_eq!(fixed.data()[0], b'E');
    drop(fixed);

    fixture.replicator.shutdown().unwrap();
}

#[test]
fn diff_undoredo_applies_redo_image() {
    let log = Arc::new(MemoryLog::new());
    let fixture = start_replicator(Arc::clone(&log), 0);

    let page = Vpid::new(1, 9);
    let undo = b"before image";
    let redo = b"after images";
    let rec_lsa = log.append_undoredo(1, heap_write(page, 16), undo, redo, true);

    fixture.replicator.wait_past_target_lsa(rec_lsa);

    let fixed = fixture.buffer.fix_for_read(page).unwrap();
    assert_eq!(&fixed.data()[16..16 + redo.len()], redo);
    assert_eq!(fixed.page_lsa(), rec_lsa);
    drop(fixed);

    fixture.replicator.shutdown().unwrap();
}

/// Builds one mixed workload; used by the replay-determinism check.
fn append_mixed_workload(log: &MemoryLog) -> Lsa {
    let page_a = Vpid::new(1, 7);
    let page_b = Vpid::new(1, 8);
    let delta = 3i64.to_le_bytes();

    let mut final_lsa = Lsa::NULL;
    for i in 0..50u32 {
        final_lsa = log.append_redo(i, heap_write(page_a, 0), &[(i % 7) as u8], false);
        final_lsa = log.append_redo(i, counter_add(page_b, 32), &delta, false);
        if i % 10 == 0 {
            final_lsa = log.append_mvcc_undoredo(
                i,
                heap_write(page_a, 100),
                MvccId::new(u64::from(i) + 1),
                b"undo bytes",
                b"redo bytes",
                true,
            );
            final_lsa = log.append_commit(i, now_msec());
        }
    }

    let payload = btree::encode_stats_payload(BtreeId::new(2, 10, 42), UniqueStats::new(9, 9, 1));
    final_lsa = log.append_redo(
        99,
        LogData::new(RcvIndex::BtreeStatsCommit, Vpid::NULL, 0),
        &payload,
        true,
    );
    final_lsa
}

fn replay(log: &Arc<MemoryLog>, parallel_count: usize, final_lsa: Lsa) -> (Vec<Vec<u8>>, Lsa) {
    let fixture = start_replicator(Arc::clone(log), parallel_count);
    fixture.replicator.wait_past_target_lsa(final_lsa);
    fixture.replicator.wait_replication_finish_during_shutdown();

    let pages = [Vpid::new(1, 7), Vpid::new(1, 8), Vpid::new(2, 42)];
    let images = pages
        .iter()
        .map(|&vpid| fixture.buffer.fix_for_read(vpid).unwrap().data().to_vec())
        .collect();
    let frontier = fixture.replicator.redo_lsa();

    fixture.replicator.shutdown().unwrap();
    (images, frontier)
}

#[test]
fn replay_is_deterministic_across_modes() {
    let log = Arc::new(MemoryLog::new());
    let final_lsa = append_mixed_workload(&log);

    // Same prefix, fresh replicators: synchronous and parallel replay must
    // produce identical page images and the same final frontier.
    let (sync_images, sync_frontier) = replay(&log, 0, final_lsa);
    let (par_images, par_frontier) = replay(&log, 4, final_lsa);
    let (again_images, again_frontier) = replay(&log, 4, final_lsa);

    assert_eq!(sync_images, par_images);
    assert_eq!(par_images, again_images);
    assert_eq!(sync_frontier, par_frontier);
    assert_eq!(par_frontier, again_frontier);
}
