//! The page-server log replicator.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::error;

use harbor_buffer::PageBuffer;
use harbor_common::config::ReplicationConfig;
use harbor_common::constants::LOGAREA_SIZE;
use harbor_common::types::Lsa;
use harbor_log::reader::{FetchMode, LogReader};
use harbor_log::record::{
    Compensate, DbExternRedo, DoneTime, HaServerState, MvccRedoData, MvccUndoRedoData, RcvIndex,
    RecordHeader, RecordType, RedoBody, RedoData, RedoRecord, RunPostpone, TimedBody, UndoRedoData,
};
use harbor_log::source::LogSource;
use harbor_log::zip::LogZip;

use crate::btree;
use crate::daemon::{Daemon, DaemonTask};
use crate::delay;
use crate::engine::ParallelRedoEngine;
use crate::error::{ReplicationError, ReplicationResult};
use crate::job::{RedoJob, ReplicationContext};
use crate::metrics::{MetricsSink, Stat};
use crate::monitor::MinLsaMonitor;
use crate::mvcc::MvccTracker;
use crate::recovery::{RecoveryTable, RedoContext};
use crate::redo;

/// Continuously consumes the active server's redo log and applies it
/// against the local page buffer.
///
/// One dedicated producer thread decodes records in log order; with a
/// parallel count above zero, page-bound work is dispatched to a
/// [`ParallelRedoEngine`] whose workers preserve per-page order. Other
/// subsystems block on the replicator through the waiter protocol
/// ([`Replicator::wait_replication_finish_during_shutdown`],
/// [`Replicator::wait_past_target_lsa`]).
pub struct Replicator {
    core: Arc<ReplicatorCore>,
    daemon: Option<Daemon>,
}

struct ReplicatorCore {
    log: Arc<dyn LogSource>,
    context: Arc<ReplicationContext>,
    mvcc: Arc<MvccTracker>,
    redo_lsa: Mutex<Lsa>,
    redo_lsa_advanced: Condvar,
    // Engine and monitor exist together, before the daemon starts, so no
    // record can race ahead of a not-yet-ready engine.
    engine: Option<ParallelRedoEngine>,
    monitor: Option<Arc<MinLsaMonitor>>,
}

impl Replicator {
    /// Constructs the replicator and starts replication at
    /// `start_redo_lsa`.
    pub fn new(
        log: Arc<dyn LogSource>,
        buffer: Arc<PageBuffer>,
        mvcc: Arc<MvccTracker>,
        sink: Arc<dyn MetricsSink>,
        config: ReplicationConfig,
        start_redo_lsa: Lsa,
    ) -> Self {
        let context = Arc::new(ReplicationContext {
            buffer,
            sink,
            trace_delay: config.trace_replication_delay,
        });

        let (engine, monitor) = if config.parallel_count > 0 {
            let monitor = Arc::new(MinLsaMonitor::new());
            let engine = ParallelRedoEngine::new(
                config.parallel_count,
                config.job_queue_capacity,
                Arc::clone(&monitor),
                Arc::clone(&context),
                Arc::clone(&log),
            );
            (Some(engine), Some(monitor))
        } else {
            (None, None)
        };

        let core = Arc::new(ReplicatorCore {
            log: Arc::clone(&log),
            context,
            mvcc,
            redo_lsa: Mutex::new(start_redo_lsa),
            redo_lsa_advanced: Condvar::new(),
            engine,
            monitor,
        });

        let mut undo_zip = LogZip::new();
        undo_zip.realloc_if_needed(LOGAREA_SIZE);
        let mut redo_zip = LogZip::new();
        redo_zip.realloc_if_needed(LOGAREA_SIZE);

        let task = ProducerTask {
            core: Arc::clone(&core),
            reader: LogReader::new(log),
            undo_zip,
            redo_zip,
        };
        let daemon = Daemon::spawn("harbor-replicator", config.looper_period, task);

        Self {
            core,
            daemon: Some(daemon),
        }
    }

    /// The producer's current decode frontier.
    #[must_use]
    pub fn redo_lsa(&self) -> Lsa {
        *self.core.redo_lsa.lock()
    }

    /// Blocks until everything appended so far has been dispatched and, in
    /// parallel mode, applied.
    ///
    /// The engine is drained but not stopped: the producer daemon is still
    /// running, and teardown symmetry keeps the engine alive until
    /// [`Replicator::shutdown`].
    pub fn wait_replication_finish_during_shutdown(&self) {
        let mut redo_lsa = self.core.redo_lsa.lock();
        self.core
            .redo_lsa_advanced
            .wait_while(&mut redo_lsa, |redo_lsa| {
                *redo_lsa < self.core.log.nxio_lsa()
            });
        drop(redo_lsa);

        if let Some(engine) = &self.core.engine {
            engine.wait_for_idle();
        }
    }

    /// Blocks until replication has passed `target`.
    ///
    /// In synchronous mode this waits for the decode frontier to move
    /// strictly past the target; in parallel mode it waits on the minimum
    /// unapplied address, the stronger guarantee that every record up to
    /// and including the target has been applied.
    pub fn wait_past_target_lsa(&self, target: Lsa) {
        match &self.core.monitor {
            Some(monitor) => monitor.wait_past_target_lsa(target),
            None => {
                let mut redo_lsa = self.core.redo_lsa.lock();
                self.core
                    .redo_lsa_advanced
                    .wait_while(&mut redo_lsa, |redo_lsa| *redo_lsa <= target);
            }
        }
    }

    /// Stops the producer, closes the engine input and joins the workers.
    pub fn shutdown(mut self) -> ReplicationResult<()> {
        self.shutdown_inner()
    }

    fn shutdown_inner(&mut self) -> ReplicationResult<()> {
        let mut result = Ok(());

        if let Some(mut daemon) = self.daemon.take() {
            if daemon.stop().is_err() {
                result = Err(ReplicationError::ProducerPanicked);
            }
        }

        if let Some(engine) = &self.core.engine {
            // This is the earliest point where no records can be added.
            engine.set_adding_finished();
            let termination = engine.wait_for_termination_and_stop_execution();
            if result.is_ok() {
                result = termination;
            }
        }

        result
    }
}

impl Drop for Replicator {
    fn drop(&mut self) {
        let _ = self.shutdown_inner();
    }
}

impl std::fmt::Debug for Replicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replicator")
            .field("redo_lsa", &self.redo_lsa())
            .field("parallel", &self.core.engine.is_some())
            .finish()
    }
}

/// The producer: runs on the replication daemon, decoding and dispatching
/// records from the current frontier toward the log's high-water mark.
struct ProducerTask {
    core: Arc<ReplicatorCore>,
    reader: LogReader,
    undo_zip: LogZip,
    redo_zip: LogZip,
}

impl DaemonTask for ProducerTask {
    fn execute(&mut self) {
        if let Err(producer_error) = self.catch_up() {
            error!(error = %producer_error, "fatal log replication error");
            panic!("fatal log replication error: {producer_error}");
        }
    }

    fn retire(&mut self) {
        // The daemon is exiting; everything decoded so far has been
        // dispatched, so draining here leaves the engine idle but alive.
        if let Some(engine) = &self.core.engine {
            engine.wait_for_idle();
        }
    }
}

impl ProducerTask {
    /// One scheduling callback: replicate until the frontier catches up
    /// with the log's current high-water mark.
    fn catch_up(&mut self) -> ReplicationResult<()> {
        loop {
            let nxio_lsa = self.core.log.nxio_lsa();
            let redo_lsa = *self.core.redo_lsa.lock();
            if redo_lsa < nxio_lsa {
                self.redo_upto(nxio_lsa)?;
            } else {
                return Ok(());
            }
        }
    }

    fn redo_upto(&mut self, end_redo_lsa: Lsa) -> ReplicationResult<()> {
        let mut redo_lsa = *self.core.redo_lsa.lock();
        debug_assert!(redo_lsa < end_redo_lsa);

        // Refresh the page under the cursor; records may have been appended
        // into its tail since the last fetch.
        self.reader
            .set_lsa_and_fetch_page(redo_lsa, FetchMode::Force)?;

        let mut record_timer = Instant::now();
        while redo_lsa < end_redo_lsa {
            self.reader
                .set_lsa_and_fetch_page(redo_lsa, FetchMode::Normal)?;
            let header: RecordHeader = self.reader.copy_aligned()?;

            if header.forward_lsa <= redo_lsa {
                return Err(ReplicationError::NonAdvancingRecord {
                    lsa: redo_lsa,
                    forward: header.forward_lsa,
                });
            }

            match header.record_type {
                RecordType::RedoData => {
                    self.read_and_redo::<RedoData>(header.record_type, redo_lsa)?;
                }
                RecordType::MvccRedoData => {
                    self.read_and_redo::<MvccRedoData>(header.record_type, redo_lsa)?;
                }
                RecordType::UndoRedoData | RecordType::DiffUndoRedoData => {
                    self.read_and_redo::<UndoRedoData>(header.record_type, redo_lsa)?;
                }
                RecordType::MvccUndoRedoData | RecordType::MvccDiffUndoRedoData => {
                    self.read_and_redo::<MvccUndoRedoData>(header.record_type, redo_lsa)?;
                }
                RecordType::RunPostpone => {
                    self.read_and_redo::<RunPostpone>(header.record_type, redo_lsa)?;
                }
                RecordType::Compensate => {
                    self.read_and_redo::<Compensate>(header.record_type, redo_lsa)?;
                }
                RecordType::DbExternRedoData => {
                    self.redo_dbextern(redo_lsa)?;
                }
                RecordType::Commit | RecordType::Abort => {
                    self.delay_or_dispatch::<DoneTime>(redo_lsa)?;
                }
                RecordType::DummyHaServerState => {
                    self.delay_or_dispatch::<HaServerState>(redo_lsa)?;
                }
                _ => {
                    // Not interpreted; skipped via the forward address.
                }
            }

            {
                let mut frontier = self.core.redo_lsa.lock();
                *frontier = header.forward_lsa;
            }
            redo_lsa = header.forward_lsa;

            if let Some(monitor) = &self.core.monitor {
                monitor.set_producer_frontier(redo_lsa);
            }

            // Notify every step so waiters track progress accurately.
            self.core.redo_lsa_advanced.notify_all();

            self.core
                .context
                .sink
                .add_duration(Stat::RedoReplLogRedoSync, record_timer.elapsed());
            record_timer = Instant::now();
        }

        Ok(())
    }

    /// Decodes a page-bound record body and routes it: MVCC bookkeeping,
    /// then either the statistics path or the generic redo pipeline.
    fn read_and_redo<T>(&mut self, rectype: RecordType, rec_lsa: Lsa) -> ReplicationResult<()>
    where
        T: RedoBody + Into<RedoRecord>,
    {
        let body: T = self.reader.copy_aligned()?;

        // Reads on the page server require the next MVCC id to stay above
        // every id in the database.
        self.core.mvcc.advance_past(body.mvccid());

        let record: RedoRecord = body.into();
        let data = record.log_data();

        if data.rcvindex == RcvIndex::BtreeStatsCommit {
            return self.read_and_redo_btree_stats(rectype, rec_lsa, &record);
        }

        if let Some(engine) = &self.core.engine {
            engine.add(RedoJob::generic(data.vpid, rec_lsa, rectype, record))?;
        } else {
            let mut payload = Vec::new();
            redo::read_redo_payload_at_cursor(
                &mut self.reader,
                &mut self.undo_zip,
                &mut self.redo_zip,
                rectype,
                &record,
                &mut payload,
            )?;
            redo::apply_page_redo(
                &self.core.context.buffer,
                RecoveryTable::global(),
                data.vpid,
                rec_lsa,
                &data,
                &payload,
            )?;
        }
        Ok(())
    }

    /// Statistics are not applied the way recovery usually applies redo:
    /// the root page identity lives in the payload, so the payload is read
    /// here, on the producer, and the page update travels as its own job.
    fn read_and_redo_btree_stats(
        &mut self,
        rectype: RecordType,
        rec_lsa: Lsa,
        record: &RedoRecord,
    ) -> ReplicationResult<()> {
        let mut payload = Vec::new();
        redo::read_redo_payload_at_cursor(
            &mut self.reader,
            &mut self.undo_zip,
            &mut self.redo_zip,
            rectype,
            record,
            &mut payload,
        )?;
        let (btid, stats) = btree::parse_stats_payload(&payload)?;
        let root_vpid = btid.root_vpid();

        if let Some(engine) = &self.core.engine {
            engine.add(RedoJob::btree_stats(root_vpid, rec_lsa, stats))?;
        } else {
            btree::replicate_btree_stats(&self.core.context.buffer, root_vpid, rec_lsa, stats)?;
        }
        Ok(())
    }

    /// Database-external redo is not page-bound; it runs synchronously
    /// regardless of the parallelism setting.
    fn redo_dbextern(&mut self, rec_lsa: Lsa) -> ReplicationResult<()> {
        let body: DbExternRedo = self.reader.copy_aligned()?;
        let mut payload = Vec::new();
        self.reader.copy_payload(body.length as usize, &mut payload)?;

        let mut ctx = RedoContext {
            page: None,
            payload: &payload,
            offset: 0,
            rcv_lsa: rec_lsa,
        };
        (RecoveryTable::global().entry(body.rcvindex).redo)(&mut ctx)?;
        Ok(())
    }

    /// Computes the replication delay for a done record, or dispatches a
    /// sentinel job so the delta reflects worker-queue latency too.
    fn delay_or_dispatch<T: TimedBody>(&mut self, rec_lsa: Lsa) -> ReplicationResult<()> {
        let body: T = self.reader.copy_aligned()?;
        let start_time_msec = body.at_time_msec();

        if let Some(engine) = &self.core.engine {
            engine.add(RedoJob::replication_delay(rec_lsa, start_time_msec))?;
        } else {
            delay::calculate_replication_delay(
                self.core.context.sink.as_ref(),
                self.core.context.trace_delay,
                start_time_msec,
            );
        }
        Ok(())
    }
}
