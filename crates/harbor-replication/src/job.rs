//! Redo jobs and their execution environment.

use std::sync::Arc;

use harbor_buffer::PageBuffer;
use harbor_common::constants::LOGAREA_SIZE;
use harbor_common::types::{Lsa, UniqueStats, Vpid};
use harbor_log::reader::LogReader;
use harbor_log::record::{RecordType, RedoRecord};
use harbor_log::source::LogSource;
use harbor_log::zip::LogZip;

use crate::btree;
use crate::delay;
use crate::error::ReplicationResult;
use crate::metrics::MetricsSink;
use crate::redo;

/// Shared environment every redo execution sees.
pub struct ReplicationContext {
    /// Page buffer changes are applied to.
    pub buffer: Arc<PageBuffer>,
    /// Sink for replication statistics.
    pub sink: Arc<dyn MetricsSink>,
    /// Trace each computed replication delay sample.
    pub trace_delay: bool,
}

/// Per-worker state: an own log cursor and own decompression scratch.
pub(crate) struct WorkerContext {
    pub(crate) reader: LogReader,
    pub(crate) undo_zip: LogZip,
    pub(crate) redo_zip: LogZip,
    pub(crate) shared: Arc<ReplicationContext>,
}

impl WorkerContext {
    pub(crate) fn new(log: Arc<dyn LogSource>, shared: Arc<ReplicationContext>) -> Self {
        let mut undo_zip = LogZip::new();
        undo_zip.realloc_if_needed(LOGAREA_SIZE);
        let mut redo_zip = LogZip::new();
        redo_zip.realloc_if_needed(LOGAREA_SIZE);

        Self {
            reader: LogReader::new(log),
            undo_zip,
            redo_zip,
            shared,
        }
    }
}

/// Unit of work dispatched to the parallel redo engine.
///
/// A job binds a page identity and a record address to one of three
/// payloads; the engine orders jobs with equal non-sentinel identities by
/// their record address.
#[derive(Debug)]
pub struct RedoJob {
    vpid: Vpid,
    rec_lsa: Lsa,
    kind: RedoJobKind,
}

/// What a job does when a worker picks it up.
#[derive(Debug)]
pub enum RedoJobKind {
    /// Re-read the record's payloads and apply its redo portion to the
    /// target page.
    GenericRedo {
        /// Type of the originating record.
        rectype: RecordType,
        /// Decoded fixed body of the record.
        record: RedoRecord,
    },
    /// Materialize b-tree unique statistics into the root page.
    BtreeStats {
        /// Statistics to materialize.
        stats: UniqueStats,
    },
    /// Compute the end-to-end replication delay for a done record.
    ReplicationDelay {
        /// Record creation time on the active server, in milliseconds.
        start_time_msec: i64,
    },
}

impl RedoJob {
    /// Creates a generic page redo job.
    #[must_use]
    pub fn generic(vpid: Vpid, rec_lsa: Lsa, rectype: RecordType, record: RedoRecord) -> Self {
        Self {
            vpid,
            rec_lsa,
            kind: RedoJobKind::GenericRedo { rectype, record },
        }
    }

    /// Creates a b-tree statistics job against the given root page.
    #[must_use]
    pub fn btree_stats(root_vpid: Vpid, rec_lsa: Lsa, stats: UniqueStats) -> Self {
        Self {
            vpid: root_vpid,
            rec_lsa,
            kind: RedoJobKind::BtreeStats { stats },
        }
    }

    /// Creates a replication delay job.
    ///
    /// Delay jobs carry the sentinel page identity: they participate in
    /// global ordering but bind to no page, so the measured delta includes
    /// the time the job spent queued behind page work.
    #[must_use]
    pub fn replication_delay(rec_lsa: Lsa, start_time_msec: i64) -> Self {
        Self {
            vpid: Vpid::SENTINEL,
            rec_lsa,
            kind: RedoJobKind::ReplicationDelay { start_time_msec },
        }
    }

    /// Page identity the job binds to.
    #[inline]
    #[must_use]
    pub fn vpid(&self) -> Vpid {
        self.vpid
    }

    /// Address of the originating record.
    #[inline]
    #[must_use]
    pub fn rec_lsa(&self) -> Lsa {
        self.rec_lsa
    }

    pub(crate) fn execute(&self, ctx: &mut WorkerContext) -> ReplicationResult<()> {
        match &self.kind {
            RedoJobKind::GenericRedo { rectype, record } => {
                redo::apply_generic_redo(ctx, self.vpid, self.rec_lsa, *rectype, record)
            }
            RedoJobKind::BtreeStats { stats } => {
                btree::replicate_btree_stats(&ctx.shared.buffer, self.vpid, self.rec_lsa, *stats)
            }
            RedoJobKind::ReplicationDelay { start_time_msec } => {
                delay::calculate_replication_delay(
                    ctx.shared.sink.as_ref(),
                    ctx.shared.trace_delay,
                    *start_time_msec,
                );
                Ok(())
            }
        }
    }
}
