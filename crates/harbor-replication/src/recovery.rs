//! Recovery dispatch table.
//!
//! Every page-bound record names a recovery index; the index selects the
//! redo handler that knows how to apply the record's payload. The table is
//! static: the set of indices is a closed enumeration shared with the
//! active server.

use tracing::debug;

use harbor_buffer::PageWriteGuard;
use harbor_common::types::Lsa;
use harbor_log::record::RcvIndex;

use crate::error::{ReplicationError, ReplicationResult};

/// Execution context handed to a redo handler.
pub struct RedoContext<'a> {
    /// Page targeted by the record; `None` for database-external redo.
    pub page: Option<&'a PageWriteGuard>,
    /// Decoded redo payload bytes.
    pub payload: &'a [u8],
    /// Offset within the page the record targets.
    pub offset: u16,
    /// Address of the record being replayed.
    pub rcv_lsa: Lsa,
}

/// Redo handler signature.
pub type RedoFn = fn(&mut RedoContext<'_>) -> ReplicationResult<()>;

/// One dispatch entry.
pub struct RvEntry {
    /// Index this entry serves.
    pub rcvindex: RcvIndex,
    /// Redo handler.
    pub redo: RedoFn,
}

/// Static dispatch table keyed by recovery index.
pub struct RecoveryTable {
    entries: [RvEntry; RcvIndex::COUNT],
}

static RECOVERY_TABLE: RecoveryTable = RecoveryTable {
    entries: [
        RvEntry {
            rcvindex: RcvIndex::HeapRecordWrite,
            redo: heap_record_write_redo,
        },
        RvEntry {
            rcvindex: RcvIndex::PageCounterAdd,
            redo: page_counter_add_redo,
        },
        RvEntry {
            rcvindex: RcvIndex::BtreeStatsCommit,
            redo: btree_stats_commit_redo,
        },
        RvEntry {
            rcvindex: RcvIndex::VolumeExpand,
            redo: volume_expand_redo,
        },
    ],
};

impl RecoveryTable {
    /// The process-wide table.
    #[must_use]
    pub fn global() -> &'static RecoveryTable {
        &RECOVERY_TABLE
    }

    /// Looks up the entry for a recovery index.
    #[must_use]
    pub fn entry(&self, rcvindex: RcvIndex) -> &RvEntry {
        let entry = &self.entries[rcvindex.as_u16() as usize];
        debug_assert_eq!(entry.rcvindex, rcvindex);
        entry
    }
}

fn page_of<'a>(
    ctx: &'a RedoContext<'_>,
    rcvindex: RcvIndex,
) -> ReplicationResult<&'a PageWriteGuard> {
    ctx.page.ok_or_else(|| {
        ReplicationError::handler_failed(
            rcvindex,
            ctx.rcv_lsa,
            "page-bound redo invoked without a fixed page",
        )
    })
}

/// Copies the payload bytes into the page at the record's offset.
fn heap_record_write_redo(ctx: &mut RedoContext<'_>) -> ReplicationResult<()> {
    let page = page_of(ctx, RcvIndex::HeapRecordWrite)?;
    page.write_at(ctx.offset as usize, ctx.payload)?;
    Ok(())
}

/// Adds a little-endian i64 delta to a counter stored in the page.
fn page_counter_add_redo(ctx: &mut RedoContext<'_>) -> ReplicationResult<()> {
    let page = page_of(ctx, RcvIndex::PageCounterAdd)?;
    let delta: [u8; 8] = ctx.payload.try_into().map_err(|_| {
        ReplicationError::handler_failed(
            RcvIndex::PageCounterAdd,
            ctx.rcv_lsa,
            format!("expected an 8-byte delta, got {} bytes", ctx.payload.len()),
        )
    })?;
    let delta = i64::from_le_bytes(delta);

    let offset = ctx.offset as usize;
    let current = page.i64_at(offset)?;
    page.put_i64_at(offset, current.wrapping_add(delta))?;
    Ok(())
}

/// B-tree statistics never flow through the generic pipeline; replication
/// materializes them through its statistics path instead.
fn btree_stats_commit_redo(ctx: &mut RedoContext<'_>) -> ReplicationResult<()> {
    Err(ReplicationError::handler_failed(
        RcvIndex::BtreeStatsCommit,
        ctx.rcv_lsa,
        "statistics commit routed through the generic redo pipeline",
    ))
}

/// Database-external redo; nothing to apply on the page server.
fn volume_expand_redo(ctx: &mut RedoContext<'_>) -> ReplicationResult<()> {
    debug!(
        payload_len = ctx.payload.len(),
        rcv_lsa = %ctx.rcv_lsa,
        "volume expand redo"
    );
    Ok(())
}
