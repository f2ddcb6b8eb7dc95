//! B-tree unique statistics replication.
//!
//! Ordinary recovery keeps b-tree unique statistics in memory and never
//! writes them into the root page. On the page server any reader
//! transaction may fetch the root page and expects authoritative statistics
//! there, so replication materializes them directly into the page.

use bytes::{Buf, BufMut};

use harbor_buffer::PageBuffer;
use harbor_common::types::{BtreeId, Lsa, UniqueStats, Vpid};
use harbor_log::record::RcvIndex;

use crate::error::{ReplicationError, ReplicationResult};

/// Byte offsets of the statistics inside a b-tree root page.
const ROOT_NUM_KEYS_OFFSET: usize = 0;
const ROOT_NUM_OIDS_OFFSET: usize = 8;
const ROOT_NUM_NULLS_OFFSET: usize = 16;

/// Serialized size of a statistics-commit payload.
pub const STATS_PAYLOAD_SIZE: usize = 36;

/// Encodes a statistics-commit payload: the b-tree id followed by the
/// statistics triple.
#[must_use]
pub fn encode_stats_payload(btid: BtreeId, stats: UniqueStats) -> Vec<u8> {
    let mut buf = Vec::with_capacity(STATS_PAYLOAD_SIZE);
    buf.put_i16(btid.volume);
    buf.put_i32(btid.fileid);
    buf.put_i32(btid.root_page);
    buf.put_u16(0); // padding
    buf.put_i64(stats.num_keys);
    buf.put_i64(stats.num_oids);
    buf.put_i64(stats.num_nulls);
    buf
}

/// Parses a statistics-commit payload back into the b-tree id and the
/// statistics.
pub fn parse_stats_payload(payload: &[u8]) -> ReplicationResult<(BtreeId, UniqueStats)> {
    if payload.len() < STATS_PAYLOAD_SIZE {
        return Err(ReplicationError::handler_failed(
            RcvIndex::BtreeStatsCommit,
            Lsa::NULL,
            format!(
                "statistics payload of {} bytes, expected {}",
                payload.len(),
                STATS_PAYLOAD_SIZE
            ),
        ));
    }

    let mut buf = payload;
    let volume = buf.get_i16();
    let fileid = buf.get_i32();
    let root_page = buf.get_i32();
    let _padding = buf.get_u16();
    let num_keys = buf.get_i64();
    let num_oids = buf.get_i64();
    let num_nulls = buf.get_i64();

    Ok((
        BtreeId::new(volume, fileid, root_page),
        UniqueStats::new(num_keys, num_oids, num_nulls),
    ))
}

/// Materializes statistics into the b-tree root page and stamps it with the
/// record's address.
pub(crate) fn replicate_btree_stats(
    buffer: &PageBuffer,
    root_vpid: Vpid,
    rec_lsa: Lsa,
    stats: UniqueStats,
) -> ReplicationResult<()> {
    let page = buffer.fix_for_redo(root_vpid)?;
    if page.page_lsa() >= rec_lsa {
        // Already applied.
        return Ok(());
    }

    page.put_i64_at(ROOT_NUM_KEYS_OFFSET, stats.num_keys)?;
    page.put_i64_at(ROOT_NUM_OIDS_OFFSET, stats.num_oids)?;
    page.put_i64_at(ROOT_NUM_NULLS_OFFSET, stats.num_nulls)?;
    page.set_lsa(rec_lsa);
    page.set_dirty_and_free();
    Ok(())
}

/// Reads the statistics currently stored in a root page.
pub fn read_root_stats(buffer: &PageBuffer, root_vpid: Vpid) -> ReplicationResult<UniqueStats> {
    let page = buffer.fix_for_read(root_vpid)?;
    Ok(UniqueStats::new(
        page.i64_at(ROOT_NUM_KEYS_OFFSET),
        page.i64_at(ROOT_NUM_OIDS_OFFSET),
        page.i64_at(ROOT_NUM_NULLS_OFFSET),
    ))
}
