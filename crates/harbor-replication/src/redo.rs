//! Generic redo pipeline.
//!
//! The producer decodes a record's fixed body in log order; the payloads
//! (undo image, then redo image) are read either inline on the producer
//! (synchronous mode) or re-read by a worker from its own cursor
//! (parallel mode). Either way the redo image ends up applied through the
//! recovery dispatch table, guarded by the page's last applied address.

use harbor_buffer::PageBuffer;
use harbor_common::types::{Lsa, Vpid};
use harbor_log::reader::{FetchMode, LogReader};
use harbor_log::record::{DataFlags, LogData, RecordHeader, RecordType, RedoRecord, xor_fold};
use harbor_log::zip::LogZip;

use crate::error::ReplicationResult;
use crate::job::WorkerContext;
use crate::recovery::{RecoveryTable, RedoContext};

/// Reads a record's redo image with the cursor already positioned right
/// past the fixed body, decompressing and unfolding as the record demands.
pub(crate) fn read_redo_payload_at_cursor(
    reader: &mut LogReader,
    undo_zip: &mut LogZip,
    redo_zip: &mut LogZip,
    rectype: RecordType,
    record: &RedoRecord,
    out: &mut Vec<u8>,
) -> ReplicationResult<()> {
    out.clear();
    let flags = record.flags();

    // The undo image precedes the redo image. Diff records need it to
    // unfold the redo image; anything else skips over it.
    let undo_length = record.undo_length();
    let mut undo_raw = Vec::new();
    if undo_length > 0 {
        if rectype.is_diff() {
            let mut stored = Vec::new();
            reader.copy_payload(undo_length, &mut stored)?;
            if flags.contains(DataFlags::UNDO_COMPRESSED) {
                undo_raw.extend_from_slice(undo_zip.decompress(&stored)?);
            } else {
                undo_raw = stored;
            }
        } else {
            reader.skip_payload(undo_length);
        }
    }

    let mut stored = Vec::new();
    reader.copy_payload(record.redo_length(), &mut stored)?;
    if flags.contains(DataFlags::REDO_COMPRESSED) {
        out.extend_from_slice(redo_zip.decompress(&stored)?);
    } else {
        *out = stored;
    }

    if rectype.is_diff() {
        xor_fold(out, &undo_raw);
    }

    Ok(())
}

/// Re-reads a record's redo image from scratch: seeks to the record, skips
/// the header and the fixed body, then delegates to the cursor variant.
///
/// Workers call this; the forced fetch guarantees the page snapshot is not
/// older than the record.
pub(crate) fn read_redo_payload(
    reader: &mut LogReader,
    undo_zip: &mut LogZip,
    redo_zip: &mut LogZip,
    rec_lsa: Lsa,
    rectype: RecordType,
    record: &RedoRecord,
    out: &mut Vec<u8>,
) -> ReplicationResult<()> {
    reader.set_lsa_and_fetch_page(rec_lsa, FetchMode::Force)?;
    let _header: RecordHeader = reader.copy_aligned()?;
    reader.skip_aligned(record.fixed_size());
    read_redo_payload_at_cursor(reader, undo_zip, redo_zip, rectype, record, out)
}

/// Applies a redo image to its page through the dispatch table.
///
/// The change is applied only when the page's last applied address is older
/// than the record; either way the fix/unfix cycle completes, so replaying
/// a prefix twice leaves pages byte-identical.
pub(crate) fn apply_page_redo(
    buffer: &PageBuffer,
    table: &RecoveryTable,
    vpid: Vpid,
    rec_lsa: Lsa,
    data: &LogData,
    payload: &[u8],
) -> ReplicationResult<()> {
    let page = buffer.fix_for_redo(vpid)?;
    if page.page_lsa() >= rec_lsa {
        // Already applied.
        return Ok(());
    }

    let mut ctx = RedoContext {
        page: Some(&page),
        payload,
        offset: data.offset,
        rcv_lsa: rec_lsa,
    };
    (table.entry(data.rcvindex).redo)(&mut ctx)?;

    page.set_lsa(rec_lsa);
    page.set_dirty_and_free();
    Ok(())
}

/// Worker-side entry: re-reads the record's payloads and applies the redo
/// image to the job's page.
pub(crate) fn apply_generic_redo(
    ctx: &mut WorkerContext,
    vpid: Vpid,
    rec_lsa: Lsa,
    rectype: RecordType,
    record: &RedoRecord,
) -> ReplicationResult<()> {
    let WorkerContext {
        reader,
        undo_zip,
        redo_zip,
        shared,
    } = ctx;

    let mut payload = Vec::new();
    read_redo_payload(
        reader,
        undo_zip,
        redo_zip,
        rec_lsa,
        rectype,
        record,
        &mut payload,
    )?;
    apply_page_redo(
        &shared.buffer,
        RecoveryTable::global(),
        vpid,
        rec_lsa,
        &record.log_data(),
        &payload,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbor_common::constants::LOGAREA_SIZE;
    use harbor_log::memory::MemoryLog;
    use harbor_log::record::{RcvIndex, RedoData, UndoRedoData};
    use std::sync::Arc;

    fn reader_past_body(
        log: &Arc<MemoryLog>,
        rec_lsa: Lsa,
        fixed_size: usize,
    ) -> LogReader {
        let mut reader = LogReader::new(Arc::clone(log) as Arc<dyn harbor_log::source::LogSource>);
        reader
            .set_lsa_and_fetch_page(rec_lsa, FetchMode::Normal)
            .unwrap();
        let _header: RecordHeader = reader.copy_aligned().unwrap();
        reader.skip_aligned(fixed_size);
        reader
    }

    fn zips() -> (LogZip, LogZip) {
        let mut undo = LogZip::new();
        undo.realloc_if_needed(LOGAREA_SIZE);
        let mut redo = LogZip::new();
        redo.realloc_if_needed(LOGAREA_SIZE);
        (undo, redo)
    }

    #[test]
    fn test_plain_redo_payload() {
        let log = Arc::new(MemoryLog::new());
        let data = LogData::new(RcvIndex::HeapRecordWrite, Vpid::new(1, 7), 0);
        let rec_lsa = log.append_redo(1, data, b"payload", false);

        let mut reader = reader_past_body(&log, rec_lsa, RedoData::SIZE);
        let record = RedoRecord::Redo(RedoData {
            data,
            length: 7,
            flags: DataFlags::empty(),
        });

        let (mut undo_zip, mut redo_zip) = zips();
        let mut out = Vec::new();
        read_redo_payload_at_cursor(
            &mut reader,
            &mut undo_zip,
            &mut redo_zip,
            RecordType::RedoData,
            &record,
            &mut out,
        )
        .unwrap();
        assert_eq!(out, b"payload");
    }

    #[test]
    fn test_diff_redo_payload_unfolds() {
        let log = Arc::new(MemoryLog::new());
        let data = LogData::new(RcvIndex::HeapRecordWrite, Vpid::new(1, 7), 0);
        let undo = b"old image bytes";
        let redo = b"new image bytes";
        let rec_lsa = log.append_undoredo(1, data, undo, redo, true);

        let mut reader = reader_past_body(&log, rec_lsa, UndoRedoData::SIZE);
        let record = RedoRecord::UndoRedo(UndoRedoData {
            data,
            undo_length: undo.len() as u32,
            redo_length: redo.len() as u32,
            flags: DataFlags::empty(),
        });

        let (mut undo_zip, mut redo_zip) = zips();
        let mut out = Vec::new();
        read_redo_payload_at_cursor(
            &mut reader,
            &mut undo_zip,
            &mut redo_zip,
            RecordType::DiffUndoRedoData,
            &record,
            &mut out,
        )
        .unwrap();
        assert_eq!(out, redo);
    }

    #[test]
    fn test_apply_respects_page_lsa() {
        let buffer = PageBuffer::with_page_size(256);
        let vpid = Vpid::new(1, 7);
        let data = LogData::new(RcvIndex::HeapRecordWrite, vpid, 0);

        apply_page_redo(
            &buffer,
            RecoveryTable::global(),
            vpid,
            Lsa::new(0, 100),
            &data,
            b"B",
        )
        .unwrap();

        // An older record must not overwrite the newer image.
        apply_page_redo(
            &buffer,
            RecoveryTable::global(),
            vpid,
            Lsa::new(0, 40),
            &data,
            b"A",
        )
        .unwrap();

        let page = buffer.fix_for_read(vpid).unwrap();
        assert_eq!(page.data()[0], b'B');
        assert_eq!(page.page_lsa(), Lsa::new(0, 100));
    }
}
