//! In-memory transactional redo log.
//!
//! Stands in for the active server: the writer half appends well-formed
//! records (alignment, page spill, compression, diff folding) and publishes
//! the high-water mark only once a record is fully materialized, so a
//! reader polling `nxio_lsa` never observes a half-written record.

use parking_lot::RwLock;

use harbor_common::constants::LOG_PAGE_DATA_SIZE;
use harbor_common::types::{AtomicLsa, Lsa, MvccId};

use crate::error::{LogError, LogResult};
use crate::page::LogPage;
use crate::record::{
    align_up, Compensate, DataFlags, DbExternRedo, DoneTime, FixedBody, HaServerState, LogData,
    MvccRedoData, MvccUndoRedoData, RcvIndex, RecordHeader, RecordType, RedoData, RunPostpone,
    UndoRedoData, xor_fold,
};
use crate::source::LogSource;
use crate::zip;

/// In-memory append-only log.
pub struct MemoryLog {
    inner: RwLock<LogInner>,
    nxio: AtomicLsa,
}

struct LogInner {
    pages: Vec<LogPage>,
    append: Lsa,
    prev_record: Lsa,
}

impl MemoryLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(LogInner {
                pages: Vec::new(),
                append: Lsa::new(0, 0),
                prev_record: Lsa::NULL,
            }),
            nxio: AtomicLsa::new(Lsa::new(0, 0)),
        }
    }

    /// Appends a redo-only record.
    pub fn append_redo(&self, trid: u32, data: LogData, payload: &[u8], compress: bool) -> Lsa {
        let (stored, flags) = stored_payload(payload, compress);
        let body = RedoData {
            data,
            length: stored.len() as u32,
            flags,
        };
        self.append_record(trid, RecordType::RedoData, &serialize(&body), &[&stored])
    }

    /// Appends an MVCC redo-only record.
    pub fn append_mvcc_redo(
        &self,
        trid: u32,
        data: LogData,
        mvccid: MvccId,
        payload: &[u8],
        compress: bool,
    ) -> Lsa {
        let (stored, flags) = stored_payload(payload, compress);
        let body = MvccRedoData {
            redo: RedoData {
                data,
                length: stored.len() as u32,
                flags,
            },
            mvccid,
        };
        self.append_record(trid, RecordType::MvccRedoData, &serialize(&body), &[&stored])
    }

    /// Appends an undo/redo record; with `diff` set the redo image is
    /// stored folded against the undo image.
    pub fn append_undoredo(
        &self,
        trid: u32,
        data: LogData,
        undo: &[u8],
        redo: &[u8],
        diff: bool,
    ) -> Lsa {
        let mut stored_redo = redo.to_vec();
        if diff {
            xor_fold(&mut stored_redo, undo);
        }
        let body = UndoRedoData {
            data,
            undo_length: undo.len() as u32,
            redo_length: stored_redo.len() as u32,
            flags: DataFlags::empty(),
        };
        let record_type = if diff {
            RecordType::DiffUndoRedoData
        } else {
            RecordType::UndoRedoData
        };
        self.append_record(trid, record_type, &serialize(&body), &[undo, &stored_redo])
    }

    /// Appends an MVCC undo/redo record; with `diff` set the redo image is
    /// stored folded against the undo image.
    pub fn append_mvcc_undoredo(
        &self,
        trid: u32,
        data: LogData,
        mvccid: MvccId,
        undo: &[u8],
        redo: &[u8],
        diff: bool,
    ) -> Lsa {
        let mut stored_redo = redo.to_vec();
        if diff {
            xor_fold(&mut stored_redo, undo);
        }
        let body = MvccUndoRedoData {
            undoredo: UndoRedoData {
                data,
                undo_length: undo.len() as u32,
                redo_length: stored_redo.len() as u32,
                flags: DataFlags::empty(),
            },
            mvccid,
        };
        let record_type = if diff {
            RecordType::MvccDiffUndoRedoData
        } else {
            RecordType::MvccUndoRedoData
        };
        self.append_record(trid, record_type, &serialize(&body), &[undo, &stored_redo])
    }

    /// Appends a postpone-run record.
    pub fn append_run_postpone(
        &self,
        trid: u32,
        data: LogData,
        ref_lsa: Lsa,
        payload: &[u8],
    ) -> Lsa {
        let body = RunPostpone {
            data,
            length: payload.len() as u32,
            ref_lsa,
        };
        self.append_record(trid, RecordType::RunPostpone, &serialize(&body), &[payload])
    }

    /// Appends a compensation record.
    pub fn append_compensate(
        &self,
        trid: u32,
        data: LogData,
        undo_nxlsa: Lsa,
        payload: &[u8],
    ) -> Lsa {
        let body = Compensate {
            data,
            length: payload.len() as u32,
            undo_nxlsa,
        };
        self.append_record(trid, RecordType::Compensate, &serialize(&body), &[payload])
    }

    /// Appends a database-external redo record.
    pub fn append_dbextern_redo(&self, trid: u32, rcvindex: RcvIndex, payload: &[u8]) -> Lsa {
        let body = DbExternRedo {
            rcvindex,
            length: payload.len() as u32,
        };
        self.append_record(
            trid,
            RecordType::DbExternRedoData,
            &serialize(&body),
            &[payload],
        )
    }

    /// Appends a commit record.
    pub fn append_commit(&self, trid: u32, at_time_msec: i64) -> Lsa {
        let body = DoneTime { at_time_msec };
        self.append_record(trid, RecordType::Commit, &serialize(&body), &[])
    }

    /// Appends an abort record.
    pub fn append_abort(&self, trid: u32, at_time_msec: i64) -> Lsa {
        let body = DoneTime { at_time_msec };
        self.append_record(trid, RecordType::Abort, &serialize(&body), &[])
    }

    /// Appends an HA server state heartbeat.
    pub fn append_ha_server_state(&self, trid: u32, state: u8, at_time_msec: i64) -> Lsa {
        let body = HaServerState {
            state,
            at_time_msec,
        };
        self.append_record(
            trid,
            RecordType::DummyHaServerState,
            &serialize(&body),
            &[],
        )
    }

    /// Appends a record of a type the replicator does not interpret.
    pub fn append_other(&self, trid: u32, raw_type: u8) -> Lsa {
        self.append_record(trid, RecordType::from_u8(raw_type), &[], &[])
    }

    fn append_record(
        &self,
        trid: u32,
        record_type: RecordType,
        body: &[u8],
        payloads: &[&[u8]],
    ) -> Lsa {
        let mut inner = self.inner.write();
        let LogInner {
            pages,
            append,
            prev_record,
        } = &mut *inner;

        let mut cursor = WriteCursor { lsa: *append };

        // The previous append left room for a full header; spilling here is
        // a no-op kept for symmetry with the reader.
        cursor.advance_when_does_not_fit(RecordHeader::SIZE);
        let rec_lsa = cursor.lsa;

        cursor.write_fixed(pages, &[0u8; RecordHeader::SIZE]);
        if !body.is_empty() {
            cursor.write_fixed(pages, body);
        }
        for payload in payloads {
            cursor.write_payload(pages, payload);
        }

        // The next record's header must not split a page.
        let mut forward = cursor.lsa;
        if LOG_PAGE_DATA_SIZE - (forward.offset as usize) < RecordHeader::SIZE {
            forward = Lsa::new(forward.pageid + 1, 0);
        }

        let header = RecordHeader {
            record_type,
            trid,
            back_lsa: *prev_record,
            forward_lsa: forward,
        };
        let header_bytes = serialize(&header);
        let page = &mut pages[rec_lsa.pageid as usize];
        let offset = rec_lsa.offset as usize;
        page.data_mut()[offset..offset + RecordHeader::SIZE].copy_from_slice(&header_bytes);

        *prev_record = rec_lsa;
        *append = forward;
        drop(inner);

        // Publish only after the record is fully written.
        self.nxio.store(forward);
        rec_lsa
    }
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSource for MemoryLog {
    fn nxio_lsa(&self) -> Lsa {
        self.nxio.load()
    }

    fn fetch_page(&self, pageid: i64) -> LogResult<LogPage> {
        if pageid < 0 {
            return Err(LogError::InvalidPageId { pageid });
        }

        let inner = self.inner.read();
        // Pages past the append point read as formatted-but-empty, the way
        // a pre-allocated log volume does.
        Ok(inner
            .pages
            .get(pageid as usize)
            .cloned()
            .unwrap_or_else(|| LogPage::new(pageid)))
    }
}

/// Append position that mirrors the reader's layout discipline.
struct WriteCursor {
    lsa: Lsa,
}

impl WriteCursor {
    fn advance_when_does_not_fit(&mut self, size: usize) {
        if self.lsa.offset as usize + size > LOG_PAGE_DATA_SIZE {
            self.lsa = Lsa::new(self.lsa.pageid + 1, 0);
        }
    }

    fn align(&mut self) {
        let aligned = align_up(self.lsa.offset as usize);
        if aligned >= LOG_PAGE_DATA_SIZE {
            self.lsa = Lsa::new(self.lsa.pageid + 1, 0);
        } else {
            self.lsa.offset = aligned as i16;
        }
    }

    /// Writes a structure contiguously, spilling to the next page first if
    /// it does not fit, then re-aligns.
    fn write_fixed(&mut self, pages: &mut Vec<LogPage>, bytes: &[u8]) {
        self.advance_when_does_not_fit(bytes.len());
        let offset = self.lsa.offset as usize;
        let page = ensure_page(pages, self.lsa.pageid);
        page.data_mut()[offset..offset + bytes.len()].copy_from_slice(bytes);
        self.lsa.offset += bytes.len() as i16;
        self.align();
    }

    /// Writes payload bytes, spilling across pages, then re-aligns.
    fn write_payload(&mut self, pages: &mut Vec<LogPage>, bytes: &[u8]) {
        let mut written = 0;
        while written < bytes.len() {
            if self.lsa.offset as usize >= LOG_PAGE_DATA_SIZE {
                self.lsa = Lsa::new(self.lsa.pageid + 1, 0);
            }
            let offset = self.lsa.offset as usize;
            let take = (bytes.len() - written).min(LOG_PAGE_DATA_SIZE - offset);
            let page = ensure_page(pages, self.lsa.pageid);
            page.data_mut()[offset..offset + take].copy_from_slice(&bytes[written..written + take]);
            self.lsa.offset += take as i16;
            written += take;
        }

        self.align();
    }
}

fn ensure_page(pages: &mut Vec<LogPage>, pageid: i64) -> &mut LogPage {
    while pages.len() <= pageid as usize {
        pages.push(LogPage::new(pages.len() as i64));
    }
    &mut pages[pageid as usize]
}

fn serialize<T: FixedBody>(body: &T) -> Vec<u8> {
    let mut buf = Vec::with_capacity(T::SIZE);
    body.serialize(&mut buf);
    debug_assert_eq!(buf.len(), T::SIZE);
    buf
}

fn stored_payload(payload: &[u8], compress: bool) -> (Vec<u8>, DataFlags) {
    if compress {
        (zip::compress_payload(payload), DataFlags::REDO_COMPRESSED)
    } else {
        (payload.to_vec(), DataFlags::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{FetchMode, LogReader};
    use crate::record::RedoRecord;
    use harbor_common::types::Vpid;
    use std::sync::Arc;

    fn data_at(vpid: Vpid, offset: u16) -> LogData {
        LogData::new(RcvIndex::HeapRecordWrite, vpid, offset)
    }

    #[test]
    fn test_empty_log() {
        let log = MemoryLog::new();
        assert_eq!(log.nxio_lsa(), Lsa::new(0, 0));
        let page = log.fetch_page(5).unwrap();
        assert!(page.data().iter().all(|&b| b == 0));
        assert!(log.fetch_page(-1).is_err());
    }

    #[test]
    fn test_nxio_advances_per_record() {
        let log = MemoryLog::new();
        let first = log.append_commit(1, 100);
        let after_first = log.nxio_lsa();
        let second = log.append_commit(2, 200);
        let after_second = log.nxio_lsa();

        assert_eq!(first, Lsa::new(0, 0));
        assert_eq!(second, after_first);
        assert!(after_first < after_second);
    }

    #[test]
    fn test_back_lsa_chain() {
        let log = Arc::new(MemoryLog::new());
        let first = log.append_commit(1, 1);
        let second = log.append_commit(1, 2);

        let mut reader = LogReader::new(log);
        reader
            .set_lsa_and_fetch_page(second, FetchMode::Normal)
            .unwrap();
        let header: RecordHeader = reader.copy_aligned().unwrap();
        assert_eq!(header.back_lsa, first);
    }

    #[test]
    fn test_records_fill_many_pages() {
        let log = Arc::new(MemoryLog::new());
        let mut lsas = Vec::new();
        for i in 0..500u32 {
            let payload = vec![(i % 256) as u8; 100];
            lsas.push(log.append_redo(i, data_at(Vpid::new(1, 7), 0), &payload, false));
        }
        assert!(log.nxio_lsa().pageid > 0);

        // Walk the whole chain through the reader.
        let mut reader = LogReader::new(Arc::clone(&log) as Arc<dyn LogSource>);
        let mut at = lsas[0];
        for expected in &lsas {
            assert_eq!(at, *expected);
            reader.set_lsa_and_fetch_page(at, FetchMode::Normal).unwrap();
            let header: RecordHeader = reader.copy_aligned().unwrap();
            assert_eq!(header.record_type, RecordType::RedoData);
            at = header.forward_lsa;
        }
        assert_eq!(at, log.nxio_lsa());
    }

    #[test]
    fn test_compressed_payload_roundtrip() {
        let log = Arc::new(MemoryLog::new());
        let payload = vec![42u8; 600];
        let rec_lsa = log.append_redo(1, data_at(Vpid::new(1, 7), 0), &payload, true);

        let mut reader = LogReader::new(log);
        reader
            .set_lsa_and_fetch_page(rec_lsa, FetchMode::Normal)
            .unwrap();
        let _header: RecordHeader = reader.copy_aligned().unwrap();
        let body: RedoData = reader.copy_aligned().unwrap();
        assert!(body.flags.contains(DataFlags::REDO_COMPRESSED));
        assert!((body.length as usize) < payload.len());

        let mut stored = Vec::new();
        reader.copy_payload(body.length as usize, &mut stored).unwrap();
        let mut unzip = zip::LogZip::new();
        assert_eq!(unzip.decompress(&stored).unwrap(), &payload[..]);
    }

    #[test]
    fn test_diff_record_unfolds() {
        let log = Arc::new(MemoryLog::new());
        let undo = b"old page image";
        let redo = b"new page image";
        let rec_lsa = log.append_undoredo(1, data_at(Vpid::new(1, 7), 0), undo, redo, true);

        let mut reader = LogReader::new(log);
        reader
            .set_lsa_and_fetch_page(rec_lsa, FetchMode::Normal)
            .unwrap();
        let header: RecordHeader = reader.copy_aligned().unwrap();
        assert_eq!(header.record_type, RecordType::DiffUndoRedoData);

        let body: UndoRedoData = reader.copy_aligned().unwrap();
        let record = RedoRecord::from(body);
        assert_eq!(record.undo_length(), undo.len());
        assert_eq!(record.redo_length(), redo.len());

        let mut undo_read = Vec::new();
        reader
            .copy_payload(record.undo_length(), &mut undo_read)
            .unwrap();
        assert_eq!(undo_read, undo);

        let mut redo_read = Vec::new();
        reader
            .copy_payload(record.redo_length(), &mut redo_read)
            .unwrap();
        assert_ne!(redo_read, redo);

        xor_fold(&mut redo_read, &undo_read);
        assert_eq!(redo_read, redo);
    }
}
