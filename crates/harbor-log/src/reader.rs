//! Log reading cursor.

use std::sync::Arc;

use harbor_common::constants::LOG_PAGE_DATA_SIZE;
use harbor_common::types::Lsa;

use crate::error::LogResult;
use crate::page::LogPage;
use crate::record::{align_up, FixedBody};
use crate::source::LogSource;

/// How `set_lsa_and_fetch_page` treats an already-cached page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Reuse the cached snapshot when it covers the target page.
    Normal,
    /// Refetch unconditionally, making records appended into the page tail
    /// since the last fetch visible.
    Force,
}

/// Cursor over the transactional redo log.
///
/// The reader keeps one page snapshot and a logical position inside it.
/// Structures are copied out with 8-byte alignment; anything that does not
/// fit in the current page tail continues at the start of the next page's
/// data area, the same layout discipline the log writer follows.
pub struct LogReader {
    source: Arc<dyn LogSource>,
    page: Option<LogPage>,
    lsa: Lsa,
}

impl LogReader {
    /// Creates a cursor over the given log.
    #[must_use]
    pub fn new(source: Arc<dyn LogSource>) -> Self {
        Self {
            source,
            page: None,
            lsa: Lsa::NULL,
        }
    }

    /// Current position.
    #[inline]
    #[must_use]
    pub fn lsa(&self) -> Lsa {
        self.lsa
    }

    /// Positions the cursor and fetches the page under it.
    pub fn set_lsa_and_fetch_page(&mut self, lsa: Lsa, mode: FetchMode) -> LogResult<()> {
        let cached = matches!(&self.page, Some(page) if page.pageid() == lsa.pageid);
        if !cached || mode == FetchMode::Force {
            self.page = Some(self.source.fetch_page(lsa.pageid)?);
        }
        self.lsa = lsa;
        Ok(())
    }

    /// Moves the position to the next page when `size` bytes do not fit in
    /// the current page tail.
    pub fn advance_when_does_not_fit(&mut self, size: usize) {
        if self.lsa.offset as usize + size > LOG_PAGE_DATA_SIZE {
            self.lsa = Lsa::new(self.lsa.pageid + 1, 0);
        }
    }

    /// Copies a fixed structure out of the log and advances past it with
    /// alignment.
    pub fn copy_aligned<T: FixedBody>(&mut self) -> LogResult<T> {
        self.advance_when_does_not_fit(T::SIZE);
        let offset = self.lsa.offset as usize;
        let page = self.ensure_page()?;
        let mut slice = &page.data()[offset..offset + T::SIZE];
        let body = T::deserialize(&mut slice)?;
        self.lsa.offset += T::SIZE as i16;
        self.align();
        Ok(body)
    }

    /// Advances past a fixed structure of `size` bytes without decoding it.
    pub fn skip_aligned(&mut self, size: usize) {
        self.advance_when_does_not_fit(size);
        self.lsa.offset += size as i16;
        self.align();
    }

    /// Copies `length` payload bytes into `out`, spilling across pages, and
    /// re-aligns afterward.
    pub fn copy_payload(&mut self, length: usize, out: &mut Vec<u8>) -> LogResult<()> {
        out.clear();
        out.reserve(length);

        let mut remaining = length;
        while remaining > 0 {
            if self.lsa.offset as usize >= LOG_PAGE_DATA_SIZE {
                self.lsa = Lsa::new(self.lsa.pageid + 1, 0);
            }
            let offset = self.lsa.offset as usize;
            let take = remaining.min(LOG_PAGE_DATA_SIZE - offset);
            let page = self.ensure_page()?;
            out.extend_from_slice(&page.data()[offset..offset + take]);
            self.lsa.offset += take as i16;
            remaining -= take;
        }

        self.align();
        Ok(())
    }

    /// Advances past `length` payload bytes without copying them.
    pub fn skip_payload(&mut self, length: usize) {
        let mut remaining = length;
        while remaining > 0 {
            if self.lsa.offset as usize >= LOG_PAGE_DATA_SIZE {
                self.lsa = Lsa::new(self.lsa.pageid + 1, 0);
            }
            let offset = self.lsa.offset as usize;
            let take = remaining.min(LOG_PAGE_DATA_SIZE - offset);
            self.lsa.offset += take as i16;
            remaining -= take;
        }

        self.align();
    }

    fn align(&mut self) {
        let aligned = align_up(self.lsa.offset as usize);
        if aligned >= LOG_PAGE_DATA_SIZE {
            self.lsa = Lsa::new(self.lsa.pageid + 1, 0);
        } else {
            self.lsa.offset = aligned as i16;
        }
    }

    fn ensure_page(&mut self) -> LogResult<&LogPage> {
        let pageid = self.lsa.pageid;
        let cached = matches!(&self.page, Some(page) if page.pageid() == pageid);
        if !cached {
            self.page = Some(self.source.fetch_page(pageid)?);
        }
        Ok(self.page.as_ref().unwrap())
    }
}

impl std::fmt::Debug for LogReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogReader")
            .field("lsa", &self.lsa)
            .field("cached_page", &self.page.as_ref().map(LogPage::pageid))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLog;
    use crate::record::{DoneTime, LogData, RcvIndex, RecordHeader, RecordType};
    use harbor_common::types::Vpid;

    #[test]
    fn test_read_single_record() {
        let log = Arc::new(MemoryLog::new());
        let rec_lsa = log.append_commit(9, 123_456);
        let nxio = log.nxio_lsa();
        assert!(rec_lsa < nxio);

        let mut reader = LogReader::new(log);
        reader
            .set_lsa_and_fetch_page(rec_lsa, FetchMode::Normal)
            .unwrap();

        let header: RecordHeader = reader.copy_aligned().unwrap();
        assert_eq!(header.record_type, RecordType::Commit);
        assert_eq!(header.trid, 9);
        assert_eq!(header.forward_lsa, nxio);
        assert!(header.back_lsa.is_null());

        let done: DoneTime = reader.copy_aligned().unwrap();
        assert_eq!(done.at_time_msec, 123_456);
    }

    #[test]
    fn test_forward_chain_and_payload() {
        let log = Arc::new(MemoryLog::new());
        let data = LogData::new(RcvIndex::HeapRecordWrite, Vpid::new(1, 7), 0);
        let first = log.append_redo(1, data, b"AB", false);
        let second = log.append_commit(1, 1);

        let mut reader = LogReader::new(Arc::clone(&log) as Arc<dyn LogSource>);
        reader
            .set_lsa_and_fetch_page(first, FetchMode::Normal)
            .unwrap();

        let header: RecordHeader = reader.copy_aligned().unwrap();
        assert_eq!(header.forward_lsa, second);

        let body: crate::record::RedoData = reader.copy_aligned().unwrap();
        assert_eq!(body.data, data);
        assert_eq!(body.length, 2);

        let mut payload = Vec::new();
        reader.copy_payload(body.length as usize, &mut payload).unwrap();
        assert_eq!(payload, b"AB");
        assert_eq!(reader.lsa(), second);
    }

    #[test]
    fn test_payload_spills_across_pages() {
        let log = Arc::new(MemoryLog::new());
        let payload: Vec<u8> = (0..9000u32).map(|i| (i % 251) as u8).collect();
        let data = LogData::new(RcvIndex::HeapRecordWrite, Vpid::new(1, 7), 0);
        let rec_lsa = log.append_redo(1, data, &payload, false);

        let mut reader = LogReader::new(log);
        reader
            .set_lsa_and_fetch_page(rec_lsa, FetchMode::Normal)
            .unwrap();
        let _header: RecordHeader = reader.copy_aligned().unwrap();
        let body: crate::record::RedoData = reader.copy_aligned().unwrap();

        let mut read_back = Vec::new();
        reader
            .copy_payload(body.length as usize, &mut read_back)
            .unwrap();
        assert_eq!(read_back, payload);
        assert!(reader.lsa().pageid > rec_lsa.pageid);
    }

    #[test]
    fn test_force_refetch_sees_appended_records() {
        let log = Arc::new(MemoryLog::new());
        let first = log.append_commit(1, 10);

        let mut reader = LogReader::new(Arc::clone(&log) as Arc<dyn LogSource>);
        reader
            .set_lsa_and_fetch_page(first, FetchMode::Normal)
            .unwrap();
        let header: RecordHeader = reader.copy_aligned().unwrap();
        let second = header.forward_lsa;

        // Appended after the snapshot; a NORMAL fetch of the same page keeps
        // the stale copy, FORCE refreshes it.
        let appended = log.append_commit(2, 20);
        assert_eq!(appended, second);

        reader
            .set_lsa_and_fetch_page(second, FetchMode::Force)
            .unwrap();
        let header: RecordHeader = reader.copy_aligned().unwrap();
        assert_eq!(header.record_type, RecordType::Commit);
        assert_eq!(header.trid, 2);
    }
}
