//! Page buffer: the server's resident page cache.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use harbor_common::constants::DB_PAGE_SIZE;
use harbor_common::types::{Lsa, Vpid};

use crate::error::{BufferError, BufferResult};
use crate::frame::PageFrame;

/// The page server's resident page cache, keyed by page identity.
///
/// Replication fixes pages for redo through [`PageBuffer::fix_for_redo`]:
/// the page server owns authoritative storage, so a redo fix materializes a
/// zero-filled frame on first touch rather than missing. Readers inspect
/// resident pages through [`PageBuffer::fix_for_read`].
pub struct PageBuffer {
    page_size: usize,
    frames: RwLock<HashMap<Vpid, Arc<PageFrame>>>,
    fix_count: AtomicU64,
    materialized_count: AtomicU64,
}

impl PageBuffer {
    /// Creates a buffer with the default database page size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_size(DB_PAGE_SIZE)
    }

    /// Creates a buffer with an explicit page size.
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size,
            frames: RwLock::new(HashMap::new()),
            fix_count: AtomicU64::new(0),
            materialized_count: AtomicU64::new(0),
        }
    }

    /// Returns the configured page size.
    #[inline]
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Fixes a page for redo, materializing it on first touch.
    pub fn fix_for_redo(&self, vpid: Vpid) -> BufferResult<PageWriteGuard> {
        let frame = self.frame(vpid, true)?;
        frame.pin();
        Ok(PageWriteGuard { frame })
    }

    /// Fixes a resident page for reading.
    pub fn fix_for_read(&self, vpid: Vpid) -> BufferResult<PageReadGuard> {
        let frame = self.frame(vpid, false)?;
        frame.pin();
        Ok(PageReadGuard { frame })
    }

    /// Number of resident pages.
    #[must_use]
    pub fn resident_count(&self) -> usize {
        self.frames.read().len()
    }

    /// Number of resident dirty pages.
    #[must_use]
    pub fn dirty_count(&self) -> usize {
        self.frames.read().values().filter(|f| f.is_dirty()).count()
    }

    /// Total page fixes served.
    #[must_use]
    pub fn fix_count(&self) -> u64 {
        self.fix_count.load(Ordering::Relaxed)
    }

    /// Pages materialized on first touch.
    #[must_use]
    pub fn materialized_count(&self) -> u64 {
        self.materialized_count.load(Ordering::Relaxed)
    }

    fn frame(&self, vpid: Vpid, materialize: bool) -> BufferResult<Arc<PageFrame>> {
        if vpid.is_null() || vpid.is_sentinel() {
            return Err(BufferError::InvalidVpid { vpid });
        }
        self.fix_count.fetch_add(1, Ordering::Relaxed);

        if let Some(frame) = self.frames.read().get(&vpid) {
            return Ok(Arc::clone(frame));
        }

        if !materialize {
            return Err(BufferError::PageNotResident { vpid });
        }

        let mut frames = self.frames.write();
        let frame = frames
            .entry(vpid)
            .or_insert_with(|| {
                self.materialized_count.fetch_add(1, Ordering::Relaxed);
                Arc::new(PageFrame::new(vpid, self.page_size))
            });
        Ok(Arc::clone(frame))
    }
}

impl Default for PageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PageBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageBuffer")
            .field("page_size", &self.page_size)
            .field("resident", &self.resident_count())
            .finish()
    }
}

/// Read access to a fixed page; unfixes on drop.
pub struct PageReadGuard {
    frame: Arc<PageFrame>,
}

impl PageReadGuard {
    /// Returns the page identity.
    #[inline]
    #[must_use]
    pub fn vpid(&self) -> Vpid {
        self.frame.vpid()
    }

    /// Returns the page's last applied log address.
    #[inline]
    #[must_use]
    pub fn page_lsa(&self) -> Lsa {
        self.frame.page_lsa()
    }

    /// Returns the page bytes.
    #[inline]
    pub fn data(&self) -> impl Deref<Target = [u8]> + '_ {
        PageDataRef {
            guard: self.frame.read_data(),
        }
    }

    /// Reads a little-endian i64 at the given offset.
    ///
    /// # Panics
    ///
    /// Panics when the read exceeds the page bounds.
    #[must_use]
    pub fn i64_at(&self, offset: usize) -> i64 {
        let data = self.frame.read_data();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&data[offset..offset + 8]);
        i64::from_le_bytes(bytes)
    }
}

impl Drop for PageReadGuard {
    fn drop(&mut self) {
        self.frame.unpin();
    }
}

impl std::fmt::Debug for PageReadGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageReadGuard")
            .field("vpid", &self.vpid())
            .field("page_lsa", &self.page_lsa())
            .finish()
    }
}

struct PageDataRef<'a> {
    guard: parking_lot::RwLockReadGuard<'a, Vec<u8>>,
}

impl Deref for PageDataRef<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

/// Write access to a page fixed for redo; unfixes on drop.
///
/// Redo applies its change, stamps the record's address with
/// [`PageWriteGuard::set_lsa`] and releases the page with
/// [`PageWriteGuard::set_dirty_and_free`].
pub struct PageWriteGuard {
    frame: Arc<PageFrame>,
}

impl PageWriteGuard {
    /// Returns the page identity.
    #[inline]
    #[must_use]
    pub fn vpid(&self) -> Vpid {
        self.frame.vpid()
    }

    /// Returns the page's last applied log address.
    #[inline]
    #[must_use]
    pub fn page_lsa(&self) -> Lsa {
        self.frame.page_lsa()
    }

    /// Stamps the page with a log address.
    #[inline]
    pub fn set_lsa(&self, lsa: Lsa) {
        self.frame.set_page_lsa(lsa);
    }

    /// Returns the page bytes.
    #[inline]
    pub fn data(&self) -> impl Deref<Target = [u8]> + '_ {
        PageDataRef {
            guard: self.frame.read_data(),
        }
    }

    /// Copies `bytes` into the page at `offset`.
    pub fn write_at(&self, offset: usize, bytes: &[u8]) -> BufferResult<()> {
        let mut data = self.frame.write_data();
        let end = offset
            .checked_add(bytes.len())
            .filter(|&end| end <= data.len())
            .ok_or(BufferError::OutOfPage {
                offset,
                length: bytes.len(),
                page_size: data.len(),
            })?;
        data[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Reads a little-endian i64 at the given offset.
    pub fn i64_at(&self, offset: usize) -> BufferResult<i64> {
        let data = self.frame.read_data();
        if offset + 8 > data.len() {
            return Err(BufferError::OutOfPage {
                offset,
                length: 8,
                page_size: data.len(),
            });
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&data[offset..offset + 8]);
        Ok(i64::from_le_bytes(bytes))
    }

    /// Writes a little-endian i64 at the given offset.
    pub fn put_i64_at(&self, offset: usize, value: i64) -> BufferResult<()> {
        self.write_at(offset, &value.to_le_bytes())
    }

    /// Marks the page dirty and releases the fix.
    pub fn set_dirty_and_free(self) {
        self.frame.set_dirty(true);
        // Unpin happens in Drop.
    }
}

impl Drop for PageWriteGuard {
    fn drop(&mut self) {
        self.frame.unpin();
    }
}

impl std::fmt::Debug for PageWriteGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageWriteGuard")
            .field("vpid", &self.vpid())
            .field("page_lsa", &self.page_lsa())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_materializes_once() {
        let buffer = PageBuffer::with_page_size(1024);
        let vpid = Vpid::new(1, 7);

        {
            let page = buffer.fix_for_redo(vpid).unwrap();
            assert!(page.page_lsa().is_null());
            page.write_at(0, b"A").unwrap();
            page.set_lsa(Lsa::new(0, 0));
            page.set_dirty_and_free();
        }

        assert_eq!(buffer.resident_count(), 1);
        assert_eq!(buffer.materialized_count(), 1);

        let page = buffer.fix_for_read(vpid).unwrap();
        assert_eq!(page.data()[0], b'A');
        assert_eq!(page.page_lsa(), Lsa::new(0, 0));
        assert_eq!(buffer.materialized_count(), 1);
    }

    #[test]
    fn test_read_miss() {
        let buffer = PageBuffer::new();
        assert!(matches!(
            buffer.fix_for_read(Vpid::new(1, 7)),
            Err(BufferError::PageNotResident { .. })
        ));
    }

    #[test]
    fn test_invalid_vpid() {
        let buffer = PageBuffer::new();
        assert!(buffer.fix_for_redo(Vpid::NULL).is_err());
        assert!(buffer.fix_for_redo(Vpid::SENTINEL).is_err());
    }

    #[test]
    fn test_out_of_page_write() {
        let buffer = PageBuffer::with_page_size(64);
        let page = buffer.fix_for_redo(Vpid::new(1, 1)).unwrap();
        assert!(page.write_at(60, b"12345").is_err());
        assert!(page.write_at(60, b"1234").is_ok());
    }

    #[test]
    fn test_counter_helpers() {
        let buffer = PageBuffer::with_page_size(64);
        let page = buffer.fix_for_redo(Vpid::new(1, 1)).unwrap();
        assert_eq!(page.i64_at(16).unwrap(), 0);
        page.put_i64_at(16, 41).unwrap();
        page.put_i64_at(16, page.i64_at(16).unwrap() + 1).unwrap();
        assert_eq!(page.i64_at(16).unwrap(), 42);
    }

    #[test]
    fn test_dirty_tracking() {
        let buffer = PageBuffer::with_page_size(64);
        {
            let page = buffer.fix_for_redo(Vpid::new(1, 1)).unwrap();
            page.write_at(0, b"x").unwrap();
            page.set_dirty_and_free();
        }
        {
            let _clean = buffer.fix_for_redo(Vpid::new(1, 2)).unwrap();
        }
        assert_eq!(buffer.dirty_count(), 1);
        assert_eq!(buffer.resident_count(), 2);
    }
}
