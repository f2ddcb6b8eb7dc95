//! Buffer frame - a resident database page.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use harbor_common::types::{AtomicLsa, Lsa, Vpid};

/// A resident database page.
///
/// Each frame carries:
/// - The page bytes behind a read/write lock
/// - The page's last applied log address
/// - A dirty flag and a pin count
///
/// The pin count and the flags use atomics so metadata reads never contend
/// with page content access.
pub struct PageFrame {
    vpid: Vpid,
    data: RwLock<Vec<u8>>,
    lsa: AtomicLsa,
    dirty: AtomicBool,
    pin_count: AtomicU32,
}

impl PageFrame {
    /// Creates a zero-filled frame for the given page.
    #[must_use]
    pub fn new(vpid: Vpid, page_size: usize) -> Self {
        Self {
            vpid,
            data: RwLock::new(vec![0u8; page_size]),
            lsa: AtomicLsa::new(Lsa::NULL),
            dirty: AtomicBool::new(false),
            pin_count: AtomicU32::new(0),
        }
    }

    /// Returns the page identity.
    #[inline]
    #[must_use]
    pub fn vpid(&self) -> Vpid {
        self.vpid
    }

    /// Returns the page's last applied log address.
    #[inline]
    #[must_use]
    pub fn page_lsa(&self) -> Lsa {
        self.lsa.load()
    }

    /// Sets the page's last applied log address.
    #[inline]
    pub fn set_page_lsa(&self, lsa: Lsa) {
        self.lsa.store(lsa);
    }

    /// Returns true if the page has unflushed changes.
    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Sets or clears the dirty flag.
    #[inline]
    pub fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::Release);
    }

    /// Returns the current pin count.
    #[inline]
    #[must_use]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Increments the pin count.
    #[inline]
    pub fn pin(&self) {
        self.pin_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrements the pin count.
    #[inline]
    pub fn unpin(&self) {
        let previous = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "unpin without a matching pin");
    }

    /// Locks the page bytes for reading.
    #[inline]
    pub fn read_data(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.data.read()
    }

    /// Locks the page bytes for writing.
    #[inline]
    pub fn write_data(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.data.write()
    }
}

impl std::fmt::Debug for PageFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageFrame")
            .field("vpid", &self.vpid)
            .field("page_lsa", &self.page_lsa())
            .field("dirty", &self.is_dirty())
            .field("pin_count", &self.pin_count())
            .finish()
    }
}
