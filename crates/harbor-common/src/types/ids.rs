//! Core identifier types for the HarborDB page server.
//!
//! These types provide type-safe wrappers around the raw log and storage
//! coordinates, preventing accidental misuse of different id kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Log Sequence Address - a position in the transactional redo log.
///
/// An address is the pair of a log page id and a byte offset within that
/// page's data area. Ordering is lexicographic, so addresses compare in
/// append order.
///
/// # Example
///
/// ```rust
/// use harbor_common::types::Lsa;
///
/// let a = Lsa::new(3, 40);
/// let b = Lsa::new(3, 128);
/// assert!(a < b);
/// assert!(Lsa::NULL < a);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Lsa {
    /// Log page the address points into.
    pub pageid: i64,
    /// Byte offset inside the page's data area.
    pub offset: i16,
}

impl Lsa {
    /// Null address; compares below every real log position.
    pub const NULL: Self = Self {
        pageid: -1,
        offset: -1,
    };

    /// Creates an address from a log page id and an offset.
    #[inline]
    #[must_use]
    pub const fn new(pageid: i64, offset: i16) -> Self {
        Self { pageid, offset }
    }

    /// Checks whether this is the null address.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.pageid == Self::NULL.pageid && self.offset == Self::NULL.offset
    }

    /// Packs the address into a single word.
    ///
    /// Packed order equals lexicographic order for non-negative addresses,
    /// so atomics holding packed addresses can be compared on the raw word.
    #[inline]
    #[must_use]
    pub const fn pack(self) -> u64 {
        // pageid occupies the high 48 bits, sign-extended back on unpack
        ((self.pageid as u64) << 16) | (self.offset as u16 as u64)
    }

    /// Unpacks an address previously produced by [`Lsa::pack`].
    #[inline]
    #[must_use]
    pub const fn unpack(raw: u64) -> Self {
        Self {
            pageid: (raw as i64) >> 16,
            offset: (raw & 0xFFFF) as u16 as i16,
        }
    }
}

impl fmt::Debug for Lsa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Lsa(NULL)")
        } else {
            write!(f, "Lsa({}|{})", self.pageid, self.offset)
        }
    }
}

impl fmt::Display for Lsa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.pageid, self.offset)
    }
}

/// An [`Lsa`] stored in a single atomic word.
///
/// Used for high-water marks and page addresses that are read from many
/// threads but written from one.
#[derive(Debug)]
pub struct AtomicLsa(AtomicU64);

impl AtomicLsa {
    /// Creates an atomic address holding the given value.
    #[must_use]
    pub fn new(lsa: Lsa) -> Self {
        Self(AtomicU64::new(lsa.pack()))
    }

    /// Returns the current address.
    #[inline]
    pub fn load(&self) -> Lsa {
        Lsa::unpack(self.0.load(Ordering::Acquire))
    }

    /// Publishes a new address.
    #[inline]
    pub fn store(&self, lsa: Lsa) {
        self.0.store(lsa.pack(), Ordering::Release);
    }
}

impl Default for AtomicLsa {
    fn default() -> Self {
        Self::new(Lsa::NULL)
    }
}

/// Volume-page identifier of a database page.
///
/// A reserved sentinel value denotes a job that has no associated page and
/// participates in scheduling only as a global ordering marker.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Vpid {
    /// Volume the page belongs to.
    pub volume: i16,
    /// Page number within the volume.
    pub pageid: i32,
}

impl Vpid {
    /// Null page identity.
    pub const NULL: Self = Self {
        volume: -1,
        pageid: -1,
    };

    /// Sentinel identity for jobs that bind to no page.
    pub const SENTINEL: Self = Self {
        volume: -2,
        pageid: -2,
    };

    /// Creates a page identity from a volume and a page number.
    #[inline]
    #[must_use]
    pub const fn new(volume: i16, pageid: i32) -> Self {
        Self { volume, pageid }
    }

    /// Checks whether this is the null identity.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.volume == Self::NULL.volume && self.pageid == Self::NULL.pageid
    }

    /// Checks whether this is the sentinel identity.
    #[inline]
    #[must_use]
    pub const fn is_sentinel(self) -> bool {
        self.volume == Self::SENTINEL.volume && self.pageid == Self::SENTINEL.pageid
    }
}

impl fmt::Debug for Vpid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Vpid(NULL)")
        } else if self.is_sentinel() {
            write!(f, "Vpid(SENTINEL)")
        } else {
            write!(f, "Vpid({}|{})", self.volume, self.pageid)
        }
    }
}

impl fmt::Display for Vpid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.volume, self.pageid)
    }
}

/// Multi-version concurrency control transaction id.
///
/// Ids are allocated monotonically on the active server; the page server
/// only observes them in the log.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct MvccId(u64);

impl MvccId {
    /// Null id, carried by records outside any MVCC transaction.
    pub const NULL: Self = Self(0);

    /// First valid id.
    pub const FIRST: Self = Self(1);

    /// Creates an id from a raw u64 value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Checks whether this is a valid id.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == Self::NULL.0
    }

    /// Returns the next id.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Debug for MvccId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "MvccId(NULL)")
        } else {
            write!(f, "MvccId({})", self.0)
        }
    }
}

impl fmt::Display for MvccId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MvccId {
    #[inline]
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

impl From<MvccId> for u64 {
    #[inline]
    fn from(id: MvccId) -> Self {
        id.0
    }
}
