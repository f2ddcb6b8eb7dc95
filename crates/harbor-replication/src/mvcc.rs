//! Process-wide MVCC id tracking.

use std::sync::atomic::{AtomicU64, Ordering};

use harbor_common::types::MvccId;

/// Tracks the next MVCC id the page server may allocate.
///
/// Readers on the page server build visibility snapshots from `next_id`,
/// so it must stay strictly above every id observed in the log. The
/// replicator's producer thread is the only writer; reads can happen
/// anywhere.
#[derive(Debug)]
pub struct MvccTracker {
    next_id: AtomicU64,
}

impl MvccTracker {
    /// Creates a tracker that has seen no ids yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(MvccId::FIRST.as_u64()),
        }
    }

    /// The smallest id guaranteed to be newer than everything seen.
    #[must_use]
    pub fn next_id(&self) -> MvccId {
        MvccId::new(self.next_id.load(Ordering::Acquire))
    }

    /// Makes `next_id` strictly greater than `id`. Null ids are ignored.
    pub fn advance_past(&self, id: MvccId) {
        if id.is_null() {
            return;
        }
        self.next_id
            .fetch_max(id.as_u64() + 1, Ordering::AcqRel);
    }
}

impl Default for MvccTracker {
    fn default() -> Self {
        Self::new()
    }
}
