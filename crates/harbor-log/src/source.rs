//! Read-side interface of the transactional redo log.

use harbor_common::types::Lsa;

use crate::error::LogResult;
use crate::page::LogPage;

/// What the page server sees of the active server's log.
///
/// The log is produced elsewhere; the replicator only observes the durable
/// high-water mark and fetches page snapshots. A snapshot may be refreshed
/// at any time to pick up records appended into the page tail since the
/// last fetch.
pub trait LogSource: Send + Sync {
    /// Current high-water mark: the address right past the last durably
    /// appended record.
    fn nxio_lsa(&self) -> Lsa;

    /// Fetches a snapshot of the given log page.
    fn fetch_page(&self, pageid: i64) -> LogResult<LogPage>;
}
