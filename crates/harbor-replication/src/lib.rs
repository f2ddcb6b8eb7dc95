//! # harbor-replication
//!
//! Page-server log replication core for HarborDB.
//!
//! The replicator continuously consumes the transactional redo log produced
//! by the active server and applies each record against the page server's
//! page buffer, so that local pages stay logically current with the
//! primary. A linear, totally-ordered log is turned into parallel per-page
//! mutations while preserving per-page causal order:
//!
//! - [`replicator::Replicator`] owns the producer daemon, the record
//!   dispatch and the waiter protocol
//! - [`engine::ParallelRedoEngine`] applies page-bound jobs across workers
//!   with per-page ordering
//! - [`monitor::MinLsaMonitor`] tracks the smallest log address still
//!   unapplied anywhere
//! - [`recovery::RecoveryTable`] dispatches redo by recovery index
//! - [`metrics::MetricsSink`] receives the replication delay and per-record
//!   redo timing

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod btree;
pub mod daemon;
pub mod engine;
pub mod error;
pub mod job;
pub mod metrics;
pub mod monitor;
pub mod mvcc;
pub mod recovery;
pub mod replicator;

mod delay;
mod redo;

pub use error::{ReplicationError, ReplicationResult};
pub use replicator::Replicator;
