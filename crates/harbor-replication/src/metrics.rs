//! Replication performance metrics.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

/// Statistics published by the replicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stat {
    /// End-to-end replication delay in milliseconds, sampled per
    /// commit/abort/heartbeat record.
    RedoReplDelay,
    /// Time spent handling each log record on the producer.
    RedoReplLogRedoSync,
}

/// Sink the replicator publishes its statistics into.
///
/// Implemented by the process-wide metrics registry in the server; tests
/// install recording sinks.
pub trait MetricsSink: Send + Sync {
    /// Records a point-in-time value.
    fn set_stat(&self, stat: Stat, value: i64);

    /// Accumulates a duration.
    fn add_duration(&self, stat: Stat, elapsed: Duration);
}

/// Default sink keeping last value and totals in atomics.
#[derive(Debug, Default)]
pub struct ReplicationMetrics {
    delay_last_msec: AtomicI64,
    delay_samples: AtomicU64,
    redo_sync_total_nanos: AtomicU64,
    redo_sync_count: AtomicU64,
}

impl ReplicationMetrics {
    /// Creates an empty metrics holder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last observed replication delay in milliseconds.
    #[must_use]
    pub fn last_delay_msec(&self) -> i64 {
        self.delay_last_msec.load(Ordering::Relaxed)
    }

    /// Number of delay samples observed.
    #[must_use]
    pub fn delay_samples(&self) -> u64 {
        self.delay_samples.load(Ordering::Relaxed)
    }

    /// Total time spent handling records on the producer.
    #[must_use]
    pub fn redo_sync_total(&self) -> Duration {
        Duration::from_nanos(self.redo_sync_total_nanos.load(Ordering::Relaxed))
    }

    /// Number of record-handling spans accumulated.
    #[must_use]
    pub fn redo_sync_count(&self) -> u64 {
        self.redo_sync_count.load(Ordering::Relaxed)
    }
}

impl MetricsSink for ReplicationMetrics {
    fn set_stat(&self, stat: Stat, value: i64) {
        if stat == Stat::RedoReplDelay {
            self.delay_last_msec.store(value, Ordering::Relaxed);
            self.delay_samples.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn add_duration(&self, stat: Stat, elapsed: Duration) {
        if stat == Stat::RedoReplLogRedoSync {
            self.redo_sync_total_nanos
                .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
            self.redo_sync_count.fetch_add(1, Ordering::Relaxed);
        }
    }
}
