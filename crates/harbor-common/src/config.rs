//! Replication configuration.

use std::time::Duration;

/// Configuration for the page-server log replicator.
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// Number of parallel redo workers.
    ///
    /// With 0 workers every record is applied synchronously on the producer
    /// thread; with more, page-bound redo is dispatched to a worker pool.
    pub parallel_count: usize,

    /// Emit a trace line for every computed replication delay sample.
    pub trace_replication_delay: bool,

    /// Maximum number of jobs outstanding in the parallel engine before
    /// `add` blocks the producer.
    pub job_queue_capacity: usize,

    /// Minimum idle delay of the producer daemon between catch-up sweeps.
    pub looper_period: Duration,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            parallel_count: 0,
            trace_replication_delay: false,
            job_queue_capacity: 1024,
            looper_period: Duration::from_millis(1),
        }
    }
}

impl ReplicationConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of parallel redo workers.
    #[must_use]
    pub fn with_parallel_count(mut self, count: usize) -> Self {
        self.parallel_count = count;
        self
    }

    /// Enables or disables per-sample replication delay tracing.
    #[must_use]
    pub fn with_trace_replication_delay(mut self, enabled: bool) -> Self {
        self.trace_replication_delay = enabled;
        self
    }

    /// Sets the engine's outstanding-job capacity.
    #[must_use]
    pub fn with_job_queue_capacity(mut self, capacity: usize) -> Self {
        self.job_queue_capacity = capacity;
        self
    }

    /// Sets the producer daemon's idle period.
    #[must_use]
    pub fn with_looper_period(mut self, period: Duration) -> Self {
        self.looper_period = period;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_synchronous() {
        let config = ReplicationConfig::default();
        assert_eq!(config.parallel_count, 0);
        assert!(!config.trace_replication_delay);
        assert!(config.job_queue_capacity > 0);
    }

    #[test]
    fn test_builder() {
        let config = ReplicationConfig::new()
            .with_parallel_count(4)
            .with_trace_replication_delay(true)
            .with_job_queue_capacity(64)
            .with_looper_period(Duration::from_millis(5));

        assert_eq!(config.parallel_count, 4);
        assert!(config.trace_replication_delay);
        assert_eq!(config.job_queue_capacity, 64);
        assert_eq!(config.looper_period, Duration::from_millis(5));
    }
}
