//! Replication error types.
//!
//! Every error in this subsystem is fatal: the log is authoritative and
//! well-formed by assumption, so there are no retry paths. Errors reaching
//! the producer daemon terminate it; errors in a worker abort the engine
//! and surface from its termination path.

use thiserror::Error;

use harbor_buffer::BufferError;
use harbor_common::types::Lsa;
use harbor_log::record::RcvIndex;
use harbor_log::LogError;

/// Result type for replication operations.
pub type ReplicationResult<T> = Result<T, ReplicationError>;

/// Errors that can occur while replicating the log.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// Log decode or fetch failure.
    #[error("log error: {source}")]
    Log {
        /// Underlying log error.
        #[from]
        source: LogError,
    },

    /// Page fix or page write failure.
    #[error("buffer error: {source}")]
    Buffer {
        /// Underlying buffer error.
        #[from]
        source: BufferError,
    },

    /// A record whose forward address does not advance the cursor.
    #[error("log record at {lsa} does not advance (forward address {forward})")]
    NonAdvancingRecord {
        /// Address of the record.
        lsa: Lsa,
        /// Its forward address.
        forward: Lsa,
    },

    /// A redo handler reported failure.
    #[error("redo handler {rcvindex:?} failed at {lsa}: {reason}")]
    HandlerFailed {
        /// Handler that failed.
        rcvindex: RcvIndex,
        /// Record being replayed.
        lsa: Lsa,
        /// What went wrong.
        reason: String,
    },

    /// A job was added after the engine input was closed.
    #[error("job added to a closed redo engine")]
    EngineClosed,

    /// A redo worker panicked.
    #[error("redo worker panicked")]
    WorkerPanicked,

    /// The producer daemon panicked on a fatal error.
    #[error("replication producer terminated abnormally")]
    ProducerPanicked,
}

impl ReplicationError {
    /// Creates a handler-failure error.
    pub fn handler_failed(rcvindex: RcvIndex, lsa: Lsa, reason: impl Into<String>) -> Self {
        Self::HandlerFailed {
            rcvindex,
            lsa,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReplicationError::NonAdvancingRecord {
            lsa: Lsa::new(3, 40),
            forward: Lsa::new(3, 40),
        };
        assert!(format!("{}", err).contains("3|40"));

        let err =
            ReplicationError::handler_failed(RcvIndex::HeapRecordWrite, Lsa::new(0, 0), "oops");
        assert!(format!("{}", err).contains("oops"));
    }
}
