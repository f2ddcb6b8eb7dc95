//! Log error types.

use thiserror::Error;

use harbor_common::types::Lsa;

/// Result type for log operations.
pub type LogResult<T> = Result<T, LogError>;

/// Errors observed while decoding or fetching log content.
///
/// The log is authoritative; every variant here is treated as fatal by the
/// replicator. There are no retry paths.
#[derive(Debug, Error)]
pub enum LogError {
    /// A fixed structure did not fit in the bytes available.
    #[error("truncated log record at {lsa}: needed {needed} bytes, {available} available")]
    TruncatedRecord {
        /// Address the decode started at.
        lsa: Lsa,
        /// Bytes the structure needs.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },

    /// A recovery index outside the closed enumeration.
    #[error("unknown recovery index {raw}")]
    UnknownRecoveryIndex {
        /// Raw index value found in the log.
        raw: u16,
    },

    /// A page id no log page can have.
    #[error("invalid log page id {pageid}")]
    InvalidPageId {
        /// The offending page id.
        pageid: i64,
    },

    /// A compressed payload that does not decode.
    #[error("corrupted log payload: {reason}")]
    CorruptedPayload {
        /// What went wrong.
        reason: String,
    },
}

impl LogError {
    /// Creates a truncated-record error.
    pub fn truncated_record(lsa: Lsa, needed: usize, available: usize) -> Self {
        Self::TruncatedRecord {
            lsa,
            needed,
            available,
        }
    }

    /// Creates a corrupted-payload error.
    pub fn corrupted_payload(reason: impl Into<String>) -> Self {
        Self::CorruptedPayload {
            reason: reason.into(),
        }
    }
}
