//! Buffer error types.

use thiserror::Error;

use harbor_common::types::Vpid;

/// Result type for buffer operations.
pub type BufferResult<T> = Result<T, BufferError>;

/// Errors that can occur while fixing or mutating pages.
#[derive(Debug, Error)]
pub enum BufferError {
    /// A null or sentinel page identity cannot be fixed.
    #[error("cannot fix page {vpid:?}")]
    InvalidVpid {
        /// The offending identity.
        vpid: Vpid,
    },

    /// The page is not resident and the caller asked not to materialize it.
    #[error("page {vpid:?} is not resident")]
    PageNotResident {
        /// The missing page.
        vpid: Vpid,
    },

    /// A write landed outside the page bounds.
    #[error("write of {length} bytes at offset {offset} exceeds page size {page_size}")]
    OutOfPage {
        /// Offset of the attempted access.
        offset: usize,
        /// Length of the attempted access.
        length: usize,
        /// Size of the page.
        page_size: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BufferError::InvalidVpid {
            vpid: Vpid::SENTINEL,
        };
        assert!(format!("{}", err).contains("SENTINEL"));

        let err = BufferError::OutOfPage {
            offset: 8000,
            length: 512,
            page_size: 8192,
        };
        assert!(format!("{}", err).contains("8000"));
    }
}
