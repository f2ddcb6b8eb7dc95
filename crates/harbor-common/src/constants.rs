//! System-wide constants for the HarborDB page server.

// =============================================================================
// Log Geometry
// =============================================================================

/// Size of one transactional log page in bytes.
pub const LOG_PAGE_SIZE: usize = 4096;

/// Bytes reserved at the head of each log page for the page header
/// (log page id + reserved word).
pub const LOG_PAGE_HEADER_SIZE: usize = 16;

/// Usable data area of a log page; log addresses index into this area.
pub const LOG_PAGE_DATA_SIZE: usize = LOG_PAGE_SIZE - LOG_PAGE_HEADER_SIZE;

/// Alignment of every structure stored in the log.
///
/// Record headers, fixed record bodies and payload tails all start on this
/// boundary.
pub const MAX_ALIGN: usize = 8;

/// Upper bound on a single record's payload.
///
/// Sizes the reusable decompression scratch buffers.
pub const LOGAREA_SIZE: usize = LOG_PAGE_DATA_SIZE;

// =============================================================================
// Database Pages
// =============================================================================

/// Size of a database page served by the page buffer (8 KB).
pub const DB_PAGE_SIZE: usize = 8 * 1024;
