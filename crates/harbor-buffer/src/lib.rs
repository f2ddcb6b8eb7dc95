//! # harbor-buffer
//!
//! Page-server page buffer for HarborDB.
//!
//! The buffer holds the server's resident database pages, keyed by volume
//! and page number. Replication fixes pages for redo through it; read
//! transactions fix them for inspection. Each frame tracks the page's last
//! applied log address and its dirty state.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod frame;
pub mod pool;

pub use error::{BufferError, BufferResult};
pub use frame::PageFrame;
pub use pool::{PageBuffer, PageReadGuard, PageWriteGuard};
