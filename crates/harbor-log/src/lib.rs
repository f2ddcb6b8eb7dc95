//! # harbor-log
//!
//! Transactional redo log model and reading primitives for HarborDB.
//!
//! This crate defines what the page server sees of the active server's log:
//!
//! - Typed log records (header, fixed bodies, payload flags)
//! - The [`reader::LogReader`] cursor used to decode records in place
//! - The [`source::LogSource`] interface the log is consumed through
//! - An in-memory log ([`memory::MemoryLog`]) standing in for the primary
//! - The payload compression scratch ([`zip::LogZip`])

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod memory;
pub mod page;
pub mod reader;
pub mod record;
pub mod source;
pub mod zip;

pub use error::{LogError, LogResult};
