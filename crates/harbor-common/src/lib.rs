//! # harbor-common
//!
//! Common types, constants and configuration for HarborDB.
//!
//! This crate provides the foundational vocabulary shared by the page-server
//! replication stack:
//!
//! - **Types**: log addresses (`Lsa`, `AtomicLsa`), page identity (`Vpid`),
//!   MVCC ids (`MvccId`) and the b-tree statistics carriers
//! - **Constants**: log page geometry and database page size
//! - **Config**: replication tuning knobs
//!
//! ## Example
//!
//! ```rust
//! use harbor_common::types::{Lsa, Vpid};
//!
//! let first = Lsa::new(0, 0);
//! let later = Lsa::new(0, 128);
//! assert!(first < later);
//! assert!(Lsa::NULL < first);
//! assert!(Vpid::SENTINEL.is_sentinel());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod constants;
pub mod types;

// Re-export commonly used items at the crate root
pub use config::ReplicationConfig;
pub use constants::*;
pub use types::{AtomicLsa, BtreeId, Lsa, MvccId, UniqueStats, Vpid};
