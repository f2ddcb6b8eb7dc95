//! Core identifier and statistics types shared across HarborDB crates.

mod ids;
mod stats;

pub use ids::{AtomicLsa, Lsa, MvccId, Vpid};
pub use stats::{BtreeId, UniqueStats};
