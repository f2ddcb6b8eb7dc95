//! B-tree identity and unique-constraint statistics carriers.

use serde::{Deserialize, Serialize};

use super::Vpid;

/// Identifier of a b-tree: the owning file plus its root page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BtreeId {
    /// Volume of the file the b-tree lives in.
    pub volume: i16,
    /// File id within the volume.
    pub fileid: i32,
    /// Root page number.
    pub root_page: i32,
}

impl BtreeId {
    /// Creates a b-tree id.
    #[inline]
    #[must_use]
    pub const fn new(volume: i16, fileid: i32, root_page: i32) -> Self {
        Self {
            volume,
            fileid,
            root_page,
        }
    }

    /// Identity of the root page.
    #[inline]
    #[must_use]
    pub const fn root_vpid(self) -> Vpid {
        Vpid::new(self.volume, self.root_page)
    }
}

/// Unique-constraint statistics maintained per b-tree root.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueStats {
    /// Number of distinct keys.
    pub num_keys: i64,
    /// Number of object identifiers.
    pub num_oids: i64,
    /// Number of null entries.
    pub num_nulls: i64,
}

impl UniqueStats {
    /// Creates a statistics triple.
    #[inline]
    #[must_use]
    pub const fn new(num_keys: i64, num_oids: i64, num_nulls: i64) -> Self {
        Self {
            num_keys,
            num_oids,
            num_nulls,
        }
    }
}
