//! Record type tags, recovery indices and payload flags.

use crate::error::{LogError, LogResult};

/// Type tag carried by every log record header.
///
/// The replicator interprets the types below; any other value decodes to
/// [`RecordType::Other`] and is skipped via the header's forward address,
/// which keeps the reader forward-compatible with newer record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// Redo-only page change.
    RedoData,
    /// Redo-only page change within an MVCC transaction.
    MvccRedoData,
    /// Page change carrying both undo and redo images.
    UndoRedoData,
    /// Undo/redo change whose redo image is stored diffed against the undo
    /// image.
    DiffUndoRedoData,
    /// Undo/redo change within an MVCC transaction.
    MvccUndoRedoData,
    /// MVCC undo/redo change with a diffed redo image.
    MvccDiffUndoRedoData,
    /// Deferred change executed after its transaction's main work.
    RunPostpone,
    /// Compensation applied while rolling back.
    Compensate,
    /// Database-external redo; not bound to any page.
    DbExternRedoData,
    /// Transaction commit.
    Commit,
    /// Transaction abort.
    Abort,
    /// Heartbeat record carrying the active server's HA state.
    DummyHaServerState,
    /// Any type this replicator does not interpret.
    Other(u8),
}

impl RecordType {
    /// Converts the record type to its wire value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::RedoData => 1,
            Self::MvccRedoData => 2,
            Self::UndoRedoData => 3,
            Self::DiffUndoRedoData => 4,
            Self::MvccUndoRedoData => 5,
            Self::MvccDiffUndoRedoData => 6,
            Self::RunPostpone => 7,
            Self::Compensate => 8,
            Self::DbExternRedoData => 9,
            Self::Commit => 10,
            Self::Abort => 11,
            Self::DummyHaServerState => 12,
            Self::Other(raw) => raw,
        }
    }

    /// Decodes a record type from its wire value.
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::RedoData,
            2 => Self::MvccRedoData,
            3 => Self::UndoRedoData,
            4 => Self::DiffUndoRedoData,
            5 => Self::MvccUndoRedoData,
            6 => Self::MvccDiffUndoRedoData,
            7 => Self::RunPostpone,
            8 => Self::Compensate,
            9 => Self::DbExternRedoData,
            10 => Self::Commit,
            11 => Self::Abort,
            12 => Self::DummyHaServerState,
            raw => Self::Other(raw),
        }
    }

    /// Whether the redo image of this type is stored diffed against the
    /// undo image.
    #[must_use]
    pub const fn is_diff(self) -> bool {
        matches!(self, Self::DiffUndoRedoData | Self::MvccDiffUndoRedoData)
    }
}

/// Recovery index: selects a redo handler from the static dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum RcvIndex {
    /// Copy the payload bytes into the page at the record's offset.
    HeapRecordWrite = 0,
    /// Add a 64-bit little-endian delta to a counter stored in the page.
    PageCounterAdd = 1,
    /// Materialize b-tree unique statistics into the root page.
    BtreeStatsCommit = 2,
    /// Database-external volume maintenance; not bound to any page.
    VolumeExpand = 3,
}

impl RcvIndex {
    /// Number of recovery indices.
    pub const COUNT: usize = 4;

    /// Converts the index to its wire value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Decodes a recovery index from its wire value.
    pub fn from_u16(value: u16) -> LogResult<Self> {
        match value {
            0 => Ok(Self::HeapRecordWrite),
            1 => Ok(Self::PageCounterAdd),
            2 => Ok(Self::BtreeStatsCommit),
            3 => Ok(Self::VolumeExpand),
            raw => Err(LogError::UnknownRecoveryIndex { raw }),
        }
    }
}

bitflags::bitflags! {
    /// Flags describing how a record's variable payloads are stored.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DataFlags: u16 {
        /// The redo payload is stored compressed.
        const REDO_COMPRESSED = 0b0000_0001;
        /// The undo payload is stored compressed.
        const UNDO_COMPRESSED = 0b0000_0010;
    }
}
