//! Log record model.
//!
//! A record is a fixed [`header::RecordHeader`], an aligned fixed body typed
//! by the header's record type, and zero or more variable payloads. The
//! header's forward address is the sole means of advancing from one record
//! to the next.

pub mod body;
pub mod header;
pub mod types;

pub use body::{
    Compensate, DbExternRedo, DoneTime, FixedBody, HaServerState, LogData, MvccRedoData,
    MvccUndoRedoData, RedoBody, RedoData, RedoRecord, RunPostpone, TimedBody, UndoRedoData,
    xor_fold,
};
pub use header::RecordHeader;
pub use types::{DataFlags, RcvIndex, RecordType};

use bytes::{Buf, BufMut};
use harbor_common::constants::MAX_ALIGN;
use harbor_common::types::Lsa;

/// Serialized size of an [`Lsa`] inside a record structure.
pub(crate) const LSA_WIRE_SIZE: usize = 12;

/// Rounds an offset up to the log's structure alignment.
#[inline]
pub(crate) const fn align_up(offset: usize) -> usize {
    (offset + MAX_ALIGN - 1) & !(MAX_ALIGN - 1)
}

pub(crate) fn put_lsa(buf: &mut impl BufMut, lsa: Lsa) {
    buf.put_i64(lsa.pageid);
    buf.put_i16(lsa.offset);
    buf.put_u16(0); // padding
}

pub(crate) fn get_lsa(buf: &mut impl Buf) -> Lsa {
    let pageid = buf.get_i64();
    let offset = buf.get_i16();
    let _padding = buf.get_u16();
    Lsa::new(pageid, offset)
}
