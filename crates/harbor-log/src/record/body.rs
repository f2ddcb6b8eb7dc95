//! Typed fixed record bodies.
//!
//! Every interpreted record type has a fixed-size body following the header.
//! Variable payloads (undo image, then redo image, each 8-byte aligned)
//! follow the body in the log.

use bytes::{Buf, BufMut};

use harbor_common::types::{Lsa, MvccId, Vpid};

use super::types::{DataFlags, RcvIndex};
use super::{get_lsa, put_lsa, LSA_WIRE_SIZE};
use crate::error::{LogError, LogResult};

/// Fixed-layout structure that can be copied out of the log.
pub trait FixedBody: Sized {
    /// Serialized size in bytes.
    const SIZE: usize;

    /// Writes the structure.
    fn serialize(&self, buf: &mut impl BufMut);

    /// Reads the structure back.
    fn deserialize(buf: &mut impl Buf) -> LogResult<Self>;
}

/// Target of a page-bound change: recovery index, page and offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogData {
    /// Redo handler that applies the change.
    pub rcvindex: RcvIndex,
    /// Page the change targets.
    pub vpid: Vpid,
    /// Byte offset within the page.
    pub offset: u16,
}

impl LogData {
    /// Serialized size in bytes.
    pub const SIZE: usize = 12;

    /// Creates a change target.
    #[must_use]
    pub const fn new(rcvindex: RcvIndex, vpid: Vpid, offset: u16) -> Self {
        Self {
            rcvindex,
            vpid,
            offset,
        }
    }
}

impl FixedBody for LogData {
    const SIZE: usize = 12;

    fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u16(self.rcvindex.as_u16());
        buf.put_i16(self.vpid.volume);
        buf.put_i32(self.vpid.pageid);
        buf.put_u16(self.offset);
        buf.put_u16(0); // padding
    }

    fn deserialize(buf: &mut impl Buf) -> LogResult<Self> {
        ensure_remaining(buf, Self::SIZE)?;
        let rcvindex = RcvIndex::from_u16(buf.get_u16())?;
        let volume = buf.get_i16();
        let pageid = buf.get_i32();
        let offset = buf.get_u16();
        let _padding = buf.get_u16();
        Ok(Self {
            rcvindex,
            vpid: Vpid::new(volume, pageid),
            offset,
        })
    }
}

/// A decoded fixed body that drives the generic page redo pipeline.
pub trait RedoBody: FixedBody {
    /// Target page and recovery index of the redo portion.
    fn log_data(&self) -> LogData;

    /// Length of the stored redo payload in bytes.
    fn redo_length(&self) -> usize;

    /// Length of the stored undo payload preceding the redo payload.
    fn undo_length(&self) -> usize {
        0
    }

    /// How the payloads are stored.
    fn flags(&self) -> DataFlags {
        DataFlags::empty()
    }

    /// MVCC id carried by the record, if any.
    fn mvccid(&self) -> MvccId {
        MvccId::NULL
    }
}

/// A fixed body that embeds the primary-side creation timestamp.
pub trait TimedBody: FixedBody {
    /// Wall-clock milliseconds since the epoch at record creation.
    fn at_time_msec(&self) -> i64;
}

/// Redo-only page change (20 bytes serialized).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedoData {
    /// Change target.
    pub data: LogData,
    /// Stored redo payload length.
    pub length: u32,
    /// Payload storage flags.
    pub flags: DataFlags,
}

impl RedoData {
    /// Serialized size in bytes.
    pub const SIZE: usize = LogData::SIZE + 8;
}

impl FixedBody for RedoData {
    const SIZE: usize = LogData::SIZE + 8;

    fn serialize(&self, buf: &mut impl BufMut) {
        self.data.serialize(buf);
        buf.put_u32(self.length);
        buf.put_u16(self.flags.bits());
        buf.put_u16(0); // padding
    }

    fn deserialize(buf: &mut impl Buf) -> LogResult<Self> {
        ensure_remaining(buf, Self::SIZE)?;
        let data = LogData::deserialize(buf)?;
        let length = buf.get_u32();
        let flags = DataFlags::from_bits_truncate(buf.get_u16());
        let _padding = buf.get_u16();
        Ok(Self {
            data,
            length,
            flags,
        })
    }
}

impl RedoBody for RedoData {
    fn log_data(&self) -> LogData {
        self.data
    }

    fn redo_length(&self) -> usize {
        self.length as usize
    }

    fn flags(&self) -> DataFlags {
        self.flags
    }
}

/// Redo-only page change within an MVCC transaction (28 bytes serialized).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MvccRedoData {
    /// Embedded redo description.
    pub redo: RedoData,
    /// Transaction the change belongs to.
    pub mvccid: MvccId,
}

impl MvccRedoData {
    /// Serialized size in bytes.
    pub const SIZE: usize = RedoData::SIZE + 8;
}

impl FixedBody for MvccRedoData {
    const SIZE: usize = RedoData::SIZE + 8;

    fn serialize(&self, buf: &mut impl BufMut) {
        self.redo.serialize(buf);
        buf.put_u64(self.mvccid.as_u64());
    }

    fn deserialize(buf: &mut impl Buf) -> LogResult<Self> {
        ensure_remaining(buf, Self::SIZE)?;
        let redo = RedoData::deserialize(buf)?;
        let mvccid = MvccId::new(buf.get_u64());
        Ok(Self { redo, mvccid })
    }
}

impl RedoBody for MvccRedoData {
    fn log_data(&self) -> LogData {
        self.redo.data
    }

    fn redo_length(&self) -> usize {
        self.redo.length as usize
    }

    fn flags(&self) -> DataFlags {
        self.redo.flags
    }

    fn mvccid(&self) -> MvccId {
        self.mvccid
    }
}

/// Page change carrying both undo and redo images (24 bytes serialized).
///
/// Shared by the plain and the diff record types; the record type decides
/// whether the redo image must be unfolded against the undo image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndoRedoData {
    /// Change target.
    pub data: LogData,
    /// Stored undo payload length.
    pub undo_length: u32,
    /// Stored redo payload length.
    pub redo_length: u32,
    /// Payload storage flags.
    pub flags: DataFlags,
}

impl UndoRedoData {
    /// Serialized size in bytes.
    pub const SIZE: usize = LogData::SIZE + 12;
}

impl FixedBody for UndoRedoData {
    const SIZE: usize = LogData::SIZE + 12;

    fn serialize(&self, buf: &mut impl BufMut) {
        self.data.serialize(buf);
        buf.put_u32(self.undo_length);
        buf.put_u32(self.redo_length);
        buf.put_u16(self.flags.bits());
        buf.put_u16(0); // padding
    }

    fn deserialize(buf: &mut impl Buf) -> LogResult<Self> {
        ensure_remaining(buf, Self::SIZE)?;
        let data = LogData::deserialize(buf)?;
        let undo_length = buf.get_u32();
        let redo_length = buf.get_u32();
        let flags = DataFlags::from_bits_truncate(buf.get_u16());
        let _padding = buf.get_u16();
        Ok(Self {
            data,
            undo_length,
            redo_length,
            flags,
        })
    }
}

impl RedoBody for UndoRedoData {
    fn log_data(&self) -> LogData {
        self.data
    }

    fn redo_length(&self) -> usize {
        self.redo_length as usize
    }

    fn undo_length(&self) -> usize {
        self.undo_length as usize
    }

    fn flags(&self) -> DataFlags {
        self.flags
    }
}

/// Undo/redo page change within an MVCC transaction (32 bytes serialized).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MvccUndoRedoData {
    /// Embedded undo/redo description.
    pub undoredo: UndoRedoData,
    /// Transaction the change belongs to.
    pub mvccid: MvccId,
}

impl MvccUndoRedoData {
    /// Serialized size in bytes.
    pub const SIZE: usize = UndoRedoData::SIZE + 8;
}

impl FixedBody for MvccUndoRedoData {
    const SIZE: usize = UndoRedoData::SIZE + 8;

    fn serialize(&self, buf: &mut impl BufMut) {
        self.undoredo.serialize(buf);
        buf.put_u64(self.mvccid.as_u64());
    }

    fn deserialize(buf: &mut impl Buf) -> LogResult<Self> {
        ensure_remaining(buf, Self::SIZE)?;
        let undoredo = UndoRedoData::deserialize(buf)?;
        let mvccid = MvccId::new(buf.get_u64());
        Ok(Self { undoredo, mvccid })
    }
}

impl RedoBody for MvccUndoRedoData {
    fn log_data(&self) -> LogData {
        self.undoredo.data
    }

    fn redo_length(&self) -> usize {
        self.undoredo.redo_length as usize
    }

    fn undo_length(&self) -> usize {
        self.undoredo.undo_length as usize
    }

    fn flags(&self) -> DataFlags {
        self.undoredo.flags
    }

    fn mvccid(&self) -> MvccId {
        self.mvccid
    }
}

/// Deferred change executed after its transaction's main work
/// (28 bytes serialized).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPostpone {
    /// Change target.
    pub data: LogData,
    /// Stored redo payload length.
    pub length: u32,
    /// Address of the postpone record this run corresponds to.
    pub ref_lsa: Lsa,
}

impl RunPostpone {
    /// Serialized size in bytes.
    pub const SIZE: usize = LogData::SIZE + 4 + LSA_WIRE_SIZE;
}

impl FixedBody for RunPostpone {
    const SIZE: usize = LogData::SIZE + 4 + LSA_WIRE_SIZE;

    fn serialize(&self, buf: &mut impl BufMut) {
        self.data.serialize(buf);
        buf.put_u32(self.length);
        put_lsa(buf, self.ref_lsa);
    }

    fn deserialize(buf: &mut impl Buf) -> LogResult<Self> {
        ensure_remaining(buf, Self::SIZE)?;
        let data = LogData::deserialize(buf)?;
        let length = buf.get_u32();
        let ref_lsa = get_lsa(buf);
        Ok(Self {
            data,
            length,
            ref_lsa,
        })
    }
}

impl RedoBody for RunPostpone {
    fn log_data(&self) -> LogData {
        self.data
    }

    fn redo_length(&self) -> usize {
        self.length as usize
    }
}

/// Compensation applied while rolling back (28 bytes serialized).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compensate {
    /// Change target.
    pub data: LogData,
    /// Stored redo payload length.
    pub length: u32,
    /// Next address to undo after this compensation.
    pub undo_nxlsa: Lsa,
}

impl Compensate {
    /// Serialized size in bytes.
    pub const SIZE: usize = LogData::SIZE + 4 + LSA_WIRE_SIZE;
}

impl FixedBody for Compensate {
    const SIZE: usize = LogData::SIZE + 4 + LSA_WIRE_SIZE;

    fn serialize(&self, buf: &mut impl BufMut) {
        self.data.serialize(buf);
        buf.put_u32(self.length);
        put_lsa(buf, self.undo_nxlsa);
    }

    fn deserialize(buf: &mut impl Buf) -> LogResult<Self> {
        ensure_remaining(buf, Self::SIZE)?;
        let data = LogData::deserialize(buf)?;
        let length = buf.get_u32();
        let undo_nxlsa = get_lsa(buf);
        Ok(Self {
            data,
            length,
            undo_nxlsa,
        })
    }
}

impl RedoBody for Compensate {
    fn log_data(&self) -> LogData {
        self.data
    }

    fn redo_length(&self) -> usize {
        self.length as usize
    }
}

/// Database-external redo; not bound to any page (8 bytes serialized).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbExternRedo {
    /// Redo handler that applies the change.
    pub rcvindex: RcvIndex,
    /// Stored redo payload length.
    pub length: u32,
}

impl DbExternRedo {
    /// Serialized size in bytes.
    pub const SIZE: usize = 8;
}

impl FixedBody for DbExternRedo {
    const SIZE: usize = 8;

    fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u16(self.rcvindex.as_u16());
        buf.put_u16(0); // padding
        buf.put_u32(self.length);
    }

    fn deserialize(buf: &mut impl Buf) -> LogResult<Self> {
        ensure_remaining(buf, Self::SIZE)?;
        let rcvindex = RcvIndex::from_u16(buf.get_u16())?;
        let _padding = buf.get_u16();
        let length = buf.get_u32();
        Ok(Self { rcvindex, length })
    }
}

/// Commit or abort marker (8 bytes serialized).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoneTime {
    /// Wall-clock milliseconds since the epoch at record creation.
    pub at_time_msec: i64,
}

impl DoneTime {
    /// Serialized size in bytes.
    pub const SIZE: usize = 8;
}

impl FixedBody for DoneTime {
    const SIZE: usize = 8;

    fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_i64(self.at_time_msec);
    }

    fn deserialize(buf: &mut impl Buf) -> LogResult<Self> {
        ensure_remaining(buf, Self::SIZE)?;
        Ok(Self {
            at_time_msec: buf.get_i64(),
        })
    }
}

impl TimedBody for DoneTime {
    fn at_time_msec(&self) -> i64 {
        self.at_time_msec
    }
}

/// Heartbeat carrying the active server's HA state (16 bytes serialized).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HaServerState {
    /// Raw HA state code.
    pub state: u8,
    /// Wall-clock milliseconds since the epoch at record creation.
    pub at_time_msec: i64,
}

impl HaServerState {
    /// Serialized size in bytes.
    pub const SIZE: usize = 16;
}

impl FixedBody for HaServerState {
    const SIZE: usize = 16;

    fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.state);
        buf.put_bytes(0, 7); // padding
        buf.put_i64(self.at_time_msec);
    }

    fn deserialize(buf: &mut impl Buf) -> LogResult<Self> {
        ensure_remaining(buf, Self::SIZE)?;
        let state = buf.get_u8();
        buf.advance(7);
        let at_time_msec = buf.get_i64();
        Ok(Self {
            state,
            at_time_msec,
        })
    }
}

impl TimedBody for HaServerState {
    fn at_time_msec(&self) -> i64 {
        self.at_time_msec
    }
}

/// Any decoded fixed body that drives the generic redo pipeline.
///
/// Jobs dispatched to the parallel engine carry this tagged variant so a
/// worker can re-read the record's payloads without re-decoding the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedoRecord {
    /// Redo-only change.
    Redo(RedoData),
    /// MVCC redo-only change.
    MvccRedo(MvccRedoData),
    /// Undo/redo change (plain or diff).
    UndoRedo(UndoRedoData),
    /// MVCC undo/redo change (plain or diff).
    MvccUndoRedo(MvccUndoRedoData),
    /// Postpone run.
    RunPostpone(RunPostpone),
    /// Rollback compensation.
    Compensate(Compensate),
}

impl RedoRecord {
    /// Target page and recovery index of the redo portion.
    #[must_use]
    pub fn log_data(&self) -> LogData {
        match self {
            Self::Redo(body) => body.log_data(),
            Self::MvccRedo(body) => body.log_data(),
            Self::UndoRedo(body) => body.log_data(),
            Self::MvccUndoRedo(body) => body.log_data(),
            Self::RunPostpone(body) => body.log_data(),
            Self::Compensate(body) => body.log_data(),
        }
    }

    /// Length of the stored redo payload.
    #[must_use]
    pub fn redo_length(&self) -> usize {
        match self {
            Self::Redo(body) => body.redo_length(),
            Self::MvccRedo(body) => body.redo_length(),
            Self::UndoRedo(body) => body.redo_length(),
            Self::MvccUndoRedo(body) => body.redo_length(),
            Self::RunPostpone(body) => body.redo_length(),
            Self::Compensate(body) => body.redo_length(),
        }
    }

    /// Length of the stored undo payload.
    #[must_use]
    pub fn undo_length(&self) -> usize {
        match self {
            Self::UndoRedo(body) => body.undo_length(),
            Self::MvccUndoRedo(body) => body.undo_length(),
            _ => 0,
        }
    }

    /// How the payloads are stored.
    #[must_use]
    pub fn flags(&self) -> DataFlags {
        match self {
            Self::Redo(body) => body.flags(),
            Self::MvccRedo(body) => body.flags(),
            Self::UndoRedo(body) => body.flags(),
            Self::MvccUndoRedo(body) => body.flags(),
            Self::RunPostpone(body) => body.flags(),
            Self::Compensate(body) => body.flags(),
        }
    }

    /// MVCC id carried by the record, if any.
    #[must_use]
    pub fn mvccid(&self) -> MvccId {
        match self {
            Self::MvccRedo(body) => body.mvccid(),
            Self::MvccUndoRedo(body) => body.mvccid(),
            _ => MvccId::NULL,
        }
    }

    /// Serialized size of the fixed body this variant was decoded from.
    #[must_use]
    pub fn fixed_size(&self) -> usize {
        match self {
            Self::Redo(_) => RedoData::SIZE,
            Self::MvccRedo(_) => MvccRedoData::SIZE,
            Self::UndoRedo(_) => UndoRedoData::SIZE,
            Self::MvccUndoRedo(_) => MvccUndoRedoData::SIZE,
            Self::RunPostpone(_) => RunPostpone::SIZE,
            Self::Compensate(_) => Compensate::SIZE,
        }
    }
}

impl From<RedoData> for RedoRecord {
    fn from(body: RedoData) -> Self {
        Self::Redo(body)
    }
}

impl From<MvccRedoData> for RedoRecord {
    fn from(body: MvccRedoData) -> Self {
        Self::MvccRedo(body)
    }
}

impl From<UndoRedoData> for RedoRecord {
    fn from(body: UndoRedoData) -> Self {
        Self::UndoRedo(body)
    }
}

impl From<MvccUndoRedoData> for RedoRecord {
    fn from(body: MvccUndoRedoData) -> Self {
        Self::MvccUndoRedo(body)
    }
}

impl From<RunPostpone> for RedoRecord {
    fn from(body: RunPostpone) -> Self {
        Self::RunPostpone(body)
    }
}

impl From<Compensate> for RedoRecord {
    fn from(body: Compensate) -> Self {
        Self::Compensate(body)
    }
}

/// XOR-folds `data` against `base`, prefix-wise.
///
/// The operation is an involution: folding a redo image against its undo
/// image produces the stored diff, and folding the diff against the same
/// undo image restores the redo image.
pub fn xor_fold(data: &mut [u8], base: &[u8]) {
    for (byte, mask) in data.iter_mut().zip(base.iter()) {
        *byte ^= mask;
    }
}

fn ensure_remaining(buf: &impl Buf, needed: usize) -> LogResult<()> {
    if buf.remaining() < needed {
        return Err(LogError::truncated_record(
            Lsa::NULL,
            needed,
            buf.remaining(),
        ));
    }
    Ok(())
}
