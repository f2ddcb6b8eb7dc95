//! Log record header.

use bytes::{Buf, BufMut};

use harbor_common::types::Lsa;

use super::body::FixedBody;
use super::types::RecordType;
use super::{get_lsa, put_lsa, LSA_WIRE_SIZE};
use crate::error::{LogError, LogResult};

/// Fixed prefix of every log record (32 bytes serialized).
///
/// Layout:
/// - record_type: 1 byte
/// - reserved: 3 bytes
/// - trid: 4 bytes (transaction that produced the record)
/// - back_lsa: 12 bytes (previous record of the same transaction)
/// - forward_lsa: 12 bytes (address of the next record)
///
/// `forward_lsa` is the sole means of advancing the replication cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Type of the record.
    pub record_type: RecordType,
    /// Transaction that produced the record.
    pub trid: u32,
    /// Previous record of the same transaction, null for the first.
    pub back_lsa: Lsa,
    /// Address of the next record in the log.
    pub forward_lsa: Lsa,
}

impl RecordHeader {
    /// Serialized size of the header in bytes.
    pub const SIZE: usize = 8 + 2 * LSA_WIRE_SIZE;
}

impl FixedBody for RecordHeader {
    const SIZE: usize = 8 + 2 * LSA_WIRE_SIZE;

    fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.record_type.as_u8());
        buf.put_u8(0); // reserved
        buf.put_u16(0); // reserved
        buf.put_u32(self.trid);
        put_lsa(buf, self.back_lsa);
        put_lsa(buf, self.forward_lsa);
    }

    fn deserialize(buf: &mut impl Buf) -> LogResult<Self> {
        if buf.remaining() < Self::SIZE {
            return Err(LogError::truncated_record(
                Lsa::NULL,
                Self::SIZE,
                buf.remaining(),
            ));
        }

        let record_type = RecordType::from_u8(buf.get_u8());
        let _reserved = buf.get_u8();
        let _reserved = buf.get_u16();
        let trid = buf.get_u32();
        let back_lsa = get_lsa(buf);
        let forward_lsa = get_lsa(buf);

        Ok(Self {
            record_type,
            trid,
            back_lsa,
            forward_lsa,
        })
    }
}
