//! Tuple record bodies.
//!
//! Body layout (big-endian):
//!
//! ```text
//! txn_id u64 | database_id u32 | table_id u32
//! insert (tile_group u32, slot u32) | delete (tile_group u32, slot u32)
//! payload_len u32 | payload
//! ```
//!
//! Locations a record kind does not use are written as the invalid location.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use strata_common::types::{Oid, SlotId, TupleLocation, TxnId};
use strata_storage::catalog::Schema;
use strata_storage::serializer::{SerializeInput, SerializeOutput};
use strata_storage::tuple::Tuple;

use crate::error::{WalError, WalResult};

const FIXED_BODY_SIZE: usize = 8 + 4 + 4 + 8 + 8 + 4;

/// Location-addressed change to one tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleRecord {
    /// Writing transaction.
    pub txn_id: TxnId,
    /// Database of the table.
    pub database_id: Oid,
    /// Table written.
    pub table_id: Oid,
    /// Location of the new version.
    pub insert_location: TupleLocation,
    /// Location of the superseded version.
    pub delete_location: TupleLocation,
    /// Serialized tuple, empty for deletes.
    pub payload: Bytes,
}

impl TupleRecord {
    /// Encodes `tuple` in the tile wire format as a record payload.
    pub fn encode_payload(schema: &Schema, tuple: &Tuple) -> WalResult<Bytes> {
        let mut out = SerializeOutput::new();
        tuple.serialize_to(schema, &mut out)?;
        Ok(out.freeze())
    }

    /// Decodes the payload back into a tuple of `schema`.
    pub fn decode_payload(&self, schema: &Schema) -> WalResult<Tuple> {
        let mut input = SerializeInput::new(&self.payload);
        let tuple = Tuple::deserialize_from(schema, &mut input)?;
        if input.remaining() != 0 {
            return Err(WalError::deserialization(format!(
                "{} trailing bytes after tuple payload",
                input.remaining()
            )));
        }
        Ok(tuple)
    }

    pub(crate) fn encoded_len(&self) -> usize {
        FIXED_BODY_SIZE + self.payload.len()
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) -> WalResult<()> {
        let payload_len = u32::try_from(self.payload.len()).map_err(|_| WalError::RecordTooLarge {
            size: self.payload.len(),
            max: u32::MAX as usize,
        })?;
        buf.put_u64(self.txn_id.as_u64());
        buf.put_u32(self.database_id.as_u32());
        buf.put_u32(self.table_id.as_u32());
        put_location(buf, self.insert_location);
        put_location(buf, self.delete_location);
        buf.put_u32(payload_len);
        buf.extend_from_slice(&self.payload);
        Ok(())
    }

    pub(crate) fn decode(mut body: &[u8]) -> WalResult<Self> {
        if body.remaining() < FIXED_BODY_SIZE {
            return Err(WalError::deserialization(format!(
                "tuple record too short: {} < {}",
                body.remaining(),
                FIXED_BODY_SIZE
            )));
        }
        let txn_id = TxnId::new(body.get_u64());
        let database_id = Oid::new(body.get_u32());
        let table_id = Oid::new(body.get_u32());
        let insert_location = get_location(&mut body);
        let delete_location = get_location(&mut body);
        let payload_len = body.get_u32() as usize;
        if body.remaining() != payload_len {
            return Err(WalError::deserialization(format!(
                "tuple payload length {} but {} bytes remain",
                payload_len,
                body.remaining()
            )));
        }
        Ok(Self {
            txn_id,
            database_id,
            table_id,
            insert_location,
            delete_location,
            payload: Bytes::copy_from_slice(body),
        })
    }
}

fn put_location(buf: &mut BytesMut, location: TupleLocation) {
    buf.put_u32(location.tile_group_id.as_u32());
    buf.put_u32(location.slot.as_u32());
}

fn get_location(buf: &mut &[u8]) -> TupleLocation {
    let tile_group_id = Oid::new(buf.get_u32());
    let slot = SlotId::new(buf.get_u32());
    TupleLocation::new(tile_group_id, slot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_storage::catalog::{Column, ValueType};
    use strata_storage::tuple::Value;

    fn record(payload: Bytes) -> TupleRecord {
        TupleRecord {
            txn_id: TxnId::new(12),
            database_id: Oid::new(1),
            table_id: Oid::new(7),
            insert_location: TupleLocation::new(Oid::new(3), SlotId::new(9)),
            delete_location: TupleLocation::INVALID,
            payload,
        }
    }

    #[test]
    fn test_body_layout() {
        let rec = record(Bytes::from_static(b"xyz"));
        let mut buf = BytesMut::new();
        rec.encode(&mut buf).unwrap();

        assert_eq!(buf.len(), rec.encoded_len());
        assert_eq!(&buf[..8], &12u64.to_be_bytes());
        assert_eq!(&buf[16..20], &3u32.to_be_bytes());
        assert_eq!(&buf[24..28], &u32::MAX.to_be_bytes());
        assert_eq!(&buf[buf.len() - 3..], b"xyz");

        assert_eq!(TupleRecord::decode(&buf).unwrap(), rec);
    }

    #[test]
    fn test_decode_rejects_bad_lengths() {
        let rec = record(Bytes::from_static(b"abcd"));
        let mut buf = BytesMut::new();
        rec.encode(&mut buf).unwrap();

        assert!(TupleRecord::decode(&buf[..10]).is_err());
        assert!(TupleRecord::decode(&buf[..buf.len() - 1]).is_err());
    }

    #[test]
    fn test_tuple_payload() {
        let schema = Schema::new(vec![
            Column::fixed("id", ValueType::Integer, false),
            Column::varchar("name", 64, true),
        ])
        .unwrap();
        let tuple = Tuple::new(vec![Value::Integer(5), Value::Null]);

        let rec = record(TupleRecord::encode_payload(&schema, &tuple).unwrap());
        assert_eq!(rec.decode_payload(&schema).unwrap(), tuple);

        let wrong = Schema::new(vec![Column::fixed("id", ValueType::Integer, false)]).unwrap();
        assert!(matches!(
            rec.decode_payload(&wrong),
            Err(WalError::Deserialization { .. })
        ));
    }
}
