//! Log records and their frames.

pub mod tuple;
pub mod types;

pub use tuple::TupleRecord;
pub use types::RecordKind;

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use strata_common::types::{CommitId, TxnId};

use crate::error::{WalError, WalResult};

/// Bytes preceding every record body: kind, body length and checksum.
pub const FRAME_HEADER_SIZE: usize = 1 + 4 + 4;

/// Largest body a frame may carry.
pub const MAX_RECORD_SIZE: usize = 64 * 1024 * 1024;

/// A log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// New version written at `insert_location`.
    TupleInsert(TupleRecord),
    /// Version at `delete_location` deleted.
    TupleDelete(TupleRecord),
    /// Version at `delete_location` superseded by one at `insert_location`.
    TupleUpdate(TupleRecord),
    /// Transaction started.
    TransactionBegin {
        /// Transaction.
        txn_id: TxnId,
    },
    /// Transaction committed.
    TransactionCommit {
        /// Transaction.
        txn_id: TxnId,
        /// Commit id assigned to its writes.
        commit_id: CommitId,
    },
    /// Transaction rolled back.
    TransactionAbort {
        /// Transaction.
        txn_id: TxnId,
    },
}

impl LogRecord {
    /// Kind tag of this record.
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::TupleInsert(_) => RecordKind::TupleInsert,
            Self::TupleDelete(_) => RecordKind::TupleDelete,
            Self::TupleUpdate(_) => RecordKind::TupleUpdate,
            Self::TransactionBegin { .. } => RecordKind::TransactionBegin,
            Self::TransactionCommit { .. } => RecordKind::TransactionCommit,
            Self::TransactionAbort { .. } => RecordKind::TransactionAbort,
        }
    }

    /// Transaction that produced this record.
    pub fn txn_id(&self) -> TxnId {
        match self {
            Self::TupleInsert(r) | Self::TupleDelete(r) | Self::TupleUpdate(r) => r.txn_id,
            Self::TransactionBegin { txn_id }
            | Self::TransactionCommit { txn_id, .. }
            | Self::TransactionAbort { txn_id } => *txn_id,
        }
    }

    /// Tuple body, if this is a tuple record.
    pub fn tuple_record(&self) -> Option<&TupleRecord> {
        match self {
            Self::TupleInsert(r) | Self::TupleDelete(r) | Self::TupleUpdate(r) => Some(r),
            _ => None,
        }
    }

    fn check_locations(&self) -> WalResult<()> {
        let Some(record) = self.tuple_record() else {
            return Ok(());
        };
        let kind = self.kind();
        if kind.needs_insert_location() && !record.insert_location.is_valid() {
            return Err(WalError::MissingLocation {
                kind: kind.name(),
                location: "insert",
            });
        }
        if kind.needs_delete_location() && !record.delete_location.is_valid() {
            return Err(WalError::MissingLocation {
                kind: kind.name(),
                location: "delete",
            });
        }
        Ok(())
    }

    fn body_len(&self) -> usize {
        match self {
            Self::TupleInsert(r) | Self::TupleDelete(r) | Self::TupleUpdate(r) => r.encoded_len(),
            Self::TransactionCommit { .. } => 16,
            Self::TransactionBegin { .. } | Self::TransactionAbort { .. } => 8,
        }
    }

    /// Appends this record's frame to `buf`.
    pub fn encode_to(&self, buf: &mut BytesMut) -> WalResult<()> {
        self.check_locations()?;
        let body_len = self.body_len();
        if body_len > MAX_RECORD_SIZE {
            return Err(WalError::RecordTooLarge {
                size: body_len,
                max: MAX_RECORD_SIZE,
            });
        }

        let mut body = BytesMut::with_capacity(body_len);
        match self {
            Self::TupleInsert(r) | Self::TupleDelete(r) | Self::TupleUpdate(r) => r.encode(&mut body)?,
            Self::TransactionBegin { txn_id } | Self::TransactionAbort { txn_id } => {
                body.put_u64(txn_id.as_u64());
            }
            Self::TransactionCommit { txn_id, commit_id } => {
                body.put_u64(txn_id.as_u64());
                body.put_u64(commit_id.as_u64());
            }
        }

        buf.reserve(FRAME_HEADER_SIZE + body.len());
        buf.put_u8(self.kind().as_u8());
        // body_len <= MAX_RECORD_SIZE
        buf.put_u32(body.len() as u32);
        buf.put_u32(crc32fast::hash(&body));
        buf.extend_from_slice(&body);
        Ok(())
    }

    /// Encodes this record as a standalone frame.
    pub fn encode(&self) -> WalResult<Bytes> {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + self.body_len());
        self.encode_to(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decodes the frame at the start of `bytes`, returning the record and
    /// the number of bytes consumed. `offset` is only used in errors.
    pub fn decode_frame(bytes: &[u8], offset: usize) -> WalResult<(Self, usize)> {
        let mut header = bytes;
        if header.remaining() < FRAME_HEADER_SIZE {
            return Err(WalError::deserialization(format!(
                "truncated frame header at offset {}",
                offset
            )));
        }
        let kind = RecordKind::from_u8(header.get_u8())?;
        let body_len = header.get_u32() as usize;
        let expected = header.get_u32();
        if body_len > MAX_RECORD_SIZE {
            return Err(WalError::RecordTooLarge {
                size: body_len,
                max: MAX_RECORD_SIZE,
            });
        }
        if header.remaining() < body_len {
            return Err(WalError::deserialization(format!(
                "truncated {} body at offset {}: need {} bytes, have {}",
                kind,
                offset,
                body_len,
                header.remaining()
            )));
        }

        let body = &header[..body_len];
        let computed = crc32fast::hash(body);
        if computed != expected {
            return Err(WalError::checksum_mismatch(offset, expected, computed));
        }

        let record = Self::decode_body(kind, body)?;
        Ok((record, FRAME_HEADER_SIZE + body_len))
    }

    fn decode_body(kind: RecordKind, mut body: &[u8]) -> WalResult<Self> {
        let record = match kind {
            RecordKind::TupleInsert => Self::TupleInsert(TupleRecord::decode(body)?),
            RecordKind::TupleDelete => Self::TupleDelete(TupleRecord::decode(body)?),
            RecordKind::TupleUpdate => Self::TupleUpdate(TupleRecord::decode(body)?),
            RecordKind::TransactionBegin | RecordKind::TransactionAbort => {
                expect_len(kind, body, 8)?;
                let txn_id = TxnId::new(body.get_u64());
                if kind == RecordKind::TransactionBegin {
                    Self::TransactionBegin { txn_id }
                } else {
                    Self::TransactionAbort { txn_id }
                }
            }
            RecordKind::TransactionCommit => {
                expect_len(kind, body, 16)?;
                Self::TransactionCommit {
                    txn_id: TxnId::new(body.get_u64()),
                    commit_id: CommitId::new(body.get_u64()),
                }
            }
        };
        record.check_locations()?;
        Ok(record)
    }
}

fn expect_len(kind: RecordKind, body: &[u8], len: usize) -> WalResult<()> {
    if body.len() != len {
        return Err(WalError::deserialization(format!(
            "{} body must be {} bytes, got {}",
            kind,
            len,
            body.len()
        )));
    }
    Ok(())
}

/// Decodes a sequence of back-to-back frames.
pub fn decode_all(bytes: &[u8]) -> WalResult<Vec<LogRecord>> {
    let mut records = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let (record, consumed) = LogRecord::decode_frame(&bytes[offset..], offset)?;
        records.push(record);
        offset += consumed;
    }
    Ok(records)
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TupleInsert(r) | Self::TupleDelete(r) | Self::TupleUpdate(r) => write!(
                f,
                "{} txn {} db {} table {} insert {} delete {} payload {} bytes",
                self.kind(),
                r.txn_id,
                r.database_id,
                r.table_id,
                r.insert_location,
                r.delete_location,
                r.payload.len()
            ),
            Self::TransactionCommit { txn_id, commit_id } => {
                write!(f, "TransactionCommit txn {} cid {}", txn_id, commit_id)
            }
            Self::TransactionBegin { txn_id } | Self::TransactionAbort { txn_id } => {
                write!(f, "{} txn {}", self.kind(), txn_id)
            }
        }
    }
}
