//! # strata-wal
//!
//! Log records emitted by Strata storage.
//!
//! Tuple records describe an insert, delete or update by the slot locations
//! they touched and carry the serialized tuple as an opaque payload.
//! Transaction records mark begin, commit and abort. Every record is framed
//! with a kind tag, a body length and a CRC32 of the body:
//!
//! ```text
//! +------+----------+---------+------------------+
//! | kind | body_len |  crc32  |       body       |
//! |  u8  |   u32    |   u32   |  body_len bytes  |
//! +------+----------+---------+------------------+
//! ```
//!
//! Durability, segmenting and replay ordering belong to whatever consumes the
//! frames through a [`LogSink`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod record;
pub mod sink;

pub use error::{WalError, WalResult};
pub use record::{decode_all, LogRecord, RecordKind, TupleRecord, FRAME_HEADER_SIZE};
pub use sink::{LogSink, MemoryLogSink};
