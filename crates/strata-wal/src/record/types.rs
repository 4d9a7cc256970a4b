//! Record kind tags.

use std::fmt;

use crate::error::{WalError, WalResult};

/// Kind tag written as the first byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordKind {
    /// A tuple was inserted.
    TupleInsert = 1,
    /// A tuple was deleted.
    TupleDelete = 2,
    /// A tuple was replaced by a new version.
    TupleUpdate = 3,
    /// A transaction began.
    TransactionBegin = 4,
    /// A transaction committed.
    TransactionCommit = 5,
    /// A transaction aborted.
    TransactionAbort = 6,
}

impl RecordKind {
    /// The tag byte.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parses a tag byte.
    pub fn from_u8(value: u8) -> WalResult<Self> {
        match value {
            1 => Ok(Self::TupleInsert),
            2 => Ok(Self::TupleDelete),
            3 => Ok(Self::TupleUpdate),
            4 => Ok(Self::TransactionBegin),
            5 => Ok(Self::TransactionCommit),
            6 => Ok(Self::TransactionAbort),
            _ => Err(WalError::deserialization(format!(
                "unknown record kind: {}",
                value
            ))),
        }
    }

    /// Returns true for the tuple record kinds.
    pub const fn is_tuple_record(self) -> bool {
        matches!(self, Self::TupleInsert | Self::TupleDelete | Self::TupleUpdate)
    }

    /// Name used in diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            Self::TupleInsert => "TupleInsert",
            Self::TupleDelete => "TupleDelete",
            Self::TupleUpdate => "TupleUpdate",
            Self::TransactionBegin => "TransactionBegin",
            Self::TransactionCommit => "TransactionCommit",
            Self::TransactionAbort => "TransactionAbort",
        }
    }

    /// Whether a tuple record of this kind must carry an insert location.
    pub(crate) const fn needs_insert_location(self) -> bool {
        matches!(self, Self::TupleInsert | Self::TupleUpdate)
    }

    /// Whether a tuple record of this kind must carry a delete location.
    pub(crate) const fn needs_delete_location(self) -> bool {
        matches!(self, Self::TupleDelete | Self::TupleUpdate)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        for tag in 1..=6u8 {
            let kind = RecordKind::from_u8(tag).unwrap();
            assert_eq!(kind.as_u8(), tag);
        }
        assert!(RecordKind::from_u8(0).is_err());
        assert!(RecordKind::from_u8(7).is_err());
    }

    #[test]
    fn test_location_requirements() {
        assert!(RecordKind::TupleInsert.needs_insert_location());
        assert!(!RecordKind::TupleInsert.needs_delete_location());
        assert!(RecordKind::TupleDelete.needs_delete_location());
        assert!(RecordKind::TupleUpdate.needs_insert_location());
        assert!(RecordKind::TupleUpdate.needs_delete_location());
        assert!(!RecordKind::TransactionCommit.is_tuple_record());
    }
}
