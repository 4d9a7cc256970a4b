//! Core identifier types for Strata.
//!
//! These types provide type-safe wrappers around numeric identifiers,
//! preventing accidental misuse of catalog ids, transaction ids, commit ids
//! and slot indexes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Catalog object identifier (database, table, tile group or tile).
///
/// # Example
///
/// ```rust
/// use strata_common::types::Oid;
///
/// let table = Oid::new(42);
/// assert!(table.is_valid());
/// assert!(!Oid::INVALID.is_valid());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Oid(u32);

impl Oid {
    /// Invalid object id, used for tiles that are not attached to a catalog object.
    pub const INVALID: Self = Self(u32::MAX);

    /// Creates a new `Oid` from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw u32 value.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the next object id.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Checks if this is a valid object id.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl Default for Oid {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "Oid(INVALID)")
        } else {
            write!(f, "Oid({})", self.0)
        }
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "-")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<u32> for Oid {
    #[inline]
    fn from(id: u32) -> Self {
        Self::new(id)
    }
}

/// Transaction identifier.
///
/// A transaction id names the writer that owns a slot's metadata while its
/// insert or delete is still uncommitted.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TxnId(u64);

impl TxnId {
    /// Invalid transaction id. A slot owned by `INVALID` has no writer.
    pub const INVALID: Self = Self(0);

    /// Minimum valid transaction id.
    pub const MIN: Self = Self(1);

    /// Creates a new `TxnId` from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next transaction id.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Checks if this is a valid transaction id.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl fmt::Debug for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "TxnId(INVALID)")
        } else {
            write!(f, "TxnId({})", self.0)
        }
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TxnId {
    #[inline]
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

/// Commit identifier, the snapshot timestamp used by the visibility predicate.
///
/// `INFINITY` marks an open-ended version (not yet deleted) and a begin
/// timestamp that has not been committed yet. `PENDING_END` marks a delete
/// that is in progress: it is finite, so the slot counts as superseded, but it
/// is larger than every real commit id, so other snapshots still see the row.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct CommitId(u64);

impl CommitId {
    /// Invalid commit id.
    pub const INVALID: Self = Self(0);

    /// Open end of a live version, and the begin of an uncommitted insert.
    pub const INFINITY: Self = Self(u64::MAX);

    /// End stamp of a version whose delete has not committed yet.
    pub const PENDING_END: Self = Self(u64::MAX - 1);

    /// Largest commit id a transaction manager may hand out.
    pub const MAX: Self = Self(u64::MAX - 2);

    /// Creates a new `CommitId` from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns true for `INFINITY`.
    #[inline]
    #[must_use]
    pub const fn is_infinity(self) -> bool {
        self.0 == Self::INFINITY.0
    }

    /// Returns true if this id can be handed out as a real commit timestamp.
    #[inline]
    #[must_use]
    pub const fn is_committable(self) -> bool {
        self.0 != Self::INVALID.0 && self.0 <= Self::MAX.0
    }
}

impl fmt::Debug for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::INFINITY => write!(f, "CommitId(INF)"),
            Self::PENDING_END => write!(f, "CommitId(PENDING)"),
            _ => write!(f, "CommitId({})", self.0),
        }
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::INFINITY => write!(f, "INF"),
            Self::PENDING_END => write!(f, "PENDING"),
            _ => write!(f, "{}", self.0),
        }
    }
}

impl From<u64> for CommitId {
    #[inline]
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

/// Index of a tuple slot inside a tile or tile group.
///
/// Slot ids are checked against capacity at every storage entry point; the
/// newtype only guarantees that a slot id is never confused with a column id.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SlotId(u32);

impl SlotId {
    /// Creates a new `SlotId`.
    #[inline]
    #[must_use]
    pub const fn new(slot: u32) -> Self {
        Self(slot)
    }

    /// Returns the raw u32 value.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the slot as a `usize` index.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotId({})", self.0)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SlotId {
    #[inline]
    fn from(slot: u32) -> Self {
        Self::new(slot)
    }
}

/// Physical location of a tuple: the tile group that holds it and its slot.
///
/// This is the location type carried by tuple log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupleLocation {
    /// Tile group holding the tuple.
    pub tile_group_id: Oid,
    /// Slot inside the tile group.
    pub slot: SlotId,
}

impl TupleLocation {
    /// A location that points nowhere.
    pub const INVALID: Self = Self {
        tile_group_id: Oid::INVALID,
        slot: SlotId(u32::MAX),
    };

    /// Creates a new location.
    #[inline]
    #[must_use]
    pub const fn new(tile_group_id: Oid, slot: SlotId) -> Self {
        Self {
            tile_group_id,
            slot,
        }
    }

    /// Returns true if the location names a real tile group.
    #[inline]
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.tile_group_id.is_valid()
    }
}

impl Default for TupleLocation {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for TupleLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.tile_group_id, self.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oid_validity() {
        assert!(Oid::new(0).is_valid());
        assert!(!Oid::INVALID.is_valid());
        assert_eq!(Oid::default(), Oid::INVALID);
        assert_eq!(Oid::new(4).next(), Oid::new(5));
    }

    #[test]
    fn test_commit_id_ordering() {
        let cid = CommitId::new(100);
        assert!(cid < CommitId::MAX);
        assert!(CommitId::MAX < CommitId::PENDING_END);
        assert!(CommitId::PENDING_END < CommitId::INFINITY);
        assert!(cid.is_committable());
        assert!(!CommitId::INVALID.is_committable());
        assert!(!CommitId::PENDING_END.is_committable());
        assert!(CommitId::INFINITY.is_infinity());
    }

    #[test]
    fn test_display() {
        assert_eq!(CommitId::INFINITY.to_string(), "INF");
        assert_eq!(Oid::INVALID.to_string(), "-");
        let loc = TupleLocation::new(Oid::new(2), SlotId::new(9));
        assert_eq!(loc.to_string(), "(2, 9)");
        assert!(loc.is_valid());
        assert!(!TupleLocation::default().is_valid());
    }

    #[test]
    fn test_txn_id() {
        assert!(!TxnId::INVALID.is_valid());
        assert!(TxnId::MIN.is_valid());
        assert_eq!(TxnId::from(3).next(), TxnId::new(4));
        assert_eq!(format!("{:?}", TxnId::INVALID), "TxnId(INVALID)");
    }
}
