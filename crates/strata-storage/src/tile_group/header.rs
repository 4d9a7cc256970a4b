//! Tile group header: per-slot MVCC metadata.
//!
//! Every slot of a tile group carries three words:
//!
//! - `owner`: the transaction holding the slot's write lock, or INVALID
//! - `begin`: commit id from which the version is visible (`INFINITY` while
//!   the insert is uncommitted)
//! - `end`: commit id at which the version stops being visible (`INFINITY`
//!   while live, `PENDING_END` while a delete is uncommitted)
//!
//! # Visibility
//!
//! A slot is visible to `(reader_txn, reader_cid)` when
//!
//! 1. the reader owns it and it is not deleted (`owner == reader_txn && end == INFINITY`), or
//! 2. it was committed at or before the snapshot and not deleted by then
//!    (`begin <= reader_cid && (end == INFINITY || end > reader_cid)`).
//!
//! # Ordering
//!
//! Writers publish `begin`/`end` before releasing `owner`, all with
//! `Release`. Readers load `owner`, then `begin`, then `end` with `Acquire`,
//! so a reader that sees a released owner also sees the final timestamps.

use std::fmt;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use strata_common::types::{CommitId, Oid, SlotId, TxnId};
use strata_common::{StrataError, StrataResult};

/// The two-clause visibility rule over raw slot metadata.
///
/// An INVALID reader sees nothing: committed and aborted versions both carry
/// an INVALID owner, so the own-write clause would otherwise match them.
#[inline]
#[must_use]
pub fn is_visible_version(
    owner: TxnId,
    begin: CommitId,
    end: CommitId,
    reader_txn: TxnId,
    reader_cid: CommitId,
) -> bool {
    if !reader_txn.is_valid() {
        return false;
    }
    let own_write = owner == reader_txn && end.is_infinity();
    let committed = begin <= reader_cid && (end.is_infinity() || end > reader_cid);
    own_write || committed
}

/// Observed state of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// At or beyond the next free slot.
    Unallocated,
    /// A version with an open end.
    Active {
        /// Write-lock holder, INVALID when unlocked.
        owner: TxnId,
        /// Commit id of the insert, `INFINITY` while uncommitted.
        begin: CommitId,
    },
    /// A version with a finite or pending end.
    Superseded {
        /// Write-lock holder, INVALID when unlocked.
        owner: TxnId,
        /// Commit id of the insert.
        begin: CommitId,
        /// Commit id of the delete, `PENDING_END` while uncommitted.
        end: CommitId,
    },
}

impl SlotState {
    /// Applies the visibility rule to this state.
    #[must_use]
    pub fn is_visible_to(&self, reader_txn: TxnId, reader_cid: CommitId) -> bool {
        match *self {
            SlotState::Unallocated => false,
            SlotState::Active { owner, begin } => {
                is_visible_version(owner, begin, CommitId::INFINITY, reader_txn, reader_cid)
            }
            SlotState::Superseded { owner, begin, end } => {
                is_visible_version(owner, begin, end, reader_txn, reader_cid)
            }
        }
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotState::Unallocated => write!(f, "unallocated"),
            SlotState::Active { owner, begin } => {
                write!(f, "active (owner {}, begin {})", owner, begin)
            }
            SlotState::Superseded { owner, begin, end } => {
                write!(f, "superseded (owner {}, begin {}, end {})", owner, begin, end)
            }
        }
    }
}

struct SlotMeta {
    owner: AtomicU64,
    begin: AtomicU64,
    end: AtomicU64,
}

impl SlotMeta {
    fn unclaimed() -> Self {
        Self {
            owner: AtomicU64::new(TxnId::INVALID.as_u64()),
            begin: AtomicU64::new(CommitId::INFINITY.as_u64()),
            end: AtomicU64::new(CommitId::INFINITY.as_u64()),
        }
    }

    fn owner(&self) -> TxnId {
        TxnId::new(self.owner.load(Ordering::Acquire))
    }

    fn begin(&self) -> CommitId {
        CommitId::new(self.begin.load(Ordering::Acquire))
    }

    fn end(&self) -> CommitId {
        CommitId::new(self.end.load(Ordering::Acquire))
    }
}

/// MVCC metadata and slot allocator of one tile group.
///
/// # Example
///
/// ```rust
/// use strata_common::types::{CommitId, Oid, TxnId};
/// use strata_storage::tile_group::TileGroupHeader;
///
/// let header = TileGroupHeader::new(Oid::new(0), 4);
/// let writer = TxnId::new(1);
/// let slot = header.reserve_slot(writer).unwrap();
///
/// // the writer sees its own insert, nobody else does
/// assert!(header.is_visible(slot, writer, CommitId::new(1)));
/// assert!(!header.is_visible(slot, TxnId::new(2), CommitId::new(10)));
///
/// header.commit_insert(slot, CommitId::new(5)).unwrap();
/// assert!(header.is_visible(slot, TxnId::new(2), CommitId::new(5)));
/// ```
pub struct TileGroupHeader {
    tile_group_id: Oid,
    capacity: usize,
    next_free_slot: AtomicUsize,
    slots: Box<[SlotMeta]>,
}

impl TileGroupHeader {
    /// Creates a header with `capacity` unallocated slots.
    #[must_use]
    pub fn new(tile_group_id: Oid, capacity: usize) -> Self {
        Self {
            tile_group_id,
            capacity,
            next_free_slot: AtomicUsize::new(0),
            slots: (0..capacity).map(|_| SlotMeta::unclaimed()).collect(),
        }
    }

    /// Owning tile group.
    #[inline]
    #[must_use]
    pub fn tile_group_id(&self) -> Oid {
        self.tile_group_id
    }

    /// Number of slots.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Upper bound of allocated slots; scans stop here.
    #[inline]
    #[must_use]
    pub fn next_tuple_slot(&self) -> usize {
        self.next_free_slot.load(Ordering::Acquire)
    }

    /// Atomically hands out the next slot. Never advances past capacity.
    pub fn reserve_next_slot(&self) -> StrataResult<SlotId> {
        let capacity = self.capacity;
        self.next_free_slot
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |next| {
                (next < capacity).then_some(next + 1)
            })
            // capacity never exceeds u32::MAX
            .map(|slot| SlotId::new(slot as u32))
            .map_err(|_| StrataError::GroupFull {
                tile_group_id: self.tile_group_id,
                capacity,
            })
    }

    /// Reserves a slot and claims it for `txn` as an uncommitted insert.
    pub fn reserve_slot(&self, txn: TxnId) -> StrataResult<SlotId> {
        if !txn.is_valid() {
            return Err(StrataError::invalid_argument("cannot claim a slot for INVALID txn"));
        }
        let slot = self.reserve_next_slot()?;
        let meta = &self.slots[slot.as_usize()];
        meta.end.store(CommitId::INFINITY.as_u64(), Ordering::Release);
        meta.begin.store(CommitId::INFINITY.as_u64(), Ordering::Release);
        meta.owner.store(txn.as_u64(), Ordering::Release);
        Ok(slot)
    }

    fn meta(&self, slot: SlotId) -> StrataResult<&SlotMeta> {
        let index = slot.as_usize();
        if index >= self.next_tuple_slot() {
            if index >= self.capacity {
                return Err(StrataError::SlotOutOfRange {
                    slot,
                    capacity: self.capacity,
                });
            }
            return Err(self.illegal(slot, "modify"));
        }
        Ok(&self.slots[index])
    }

    fn illegal(&self, slot: SlotId, action: &'static str) -> StrataError {
        StrataError::IllegalTransition {
            slot,
            state: self.slot_state(slot).to_string(),
            action,
        }
    }

    /// Publishes an insert at `cid` and releases the write lock.
    pub fn commit_insert(&self, slot: SlotId, cid: CommitId) -> StrataResult<()> {
        let meta = self.meta(slot)?;
        if !cid.is_committable() {
            return Err(StrataError::invalid_argument(format!(
                "commit id {} cannot be committed",
                cid
            )));
        }
        if !meta.owner().is_valid() {
            return Err(self.illegal(slot, "commit insert"));
        }
        meta.begin
            .compare_exchange(
                CommitId::INFINITY.as_u64(),
                cid.as_u64(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| self.illegal(slot, "commit insert"))?;
        meta.owner.store(TxnId::INVALID.as_u64(), Ordering::Release);
        Ok(())
    }

    /// Abandons an uncommitted insert. The slot stays permanently invisible.
    pub fn abort_insert(&self, slot: SlotId) -> StrataResult<()> {
        let meta = self.meta(slot)?;
        if !meta.begin().is_infinity() || !meta.owner().is_valid() {
            return Err(self.illegal(slot, "abort insert"));
        }
        meta.owner.store(TxnId::INVALID.as_u64(), Ordering::Release);
        Ok(())
    }

    /// Takes the write lock of a committed live version for `txn` and marks
    /// it as tentatively deleted.
    ///
    /// A slot locked by another transaction fails with `WriteConflict`. The
    /// version is checked only after the lock is won, so a delete committed
    /// by the previous holder can never be overwritten.
    pub fn mark_deleted(&self, slot: SlotId, txn: TxnId) -> StrataResult<()> {
        let meta = self.meta(slot)?;
        if !txn.is_valid() {
            return Err(StrataError::invalid_argument("cannot delete as INVALID txn"));
        }
        if let Err(holder) = meta.owner.compare_exchange(
            TxnId::INVALID.as_u64(),
            txn.as_u64(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return Err(StrataError::WriteConflict {
                slot,
                holder: TxnId::new(holder),
            });
        }

        let published = !meta.begin().is_infinity()
            && meta
                .end
                .compare_exchange(
                    CommitId::INFINITY.as_u64(),
                    CommitId::PENDING_END.as_u64(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok();
        if !published {
            meta.owner.store(TxnId::INVALID.as_u64(), Ordering::Release);
            return Err(self.illegal(slot, "delete"));
        }
        Ok(())
    }

    /// Publishes a delete at `cid` and releases the write lock.
    pub fn commit_delete(&self, slot: SlotId, cid: CommitId) -> StrataResult<()> {
        let meta = self.meta(slot)?;
        if !cid.is_committable() {
            return Err(StrataError::invalid_argument(format!(
                "commit id {} cannot be committed",
                cid
            )));
        }
        if meta.end() != CommitId::PENDING_END || cid < meta.begin() {
            return Err(self.illegal(slot, "commit delete"));
        }
        meta.end.store(cid.as_u64(), Ordering::Release);
        meta.owner.store(TxnId::INVALID.as_u64(), Ordering::Release);
        Ok(())
    }

    /// Reverts a tentative delete and releases the write lock.
    pub fn abort_delete(&self, slot: SlotId) -> StrataResult<()> {
        let meta = self.meta(slot)?;
        if meta.end() != CommitId::PENDING_END {
            return Err(self.illegal(slot, "abort delete"));
        }
        meta.end.store(CommitId::INFINITY.as_u64(), Ordering::Release);
        meta.owner.store(TxnId::INVALID.as_u64(), Ordering::Release);
        Ok(())
    }

    /// Snapshot of a slot's metadata.
    #[must_use]
    pub fn slot_state(&self, slot: SlotId) -> SlotState {
        let index = slot.as_usize();
        if index >= self.next_tuple_slot() {
            return SlotState::Unallocated;
        }
        let meta = &self.slots[index];
        let owner = meta.owner();
        let begin = meta.begin();
        let end = meta.end();
        if end.is_infinity() {
            SlotState::Active { owner, begin }
        } else {
            SlotState::Superseded { owner, begin, end }
        }
    }

    /// Lock-free visibility check. Unallocated and out-of-range slots are
    /// never visible, and neither is anything to an INVALID reader.
    #[must_use]
    pub fn is_visible(&self, slot: SlotId, reader_txn: TxnId, reader_cid: CommitId) -> bool {
        self.slot_state(slot).is_visible_to(reader_txn, reader_cid)
    }

    /// Committed versions with an open end.
    #[must_use]
    pub fn active_tuple_count(&self) -> usize {
        self.slots[..self.next_tuple_slot()]
            .iter()
            .filter(|meta| !meta.begin().is_infinity() && meta.end().is_infinity())
            .count()
    }

    /// One line per allocated slot with its metadata and visibility.
    #[must_use]
    pub fn visibility_report(&self, reader_txn: TxnId, reader_cid: CommitId) -> String {
        let mut report = format!(
            "tile group {}: {} of {} slots allocated, reader txn {} at cid {}\n",
            self.tile_group_id,
            self.next_tuple_slot(),
            self.capacity,
            reader_txn,
            reader_cid
        );
        for index in 0..self.next_tuple_slot() {
            // index < capacity <= u32::MAX
            let slot = SlotId::new(index as u32);
            let state = self.slot_state(slot);
            let _ = writeln!(
                report,
                "  slot {}: {} visible={}",
                slot,
                state,
                state.is_visible_to(reader_txn, reader_cid)
            );
        }
        report
    }
}

impl fmt::Debug for TileGroupHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileGroupHeader")
            .field("tile_group_id", &self.tile_group_id)
            .field("capacity", &self.capacity)
            .field("next_free_slot", &self.next_tuple_slot())
            .finish()
    }
}
