//! Sequential scan.
//!
//! Walks tile groups in order and produces one logical tile per group. A
//! slot is part of the output when its version is visible to the scanning
//! snapshot and, if a predicate is supplied, the predicate accepts it.
//! Groups that contribute no rows still yield an empty logical tile.

use std::fmt;
use std::sync::Arc;

use strata_common::types::{CommitId, SlotId, TxnId};
use strata_common::StrataResult;
use strata_storage::tile_group::TileGroup;

use crate::logical_tile::{BaseTile, LogicalTile};

/// Reader identity used for visibility checks. A snapshot whose `txn` is
/// INVALID sees no rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    /// Reading transaction.
    pub txn: TxnId,
    /// Commit id the reader observes.
    pub cid: CommitId,
}

impl Snapshot {
    /// Creates a snapshot.
    #[inline]
    #[must_use]
    pub const fn new(txn: TxnId, cid: CommitId) -> Self {
        Self { txn, cid }
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn {} @ {}", self.txn, self.cid)
    }
}

/// Predicate evaluated against a stored slot.
pub type SlotPredicate<'p> = dyn FnMut(&TileGroup, SlotId) -> StrataResult<bool> + 'p;

/// Scans one tile group without a predicate.
pub fn scan_tile_group<'a>(
    group: &'a TileGroup,
    column_ids: &[usize],
    snapshot: Snapshot,
) -> StrataResult<LogicalTile<'a>> {
    scan_tile_group_filtered(group, column_ids, snapshot, |_, _| Ok(true))
}

/// Scans one tile group, keeping visible slots accepted by `predicate`.
///
/// An empty `column_ids` selects every column of the group. Slots are
/// checked for visibility before the predicate runs, so the predicate never
/// observes a version the snapshot cannot see.
pub fn scan_tile_group_filtered<'a, F>(
    group: &'a TileGroup,
    column_ids: &[usize],
    snapshot: Snapshot,
    mut predicate: F,
) -> StrataResult<LogicalTile<'a>>
where
    F: FnMut(&TileGroup, SlotId) -> StrataResult<bool>,
{
    let header = group.header();
    let upper = header.next_tuple_slot();

    let mut positions = Vec::new();
    for raw in 0..upper {
        // upper <= capacity, which fits in u32
        let slot = SlotId::new(raw as u32);
        if header.is_visible(slot, snapshot.txn, snapshot.cid) && predicate(group, slot)? {
            positions.push(slot);
        }
    }

    tracing::trace!(
        tile_group = %group.tile_group_id(),
        scanned = upper,
        selected = positions.len(),
        "scanned tile group"
    );

    let mut logical = LogicalTile::new();
    logical.add_position_list(positions);

    let all_columns: Vec<usize>;
    let column_ids = if column_ids.is_empty() {
        all_columns = (0..group.column_count()).collect();
        &all_columns
    } else {
        column_ids
    };

    for &column in column_ids {
        let (tile_index, tile_column) = group.locate_tile_and_column(column)?;
        let tile = group.tile(tile_index)?;
        logical.add_column(BaseTile::Borrowed(tile), tile_column, 0)?;
    }
    Ok(logical)
}

/// Hides the rows of an existing logical tile that fail `predicate`.
/// Returns the number of rows hidden.
pub fn filter_logical_tile<F>(tile: &mut LogicalTile<'_>, mut predicate: F) -> StrataResult<usize>
where
    F: FnMut(&LogicalTile<'_>, usize) -> StrataResult<bool>,
{
    let removed = tile.retain(|view, row| predicate(view, row))?;
    tracing::trace!(removed, remaining = tile.visible_count(), "filtered logical tile");
    Ok(removed)
}

/// Iterator producing one logical tile per tile group.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use strata_common::{CommitId, HeapBackend, Oid, StorageConfig, TxnId};
/// use strata_executor::{SeqScan, Snapshot};
/// use strata_storage::catalog::{Column, Schema, ValueType};
/// use strata_storage::table::DataTable;
/// use strata_storage::tuple::Tuple;
///
/// let schema = Schema::new(vec![Column::fixed("id", ValueType::Integer, false)]).unwrap();
/// let config = StorageConfig::for_testing();
/// let table = DataTable::new(
///     Oid::new(1), Oid::new(2), "t", schema, &config, Arc::new(HeapBackend::new()),
/// ).unwrap();
///
/// let writer = TxnId::new(7);
/// let location = table.insert_tuple(writer, &Tuple::new(vec![1i32.into()])).unwrap();
/// table.commit_insert(location, CommitId::new(10)).unwrap();
///
/// let groups = table.tile_groups();
/// let snapshot = Snapshot::new(TxnId::new(8), CommitId::new(10));
/// let tiles: Vec<_> = SeqScan::new(&groups, vec![], snapshot)
///     .collect::<Result<_, _>>()
///     .unwrap();
/// assert_eq!(tiles.len(), 1);
/// assert_eq!(tiles[0].visible_count(), 1);
/// ```
pub struct SeqScan<'a> {
    groups: &'a [Arc<TileGroup>],
    column_ids: Vec<usize>,
    snapshot: Snapshot,
    predicate: Option<Box<SlotPredicate<'a>>>,
    next: usize,
}

impl<'a> SeqScan<'a> {
    /// Creates a scan over `groups` projecting `column_ids`.
    #[must_use]
    pub fn new(groups: &'a [Arc<TileGroup>], column_ids: Vec<usize>, snapshot: Snapshot) -> Self {
        Self {
            groups,
            column_ids,
            snapshot,
            predicate: None,
            next: 0,
        }
    }

    /// Applies `predicate` to every visible slot.
    #[must_use]
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: FnMut(&TileGroup, SlotId) -> StrataResult<bool> + 'a,
    {
        self.predicate = Some(Box::new(predicate));
        self
    }

    /// Snapshot used for visibility.
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot
    }
}

impl fmt::Debug for SeqScan<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeqScan")
            .field("groups", &self.groups.len())
            .field("column_ids", &self.column_ids)
            .field("snapshot", &self.snapshot)
            .field("filtered", &self.predicate.is_some())
            .field("next", &self.next)
            .finish()
    }
}

impl<'a> Iterator for SeqScan<'a> {
    type Item = StrataResult<LogicalTile<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let group: &'a TileGroup = self.groups.get(self.next)?;
        self.next += 1;
        let result = match self.predicate.as_mut() {
            Some(predicate) => {
                scan_tile_group_filtered(group, &self.column_ids, self.snapshot, predicate)
            }
            None => scan_tile_group(group, &self.column_ids, self.snapshot),
        };
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.groups.len() - self.next;
        (remaining, Some(remaining))
    }
}
