//! Tile groups.
//!
//! A tile group is a row group: a fixed set of tiles that share one slot
//! address space and one [`TileGroupHeader`]. Slot `s` of the group is slot
//! `s` of every tile. A column map translates logical column ids into
//! `(tile, column within tile)` pairs.

mod header;

use std::fmt;
use std::sync::Arc;

use strata_common::memory::Backend;
use strata_common::types::{Oid, SlotId, TxnId};
use strata_common::{StrataError, StrataResult};

use crate::catalog::Schema;
use crate::tile::{Tile, TileBuilder, TileIdentity};
use crate::tuple::{Tuple, Value};

pub use header::{is_visible_version, SlotState, TileGroupHeader};

/// Catalog identifiers of a tile group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileGroupIdentity {
    /// Owning database.
    pub database_id: Oid,
    /// Owning table.
    pub table_id: Oid,
    /// The group itself.
    pub tile_group_id: Oid,
}

impl TileGroupIdentity {
    /// Creates an identity.
    #[must_use]
    pub const fn new(database_id: Oid, table_id: Oid, tile_group_id: Oid) -> Self {
        Self {
            database_id,
            table_id,
            tile_group_id,
        }
    }

    fn tile(&self, tile_id: usize) -> TileIdentity {
        TileIdentity {
            database_id: self.database_id,
            table_id: self.table_id,
            tile_group_id: self.tile_group_id,
            // tile count bounded by the column count
            tile_id: Oid::new(tile_id as u32),
        }
    }
}

/// A row group of tiles sharing one slot space.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use strata_common::memory::HeapBackend;
/// use strata_common::types::{CommitId, Oid, TxnId};
/// use strata_storage::catalog::{Column, Schema, ValueType};
/// use strata_storage::tile_group::{TileGroup, TileGroupIdentity};
/// use strata_storage::tuple::{Tuple, Value};
///
/// let schema = Schema::new(vec![
///     Column::fixed("id", ValueType::Integer, false),
///     Column::fixed("balance", ValueType::BigInt, true),
/// ])
/// .unwrap();
/// let identity = TileGroupIdentity::new(Oid::new(1), Oid::new(2), Oid::new(0));
///
/// // one tile per column
/// let group = TileGroup::partitioned(
///     identity,
///     &schema,
///     &[vec![0], vec![1]],
///     8,
///     Arc::new(HeapBackend::new()),
///     4096,
/// )
/// .unwrap();
///
/// let txn = TxnId::new(1);
/// let slot = group.insert_tuple(txn, &Tuple::new(vec![Value::Integer(7), Value::BigInt(70)])).unwrap();
/// group.header().commit_insert(slot, CommitId::new(1)).unwrap();
///
/// assert_eq!(group.locate_tile_and_column(1).unwrap(), (1, 0));
/// assert_eq!(group.value(slot, 1).unwrap(), Value::BigInt(70));
/// ```
pub struct TileGroup {
    identity: TileGroupIdentity,
    tiles: Vec<Tile>,
    header: TileGroupHeader,
    /// Logical column id to (tile index, column within tile).
    column_map: Vec<(usize, usize)>,
    /// Logical schema in column id order.
    schema: Arc<Schema>,
    capacity: usize,
}

impl TileGroup {
    /// Creates a group whose tiles hold `schemas` in order; logical column
    /// ids run through the tiles sequentially.
    pub fn new(
        identity: TileGroupIdentity,
        schemas: Vec<Arc<Schema>>,
        capacity: usize,
        backend: Arc<dyn Backend>,
        pool_chunk_size: usize,
    ) -> StrataResult<Self> {
        if schemas.is_empty() {
            return Err(StrataError::invalid_argument("a tile group needs at least one tile"));
        }
        let column_map = schemas
            .iter()
            .enumerate()
            .flat_map(|(tile, schema)| (0..schema.column_count()).map(move |col| (tile, col)))
            .collect();
        let logical = Arc::new(Schema::concat(schemas.iter().map(|s| s.as_ref()))?);
        Self::assemble(identity, schemas, column_map, logical, capacity, backend, pool_chunk_size)
    }

    /// Creates a group that splits `table_schema` into one tile per
    /// partition. Each partition lists logical column ids; every column must
    /// appear in exactly one partition.
    pub fn partitioned(
        identity: TileGroupIdentity,
        table_schema: &Schema,
        partitions: &[Vec<usize>],
        capacity: usize,
        backend: Arc<dyn Backend>,
        pool_chunk_size: usize,
    ) -> StrataResult<Self> {
        let column_count = table_schema.column_count();
        let mut column_map = vec![None; column_count];
        let mut schemas = Vec::with_capacity(partitions.len());

        for (tile, columns) in partitions.iter().enumerate() {
            for (offset, &column) in columns.iter().enumerate() {
                let entry = column_map.get_mut(column).ok_or(StrataError::ColumnOutOfRange {
                    column,
                    column_count,
                })?;
                if entry.is_some() {
                    return Err(StrataError::invalid_argument(format!(
                        "column {} assigned to more than one tile",
                        column
                    )));
                }
                *entry = Some((tile, offset));
            }
            schemas.push(Arc::new(table_schema.project(columns)?));
        }

        let column_map = column_map
            .into_iter()
            .enumerate()
            .map(|(column, entry)| {
                entry.ok_or_else(|| {
                    StrataError::invalid_argument(format!("column {} assigned to no tile", column))
                })
            })
            .collect::<StrataResult<Vec<_>>>()?;

        let logical = Arc::new(table_schema.clone());
        Self::assemble(identity, schemas, column_map, logical, capacity, backend, pool_chunk_size)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        identity: TileGroupIdentity,
        schemas: Vec<Arc<Schema>>,
        column_map: Vec<(usize, usize)>,
        schema: Arc<Schema>,
        capacity: usize,
        backend: Arc<dyn Backend>,
        pool_chunk_size: usize,
    ) -> StrataResult<Self> {
        let tiles = schemas
            .into_iter()
            .enumerate()
            .map(|(tile_id, schema)| {
                TileBuilder::new(schema, capacity)
                    .with_identity(identity.tile(tile_id))
                    .with_pool_chunk_size(pool_chunk_size)
                    .build(Arc::clone(&backend))
            })
            .collect::<StrataResult<Vec<_>>>()?;

        if let Some(tile) = tiles.iter().find(|t| t.capacity() != capacity) {
            panic!(
                "tile {} of group {} has capacity {}, group has {}",
                tile.tile_id(),
                identity.tile_group_id,
                tile.capacity(),
                capacity
            );
        }

        tracing::debug!(
            tile_group_id = %identity.tile_group_id,
            table_id = %identity.table_id,
            tiles = tiles.len(),
            capacity,
            "tile group created"
        );

        Ok(Self {
            identity,
            tiles,
            header: TileGroupHeader::new(identity.tile_group_id, capacity),
            column_map,
            schema,
            capacity,
        })
    }

    /// Sets whether the group's tiles check names and types when decoding
    /// a stream header.
    #[must_use]
    pub fn with_header_validation(mut self, enabled: bool) -> Self {
        for tile in &mut self.tiles {
            tile.set_header_validation(enabled);
        }
        self
    }

    /// Catalog identity.
    #[inline]
    #[must_use]
    pub fn identity(&self) -> TileGroupIdentity {
        self.identity
    }

    /// The group's id.
    #[inline]
    #[must_use]
    pub fn tile_group_id(&self) -> Oid {
        self.identity.tile_group_id
    }

    /// MVCC header.
    #[inline]
    #[must_use]
    pub fn header(&self) -> &TileGroupHeader {
        &self.header
    }

    /// Logical schema in column id order.
    #[inline]
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Number of logical columns.
    #[inline]
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.column_map.len()
    }

    /// Number of tiles.
    #[inline]
    #[must_use]
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Slots per tile.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Upper bound of allocated slots.
    #[inline]
    #[must_use]
    pub fn next_tuple_slot(&self) -> usize {
        self.header.next_tuple_slot()
    }

    /// Returns a tile by index.
    pub fn tile(&self, index: usize) -> StrataResult<&Tile> {
        self.tiles.get(index).ok_or(StrataError::ColumnOutOfRange {
            column: index,
            column_count: self.tiles.len(),
        })
    }

    /// Maps a logical column id to `(tile index, column within tile)`.
    pub fn locate_tile_and_column(&self, column: usize) -> StrataResult<(usize, usize)> {
        self.column_map
            .get(column)
            .copied()
            .ok_or(StrataError::ColumnOutOfRange {
                column,
                column_count: self.column_map.len(),
            })
    }

    fn split(&self, tuple: &Tuple) -> StrataResult<Vec<Tuple>> {
        if tuple.len() != self.column_count() {
            return Err(StrataError::invalid_argument(format!(
                "tuple has {} values, tile group has {} columns",
                tuple.len(),
                self.column_count()
            )));
        }
        let mut parts: Vec<Vec<Value>> = self
            .tiles
            .iter()
            .map(|t| vec![Value::Null; t.column_count()])
            .collect();
        for (value, &(tile, offset)) in tuple.values().iter().zip(&self.column_map) {
            parts[tile][offset] = value.clone();
        }
        Ok(parts.into_iter().map(Tuple::new).collect())
    }

    /// Reserves a slot for `txn` and writes `tuple` into every tile.
    ///
    /// Every tile's part is validated before the slot is reserved. If a write
    /// still fails, the tiles already written are cleared and the reservation
    /// is aborted so the slot stays invisible.
    pub fn insert_tuple(&self, txn: TxnId, tuple: &Tuple) -> StrataResult<SlotId> {
        let parts = self.split(tuple)?;
        for (tile, part) in self.tiles.iter().zip(&parts) {
            tile.validate_tuple(part)?;
        }

        let slot = self.header.reserve_slot(txn)?;
        for (written, (tile, part)) in self.tiles.iter().zip(&parts).enumerate() {
            if let Err(e) = tile.insert_tuple(slot, part) {
                self.undo_partial_insert(slot, written)?;
                return Err(e);
            }
        }
        Ok(slot)
    }

    /// Reserves a slot for `txn` and copies raw slot bytes into each tile.
    pub fn insert_tuple_bytes(&self, txn: TxnId, per_tile: &[&[u8]]) -> StrataResult<SlotId> {
        if per_tile.len() != self.tiles.len() {
            return Err(StrataError::invalid_argument(format!(
                "{} slot payloads given for {} tiles",
                per_tile.len(),
                self.tiles.len()
            )));
        }
        for (tile, bytes) in self.tiles.iter().zip(per_tile) {
            if bytes.len() != tile.tuple_length() {
                return Err(StrataError::invalid_argument(format!(
                    "tile {} expects {} bytes per slot, got {}",
                    tile.tile_id(),
                    tile.tuple_length(),
                    bytes.len()
                )));
            }
        }

        let slot = self.header.reserve_slot(txn)?;
        for (written, (tile, bytes)) in self.tiles.iter().zip(per_tile).enumerate() {
            if let Err(e) = tile.insert_at(slot, bytes) {
                self.undo_partial_insert(slot, written)?;
                return Err(e);
            }
        }
        Ok(slot)
    }

    /// Clears `slot` in the first `written` tiles and aborts the reservation.
    fn undo_partial_insert(&self, slot: SlotId, written: usize) -> StrataResult<()> {
        tracing::debug!(
            tile_group = %self.tile_group_id(),
            slot = %slot,
            written,
            "rolling back partial insert"
        );
        for tile in &self.tiles[..written] {
            tile.clear_slot(slot)?;
        }
        self.header.abort_insert(slot)
    }

    /// Reads one logical column of a slot.
    pub fn value(&self, slot: SlotId, column: usize) -> StrataResult<Value> {
        let (tile, offset) = self.locate_tile_and_column(column)?;
        self.tiles[tile].value_at(slot, offset)
    }

    /// Reassembles the full logical tuple of a slot.
    pub fn tuple(&self, slot: SlotId) -> StrataResult<Tuple> {
        (0..self.column_count())
            .map(|column| self.value(slot, column))
            .collect()
    }
}

impl fmt::Debug for TileGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileGroup")
            .field("identity", &self.identity)
            .field("tiles", &self.tiles.len())
            .field("capacity", &self.capacity)
            .field("next_tuple_slot", &self.next_tuple_slot())
            .finish()
    }
}
