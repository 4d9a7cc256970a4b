//! Physical tiles.
//!
//! A tile is a fixed-capacity array of equally sized tuple slots for one
//! column subset of a tile group. Slot `i` occupies bytes
//! `[i * tuple_length, (i + 1) * tuple_length)` of a single buffer obtained
//! from a [`Backend`]. Uninlined variable-length values live in the tile's
//! own [`Pool`].
//!
//! # Concurrency
//!
//! The buffer, occupancy map and pool sit behind one `RwLock`. Writers into
//! one tile are serialized; readers of any slot run in parallel. Whether a
//! reader should look at a slot at all is decided by the tile group header,
//! not by the tile.

mod serialize;

pub use serialize::TileHeader;

use std::fmt;
use std::ops::Range;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use strata_common::constants::{DEFAULT_POOL_CHUNK_SIZE, MAX_TUPLES_PER_TILE_GROUP};
use strata_common::memory::{Backend, Pool};
use strata_common::types::{Oid, SlotId};
use strata_common::{StrataError, StrataResult};

use crate::catalog::Schema;
use crate::tuple::{codec, Tuple, Value};

/// Catalog identifiers of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileIdentity {
    /// Owning database.
    pub database_id: Oid,
    /// Owning table.
    pub table_id: Oid,
    /// Owning tile group.
    pub tile_group_id: Oid,
    /// Position of the tile inside its group.
    pub tile_id: Oid,
}

impl Default for TileIdentity {
    fn default() -> Self {
        Self {
            database_id: Oid::INVALID,
            table_id: Oid::INVALID,
            tile_group_id: Oid::INVALID,
            tile_id: Oid::INVALID,
        }
    }
}

/// Builder for [`Tile`].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use strata_common::memory::HeapBackend;
/// use strata_storage::catalog::{Column, Schema, ValueType};
/// use strata_storage::tile::TileBuilder;
///
/// let schema = Arc::new(Schema::new(vec![Column::fixed("id", ValueType::Integer, false)]).unwrap());
/// let tile = TileBuilder::new(schema, 16)
///     .with_column_names(vec!["key".to_string()])
///     .build(Arc::new(HeapBackend::new()))
///     .unwrap();
///
/// assert_eq!(tile.column_offset("key"), Some(0));
/// ```
#[derive(Debug, Clone)]
pub struct TileBuilder {
    schema: Arc<Schema>,
    capacity: usize,
    identity: TileIdentity,
    column_names: Option<Vec<String>>,
    pool_chunk_size: usize,
    validate_headers: bool,
}

impl TileBuilder {
    /// Starts a tile of `capacity` slots over `schema`.
    #[must_use]
    pub fn new(schema: Arc<Schema>, capacity: usize) -> Self {
        Self {
            schema,
            capacity,
            identity: TileIdentity::default(),
            column_names: None,
            pool_chunk_size: DEFAULT_POOL_CHUNK_SIZE,
            validate_headers: true,
        }
    }

    /// Sets the catalog identity.
    #[must_use]
    pub fn with_identity(mut self, identity: TileIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Overrides the column names written to the serialized header.
    /// Defaults to the schema's names.
    #[must_use]
    pub fn with_column_names(mut self, names: Vec<String>) -> Self {
        self.column_names = Some(names);
        self
    }

    /// Sets the chunk size of the tile's pool.
    #[must_use]
    pub fn with_pool_chunk_size(mut self, size: usize) -> Self {
        self.pool_chunk_size = size;
        self
    }

    /// When disabled, decoding a serialized header only checks the column
    /// count, not column names and types.
    #[must_use]
    pub fn with_header_validation(mut self, enabled: bool) -> Self {
        self.validate_headers = enabled;
        self
    }

    /// Allocates the slot buffer from `backend`.
    pub fn build(self, backend: Arc<dyn Backend>) -> StrataResult<Tile> {
        if self.capacity == 0 || self.capacity > MAX_TUPLES_PER_TILE_GROUP {
            return Err(StrataError::invalid_argument(format!(
                "tile capacity {} must be between 1 and {}",
                self.capacity, MAX_TUPLES_PER_TILE_GROUP
            )));
        }

        let column_names = match self.column_names {
            Some(names) => names,
            None => self.schema.columns().iter().map(|c| c.name().to_string()).collect(),
        };
        if column_names.len() != self.schema.column_count() {
            return Err(StrataError::invalid_argument(format!(
                "{} column names given for {} columns",
                column_names.len(),
                self.schema.column_count()
            )));
        }
        let header_len = 4
            + 1
            + 2
            + column_names.len()
            + column_names.iter().map(|n| 4 + n.len()).sum::<usize>();
        if header_len > i32::MAX as usize {
            return Err(StrataError::invalid_argument("column names too long to serialize"));
        }

        let tuple_length = self.schema.tuple_length();
        let size = self.capacity.checked_mul(tuple_length).ok_or_else(|| {
            StrataError::allocation(usize::MAX, "tile size overflows usize")
        })?;
        let data = backend.allocate(size)?;
        let pool = Pool::new(Arc::clone(&backend), self.pool_chunk_size);

        tracing::trace!(
            tile_group_id = %self.identity.tile_group_id,
            tile_id = %self.identity.tile_id,
            capacity = self.capacity,
            tuple_length,
            "tile allocated"
        );

        Ok(Tile {
            identity: self.identity,
            schema: self.schema,
            column_names,
            capacity: self.capacity,
            tuple_length,
            validate_headers: self.validate_headers,
            backend,
            storage: RwLock::new(TileStorage {
                data,
                occupied: vec![false; self.capacity],
                live: 0,
                pool,
            }),
            column_header: OnceLock::new(),
        })
    }
}

struct TileStorage {
    data: Box<[u8]>,
    occupied: Vec<bool>,
    live: usize,
    pool: Pool,
}

impl TileStorage {
    fn mark_occupied(&mut self, index: usize) {
        if !self.occupied[index] {
            self.occupied[index] = true;
            self.live += 1;
        }
    }

    fn mark_vacant(&mut self, index: usize) {
        if self.occupied[index] {
            self.occupied[index] = false;
            self.live -= 1;
        }
    }
}

/// Fixed-capacity slot storage for one column subset.
pub struct Tile {
    identity: TileIdentity,
    schema: Arc<Schema>,
    column_names: Vec<String>,
    capacity: usize,
    tuple_length: usize,
    validate_headers: bool,
    backend: Arc<dyn Backend>,
    storage: RwLock<TileStorage>,
    /// Serialized column header, built on first use.
    column_header: OnceLock<Bytes>,
}

impl Tile {
    /// Creates a tile with default options.
    pub fn new(schema: Arc<Schema>, capacity: usize, backend: Arc<dyn Backend>) -> StrataResult<Self> {
        TileBuilder::new(schema, capacity).build(backend)
    }

    /// Catalog identity.
    #[inline]
    #[must_use]
    pub fn identity(&self) -> TileIdentity {
        self.identity
    }

    /// Position of the tile inside its group.
    #[inline]
    #[must_use]
    pub fn tile_id(&self) -> Oid {
        self.identity.tile_id
    }

    /// Schema of the stored columns.
    #[inline]
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Column names used in the serialized header.
    #[inline]
    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Number of columns.
    #[inline]
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.schema.column_count()
    }

    /// Number of slots.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes per slot.
    #[inline]
    #[must_use]
    pub fn tuple_length(&self) -> usize {
        self.tuple_length
    }

    /// Backend the tile's memory came from.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Index of the named column, looked up by the tile's column names.
    #[must_use]
    pub fn column_offset(&self, name: &str) -> Option<usize> {
        self.column_names.iter().position(|n| n == name)
    }

    /// Byte range of a slot inside the buffer.
    fn slot_range(&self, slot: SlotId) -> StrataResult<Range<usize>> {
        let index = slot.as_usize();
        if index >= self.capacity {
            return Err(StrataError::SlotOutOfRange {
                slot,
                capacity: self.capacity,
            });
        }
        let start = index * self.tuple_length;
        Ok(start..start + self.tuple_length)
    }

    /// Copies raw slot bytes into `slot`.
    ///
    /// `bytes` must be exactly `tuple_length` long. Pool references inside
    /// it must point into this tile's pool.
    pub fn insert_at(&self, slot: SlotId, bytes: &[u8]) -> StrataResult<()> {
        let range = self.slot_range(slot)?;
        if bytes.len() != self.tuple_length {
            return Err(StrataError::invalid_argument(format!(
                "slot payload is {} bytes, tile expects {}",
                bytes.len(),
                self.tuple_length
            )));
        }

        let mut storage = self.storage.write();
        storage.data[range].copy_from_slice(bytes);
        storage.mark_occupied(slot.as_usize());
        Ok(())
    }

    /// Forgets whatever was written to `slot`. Pool bytes it referenced stay
    /// allocated until the tile is dropped.
    pub(crate) fn clear_slot(&self, slot: SlotId) -> StrataResult<()> {
        let range = self.slot_range(slot)?;
        let mut storage = self.storage.write();
        storage.data[range].fill(0);
        storage.mark_vacant(slot.as_usize());
        Ok(())
    }

    /// Checks that `tuple` can be encoded into this tile.
    pub fn validate_tuple(&self, tuple: &Tuple) -> StrataResult<()> {
        tuple.validate(&self.schema)
    }

    /// Encodes `tuple` into `slot`, copying uninlined values into the pool.
    pub fn insert_tuple(&self, slot: SlotId, tuple: &Tuple) -> StrataResult<()> {
        let range = self.slot_range(slot)?;
        tuple.validate(&self.schema)?;

        let mut guard = self.storage.write();
        let storage = &mut *guard;
        let row = &mut storage.data[range];
        for (i, (column, value)) in self.schema.columns().iter().zip(tuple.values()).enumerate() {
            let offset = self.schema.offset(i);
            let dest = &mut row[offset..offset + column.slot_width()];
            codec::encode_slot(column, value, dest, &mut storage.pool)?;
        }
        storage.mark_occupied(slot.as_usize());
        Ok(())
    }

    /// Returns true if a tuple was written to `slot`.
    #[must_use]
    pub fn is_occupied(&self, slot: SlotId) -> bool {
        self.storage
            .read()
            .occupied
            .get(slot.as_usize())
            .copied()
            .unwrap_or(false)
    }

    fn occupied_range(&self, storage: &TileStorage, slot: SlotId) -> StrataResult<Range<usize>> {
        let range = self.slot_range(slot)?;
        if !storage.occupied[slot.as_usize()] {
            return Err(StrataError::invalid_argument(format!(
                "slot {} of tile {} holds no tuple",
                slot, self.identity.tile_id
            )));
        }
        Ok(range)
    }

    fn decode_row(&self, storage: &TileStorage, slot: SlotId) -> StrataResult<Tuple> {
        let range = self.occupied_range(storage, slot)?;
        let row = &storage.data[range];
        self.schema
            .columns()
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let offset = self.schema.offset(i);
                codec::decode_slot(column, &row[offset..offset + column.slot_width()], &storage.pool)
            })
            .collect()
    }

    /// Decodes the tuple in `slot`.
    pub fn tuple_at(&self, slot: SlotId) -> StrataResult<Tuple> {
        let storage = self.storage.read();
        self.decode_row(&storage, slot)
    }

    /// Decodes one column of the tuple in `slot`.
    pub fn value_at(&self, slot: SlotId, column: usize) -> StrataResult<Value> {
        let descriptor = self.schema.column(column)?;
        let storage = self.storage.read();
        let range = self.occupied_range(&storage, slot)?;
        let offset = range.start + self.schema.offset(column);
        codec::decode_slot(
            descriptor,
            &storage.data[offset..offset + descriptor.slot_width()],
            &storage.pool,
        )
    }

    /// Borrows the raw bytes of a slot. The tile stays read-locked while the
    /// guard lives.
    pub fn tuple_bytes(&self, slot: SlotId) -> StrataResult<MappedRwLockReadGuard<'_, [u8]>> {
        let range = self.slot_range(slot)?;
        Ok(RwLockReadGuard::map(self.storage.read(), |s| &s.data[range]))
    }

    pub(crate) fn set_header_validation(&mut self, enabled: bool) {
        self.validate_headers = enabled;
    }

    /// Occupied slots in slot order.
    #[must_use]
    pub fn live_slots(&self) -> Vec<SlotId> {
        let storage = self.storage.read();
        occupied_slots(&storage).collect()
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn active_tuple_count(&self) -> usize {
        self.storage.read().live
    }

    /// Decodes up to `limit` live tuples in slot order.
    pub fn live_tuples(&self, limit: usize) -> StrataResult<Vec<(SlotId, Tuple)>> {
        let storage = self.storage.read();
        occupied_slots(&storage)
            .take(limit)
            .map(|slot| Ok((slot, self.decode_row(&storage, slot)?)))
            .collect()
    }

    /// Structural equality: column count, database, schema, then live tuples
    /// compared pairwise in slot order.
    pub fn equals(&self, other: &Tile) -> StrataResult<bool> {
        if std::ptr::eq(self, other) {
            return Ok(true);
        }
        if self.column_count() != other.column_count()
            || self.identity.database_id != other.identity.database_id
            || *self.schema != *other.schema
        {
            return Ok(false);
        }

        let mine = self.live_tuples(usize::MAX)?;
        let theirs = other.live_tuples(usize::MAX)?;
        Ok(mine.len() == theirs.len()
            && mine.iter().zip(&theirs).all(|((_, a), (_, b))| a == b))
    }
}

fn occupied_slots(storage: &TileStorage) -> impl Iterator<Item = SlotId> + '_ {
    storage
        .occupied
        .iter()
        .enumerate()
        .filter(|(_, occupied)| **occupied)
        // capacity never exceeds u32::MAX
        .map(|(i, _)| SlotId::new(i as u32))
}

impl PartialEq for Tile {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other).unwrap_or(false)
    }
}

impl Drop for Tile {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.storage.get_mut().data);
        self.backend.free(data);
    }
}

impl fmt::Debug for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tile")
            .field("identity", &self.identity)
            .field("schema", &self.schema.to_string())
            .field("capacity", &self.capacity)
            .field("tuple_length", &self.tuple_length)
            .field("active", &self.active_tuple_count())
            .finish()
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Tile #{} (database {}, table {}, group {})",
            self.identity.tile_id,
            self.identity.database_id,
            self.identity.table_id,
            self.identity.tile_group_id
        )?;
        writeln!(f, "Catalog: {}", self.schema)?;
        writeln!(f, "Active tuples: {} of {}", self.active_tuple_count(), self.capacity)?;
        match self.live_tuples(usize::MAX) {
            Ok(rows) => {
                for (slot, tuple) in rows {
                    writeln!(f, "  [{}] {}", slot, tuple)?;
                }
            }
            Err(e) => writeln!(f, "  <unreadable: {}>", e)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, ValueType};
    use std::thread;
    use strata_common::memory::HeapBackend;

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::new(vec![
                Column::fixed("id", ValueType::Integer, false),
                Column::varchar("name", 64, true),
            ])
            .unwrap(),
        )
    }

    fn tile(capacity: usize) -> Tile {
        Tile::new(schema(), capacity, Arc::new(HeapBackend::new())).unwrap()
    }

    fn row(id: i32, name: &str) -> Tuple {
        Tuple::new(vec![id.into(), name.into()])
    }

    #[test]
    fn test_builder_validation() {
        let backend: Arc<dyn Backend> = Arc::new(HeapBackend::new());
        assert!(TileBuilder::new(schema(), 0).build(Arc::clone(&backend)).is_err());
        assert!(TileBuilder::new(schema(), 4)
            .with_column_names(vec!["only_one".into()])
            .build(backend)
            .is_err());
    }

    #[test]
    fn test_insert_and_read() {
        let tile = tile(4);
        tile.insert_tuple(SlotId::new(0), &row(1, "alice")).unwrap();
        tile.insert_tuple(SlotId::new(2), &row(2, "bob")).unwrap();

        assert_eq!(tile.tuple_at(SlotId::new(2)).unwrap(), row(2, "bob"));
        assert_eq!(tile.value_at(SlotId::new(0), 1).unwrap(), Value::from("alice"));
        assert_eq!(tile.active_tuple_count(), 2);
        assert_eq!(tile.live_slots(), vec![SlotId::new(0), SlotId::new(2)]);
        assert!(!tile.is_occupied(SlotId::new(1)));
        assert!(tile.tuple_at(SlotId::new(1)).is_err());
    }

    #[test]
    fn test_slot_bounds() {
        let tile = tile(4);
        let err = tile.insert_tuple(SlotId::new(4), &row(1, "x")).unwrap_err();
        assert!(matches!(err, StrataError::SlotOutOfRange { capacity: 4, .. }));
        assert!(err.is_fatal());
        assert!(tile.tuple_bytes(SlotId::new(7)).is_err());
        assert!(matches!(
            tile.value_at(SlotId::new(0), 5),
            Err(StrataError::ColumnOutOfRange { .. })
        ));
    }

    #[test]
    fn test_raw_insert_at() {
        let tile = tile(2);
        tile.insert_tuple(SlotId::new(0), &row(9, "nine")).unwrap();

        let bytes = tile.tuple_bytes(SlotId::new(0)).unwrap().to_vec();
        tile.insert_at(SlotId::new(1), &bytes).unwrap();
        assert_eq!(tile.tuple_at(SlotId::new(1)).unwrap(), row(9, "nine"));

        assert!(tile.insert_at(SlotId::new(1), &bytes[1..]).is_err());
    }

    #[test]
    fn test_column_offset() {
        let tile = tile(4);
        assert_eq!(tile.column_offset("name"), Some(1));
        assert_eq!(tile.column_offset("missing"), None);
    }

    #[test]
    fn test_memory_returned_on_drop() {
        let backend = Arc::new(HeapBackend::new());
        let tile = Tile::new(schema(), 8, backend.clone()).unwrap();
        tile.insert_tuple(SlotId::new(0), &row(1, "pooled")).unwrap();
        assert!(backend.allocated_bytes() > 8 * tile.tuple_length());

        drop(tile);
        assert_eq!(backend.allocated_bytes(), 0);
    }

    #[test]
    fn test_backend_limit() {
        let backend = Arc::new(HeapBackend::with_limit(16));
        let err = Tile::new(schema(), 8, backend).unwrap_err();
        assert!(matches!(err, StrataError::Allocation { .. }));
    }

    #[test]
    fn test_equality() {
        let a = tile(4);
        let b = tile(8);
        a.insert_tuple(SlotId::new(1), &row(1, "x")).unwrap();
        b.insert_tuple(SlotId::new(5), &row(1, "x")).unwrap();
        assert!(a == b);

        b.insert_tuple(SlotId::new(6), &row(2, "y")).unwrap();
        assert!(a != b);
        assert!(a == a);
    }

    #[test]
    fn test_concurrent_writers_distinct_slots() {
        let tile = Arc::new(tile(64));
        let mut handles = vec![];

        for t in 0..4u32 {
            let tile = Arc::clone(&tile);
            handles.push(thread::spawn(move || {
                for i in 0..16u32 {
                    let slot = t * 16 + i;
                    tile.insert_tuple(SlotId::new(slot), &row(slot as i32, "v")).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tile.active_tuple_count(), 64);
        assert_eq!(tile.value_at(SlotId::new(37), 0).unwrap(), Value::Integer(37));
    }

    #[test]
    fn test_display() {
        let tile = tile(4);
        tile.insert_tuple(SlotId::new(0), &row(1, "alice")).unwrap();
        let text = tile.to_string();
        assert!(text.contains("Active tuples: 1 of 4"));
        assert!(text.contains("(1, alice)"));
    }
}
