//! Data tables.
//!
//! A table is an append-only sequence of tile groups. Inserts go to the
//! newest group; when it reports `GroupFull` the table appends a fresh group
//! and retries. Tile group `n` of a table always has id `n`.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use strata_common::config::StorageConfig;
use strata_common::memory::Backend;
use strata_common::types::{CommitId, Oid, TupleLocation, TxnId};
use strata_common::{StrataError, StrataResult};

use crate::catalog::Schema;
use crate::tile_group::{TileGroup, TileGroupIdentity};
use crate::tuple::Tuple;

/// Column layout of every tile group a table allocates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    /// All columns in one tile.
    Row,
    /// One tile per partition of logical column ids.
    Partitioned(Vec<Vec<usize>>),
}

/// A table of tile groups.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use strata_common::config::StorageConfig;
/// use strata_common::memory::HeapBackend;
/// use strata_common::types::{CommitId, Oid, TxnId};
/// use strata_storage::catalog::{Column, Schema, ValueType};
/// use strata_storage::table::DataTable;
/// use strata_storage::tuple::Tuple;
///
/// let schema = Schema::new(vec![Column::fixed("id", ValueType::Integer, false)]).unwrap();
/// let config = StorageConfig::for_testing().with_tuples_per_tile_group(2);
/// let table = DataTable::new(Oid::new(1), Oid::new(10), "accounts", schema, &config, Arc::new(HeapBackend::new())).unwrap();
///
/// for id in 0..5i32 {
///     let location = table.insert_tuple(TxnId::new(1), &Tuple::new(vec![id.into()])).unwrap();
///     table.commit_insert(location, CommitId::new(1)).unwrap();
/// }
/// assert_eq!(table.tile_group_count(), 3);
/// ```
pub struct DataTable {
    database_id: Oid,
    table_id: Oid,
    name: String,
    schema: Arc<Schema>,
    layout: Layout,
    tuples_per_tile_group: usize,
    pool_chunk_size: usize,
    validate_headers: bool,
    backend: Arc<dyn Backend>,
    tile_groups: RwLock<Vec<Arc<TileGroup>>>,
}

impl DataTable {
    /// Creates a row-layout table with its first tile group.
    pub fn new(
        database_id: Oid,
        table_id: Oid,
        name: impl Into<String>,
        schema: Schema,
        config: &StorageConfig,
        backend: Arc<dyn Backend>,
    ) -> StrataResult<Self> {
        Self::with_layout(database_id, table_id, name, schema, Layout::Row, config, backend)
    }

    /// Creates a table on a heap backend sized by `config`.
    pub fn from_config(
        database_id: Oid,
        table_id: Oid,
        name: impl Into<String>,
        schema: Schema,
        layout: Layout,
        config: &StorageConfig,
    ) -> StrataResult<Self> {
        let backend = Arc::new(config.heap_backend());
        Self::with_layout(database_id, table_id, name, schema, layout, config, backend)
    }

    /// Creates a table with an explicit tile layout.
    #[allow(clippy::too_many_arguments)]
    pub fn with_layout(
        database_id: Oid,
        table_id: Oid,
        name: impl Into<String>,
        schema: Schema,
        layout: Layout,
        config: &StorageConfig,
        backend: Arc<dyn Backend>,
    ) -> StrataResult<Self> {
        config.validate()?;
        let table = Self {
            database_id,
            table_id,
            name: name.into(),
            schema: Arc::new(schema),
            layout,
            tuples_per_tile_group: config.tuples_per_tile_group,
            pool_chunk_size: config.pool_chunk_size,
            validate_headers: config.validate_headers,
            backend,
            tile_groups: RwLock::new(Vec::new()),
        };
        let first = table.build_tile_group(Oid::new(0))?;
        table.tile_groups.write().push(Arc::new(first));
        Ok(table)
    }

    fn build_tile_group(&self, tile_group_id: Oid) -> StrataResult<TileGroup> {
        let identity = TileGroupIdentity::new(self.database_id, self.table_id, tile_group_id);
        let group = match &self.layout {
            Layout::Row => TileGroup::new(
                identity,
                vec![Arc::clone(&self.schema)],
                self.tuples_per_tile_group,
                Arc::clone(&self.backend),
                self.pool_chunk_size,
            ),
            Layout::Partitioned(partitions) => TileGroup::partitioned(
                identity,
                &self.schema,
                partitions,
                self.tuples_per_tile_group,
                Arc::clone(&self.backend),
                self.pool_chunk_size,
            ),
        }?;
        Ok(group.with_header_validation(self.validate_headers))
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning database.
    #[inline]
    #[must_use]
    pub fn database_id(&self) -> Oid {
        self.database_id
    }

    /// Table id.
    #[inline]
    #[must_use]
    pub fn table_id(&self) -> Oid {
        self.table_id
    }

    /// Logical schema.
    #[inline]
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Number of tile groups.
    #[must_use]
    pub fn tile_group_count(&self) -> usize {
        self.tile_groups.read().len()
    }

    /// Tile group at a position.
    #[must_use]
    pub fn tile_group(&self, offset: usize) -> Option<Arc<TileGroup>> {
        self.tile_groups.read().get(offset).cloned()
    }

    /// Snapshot of all tile groups. Groups appended later are not included.
    #[must_use]
    pub fn tile_groups(&self) -> Vec<Arc<TileGroup>> {
        self.tile_groups.read().clone()
    }

    fn tile_group_by_id(&self, tile_group_id: Oid) -> StrataResult<Arc<TileGroup>> {
        let groups = self.tile_groups.read();
        groups
            .get(tile_group_id.as_u32() as usize)
            .filter(|g| g.tile_group_id() == tile_group_id)
            .cloned()
            .ok_or_else(|| {
                StrataError::invalid_argument(format!(
                    "table {} has no tile group {}",
                    self.name, tile_group_id
                ))
            })
    }

    /// Appends a new group unless another writer already replaced `full`.
    fn grow(&self, full: Oid) -> StrataResult<()> {
        let mut groups = self.tile_groups.write();
        let newest = groups.last().map(|g| g.tile_group_id());
        if newest != Some(full) {
            return Ok(());
        }

        let next = u32::try_from(groups.len())
            .ok()
            .map(Oid::new)
            .filter(|id| id.is_valid())
            .ok_or_else(|| StrataError::internal("tile group ids exhausted"))?;
        groups.push(Arc::new(self.build_tile_group(next)?));

        tracing::debug!(
            table = %self.name,
            tile_group_id = %next,
            tile_groups = groups.len(),
            "allocated tile group"
        );
        Ok(())
    }

    /// Inserts `tuple` as an uncommitted version owned by `txn`.
    pub fn insert_tuple(&self, txn: TxnId, tuple: &Tuple) -> StrataResult<TupleLocation> {
        loop {
            let group = self
                .tile_groups
                .read()
                .last()
                .cloned()
                .ok_or_else(|| StrataError::internal("table has no tile groups"))?;

            match group.insert_tuple(txn, tuple) {
                Ok(slot) => return Ok(TupleLocation::new(group.tile_group_id(), slot)),
                Err(StrataError::GroupFull { tile_group_id, .. }) => self.grow(tile_group_id)?,
                Err(e) => return Err(e),
            }
        }
    }

    /// Marks the tuple at `location` as tentatively deleted by `txn`.
    pub fn delete_tuple(&self, txn: TxnId, location: TupleLocation) -> StrataResult<()> {
        self.tile_group_by_id(location.tile_group_id)?
            .header()
            .mark_deleted(location.slot, txn)
    }

    /// Commits an insert.
    pub fn commit_insert(&self, location: TupleLocation, cid: CommitId) -> StrataResult<()> {
        self.tile_group_by_id(location.tile_group_id)?
            .header()
            .commit_insert(location.slot, cid)
    }

    /// Aborts an insert.
    pub fn abort_insert(&self, location: TupleLocation) -> StrataResult<()> {
        self.tile_group_by_id(location.tile_group_id)?
            .header()
            .abort_insert(location.slot)
    }

    /// Commits a delete.
    pub fn commit_delete(&self, location: TupleLocation, cid: CommitId) -> StrataResult<()> {
        self.tile_group_by_id(location.tile_group_id)?
            .header()
            .commit_delete(location.slot, cid)
    }

    /// Aborts a delete.
    pub fn abort_delete(&self, location: TupleLocation) -> StrataResult<()> {
        self.tile_group_by_id(location.tile_group_id)?
            .header()
            .abort_delete(location.slot)
    }

    /// Reads the tuple at `location` regardless of visibility.
    pub fn tuple(&self, location: TupleLocation) -> StrataResult<Tuple> {
        self.tile_group_by_id(location.tile_group_id)?
            .tuple(location.slot)
    }

    /// Committed live versions across all groups.
    #[must_use]
    pub fn active_tuple_count(&self) -> usize {
        self.tile_groups
            .read()
            .iter()
            .map(|g| g.header().active_tuple_count())
            .sum()
    }
}

impl fmt::Debug for DataTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataTable")
            .field("name", &self.name)
            .field("database_id", &self.database_id)
            .field("table_id", &self.table_id)
            .field("layout", &self.layout)
            .field("tile_groups", &self.tile_group_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, ValueType};
    use crate::tuple::Value;
    use std::thread;
    use strata_common::memory::HeapBackend;

    const TXN: TxnId = TxnId::new(1);

    fn schema() -> Schema {
        Schema::new(vec![
            Column::fixed("id", ValueType::Integer, false),
            Column::varchar("name", 32, true),
        ])
        .unwrap()
    }

    fn table(per_group: usize) -> DataTable {
        DataTable::new(
            Oid::new(1),
            Oid::new(7),
            "people",
            schema(),
            &StorageConfig::for_testing().with_tuples_per_tile_group(per_group),
            Arc::new(HeapBackend::new()),
        )
        .unwrap()
    }

    fn row(id: i32) -> Tuple {
        Tuple::new(vec![id.into(), format!("p{}", id).into()])
    }

    #[test]
    fn test_grows_on_full_group() {
        let table = table(3);
        let locations: Vec<_> = (0..7).map(|i| table.insert_tuple(TXN, &row(i)).unwrap()).collect();

        assert_eq!(table.tile_group_count(), 3);
        assert_eq!(locations[3].tile_group_id, Oid::new(1));
        assert_eq!(locations[6].slot.as_usize(), 0);
        assert_eq!(table.tuple(locations[4]).unwrap(), row(4));
    }

    #[test]
    fn test_commit_and_delete_through_table() {
        let table = table(4);
        let loc = table.insert_tuple(TXN, &row(1)).unwrap();
        table.commit_insert(loc, CommitId::new(2)).unwrap();
        assert_eq!(table.active_tuple_count(), 1);

        table.delete_tuple(TxnId::new(2), loc).unwrap();
        table.abort_delete(loc).unwrap();
        table.delete_tuple(TxnId::new(3), loc).unwrap();
        table.commit_delete(loc, CommitId::new(4)).unwrap();
        assert_eq!(table.active_tuple_count(), 0);

        let missing = TupleLocation::new(Oid::new(9), loc.slot);
        assert!(table.delete_tuple(TXN, missing).is_err());
    }

    #[test]
    fn test_partitioned_layout() {
        let table = DataTable::with_layout(
            Oid::new(1),
            Oid::new(8),
            "split",
            schema(),
            Layout::Partitioned(vec![vec![1], vec![0]]),
            &StorageConfig::for_testing(),
            Arc::new(HeapBackend::new()),
        )
        .unwrap();

        let loc = table.insert_tuple(TXN, &row(5)).unwrap();
        let group = table.tile_group(0).unwrap();
        assert_eq!(group.tile_count(), 2);
        assert_eq!(group.value(loc.slot, 1).unwrap(), Value::from("p5"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = DataTable::new(
            Oid::new(1),
            Oid::new(1),
            "bad",
            schema(),
            &StorageConfig::default().with_tuples_per_tile_group(0),
            Arc::new(HeapBackend::new()),
        );
        assert!(matches!(result, Err(StrataError::InvalidConfig { .. })));
    }

    #[test]
    fn test_concurrent_growth() {
        let table = Arc::new(table(5));
        let mut handles = vec![];

        for t in 0..4u64 {
            let table = Arc::clone(&table);
            handles.push(thread::spawn(move || {
                for i in 0..25 {
                    let loc = table.insert_tuple(TxnId::new(t + 1), &row(i)).unwrap();
                    table.commit_insert(loc, CommitId::new(1)).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(table.active_tuple_count(), 100);
        assert_eq!(table.tile_group_count(), 20);
        let ids: Vec<_> = table.tile_groups().iter().map(|g| g.tile_group_id().as_u32()).collect();
        assert_eq!(ids, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_from_config_applies_limit_and_validation() {
        let config = StorageConfig::for_testing()
            .with_backend_limit(Some(1))
            .with_tuples_per_tile_group(4);
        let result =
            DataTable::from_config(Oid::new(1), Oid::new(2), "t", schema(), Layout::Row, &config);
        assert!(matches!(result, Err(StrataError::Allocation { .. })));

        let config = StorageConfig::for_testing().with_header_validation(false);
        let lenient =
            DataTable::from_config(Oid::new(1), Oid::new(2), "t", schema(), Layout::Row, &config)
                .unwrap();
        let strict = table(4);

        // a stream with renamed columns loads only into the lenient table
        let source = crate::tile::TileBuilder::new(Arc::new(schema()), 1)
            .with_column_names(vec!["key".into(), "label".into()])
            .build(Arc::new(HeapBackend::new()))
            .unwrap();
        source.insert_tuple(strata_common::types::SlotId::new(0), &row(3)).unwrap();
        let mut out = crate::serializer::SerializeOutput::new();
        source.serialize_to(&mut out, 1).unwrap();

        let decode = |table: &DataTable| {
            let group = table.tile_group(0).unwrap();
            let tile = group.tile(0).unwrap();
            tile.deserialize_from(&mut crate::serializer::SerializeInput::new(out.data()))
        };
        assert_eq!(decode(&lenient).unwrap(), 1);
        assert!(matches!(decode(&strict), Err(StrataError::SchemaMismatch { .. })));
    }
}
