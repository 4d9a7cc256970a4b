//! Logical tiles.
//!
//! A logical tile is a column-composed view over physical tiles. Each column
//! binding names a base tile, a column inside it and the position list that
//! supplies its slot ids. Rows are indexes into the position lists; filtering
//! only clears a row's visibility flag, so the surviving rows always keep
//! their original order.
//!
//! ```text
//!  position list 0: [0, 2, 5, 6]      visible: [x, -, x, x]
//!
//!  column 0 -> (tile 0, col 1, list 0)
//!  column 1 -> (tile 1, col 0, list 0)
//! ```
//!
//! Base tiles are either borrowed from a tile group snapshot that outlives
//! the logical tile, or owned through an `Arc` when the logical tile wraps
//! freshly materialized storage.

use std::fmt;
use std::sync::Arc;

use strata_common::memory::Backend;
use strata_common::types::SlotId;
use strata_common::{StrataError, StrataResult};
use strata_storage::catalog::Schema;
use strata_storage::tile::{Tile, TileBuilder};
use strata_storage::tuple::{Tuple, Value};

/// A base tile reference held by a column binding.
#[derive(Debug, Clone)]
pub enum BaseTile<'a> {
    /// Storage owned by someone who outlives the logical tile.
    Borrowed(&'a Tile),
    /// Storage kept alive by the logical tile.
    Owned(Arc<Tile>),
}

impl BaseTile<'_> {
    /// The referenced tile.
    #[inline]
    #[must_use]
    pub fn tile(&self) -> &Tile {
        match self {
            BaseTile::Borrowed(tile) => tile,
            BaseTile::Owned(tile) => tile,
        }
    }
}

#[derive(Debug, Clone)]
struct ColumnBinding<'a> {
    base: BaseTile<'a>,
    origin_column: usize,
    position_list: usize,
}

/// A filtered, column-composed view over tiles.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use strata_common::memory::HeapBackend;
/// use strata_common::types::SlotId;
/// use strata_executor::{BaseTile, LogicalTile};
/// use strata_storage::catalog::{Column, Schema, ValueType};
/// use strata_storage::tile::Tile;
/// use strata_storage::tuple::Tuple;
///
/// let schema = Arc::new(Schema::new(vec![Column::fixed("id", ValueType::Integer, false)]).unwrap());
/// let tile = Tile::new(schema, 4, Arc::new(HeapBackend::new())).unwrap();
/// for slot in 0..3 {
///     tile.insert_tuple(SlotId::new(slot), &Tuple::new(vec![(slot as i32 * 10).into()])).unwrap();
/// }
///
/// let mut view = LogicalTile::new();
/// view.add_position_list(vec![SlotId::new(0), SlotId::new(1), SlotId::new(2)]);
/// view.add_column(BaseTile::Borrowed(&tile), 0, 0).unwrap();
/// view.remove_visibility(1).unwrap();
///
/// let rows: Vec<usize> = view.iter().collect();
/// assert_eq!(rows, vec![0, 2]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct LogicalTile<'a> {
    columns: Vec<ColumnBinding<'a>>,
    position_lists: Vec<Vec<SlotId>>,
    visible: Vec<bool>,
    visible_count: usize,
}

impl<'a> LogicalTile<'a> {
    /// Creates an empty logical tile.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds every column of `tile` over its occupied slots.
    pub fn wrap(tile: Arc<Tile>) -> LogicalTile<'static> {
        let mut logical = LogicalTile::new();
        logical.add_position_list(tile.live_slots());
        for column in 0..tile.column_count() {
            logical.columns.push(ColumnBinding {
                base: BaseTile::Owned(Arc::clone(&tile)),
                origin_column: column,
                position_list: 0,
            });
        }
        logical
    }

    /// Installs a single position list, replacing any previous lists. Every
    /// row starts visible.
    pub fn add_position_list(&mut self, slots: Vec<SlotId>) {
        self.reset_visibility(slots.len());
        self.position_lists = vec![slots];
    }

    /// Installs several position lists of equal length.
    pub fn set_position_lists(&mut self, lists: Vec<Vec<SlotId>>) -> StrataResult<()> {
        let rows = lists.first().map_or(0, Vec::len);
        if lists.iter().any(|list| list.len() != rows) {
            return Err(StrataError::invalid_argument(
                "position lists of a logical tile must have equal lengths",
            ));
        }
        self.reset_visibility(rows);
        self.position_lists = lists;
        Ok(())
    }

    fn reset_visibility(&mut self, rows: usize) {
        self.visible = vec![true; rows];
        self.visible_count = rows;
    }

    /// Appends a column reading `origin_column` of `base` through position
    /// list `position_list`.
    pub fn add_column(
        &mut self,
        base: BaseTile<'a>,
        origin_column: usize,
        position_list: usize,
    ) -> StrataResult<()> {
        let column_count = base.tile().column_count();
        if origin_column >= column_count {
            return Err(StrataError::ColumnOutOfRange {
                column: origin_column,
                column_count,
            });
        }
        self.columns.push(ColumnBinding {
            base,
            origin_column,
            position_list,
        });
        Ok(())
    }

    /// Hides a row. Hidden rows never become visible again.
    pub fn remove_visibility(&mut self, row: usize) -> StrataResult<()> {
        let flag = self.visible.get_mut(row).ok_or_else(|| {
            StrataError::invalid_argument(format!("row {} beyond position list", row))
        })?;
        if *flag {
            *flag = false;
            self.visible_count -= 1;
        }
        Ok(())
    }

    /// Whether a row is still visible.
    #[must_use]
    pub fn is_visible(&self, row: usize) -> bool {
        self.visible.get(row).copied().unwrap_or(false)
    }

    /// Length of the position lists.
    #[inline]
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.visible.len()
    }

    /// Rows still visible.
    #[inline]
    #[must_use]
    pub fn visible_count(&self) -> usize {
        self.visible_count
    }

    /// Number of bound columns.
    #[inline]
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Number of position lists.
    #[inline]
    #[must_use]
    pub fn position_list_count(&self) -> usize {
        self.position_lists.len()
    }

    /// Visible rows in position list order.
    #[must_use]
    pub fn iter(&self) -> VisibleRows<'_> {
        VisibleRows {
            visible: &self.visible,
            next: 0,
        }
    }

    fn binding(&self, column: usize) -> StrataResult<&ColumnBinding<'a>> {
        self.columns.get(column).ok_or(StrataError::ColumnOutOfRange {
            column,
            column_count: self.columns.len(),
        })
    }

    /// Base slot backing `column` at `row`.
    pub fn slot(&self, row: usize, column: usize) -> StrataResult<SlotId> {
        let binding = self.binding(column)?;
        let list = self.position_lists.get(binding.position_list).ok_or_else(|| {
            StrataError::invalid_argument(format!(
                "column {} reads missing position list {}",
                column, binding.position_list
            ))
        })?;
        list.get(row).copied().ok_or_else(|| {
            StrataError::invalid_argument(format!("row {} beyond position list", row))
        })
    }

    /// Base tile of a column.
    pub fn base_tile(&self, column: usize) -> StrataResult<&Tile> {
        Ok(self.binding(column)?.base.tile())
    }

    /// Reads one value.
    pub fn value(&self, row: usize, column: usize) -> StrataResult<Value> {
        let slot = self.slot(row, column)?;
        let binding = self.binding(column)?;
        binding.base.tile().value_at(slot, binding.origin_column)
    }

    /// Reads every column of a row.
    pub fn tuple(&self, row: usize) -> StrataResult<Tuple> {
        (0..self.columns.len())
            .map(|column| self.value(row, column))
            .collect()
    }

    /// Schema formed by the bound columns in order.
    pub fn schema(&self) -> StrataResult<Schema> {
        let columns = self
            .columns
            .iter()
            .map(|b| b.base.tile().schema().column(b.origin_column).cloned())
            .collect::<StrataResult<Vec<_>>>()?;
        Schema::new(columns)
    }

    /// Hides every visible row for which `predicate` returns false. Returns
    /// the number of rows hidden.
    pub fn retain<F>(&mut self, mut predicate: F) -> StrataResult<usize>
    where
        F: FnMut(&Self, usize) -> StrataResult<bool>,
    {
        let rows: Vec<usize> = self.iter().collect();
        let mut removed = 0;
        for row in rows {
            if !predicate(self, row)? {
                self.remove_visibility(row)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Copies the visible rows into a new physical tile and returns a
    /// logical tile that owns it.
    pub fn materialize(
        &self,
        backend: Arc<dyn Backend>,
        pool_chunk_size: usize,
    ) -> StrataResult<LogicalTile<'static>> {
        let schema = Arc::new(self.schema()?);
        let names = self
            .columns
            .iter()
            .map(|b| b.base.tile().column_names()[b.origin_column].clone())
            .collect();

        let tile = TileBuilder::new(schema, self.visible_count.max(1))
            .with_column_names(names)
            .with_pool_chunk_size(pool_chunk_size)
            .build(backend)?;

        for (index, row) in self.iter().enumerate() {
            // index < visible_count <= capacity
            tile.insert_tuple(SlotId::new(index as u32), &self.tuple(row)?)?;
        }

        tracing::trace!(
            rows = self.visible_count,
            columns = self.columns.len(),
            "materialized logical tile"
        );
        Ok(LogicalTile::wrap(Arc::new(tile)))
    }
}

impl fmt::Display for LogicalTile<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "LogicalTile: {} columns, {} of {} rows visible",
            self.columns.len(),
            self.visible_count,
            self.row_count()
        )?;
        for row in self.iter() {
            match self.tuple(row) {
                Ok(tuple) => writeln!(f, "  {}", tuple)?,
                Err(e) => writeln!(f, "  <row {}: {}>", row, e)?,
            }
        }
        Ok(())
    }
}

/// Iterator over visible row indexes.
#[derive(Debug, Clone)]
pub struct VisibleRows<'t> {
    visible: &'t [bool],
    next: usize,
}

impl Iterator for VisibleRows<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.next < self.visible.len() {
            let row = self.next;
            self.next += 1;
            if self.visible[row] {
                return Some(row);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.visible.len() - self.next))
    }
}

impl<'t> IntoIterator for &'t LogicalTile<'_> {
    type Item = usize;
    type IntoIter = VisibleRows<'t>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use strata_common::memory::HeapBackend;
    use strata_storage::catalog::{Column, ValueType};

    fn backend() -> Arc<dyn Backend> {
        Arc::new(HeapBackend::new())
    }

    fn tile(rows: u32) -> Tile {
        let schema = Arc::new(
            Schema::new(vec![
                Column::fixed("id", ValueType::Integer, false),
                Column::varchar("name", 40, true),
            ])
            .unwrap(),
        );
        let tile = Tile::new(schema, rows as usize, backend()).unwrap();
        for slot in 0..rows {
            let tuple = Tuple::new(vec![(slot as i32).into(), format!("row-{}", slot).into()]);
            tile.insert_tuple(SlotId::new(slot), &tuple).unwrap();
        }
        tile
    }

    fn slots(ids: &[u32]) -> Vec<SlotId> {
        ids.iter().copied().map(SlotId::new).collect()
    }

    #[test]
    fn test_bindings_and_values() {
        let tile = tile(6);
        let mut view = LogicalTile::new();
        view.add_position_list(slots(&[5, 1, 3]));
        view.add_column(BaseTile::Borrowed(&tile), 1, 0).unwrap();
        view.add_column(BaseTile::Borrowed(&tile), 0, 0).unwrap();

        assert_eq!(view.row_count(), 3);
        assert_eq!(view.value(0, 0).unwrap(), Value::from("row-5"));
        assert_eq!(view.tuple(2).unwrap(), Tuple::new(vec!["row-3".into(), Value::Integer(3)]));
        assert_eq!(view.schema().unwrap().column(0).unwrap().name(), "name");

        assert!(matches!(
            view.add_column(BaseTile::Borrowed(&tile), 7, 0),
            Err(StrataError::ColumnOutOfRange { .. })
        ));
        assert!(view.value(0, 9).is_err());
        assert!(view.value(3, 0).is_err());
    }

    #[test]
    fn test_add_position_list_replaces() {
        let mut view = LogicalTile::new();
        view.add_position_list(slots(&[1, 2, 3]));
        view.remove_visibility(0).unwrap();
        view.add_position_list(slots(&[4, 5]));
        assert_eq!(view.row_count(), 2);
        assert_eq!(view.visible_count(), 2);
        assert_eq!(view.position_list_count(), 1);
    }

    #[test]
    fn test_multiple_position_lists() {
        let left = tile(4);
        let right = tile(4);
        let mut view = LogicalTile::new();
        view.set_position_lists(vec![slots(&[0, 1]), slots(&[3, 2])]).unwrap();
        view.add_column(BaseTile::Borrowed(&left), 0, 0).unwrap();
        view.add_column(BaseTile::Borrowed(&right), 0, 1).unwrap();

        assert_eq!(view.tuple(0).unwrap(), Tuple::new(vec![Value::Integer(0), Value::Integer(3)]));
        assert_eq!(view.tuple(1).unwrap(), Tuple::new(vec![Value::Integer(1), Value::Integer(2)]));

        let err = view.set_position_lists(vec![slots(&[0]), slots(&[1, 2])]);
        assert!(err.is_err());
    }

    #[test]
    fn test_iteration_is_restartable() {
        let mut view = LogicalTile::new();
        view.add_position_list(slots(&[0, 1, 2, 3, 4]));
        view.remove_visibility(1).unwrap();
        view.remove_visibility(4).unwrap();

        let first: Vec<_> = view.iter().collect();
        let second: Vec<_> = (&view).into_iter().collect();
        assert_eq!(first, vec![0, 2, 3]);
        assert_eq!(first, second);

        // removing twice is a no-op
        view.remove_visibility(1).unwrap();
        assert_eq!(view.visible_count(), 3);
        assert!(view.remove_visibility(5).is_err());
    }

    #[test]
    fn test_monotonic_filtering() {
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..50 {
            let len = rng.gen_range(1..64);
            let mut view = LogicalTile::new();
            view.add_position_list((0..len).map(SlotId::new).collect());
            let mut previous: Vec<usize> = view.iter().collect();

            for _ in 0..rng.gen_range(0..80) {
                view.remove_visibility(rng.gen_range(0..len as usize)).unwrap();
                let current: Vec<usize> = view.iter().collect();

                // every surviving row was visible before, in the same order
                let mut earlier = previous.iter();
                assert!(current.iter().all(|row| earlier.any(|r| r == row)));
                assert_eq!(current.len(), view.visible_count());
                previous = current;
            }
        }
    }

    #[test]
    fn test_retain() {
        let tile = tile(8);
        let mut view = LogicalTile::new();
        view.add_position_list(slots(&[0, 1, 2, 3, 4, 5, 6, 7]));
        view.add_column(BaseTile::Borrowed(&tile), 0, 0).unwrap();

        let removed = view
            .retain(|view, row| Ok(view.value(row, 0)?.as_i64().unwrap_or(0) % 3 == 0))
            .unwrap();
        assert_eq!(removed, 5);
        assert_eq!(view.iter().collect::<Vec<_>>(), vec![0, 3, 6]);
    }

    #[test]
    fn test_materialize_and_wrap() {
        let tile = tile(5);
        let mut view = LogicalTile::new();
        view.add_position_list(slots(&[4, 0, 2]));
        view.add_column(BaseTile::Borrowed(&tile), 1, 0).unwrap();
        view.remove_visibility(1).unwrap();

        let owned = view.materialize(backend(), 1024).unwrap();
        drop(tile);

        assert_eq!(owned.row_count(), 2);
        assert_eq!(owned.column_count(), 1);
        assert_eq!(owned.value(0, 0).unwrap(), Value::from("row-4"));
        assert_eq!(owned.value(1, 0).unwrap(), Value::from("row-2"));
        assert_eq!(owned.base_tile(0).unwrap().column_names(), &["name".to_string()]);
    }

    #[test]
    fn test_materialize_empty() {
        let tile = tile(2);
        let mut view = LogicalTile::new();
        view.add_position_list(slots(&[0]));
        view.add_column(BaseTile::Borrowed(&tile), 0, 0).unwrap();
        view.remove_visibility(0).unwrap();

        let owned = view.materialize(backend(), 1024).unwrap();
        assert_eq!(owned.row_count(), 0);
        assert_eq!(owned.column_count(), 1);
    }
}
