//! Column and schema layout.
//!
//! A [`Schema`] is an ordered list of [`Column`]s plus the byte layout of one
//! tuple slot: every column occupies a fixed-width region at a precomputed
//! offset. Schemas are immutable once built and shared through `Arc`.

use std::fmt;

use strata_common::constants::{INLINE_VARLEN_THRESHOLD, MAX_COLUMN_COUNT, POOL_REF_SIZE};
use strata_common::{StrataError, StrataResult};

use super::types::ValueType;

/// A column descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Column {
    name: String,
    value_type: ValueType,
    length: usize,
    nullable: bool,
    inlined: bool,
}

impl Column {
    /// Creates a column with an explicit declared length.
    ///
    /// The length is ignored for fixed-width types. Variable-length columns
    /// are inlined when their declared length is at most
    /// `INLINE_VARLEN_THRESHOLD` bytes.
    pub fn new(name: impl Into<String>, value_type: ValueType, length: usize, nullable: bool) -> Self {
        let (length, inlined) = match value_type.fixed_size() {
            Some(size) => (size, true),
            None => (length, length <= INLINE_VARLEN_THRESHOLD),
        };
        Self {
            name: name.into(),
            value_type,
            length,
            nullable,
            inlined,
        }
    }

    /// Creates a fixed-width column.
    pub fn fixed(name: impl Into<String>, value_type: ValueType, nullable: bool) -> Self {
        Self::new(name, value_type, 0, nullable)
    }

    /// Creates a VARCHAR column with a maximum byte length.
    pub fn varchar(name: impl Into<String>, max_length: usize, nullable: bool) -> Self {
        Self::new(name, ValueType::Varchar, max_length, nullable)
    }

    /// Creates a VARBINARY column with a maximum byte length.
    pub fn varbinary(name: impl Into<String>, max_length: usize, nullable: bool) -> Self {
        Self::new(name, ValueType::Varbinary, max_length, nullable)
    }

    /// Column name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value type.
    #[inline]
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Declared length in bytes (the fixed size for fixed-width types).
    #[inline]
    #[must_use]
    pub fn length(&self) -> usize {
        self.length
    }

    /// Whether NULL is accepted.
    #[inline]
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Whether the value lives inside the slot rather than in the pool.
    #[inline]
    #[must_use]
    pub fn is_inlined(&self) -> bool {
        self.inlined
    }

    /// Width of the column's region inside a slot.
    #[must_use]
    pub fn slot_width(&self) -> usize {
        if !self.value_type.is_variable_length() {
            self.length
        } else if self.inlined {
            1 + self.length
        } else {
            POOL_REF_SIZE
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.value_type)?;
        if self.value_type.is_variable_length() {
            write!(f, "({})", self.length)?;
        }
        if !self.nullable {
            write!(f, " NOT NULL")?;
        }
        if !self.inlined {
            write!(f, " [pool]")?;
        }
        Ok(())
    }
}

/// Ordered columns and the slot layout derived from them.
///
/// # Example
///
/// ```rust
/// use strata_storage::catalog::{Column, Schema, ValueType};
///
/// let schema = Schema::new(vec![
///     Column::fixed("id", ValueType::Integer, false),
///     Column::varchar("name", 64, true),
/// ])
/// .unwrap();
///
/// assert_eq!(schema.offset(1), 4);
/// assert_eq!(schema.tuple_length(), 12);
/// assert!(!schema.is_inlined());
/// ```
#[derive(Debug, Clone)]
pub struct Schema {
    columns: Vec<Column>,
    offsets: Vec<usize>,
    tuple_length: usize,
    inlined: bool,
}

impl Schema {
    /// Builds a schema. Fails on an empty column list or more than
    /// `MAX_COLUMN_COUNT` columns.
    pub fn new(columns: Vec<Column>) -> StrataResult<Self> {
        if columns.is_empty() {
            return Err(StrataError::invalid_argument("a schema needs at least one column"));
        }
        if columns.len() > MAX_COLUMN_COUNT {
            return Err(StrataError::invalid_argument(format!(
                "{} columns exceed the limit of {}",
                columns.len(),
                MAX_COLUMN_COUNT
            )));
        }

        let mut offsets = Vec::with_capacity(columns.len());
        let mut tuple_length = 0;
        for column in &columns {
            offsets.push(tuple_length);
            tuple_length += column.slot_width();
        }
        let inlined = columns.iter().all(Column::is_inlined);

        Ok(Self {
            columns,
            offsets,
            tuple_length,
            inlined,
        })
    }

    /// Number of columns.
    #[inline]
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// All columns in order.
    #[inline]
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns a column, failing with `ColumnOutOfRange`.
    pub fn column(&self, index: usize) -> StrataResult<&Column> {
        self.columns.get(index).ok_or(StrataError::ColumnOutOfRange {
            column: index,
            column_count: self.columns.len(),
        })
    }

    /// Byte offset of a column inside a slot.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below the column count.
    #[inline]
    #[must_use]
    pub fn offset(&self, index: usize) -> usize {
        self.offsets[index]
    }

    /// Bytes per tuple slot.
    #[inline]
    #[must_use]
    pub fn tuple_length(&self) -> usize {
        self.tuple_length
    }

    /// True when no column needs the pool.
    #[inline]
    #[must_use]
    pub fn is_inlined(&self) -> bool {
        self.inlined
    }

    /// Position of the first column with this name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Schema made of a subset of this schema's columns, in the given order.
    pub fn project(&self, indices: &[usize]) -> StrataResult<Self> {
        let columns = indices
            .iter()
            .map(|&i| self.column(i).cloned())
            .collect::<StrataResult<Vec<_>>>()?;
        Self::new(columns)
    }

    /// Schema formed by appending the columns of every input schema.
    pub fn concat<'a>(schemas: impl IntoIterator<Item = &'a Schema>) -> StrataResult<Self> {
        let columns = schemas
            .into_iter()
            .flat_map(|s| s.columns.iter().cloned())
            .collect();
        Self::new(columns)
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns
    }
}

impl Eq for Schema {}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", column)?;
        }
        write!(f, ")")
    }
}
