//! Tile wire format.
//!
//! ```text
//! [i32 total_size]                       backpatched, excludes itself
//!   [i32 header_size]                    excludes itself
//!   [i8  status = -128]
//!   [i16 column_count]
//!   [i8  column_type] * column_count
//!   {[i32 name_length][name]} * column_count
//! [i32 tuple_count]
//! [tuple] * tuple_count
//! ```
//!
//! The header only depends on the schema and column names, so it is built
//! once per tile and reused.

use bytes::Bytes;
use strata_common::constants::TILE_HEADER_STATUS;
use strata_common::types::SlotId;
use strata_common::{StrataError, StrataResult};

use super::Tile;
use crate::catalog::{Column, Schema, ValueType};
use crate::serializer::{length_prefix, SerializeInput, SerializeOutput};
use crate::tuple::Tuple;

/// Column header as read from a stream, before it is matched to a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileHeader {
    /// Raw type code of each column.
    pub type_codes: Vec<i8>,
    /// Column names in order.
    pub column_names: Vec<String>,
}

impl TileHeader {
    /// Reads `[i32 header_size][i8 status][i16 count][types][names]`.
    pub fn read_from(input: &mut SerializeInput<'_>) -> StrataResult<Self> {
        let _header_size = input.read_i32()?;
        let _status = input.read_i8()?;

        let column_count = input.read_i16()?;
        let column_count = usize::try_from(column_count)
            .ok()
            .filter(|count| *count > 0)
            .ok_or_else(|| {
                StrataError::corruption(format!("invalid column count {}", column_count))
            })?;

        let mut type_codes = Vec::with_capacity(column_count);
        for _ in 0..column_count {
            type_codes.push(input.read_i8()?);
        }
        let mut column_names = Vec::with_capacity(column_count);
        for _ in 0..column_count {
            let name = input
                .read_varlen()?
                .ok_or_else(|| StrataError::corruption("NULL column name in header"))?;
            column_names.push(String::from_utf8_lossy(name).into_owned());
        }
        Ok(Self {
            type_codes,
            column_names,
        })
    }

    /// Number of columns described.
    #[inline]
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.type_codes.len()
    }

    /// Builds a nullable schema able to hold any stream with this header.
    /// Variable-length columns get `max_varlen` as declared length.
    pub fn infer_schema(&self, max_varlen: usize) -> StrataResult<Schema> {
        let columns = self
            .type_codes
            .iter()
            .zip(&self.column_names)
            .map(|(code, name)| {
                let value_type = ValueType::from_code(*code)?;
                Ok(Column::new(name.clone(), value_type, max_varlen, true))
            })
            .collect::<StrataResult<Vec<_>>>()?;
        Schema::new(columns)
    }
}

impl Tile {
    /// Returns the serialized column header, building it on first use.
    pub fn serialize_header(&self) -> Bytes {
        self.column_header
            .get_or_init(|| {
                let header = self.build_header();
                tracing::trace!(
                    tile_id = %self.identity.tile_id,
                    bytes = header.len(),
                    "cached tile header"
                );
                header
            })
            .clone()
    }

    fn build_header(&self) -> Bytes {
        let mut body = SerializeOutput::new();
        body.write_i8(TILE_HEADER_STATUS);
        // column count bounded by MAX_COLUMN_COUNT
        body.write_i16(self.column_count() as i16);
        for column in self.schema.columns() {
            body.write_i8(column.value_type().code());
        }
        // name lengths bounded when the tile was built
        for name in &self.column_names {
            body.write_i32(name.len() as i32);
            body.write_bytes(name.as_bytes());
        }

        let mut out = SerializeOutput::with_capacity(body.position() + 4);
        out.write_i32(body.position() as i32);
        out.write_bytes(body.data());
        out.freeze()
    }

    /// Writes the header followed by the first `tuple_count` live tuples in
    /// slot order. Fails if fewer tuples are live.
    pub fn serialize_to(&self, out: &mut SerializeOutput, tuple_count: usize) -> StrataResult<()> {
        let rows = self.live_tuples(tuple_count)?;
        if rows.len() < tuple_count {
            return Err(StrataError::invalid_argument(format!(
                "asked to serialize {} tuples, tile {} has {} live",
                tuple_count,
                self.identity.tile_id,
                rows.len()
            )));
        }
        self.write_framed(out, rows.iter().map(|(_, tuple)| tuple), tuple_count)
    }

    /// Writes the header followed by exactly `tuples`.
    pub fn serialize_tuples_to(&self, out: &mut SerializeOutput, tuples: &[Tuple]) -> StrataResult<()> {
        if tuples.is_empty() {
            return Err(StrataError::invalid_argument("no tuples to serialize"));
        }
        self.write_framed(out, tuples.iter(), tuples.len())
    }

    fn write_framed<'t>(
        &self,
        out: &mut SerializeOutput,
        tuples: impl Iterator<Item = &'t Tuple>,
        tuple_count: usize,
    ) -> StrataResult<()> {
        let count = length_prefix(tuple_count)?;

        let start = out.position();
        out.write_i32(-1);
        out.write_bytes(&self.serialize_header());
        out.write_i32(count);
        for tuple in tuples {
            tuple.serialize_to(&self.schema, out)?;
        }

        let total = length_prefix(out.position() - start - 4)?;
        out.write_i32_at(start, total)?;

        tracing::trace!(
            tile_id = %self.identity.tile_id,
            tuples = tuple_count,
            bytes = out.position() - start,
            "serialized tile"
        );
        Ok(())
    }

    /// Reads a full stream as written by [`Tile::serialize_to`], including
    /// the leading total size. Returns the number of tuples loaded.
    pub fn deserialize_from(&self, input: &mut SerializeInput<'_>) -> StrataResult<usize> {
        let total = input.read_i32()?;
        let total = usize::try_from(total)
            .ok()
            .filter(|total| *total <= input.remaining())
            .ok_or_else(|| {
                StrataError::corruption(format!(
                    "total size {} does not fit the {} remaining bytes",
                    total,
                    input.remaining()
                ))
            })?;

        let start = input.position();
        let loaded = self.deserialize_tuples_from(input)?;
        let consumed = input.position() - start;
        if consumed != total {
            return Err(StrataError::corruption(format!(
                "tile stream declared {} bytes but {} were decoded",
                total, consumed
            )));
        }
        Ok(loaded)
    }

    /// Reads a header, checks it against this tile's columns, then loads the
    /// tuples that follow into slots `0..n`.
    pub fn deserialize_tuples_from(&self, input: &mut SerializeInput<'_>) -> StrataResult<usize> {
        let header = TileHeader::read_from(input)?;
        let column_count = header.column_count();

        let matches = column_count == self.column_count()
            && (!self.validate_headers
                || self
                    .schema
                    .columns()
                    .iter()
                    .zip(&self.column_names)
                    .zip(header.type_codes.iter().zip(&header.column_names))
                    .all(|((column, own_name), (code, name))| {
                        column.value_type().code() == *code && own_name == name
                    }));

        if !matches {
            let detail = self.mismatch_detail(&header);
            tracing::warn!(
                tile_id = %self.identity.tile_id,
                expected = self.column_count(),
                actual = column_count,
                "serialized header does not match tile schema"
            );
            return Err(StrataError::SchemaMismatch {
                expected: self.column_count(),
                actual: column_count,
                detail,
            });
        }

        self.deserialize_tuples_from_without_header(input)
    }

    fn mismatch_detail(&self, header: &TileHeader) -> String {
        let mut detail = String::from("Expecting the following columns:\n");
        for (i, (column, name)) in self.schema.columns().iter().zip(&self.column_names).enumerate() {
            detail.push_str(&format!("column {}: {}, type = {}\n", i, name, column.value_type()));
        }
        detail.push_str("The following columns are given:\n");
        for (i, (code, name)) in header.type_codes.iter().zip(&header.column_names).enumerate() {
            let type_name = ValueType::from_code(*code)
                .map_or_else(|_| format!("UNKNOWN({})", code), |t| t.name().to_string());
            detail.push_str(&format!("column {}: {}, type = {}\n", i, name, type_name));
        }
        detail
    }

    /// Reads `[i32 tuple_count]` and the tuples that follow, trusting that the
    /// stream matches this tile's schema. Tuples land in slots `0..n`.
    pub fn deserialize_tuples_from_without_header(
        &self,
        input: &mut SerializeInput<'_>,
    ) -> StrataResult<usize> {
        let tuple_count = input.read_i32()?;
        if tuple_count < 0 {
            return Err(StrataError::corruption(format!(
                "negative tuple count {}",
                tuple_count
            )));
        }
        if tuple_count == 0 {
            return Err(StrataError::invalid_argument("serialized tile holds no tuples"));
        }
        let tuple_count = tuple_count as usize;
        if tuple_count > self.capacity {
            // the last slot the stream would fill
            return Err(StrataError::SlotOutOfRange {
                slot: SlotId::new(u32::try_from(tuple_count - 1).unwrap_or(u32::MAX)),
                capacity: self.capacity,
            });
        }

        let tuples = (0..tuple_count)
            .map(|_| Tuple::deserialize_from(&self.schema, input))
            .collect::<StrataResult<Vec<_>>>()?;
        for (slot, tuple) in tuples.iter().enumerate() {
            // slot < capacity <= u32::MAX
            self.insert_tuple(SlotId::new(slot as u32), tuple)?;
        }

        tracing::debug!(
            tile_id = %self.identity.tile_id,
            tuples = tuple_count,
            "loaded tuples from stream"
        );
        Ok(tuple_count)
    }
}
