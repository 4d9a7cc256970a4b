//! # strata-tools
//!
//! Support code for the `tiledump` binary: decoding serialized tile streams
//! without knowing their schema in advance and printing what they hold.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use strata_common::memory::HeapBackend;
use strata_common::StrataError;
use strata_storage::catalog::{Column, Schema, ValueType};
use strata_storage::serializer::SerializeInput;
use strata_storage::tile::{TileBuilder, TileHeader};

/// Declared length given to variable-length columns of an inferred schema.
pub const INFERRED_VARLEN_LENGTH: usize = 1 << 30;

/// How to read a stream.
#[derive(Debug, Clone, Default)]
pub struct DumpOptions {
    /// The stream is `[i32 tuple_count][tuples]` with no size or header.
    pub no_header: bool,
    /// Explicit schema, `name:type[:length]` separated by commas.
    pub schema: Option<String>,
    /// Print at most this many tuples.
    pub limit: Option<usize>,
}

/// What a dump found.
#[derive(Debug, Clone, PartialEq)]
pub struct DumpSummary {
    /// Columns of the decoded stream.
    pub column_names: Vec<String>,
    /// Tuples decoded.
    pub tuple_count: usize,
    /// Tuples printed.
    pub printed: usize,
}

/// Parses `name:type[:length]` column specs separated by commas.
pub fn parse_schema(spec: &str) -> Result<Schema> {
    let columns = spec
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut fields = part.split(':');
            let name = fields.next().unwrap_or_default();
            let type_name = fields
                .next()
                .with_context(|| format!("column '{}' has no type", part))?;
            let value_type: ValueType = type_name.parse()?;
            let length = match fields.next() {
                Some(length) => length
                    .parse()
                    .with_context(|| format!("bad length in column '{}'", part))?,
                None => INFERRED_VARLEN_LENGTH,
            };
            if fields.next().is_some() {
                bail!("column '{}' has too many fields", part);
            }
            Ok(Column::new(name, value_type, length, true))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Schema::new(columns)?)
}

/// Reads `path` and dumps it to `out`.
pub fn dump_file(path: &Path, options: &DumpOptions, out: &mut impl Write) -> Result<DumpSummary> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    tracing::debug!(file = %path.display(), bytes = bytes.len(), "read stream");
    dump(&bytes, options, out)
}

/// Decodes `bytes` and writes a human-readable dump to `out`.
pub fn dump(bytes: &[u8], options: &DumpOptions, out: &mut impl Write) -> Result<DumpSummary> {
    let explicit = options.schema.as_deref().map(parse_schema).transpose()?;

    let (schema, names, tuple_count) = if options.no_header {
        let schema = explicit.context("--schema is required for streams without a header")?;
        let names = schema.columns().iter().map(|c| c.name().to_string()).collect();
        let count = SerializeInput::new(bytes).read_i32()?;
        (schema, names, count)
    } else {
        let mut input = SerializeInput::new(bytes);
        let total = input.read_i32()?;
        let header = TileHeader::read_from(&mut input)?;
        let count = input.read_i32()?;

        writeln!(out, "stream: {} bytes, declared {}", bytes.len(), total)?;
        writeln!(out, "columns: {}", header.column_count())?;
        for (i, (code, name)) in header.type_codes.iter().zip(&header.column_names).enumerate() {
            let type_name = ValueType::from_code(*code)
                .map_or_else(|_| format!("UNKNOWN({})", code), |t| t.name().to_string());
            writeln!(out, "  {}: {} {}", i, name, type_name)?;
        }

        let schema = match explicit {
            Some(schema) => schema,
            None => header.infer_schema(INFERRED_VARLEN_LENGTH)?,
        };
        (schema, header.column_names, count)
    };

    writeln!(out, "tuples: {}", tuple_count)?;
    if tuple_count <= 0 {
        bail!(StrataError::invalid_argument(format!(
            "stream holds {} tuples",
            tuple_count
        )));
    }
    let tuple_count = tuple_count as usize;

    tracing::debug!(columns = schema.column_count(), tuples = tuple_count, "decoding stream");

    let tile = TileBuilder::new(Arc::new(schema), tuple_count)
        .with_column_names(names.clone())
        .build(Arc::new(HeapBackend::new()))?;
    let mut input = SerializeInput::new(bytes);
    let loaded = if options.no_header {
        tile.deserialize_tuples_from_without_header(&mut input)?
    } else {
        tile.deserialize_from(&mut input)?
    };
    if input.remaining() > 0 {
        tracing::warn!(trailing = input.remaining(), "bytes left after tile stream");
    }

    let rows = tile.live_tuples(options.limit.unwrap_or(usize::MAX))?;
    for (slot, tuple) in &rows {
        writeln!(out, "  [{}] {}", slot, tuple)?;
    }
    if rows.len() < loaded {
        writeln!(out, "  ... {} more", loaded - rows.len())?;
    }

    Ok(DumpSummary {
        column_names: names,
        tuple_count: loaded,
        printed: rows.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::types::SlotId;
    use strata_storage::serializer::SerializeOutput;
    use strata_storage::tile::Tile;
    use strata_storage::tuple::{Tuple, Value};

    fn stream() -> Vec<u8> {
        let schema = Schema::new(vec![
            Column::fixed("id", ValueType::Integer, false),
            Column::varchar("city", 24, true),
        ])
        .unwrap();
        let tile = Tile::new(Arc::new(schema), 4, Arc::new(HeapBackend::new())).unwrap();
        tile.insert_tuple(SlotId::new(0), &Tuple::new(vec![Value::Integer(1), "Lisbon".into()]))
            .unwrap();
        tile.insert_tuple(SlotId::new(1), &Tuple::new(vec![Value::Integer(2), Value::Null]))
            .unwrap();
        tile.insert_tuple(SlotId::new(2), &Tuple::new(vec![Value::Integer(3), "Oslo".into()]))
            .unwrap();

        let mut out = SerializeOutput::new();
        tile.serialize_to(&mut out, 3).unwrap();
        out.data().to_vec()
    }

    #[test]
    fn test_parse_schema() {
        let schema = parse_schema("id:integer, name:varchar:12,blob:VARBINARY").unwrap();
        assert_eq!(schema.column_count(), 3);
        assert_eq!(schema.column(1).unwrap().length(), 12);
        assert!(schema.column(1).unwrap().is_inlined());
        assert!(!schema.column(2).unwrap().is_inlined());

        assert!(parse_schema("id").is_err());
        assert!(parse_schema("id:float").is_err());
        assert!(parse_schema("id:integer:4:9").is_err());
        assert!(parse_schema("").is_err());
    }

    #[test]
    fn test_dump_with_header() {
        let bytes = stream();
        let mut out = Vec::new();
        let summary = dump(&bytes, &DumpOptions::default(), &mut out).unwrap();

        assert_eq!(summary.tuple_count, 3);
        assert_eq!(summary.column_names, vec!["id".to_string(), "city".to_string()]);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("columns: 2"));
        assert!(text.contains("1: city VARCHAR"));
        assert!(text.contains("Lisbon"));
        assert!(text.contains("NULL"));
    }

    #[test]
    fn test_dump_limit() {
        let bytes = stream();
        let options = DumpOptions {
            limit: Some(1),
            ..DumpOptions::default()
        };
        let mut out = Vec::new();
        let summary = dump(&bytes, &options, &mut out).unwrap();
        assert_eq!(summary.printed, 1);
        assert!(String::from_utf8(out).unwrap().contains("... 2 more"));
    }

    #[test]
    fn test_dump_without_header() {
        let bytes = stream();
        // skip total size and header to reach [i32 count][tuples]
        let mut input = SerializeInput::new(&bytes);
        input.read_i32().unwrap();
        TileHeader::read_from(&mut input).unwrap();
        let body = &bytes[input.position()..];

        let options = DumpOptions {
            no_header: true,
            schema: Some("id:integer,city:varchar:24".into()),
            limit: None,
        };
        let mut out = Vec::new();
        let summary = dump(body, &options, &mut out).unwrap();
        assert_eq!(summary.tuple_count, 3);
        assert!(String::from_utf8(out).unwrap().contains("Oslo"));

        let missing = DumpOptions {
            no_header: true,
            ..DumpOptions::default()
        };
        assert!(dump(body, &missing, &mut Vec::new()).is_err());
    }

    #[test]
    fn test_dump_rejects_garbage() {
        assert!(dump(&[0, 0, 0], &DumpOptions::default(), &mut Vec::new()).is_err());
        let mut bytes = stream();
        bytes.truncate(bytes.len() - 2);
        assert!(dump(&bytes, &DumpOptions::default(), &mut Vec::new()).is_err());
    }

    #[test]
    fn test_dump_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&stream()).unwrap();
        file.flush().unwrap();

        let mut out = Vec::new();
        let summary = dump_file(file.path(), &DumpOptions::default(), &mut out).unwrap();
        assert_eq!(summary.tuple_count, 3);

        let missing = file.path().with_extension("absent");
        let err = dump_file(&missing, &DumpOptions::default(), &mut Vec::new()).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
