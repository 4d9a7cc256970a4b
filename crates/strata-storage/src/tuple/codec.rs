//! Column value encodings.
//!
//! Two encodings exist for every column:
//!
//! - **slot**: the fixed-width region inside a tile slot. Integers are
//!   little-endian; inlined variable-length values are a length byte followed
//!   by the bytes (`0xFF` = NULL); uninlined ones are a [`PoolRef`].
//! - **wire**: the serialized tile format. Integers are big-endian at their
//!   natural width; variable-length values are `[i32 len][bytes]` (`-1` = NULL).
//!
//! Fixed-width NULL is the type's minimum value in both encodings, so that
//! value itself cannot be stored.

use strata_common::constants::INLINE_NULL_LENGTH;
use strata_common::memory::{Pool, PoolRef};
use strata_common::{StrataError, StrataResult};

use crate::catalog::{Column, ValueType};
use crate::serializer::{SerializeInput, SerializeOutput};

use super::value::Value;

const NULL_BOOLEAN: i8 = i8::MIN;

/// Checks that `value` can be stored in `column`.
pub(crate) fn check_value(column: &Column, value: &Value) -> StrataResult<()> {
    let Some(value_type) = value.value_type() else {
        if column.is_nullable() {
            return Ok(());
        }
        return Err(StrataError::invalid_argument(format!(
            "column {} is NOT NULL",
            column.name()
        )));
    };

    if value_type != column.value_type() {
        return Err(StrataError::invalid_argument(format!(
            "column {} expects {}, got {}",
            column.name(),
            column.value_type(),
            value_type
        )));
    }

    let reserved = match value {
        Value::TinyInt(v) => *v == i8::MIN,
        Value::SmallInt(v) => *v == i16::MIN,
        Value::Integer(v) => *v == i32::MIN,
        Value::BigInt(v) | Value::Timestamp(v) => *v == i64::MIN,
        Value::Double(v) => v.to_bits() == f64::MIN.to_bits(),
        _ => false,
    };
    if reserved {
        return Err(StrataError::invalid_argument(format!(
            "value {} of column {} is reserved for NULL",
            value,
            column.name()
        )));
    }

    if let Some(bytes) = value.as_bytes() {
        if bytes.len() > column.length() {
            return Err(StrataError::invalid_argument(format!(
                "{} bytes exceed the declared length {} of column {}",
                bytes.len(),
                column.length(),
                column.name()
            )));
        }
    }

    Ok(())
}

/// Writes `value` into the column's slot region.
///
/// `dest` is exactly `column.slot_width()` bytes. Uninlined values are copied
/// into `pool`. The value must already have passed [`check_value`].
pub(crate) fn encode_slot(
    column: &Column,
    value: &Value,
    dest: &mut [u8],
    pool: &mut Pool,
) -> StrataResult<()> {
    match (column.value_type(), value) {
        (ValueType::Varchar | ValueType::Varbinary, _) => {
            let bytes = value.as_bytes();
            if column.is_inlined() {
                dest.fill(0);
                match bytes {
                    None => dest[0] = INLINE_NULL_LENGTH,
                    Some(bytes) => {
                        // declared length <= threshold < 0xFF
                        dest[0] = bytes.len() as u8;
                        dest[1..=bytes.len()].copy_from_slice(bytes);
                    }
                }
            } else {
                let reference = match bytes {
                    None => PoolRef::NULL,
                    Some(bytes) => pool.allocate(bytes)?,
                };
                dest.copy_from_slice(&reference.as_raw().to_le_bytes());
            }
        }
        (ValueType::TinyInt, Value::TinyInt(v)) => dest[0] = *v as u8,
        (ValueType::TinyInt, _) => dest[0] = i8::MIN as u8,
        (ValueType::Boolean, Value::Boolean(v)) => dest[0] = u8::from(*v),
        (ValueType::Boolean, _) => dest[0] = NULL_BOOLEAN as u8,
        (ValueType::SmallInt, Value::SmallInt(v)) => dest.copy_from_slice(&v.to_le_bytes()),
        (ValueType::SmallInt, _) => dest.copy_from_slice(&i16::MIN.to_le_bytes()),
        (ValueType::Integer, Value::Integer(v)) => dest.copy_from_slice(&v.to_le_bytes()),
        (ValueType::Integer, _) => dest.copy_from_slice(&i32::MIN.to_le_bytes()),
        (ValueType::BigInt, Value::BigInt(v)) | (ValueType::Timestamp, Value::Timestamp(v)) => {
            dest.copy_from_slice(&v.to_le_bytes());
        }
        (ValueType::BigInt | ValueType::Timestamp, _) => {
            dest.copy_from_slice(&i64::MIN.to_le_bytes());
        }
        (ValueType::Double, Value::Double(v)) => dest.copy_from_slice(&v.to_le_bytes()),
        (ValueType::Double, _) => dest.copy_from_slice(&f64::MIN.to_le_bytes()),
    }
    Ok(())
}

fn array<const N: usize>(src: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&src[..N]);
    out
}

/// Reads a value from the column's slot region.
pub(crate) fn decode_slot(column: &Column, src: &[u8], pool: &Pool) -> StrataResult<Value> {
    let value = match column.value_type() {
        ValueType::TinyInt => match src[0] as i8 {
            i8::MIN => Value::Null,
            v => Value::TinyInt(v),
        },
        ValueType::Boolean => match src[0] as i8 {
            NULL_BOOLEAN => Value::Null,
            v => Value::Boolean(v != 0),
        },
        ValueType::SmallInt => match i16::from_le_bytes(array(src)) {
            i16::MIN => Value::Null,
            v => Value::SmallInt(v),
        },
        ValueType::Integer => match i32::from_le_bytes(array(src)) {
            i32::MIN => Value::Null,
            v => Value::Integer(v),
        },
        ValueType::BigInt => match i64::from_le_bytes(array(src)) {
            i64::MIN => Value::Null,
            v => Value::BigInt(v),
        },
        ValueType::Timestamp => match i64::from_le_bytes(array(src)) {
            i64::MIN => Value::Null,
            v => Value::Timestamp(v),
        },
        ValueType::Double => {
            let v = f64::from_le_bytes(array(src));
            if v.to_bits() == f64::MIN.to_bits() {
                Value::Null
            } else {
                Value::Double(v)
            }
        }
        ValueType::Varchar | ValueType::Varbinary => {
            let bytes = if column.is_inlined() {
                match src[0] {
                    INLINE_NULL_LENGTH => None,
                    len => {
                        let len = usize::from(len);
                        if len > column.length() {
                            return Err(StrataError::corruption(format!(
                                "inlined length {} exceeds column {} length {}",
                                len,
                                column.name(),
                                column.length()
                            )));
                        }
                        Some(&src[1..=len])
                    }
                }
            } else {
                let reference = PoolRef::from_raw(u64::from_le_bytes(array(src)));
                if reference.is_null() {
                    None
                } else {
                    Some(pool.get(reference)?)
                }
            };
            match bytes {
                None => Value::Null,
                Some(bytes) => varlen_value(column, bytes)?,
            }
        }
    };
    Ok(value)
}

fn varlen_value(column: &Column, bytes: &[u8]) -> StrataResult<Value> {
    if column.value_type() == ValueType::Varbinary {
        return Ok(Value::Varbinary(bytes.to_vec()));
    }
    String::from_utf8(bytes.to_vec())
        .map(Value::Varchar)
        .map_err(|e| {
            StrataError::corruption(format!("column {} holds invalid UTF-8: {}", column.name(), e))
        })
}

/// Writes `value` in the wire encoding.
pub(crate) fn write_wire(
    column: &Column,
    value: &Value,
    out: &mut SerializeOutput,
) -> StrataResult<()> {
    match (column.value_type(), value) {
        (ValueType::Varchar | ValueType::Varbinary, _) => out.write_varlen(value.as_bytes())?,
        (ValueType::TinyInt, Value::TinyInt(v)) => out.write_i8(*v),
        (ValueType::TinyInt, _) => out.write_i8(i8::MIN),
        (ValueType::Boolean, Value::Boolean(v)) => out.write_i8(i8::from(*v)),
        (ValueType::Boolean, _) => out.write_i8(NULL_BOOLEAN),
        (ValueType::SmallInt, Value::SmallInt(v)) => out.write_i16(*v),
        (ValueType::SmallInt, _) => out.write_i16(i16::MIN),
        (ValueType::Integer, Value::Integer(v)) => out.write_i32(*v),
        (ValueType::Integer, _) => out.write_i32(i32::MIN),
        (ValueType::BigInt, Value::BigInt(v)) | (ValueType::Timestamp, Value::Timestamp(v)) => {
            out.write_i64(*v);
        }
        (ValueType::BigInt | ValueType::Timestamp, _) => out.write_i64(i64::MIN),
        (ValueType::Double, Value::Double(v)) => out.write_f64(*v),
        (ValueType::Double, _) => out.write_f64(f64::MIN),
    }
    Ok(())
}

/// Reads a value in the wire encoding.
pub(crate) fn read_wire(column: &Column, input: &mut SerializeInput<'_>) -> StrataResult<Value> {
    let value = match column.value_type() {
        ValueType::TinyInt => match input.read_i8()? {
            i8::MIN => Value::Null,
            v => Value::TinyInt(v),
        },
        ValueType::Boolean => match input.read_i8()? {
            NULL_BOOLEAN => Value::Null,
            v => Value::Boolean(v != 0),
        },
        ValueType::SmallInt => match input.read_i16()? {
            i16::MIN => Value::Null,
            v => Value::SmallInt(v),
        },
        ValueType::Integer => match input.read_i32()? {
            i32::MIN => Value::Null,
            v => Value::Integer(v),
        },
        ValueType::BigInt => match input.read_i64()? {
            i64::MIN => Value::Null,
            v => Value::BigInt(v),
        },
        ValueType::Timestamp => match input.read_i64()? {
            i64::MIN => Value::Null,
            v => Value::Timestamp(v),
        },
        ValueType::Double => {
            let v = input.read_f64()?;
            if v.to_bits() == f64::MIN.to_bits() {
                Value::Null
            } else {
                Value::Double(v)
            }
        }
        ValueType::Varchar | ValueType::Varbinary => match input.read_varlen()? {
            None => Value::Null,
            Some(bytes) => varlen_value(column, bytes)?,
        },
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Arc;
    use strata_common::memory::HeapBackend;

    fn pool() -> Pool {
        Pool::new(Arc::new(HeapBackend::new()), 1024)
    }

    fn slot_roundtrip(column: &Column, value: Value) -> Value {
        let mut pool = pool();
        let mut slot = vec![0u8; column.slot_width()];
        check_value(column, &value).unwrap();
        encode_slot(column, &value, &mut slot, &mut pool).unwrap();
        decode_slot(column, &slot, &pool).unwrap()
    }

    #[test]
    fn test_fixed_width_slots() {
        let col = Column::fixed("a", ValueType::Integer, true);
        assert_eq!(slot_roundtrip(&col, Value::Integer(-42)), Value::Integer(-42));
        assert_eq!(slot_roundtrip(&col, Value::Null), Value::Null);

        let col = Column::fixed("b", ValueType::Double, true);
        assert_eq!(slot_roundtrip(&col, Value::Double(0.25)), Value::Double(0.25));

        let col = Column::fixed("c", ValueType::Boolean, true);
        assert_eq!(slot_roundtrip(&col, Value::Boolean(true)), Value::Boolean(true));
        assert_eq!(slot_roundtrip(&col, Value::Null), Value::Null);
    }

    #[test]
    fn test_inlined_varlen_slot() {
        let col = Column::varchar("code", 8, true);
        assert_eq!(slot_roundtrip(&col, "abc".into()), Value::from("abc"));
        assert_eq!(slot_roundtrip(&col, "".into()), Value::from(""));
        assert_eq!(slot_roundtrip(&col, Value::Null), Value::Null);
    }

    #[test]
    fn test_pooled_varlen_slot() {
        let col = Column::varbinary("blob", 256, true);
        let mut pool = pool();
        let mut slot = vec![0u8; col.slot_width()];

        encode_slot(&col, &Value::Varbinary(vec![9; 200]), &mut slot, &mut pool).unwrap();
        assert_eq!(pool.chunk_count(), 1);
        assert_eq!(
            decode_slot(&col, &slot, &pool).unwrap(),
            Value::Varbinary(vec![9; 200])
        );

        encode_slot(&col, &Value::Null, &mut slot, &mut pool).unwrap();
        assert_eq!(decode_slot(&col, &slot, &pool).unwrap(), Value::Null);
    }

    #[test]
    fn test_check_value_rejections() {
        let not_null = Column::fixed("id", ValueType::Integer, false);
        assert!(check_value(&not_null, &Value::Null).is_err());
        assert!(check_value(&not_null, &Value::BigInt(1)).is_err());
        assert!(check_value(&not_null, &Value::Integer(i32::MIN)).is_err());
        assert!(check_value(&not_null, &Value::Integer(i32::MAX)).is_ok());

        let short = Column::varchar("s", 4, true);
        assert!(check_value(&short, &"abcde".into()).is_err());
        assert!(check_value(&short, &"abcd".into()).is_ok());
    }

    #[test]
    fn test_wire_encoding_is_big_endian() {
        let col = Column::fixed("a", ValueType::SmallInt, true);
        let mut out = SerializeOutput::new();
        write_wire(&col, &Value::SmallInt(258), &mut out).unwrap();
        assert_eq!(out.data(), &[1, 2]);

        let col = Column::varchar("s", 64, true);
        let mut out = SerializeOutput::new();
        write_wire(&col, &Value::Null, &mut out).unwrap();
        write_wire(&col, &"hi".into(), &mut out).unwrap();
        assert_eq!(out.data(), &[0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 2, b'h', b'i']);

        let mut input = SerializeInput::new(out.data());
        assert_eq!(read_wire(&col, &mut input).unwrap(), Value::Null);
        assert_eq!(read_wire(&col, &mut input).unwrap(), Value::from("hi"));
    }

    #[test]
    fn test_invalid_utf8_is_corruption() {
        let col = Column::varchar("s", 64, true);
        let mut input = SerializeInput::new(&[0, 0, 0, 2, 0xC3, 0x28]);
        assert!(read_wire(&col, &mut input).unwrap_err().is_corruption());
    }

    #[test]
    fn test_random_values_survive_pool_growth() {
        let mut rng = StdRng::seed_from_u64(42);
        let blob = Column::varbinary("blob", 300, true);
        let id = Column::fixed("id", ValueType::BigInt, false);
        // ~24 KB of values across 1 KB chunks
        let mut pool = Pool::new(Arc::new(HeapBackend::new()), 1024);

        let mut rows = Vec::new();
        let mut wire = SerializeOutput::new();
        for _ in 0..200 {
            let number = Value::BigInt(rng.gen_range(i64::MIN + 1..=i64::MAX));
            let payload = if rng.gen_bool(0.1) {
                Value::Null
            } else {
                let len = rng.gen_range(0..=300);
                Value::Varbinary((0..len).map(|_| rng.gen()).collect())
            };

            let mut id_slot = vec![0u8; id.slot_width()];
            let mut blob_slot = vec![0u8; blob.slot_width()];
            check_value(&id, &number).unwrap();
            check_value(&blob, &payload).unwrap();
            encode_slot(&id, &number, &mut id_slot, &mut pool).unwrap();
            encode_slot(&blob, &payload, &mut blob_slot, &mut pool).unwrap();
            write_wire(&id, &number, &mut wire).unwrap();
            write_wire(&blob, &payload, &mut wire).unwrap();
            rows.push((number, payload, id_slot, blob_slot));
        }
        assert!(pool.chunk_count() > 10);

        let mut input = SerializeInput::new(wire.data());
        for (number, payload, id_slot, blob_slot) in &rows {
            assert_eq!(&decode_slot(&id, id_slot, &pool).unwrap(), number);
            assert_eq!(&decode_slot(&blob, blob_slot, &pool).unwrap(), payload);
            assert_eq!(&read_wire(&id, &mut input).unwrap(), number);
            assert_eq!(&read_wire(&blob, &mut input).unwrap(), payload);
        }
        assert_eq!(input.remaining(), 0);
    }
}
