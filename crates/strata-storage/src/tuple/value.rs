//! Runtime values.

use std::fmt;

use crate::catalog::ValueType;

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean.
    Boolean(bool),
    /// 8-bit integer.
    TinyInt(i8),
    /// 16-bit integer.
    SmallInt(i16),
    /// 32-bit integer.
    Integer(i32),
    /// 64-bit integer.
    BigInt(i64),
    /// 64-bit float.
    Double(f64),
    /// Microseconds since the epoch.
    Timestamp(i64),
    /// UTF-8 string.
    Varchar(String),
    /// Raw bytes.
    Varbinary(Vec<u8>),
}

impl Value {
    /// Returns the value's type, or `None` for NULL.
    #[must_use]
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(ValueType::Boolean),
            Value::TinyInt(_) => Some(ValueType::TinyInt),
            Value::SmallInt(_) => Some(ValueType::SmallInt),
            Value::Integer(_) => Some(ValueType::Integer),
            Value::BigInt(_) => Some(ValueType::BigInt),
            Value::Double(_) => Some(ValueType::Double),
            Value::Timestamp(_) => Some(ValueType::Timestamp),
            Value::Varchar(_) => Some(ValueType::Varchar),
            Value::Varbinary(_) => Some(ValueType::Varbinary),
        }
    }

    /// Returns true for NULL.
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view of any integral value.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::TinyInt(v) => Some(i64::from(*v)),
            Value::SmallInt(v) => Some(i64::from(*v)),
            Value::Integer(v) => Some(i64::from(*v)),
            Value::BigInt(v) | Value::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    /// String view of a Varchar.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Varchar(s) => Some(s),
            _ => None,
        }
    }

    /// Byte view of a variable-length value.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Varchar(s) => Some(s.as_bytes()),
            Value::Varbinary(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::TinyInt(v) => write!(f, "{}", v),
            Value::SmallInt(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::BigInt(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Timestamp(v) => write!(f, "ts:{}", v),
            Value::Varchar(v) => write!(f, "{}", v),
            Value::Varbinary(v) => {
                write!(f, "0x")?;
                for byte in v {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Varchar(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Varchar(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(Value::from(5), Value::Integer(5));
        assert_eq!(Value::from("x"), Value::Varchar("x".into()));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(true)), Value::Boolean(true));
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::SmallInt(-3).as_i64(), Some(-3));
        assert_eq!(Value::Varchar("ab".into()).as_bytes(), Some(&b"ab"[..]));
        assert_eq!(Value::Double(1.0).as_i64(), None);
        assert!(Value::Null.value_type().is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Varbinary(vec![0xde, 0xad]).to_string(), "0xdead");
        assert_eq!(Value::Null.to_string(), "NULL");
    }
}
