//! Column value types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strata_common::{StrataError, StrataResult};

/// Storage-level value types.
///
/// The discriminant is the type code written to the column header of a
/// serialized tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i8)]
pub enum ValueType {
    /// 8-bit signed integer.
    TinyInt = 3,
    /// 16-bit signed integer.
    SmallInt = 4,
    /// 32-bit signed integer.
    Integer = 5,
    /// 64-bit signed integer.
    BigInt = 6,
    /// 64-bit floating point.
    Double = 8,
    /// UTF-8 string.
    Varchar = 9,
    /// Microseconds since the epoch.
    Timestamp = 11,
    /// Boolean.
    Boolean = 23,
    /// Raw bytes.
    Varbinary = 25,
}

impl ValueType {
    /// Every value type, in code order.
    pub const ALL: [ValueType; 9] = [
        Self::TinyInt,
        Self::SmallInt,
        Self::Integer,
        Self::BigInt,
        Self::Double,
        Self::Varchar,
        Self::Timestamp,
        Self::Boolean,
        Self::Varbinary,
    ];

    /// Decodes a wire type code.
    pub fn from_code(code: i8) -> StrataResult<Self> {
        let value_type = match code {
            3 => Self::TinyInt,
            4 => Self::SmallInt,
            5 => Self::Integer,
            6 => Self::BigInt,
            8 => Self::Double,
            9 => Self::Varchar,
            11 => Self::Timestamp,
            23 => Self::Boolean,
            25 => Self::Varbinary,
            other => {
                return Err(StrataError::corruption(format!(
                    "unknown value type code {}",
                    other
                )))
            }
        };
        Ok(value_type)
    }

    /// Returns the wire type code.
    #[inline]
    #[must_use]
    pub const fn code(self) -> i8 {
        self as i8
    }

    /// Returns the encoded width of a fixed-width type, or `None` for
    /// variable-length types.
    #[must_use]
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            Self::TinyInt | Self::Boolean => Some(1),
            Self::SmallInt => Some(2),
            Self::Integer => Some(4),
            Self::BigInt | Self::Double | Self::Timestamp => Some(8),
            Self::Varchar | Self::Varbinary => None,
        }
    }

    /// Returns true for Varchar and Varbinary.
    #[inline]
    #[must_use]
    pub const fn is_variable_length(self) -> bool {
        self.fixed_size().is_none()
    }

    /// Upper-case type name, as printed in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::TinyInt => "TINYINT",
            Self::SmallInt => "SMALLINT",
            Self::Integer => "INTEGER",
            Self::BigInt => "BIGINT",
            Self::Double => "DOUBLE",
            Self::Varchar => "VARCHAR",
            Self::Timestamp => "TIMESTAMP",
            Self::Boolean => "BOOLEAN",
            Self::Varbinary => "VARBINARY",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ValueType {
    type Err = StrataError;

    /// Parses a type name, ignoring case.
    fn from_str(s: &str) -> StrataResult<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| StrataError::invalid_argument(format!("unknown value type '{}'", s)))
    }
}
