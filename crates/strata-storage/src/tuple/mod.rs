//! Tuples and their encodings.

pub(crate) mod codec;
mod value;

use std::fmt;

use strata_common::{StrataError, StrataResult};

use crate::catalog::Schema;
use crate::serializer::{SerializeInput, SerializeOutput};

pub use value::Value;

/// A row of values, positionally matching some schema.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tuple {
    values: Vec<Value>,
}

impl Tuple {
    /// Creates a tuple.
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// All values.
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// One value.
    #[inline]
    #[must_use]
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Number of values.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the tuple has no values.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consumes the tuple.
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Checks arity, types, nullability and lengths against `schema`.
    pub fn validate(&self, schema: &Schema) -> StrataResult<()> {
        if self.values.len() != schema.column_count() {
            return Err(StrataError::invalid_argument(format!(
                "tuple has {} values, schema has {} columns",
                self.values.len(),
                schema.column_count()
            )));
        }
        schema
            .columns()
            .iter()
            .zip(&self.values)
            .try_for_each(|(column, value)| codec::check_value(column, value))
    }

    /// Appends the wire encoding of this tuple.
    pub fn serialize_to(&self, schema: &Schema, out: &mut SerializeOutput) -> StrataResult<()> {
        self.validate(schema)?;
        for (column, value) in schema.columns().iter().zip(&self.values) {
            codec::write_wire(column, value, out)?;
        }
        Ok(())
    }

    /// Reads one tuple in the wire encoding.
    pub fn deserialize_from(schema: &Schema, input: &mut SerializeInput<'_>) -> StrataResult<Self> {
        let values = schema
            .columns()
            .iter()
            .map(|column| codec::read_wire(column, input))
            .collect::<StrataResult<Vec<_>>>()?;
        Ok(Self { values })
    }
}

impl From<Vec<Value>> for Tuple {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

impl FromIterator<Value> for Tuple {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, ValueType};

    fn schema() -> Schema {
        Schema::new(vec![
            Column::fixed("id", ValueType::Integer, false),
            Column::varchar("name", 32, true),
        ])
        .unwrap()
    }

    #[test]
    fn test_wire_roundtrip() {
        let schema = schema();
        let tuple = Tuple::new(vec![7.into(), "seven".into()]);

        let mut out = SerializeOutput::new();
        tuple.serialize_to(&schema, &mut out).unwrap();
        assert_eq!(out.position(), 4 + 4 + 5);

        let mut input = SerializeInput::new(out.data());
        assert_eq!(Tuple::deserialize_from(&schema, &mut input).unwrap(), tuple);
    }

    #[test]
    fn test_validate_arity() {
        let schema = schema();
        let tuple = Tuple::new(vec![Value::Integer(1)]);
        assert!(tuple.validate(&schema).is_err());
        assert!(tuple.serialize_to(&schema, &mut SerializeOutput::new()).is_err());
    }

    #[test]
    fn test_display() {
        let tuple: Tuple = vec![Value::Integer(1), Value::Null].into();
        assert_eq!(tuple.to_string(), "(1, NULL)");
    }
}
