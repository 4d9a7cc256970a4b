//! Catalog descriptors consumed by tiles.

mod schema;
mod types;

pub use schema::{Column, Schema};
pub use types::ValueType;
