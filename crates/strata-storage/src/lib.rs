//! # strata-storage
//!
//! Physical tuple storage for Strata.
//!
//! This crate owns how tuples are packed into fixed-size slot arrays and how
//! multi-version visibility is tracked per slot:
//!
//! - **Catalog**: `Schema`, `Column` and `ValueType` layout descriptors
//! - **Tuple**: runtime `Value`s and their slot and wire encodings
//! - **Tile**: a fixed-capacity array of tuple slots plus a pool for
//!   variable-length data
//! - **TileGroupHeader**: per-slot MVCC metadata and the atomic slot allocator
//! - **TileGroup**: tiles sharing one slot space and one header
//! - **DataTable**: an append-only sequence of tile groups
//! - **Serializer**: the binary tile format
//!
//! # Tile Group Layout
//!
//! ```text
//!              tile 0 (id, name)      tile 1 (balance)
//!            +------------------+   +-----------------+
//! slot 0     | 1 | ref -> pool   |   | 100             |   header[0]: owner, begin, end
//! slot 1     | 2 | ref -> pool   |   | 250             |   header[1]: owner, begin, end
//!   ...      |       ...        |   |       ...       |
//!            +------------------+   +-----------------+
//!                                              next_free_slot ──► 2
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Schema and column layout descriptors.
pub mod catalog;

/// Stream primitives for the tile wire format.
pub mod serializer;

/// Physical tile storage.
pub mod tile;

/// Tile groups and their MVCC header.
pub mod tile_group;

/// Runtime values and tuple encodings.
pub mod tuple;

/// Tables made of tile groups.
pub mod table;

pub use catalog::{Column, Schema, ValueType};
pub use serializer::{SerializeInput, SerializeOutput};
pub use table::{DataTable, Layout};
pub use tile::{Tile, TileBuilder, TileHeader, TileIdentity};
pub use tile_group::{
    is_visible_version, SlotState, TileGroup, TileGroupHeader, TileGroupIdentity,
};
pub use tuple::{Tuple, Value};
