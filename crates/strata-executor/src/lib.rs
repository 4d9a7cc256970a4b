//! # strata-executor
//!
//! Read-side operators over Strata storage.
//!
//! - **LogicalTile**: a column-composed, filterable view over physical tiles
//! - **SeqScan**: visibility-checked sequential scan of tile groups
//!
//! Logical tiles borrow the tile groups they were scanned from. Materializing
//! one copies its visible rows into a fresh tile that the result owns.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Logical tiles and position lists.
pub mod logical_tile;

/// Sequential scan over tile groups.
pub mod seq_scan;

pub use logical_tile::{BaseTile, LogicalTile, VisibleRows};
pub use seq_scan::{
    filter_logical_tile, scan_tile_group, scan_tile_group_filtered, SeqScan, SlotPredicate,
    Snapshot,
};
