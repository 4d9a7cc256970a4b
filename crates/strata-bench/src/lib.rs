//! Strata performance benchmarks
//!
//! - Tuple insertion into tables and tile groups
//! - Visibility-checked sequential scans
//! - Tile serialization and deserialization
//!
//! Run benchmarks with:
//! ```bash
//! cargo bench -p strata-bench
//! ```

pub mod utils;
