//! Configuration for Strata.
//!
//! This module provides the storage configuration consumed by tables and
//! tile groups.

mod storage;

pub use storage::StorageConfig;
