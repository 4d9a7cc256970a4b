//! # strata-test
//!
//! End-to-end tests for Strata.
//!
//! The tests under `tests/` drive storage, scans and log records together
//! the way an engine would: transactions write through a table, readers scan
//! with snapshots, and every change is mirrored into a log sink.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Shared fixtures for the integration tests.
pub mod utils;
