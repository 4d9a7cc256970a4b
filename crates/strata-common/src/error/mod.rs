//! Error handling for Strata.
//!
//! This module provides the error type and result alias shared by the
//! storage and executor crates.

mod storage;

pub use storage::{ErrorCode, StrataError};

/// Result type alias for Strata operations.
pub type StrataResult<T> = std::result::Result<T, StrataError>;
