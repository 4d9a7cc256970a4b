//! Storage error types.

use std::fmt;
use thiserror::Error;

use crate::types::{Oid, SlotId, TxnId};

/// Error codes for categorizing errors.
///
/// These codes are stable and can be used for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Internal error (bug).
    Internal = 0x0001,
    /// Invalid argument provided.
    InvalidArgument = 0x0003,
    /// Invalid configuration.
    InvalidConfig = 0x0006,

    // I/O errors (0x0100 - 0x01FF)
    /// General I/O error.
    Io = 0x0100,
    /// Data corruption detected.
    Corruption = 0x0104,

    // Memory errors (0x0200 - 0x02FF)
    /// The backend could not satisfy an allocation.
    Allocation = 0x0200,

    // Storage errors (0x0300 - 0x03FF)
    /// Slot index beyond capacity.
    SlotOutOfRange = 0x0300,
    /// Logical column id beyond the column count.
    ColumnOutOfRange = 0x0301,
    /// No free slot left in a tile group.
    GroupFull = 0x0302,
    /// Decoded schema disagrees with the live schema.
    SchemaMismatch = 0x0303,

    // Visibility errors (0x0400 - 0x04FF)
    /// Slot metadata transition not allowed from the current state.
    IllegalTransition = 0x0400,
    /// Slot already owned by another writer.
    WriteConflict = 0x0401,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x01 => "I/O",
            0x02 => "Memory",
            0x03 => "Storage",
            0x04 => "Visibility",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The main error type for Strata storage and execution.
///
/// # Example
///
/// ```rust
/// use strata_common::error::{StrataError, StrataResult};
/// use strata_common::types::SlotId;
///
/// fn read(slot: SlotId, capacity: usize) -> StrataResult<()> {
///     if slot.as_usize() >= capacity {
///         return Err(StrataError::SlotOutOfRange { slot, capacity });
///     }
///     Ok(())
/// }
///
/// assert!(read(SlotId::new(4), 4).is_err());
/// ```
#[derive(Debug, Error)]
pub enum StrataError {
    // ==========================================================================
    // General Errors
    // ==========================================================================
    /// Internal error - this indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    /// Invalid argument provided.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Error message.
        message: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // I/O Errors
    // ==========================================================================
    /// I/O error from the underlying system.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Data corruption detected while decoding.
    #[error("data corruption detected: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },

    // ==========================================================================
    // Memory Errors
    // ==========================================================================
    /// The backend could not satisfy an allocation request.
    #[error("allocation of {requested} bytes failed: {reason}")]
    Allocation {
        /// Number of bytes requested.
        requested: usize,
        /// Why the backend refused.
        reason: String,
    },

    // ==========================================================================
    // Storage Errors
    // ==========================================================================
    /// Slot index is not below the capacity.
    #[error("slot {slot} out of range for capacity {capacity}")]
    SlotOutOfRange {
        /// The offending slot.
        slot: SlotId,
        /// Capacity of the tile or tile group.
        capacity: usize,
    },

    /// Logical column id is not below the column count.
    #[error("column {column} out of range for {column_count} columns")]
    ColumnOutOfRange {
        /// The offending column id.
        column: usize,
        /// Number of columns available.
        column_count: usize,
    },

    /// Every slot of a tile group has been reserved.
    #[error("tile group {tile_group_id} is full ({capacity} slots)")]
    GroupFull {
        /// The exhausted tile group.
        tile_group_id: Oid,
        /// Its slot capacity.
        capacity: usize,
    },

    /// A serialized stream disagrees with the live schema.
    #[error("schema mismatch: expecting {expected} columns, but {actual} given\n{detail}")]
    SchemaMismatch {
        /// Column count of the live schema.
        expected: usize,
        /// Column count found in the stream.
        actual: usize,
        /// Expected columns and every given column with its type.
        detail: String,
    },

    // ==========================================================================
    // Visibility Errors
    // ==========================================================================
    /// Slot metadata cannot make the requested transition.
    #[error("slot {slot} cannot {action} while {state}")]
    IllegalTransition {
        /// The slot whose metadata was touched.
        slot: SlotId,
        /// Description of the current state.
        state: String,
        /// The attempted transition.
        action: &'static str,
    },

    /// Another transaction already owns the slot.
    #[error("slot {slot} is owned by transaction {holder}")]
    WriteConflict {
        /// The contended slot.
        slot: SlotId,
        /// Transaction holding it.
        holder: TxnId,
    },
}

impl StrataError {
    /// Returns the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Internal { .. } => ErrorCode::Internal,
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            Self::Io { .. } => ErrorCode::Io,
            Self::Corruption { .. } => ErrorCode::Corruption,
            Self::Allocation { .. } => ErrorCode::Allocation,
            Self::SlotOutOfRange { .. } => ErrorCode::SlotOutOfRange,
            Self::ColumnOutOfRange { .. } => ErrorCode::ColumnOutOfRange,
            Self::GroupFull { .. } => ErrorCode::GroupFull,
            Self::SchemaMismatch { .. } => ErrorCode::SchemaMismatch,
            Self::IllegalTransition { .. } => ErrorCode::IllegalTransition,
            Self::WriteConflict { .. } => ErrorCode::WriteConflict,
        }
    }

    /// Returns true if the caller can recover by retrying elsewhere
    /// (a fresh tile group, or after the conflicting writer finishes).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::GroupFull { .. } | Self::WriteConflict { .. })
    }

    /// Returns true if this error is a caller bug with no recovery path.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SlotOutOfRange { .. } | Self::ColumnOutOfRange { .. } | Self::Internal { .. }
        )
    }

    /// Returns true if decoded data was damaged or came from a different schema.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption { .. } | Self::SchemaMismatch { .. })
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    #[must_use]
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Creates an allocation error.
    #[must_use]
    pub fn allocation(requested: usize, reason: impl Into<String>) -> Self {
        Self::Allocation {
            requested,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = StrataError::SlotOutOfRange {
            slot: SlotId::new(9),
            capacity: 4,
        };
        assert_eq!(err.code(), ErrorCode::SlotOutOfRange);
        assert_eq!(err.code().category(), "Storage");
        assert_eq!(ErrorCode::Allocation.category(), "Memory");
    }

    #[test]
    fn test_error_display() {
        let err = StrataError::GroupFull {
            tile_group_id: Oid::new(3),
            capacity: 10,
        };
        assert_eq!(err.to_string(), "tile group 3 is full (10 slots)");

        let err = StrataError::SchemaMismatch {
            expected: 2,
            actual: 3,
            detail: "column 0: id, type = INTEGER".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("expecting 2 columns, but 3 given"));
        assert!(msg.contains("column 0: id"));
    }

    #[test]
    fn test_classification() {
        let full = StrataError::GroupFull {
            tile_group_id: Oid::new(0),
            capacity: 1,
        };
        assert!(full.is_retryable());
        assert!(!full.is_fatal());

        let range = StrataError::ColumnOutOfRange {
            column: 5,
            column_count: 2,
        };
        assert!(range.is_fatal());
        assert!(!range.is_retryable());

        assert!(StrataError::corruption("bad").is_corruption());
        assert!(!StrataError::invalid_argument("x").is_corruption());
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: StrataError = io_err.into();
        assert_eq!(err.code(), ErrorCode::Io);
    }
}
