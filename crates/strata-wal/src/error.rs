//! Log record error types.

use std::io;
use thiserror::Error;

use strata_common::StrataError;

/// Result type for log record operations.
pub type WalResult<T> = Result<T, WalError>;

/// Errors raised while building, framing or decoding log records.
#[derive(Debug, Error)]
pub enum WalError {
    /// I/O error while writing or reading frames.
    #[error("log I/O error: {source}")]
    Io {
        /// Underlying error.
        #[from]
        source: io::Error,
    },

    /// Storage error while encoding or decoding a tuple payload.
    #[error("log payload error: {source}")]
    Storage {
        /// Underlying error.
        #[from]
        source: StrataError,
    },

    /// Frame checksum does not match its body.
    #[error("log frame checksum mismatch at offset {offset}: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// Byte offset of the frame.
        offset: usize,
        /// Checksum stored in the frame.
        expected: u32,
        /// Checksum of the body as read.
        computed: u32,
    },

    /// Record body exceeds the frame limit.
    #[error("log record too large: {size} bytes exceeds maximum {max} bytes")]
    RecordTooLarge {
        /// Body size.
        size: usize,
        /// Largest permitted body.
        max: usize,
    },

    /// A tuple record is missing a location its kind requires.
    #[error("{kind} record requires a valid {location} location")]
    MissingLocation {
        /// Record kind.
        kind: &'static str,
        /// Which location is missing.
        location: &'static str,
    },

    /// Malformed frame or body.
    #[error("failed to decode log record: {reason}")]
    Deserialization {
        /// What was wrong.
        reason: String,
    },
}

impl WalError {
    /// Creates a deserialization error.
    pub fn deserialization(reason: impl Into<String>) -> Self {
        Self::Deserialization {
            reason: reason.into(),
        }
    }

    /// Creates a checksum mismatch error.
    pub fn checksum_mismatch(offset: usize, expected: u32, computed: u32) -> Self {
        Self::ChecksumMismatch {
            offset,
            expected,
            computed,
        }
    }

    /// Returns true if the bytes themselves are damaged.
    pub fn is_corruption(&self) -> bool {
        match self {
            Self::ChecksumMismatch { .. } | Self::Deserialization { .. } => true,
            Self::Storage { source } => source.is_corruption(),
            _ => false,
        }
    }
}
