//! System-wide constants for Strata.

// =============================================================================
// Tile Group Constants
// =============================================================================

/// Default number of tuple slots in a tile group.
pub const DEFAULT_TUPLES_PER_TILE_GROUP: usize = 1000;

/// Maximum number of tuple slots in a tile group (slot ids are `u32`).
pub const MAX_TUPLES_PER_TILE_GROUP: usize = u32::MAX as usize;

/// Maximum number of columns a tile can hold (the column count is an `int16` on the wire).
pub const MAX_COLUMN_COUNT: usize = i16::MAX as usize;

// =============================================================================
// Column Layout Constants
// =============================================================================

/// Variable-length columns with a declared length up to this many bytes are
/// stored inside the slot; longer ones live in the tile's pool.
pub const INLINE_VARLEN_THRESHOLD: usize = 16;

/// Width of the in-slot reference to a pool-resident value.
pub const POOL_REF_SIZE: usize = 8;

/// Length byte marking a NULL inlined variable-length value.
pub const INLINE_NULL_LENGTH: u8 = 0xFF;

// =============================================================================
// Pool Constants
// =============================================================================

/// Default chunk size for the variable-length data pool (64 KB).
pub const DEFAULT_POOL_CHUNK_SIZE: usize = 64 * 1024;

/// Minimum pool chunk size (1 KB).
pub const MIN_POOL_CHUNK_SIZE: usize = 1024;

// =============================================================================
// Serialization Constants
// =============================================================================

/// Status byte written after the header length of a serialized tile.
pub const TILE_HEADER_STATUS: i8 = -128;

/// Length prefix written for a NULL variable-length value on the wire.
pub const NULL_VARLEN_LENGTH: i32 = -1;
