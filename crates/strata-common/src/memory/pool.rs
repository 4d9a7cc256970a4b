//! Pool allocator for variable-length column data.
//!
//! A pool is a bump arena that stores the bytes of uninlined column values.
//! The slot itself only holds a fixed-width [`PoolRef`]. Chunks are requested
//! from a [`Backend`] and returned to it when the pool is dropped.
//!
//! # Layout
//!
//! ```text
//! chunk 0                               chunk 1
//! +-----------+---------+-----------+   +-----------+------------------+
//! | len (u32) | bytes.. | len (u32) |   | len (u32) | bytes..          |
//! +-----------+---------+-----------+   +-----------+------------------+
//!  ^ PoolRef(0, 0)        ^ PoolRef(0, 4 + len)
//! ```
//!
//! # Thread Safety
//!
//! Allocation takes `&mut self`. A pool has a single writer at a time; the
//! owning tile enforces this with its lock.

use std::fmt;
use std::sync::Arc;

use super::backend::Backend;
use crate::constants::MIN_POOL_CHUNK_SIZE;
use crate::error::{StrataError, StrataResult};

/// Size of the length prefix stored before every value.
const LENGTH_PREFIX: usize = 4;

/// Fixed-width reference to a value stored in a [`Pool`].
///
/// Encoded as `chunk << 32 | offset`; `u64::MAX` is the NULL reference.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolRef(u64);

impl PoolRef {
    /// Reference standing for a NULL value.
    pub const NULL: Self = Self(u64::MAX);

    fn new(chunk: u32, offset: u32) -> Self {
        Self((u64::from(chunk) << 32) | u64::from(offset))
    }

    /// Rebuilds a reference from its raw slot encoding.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw encoding stored in the slot.
    #[inline]
    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    /// Returns true for the NULL reference.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == Self::NULL.0
    }

    #[inline]
    fn chunk(self) -> usize {
        (self.0 >> 32) as usize
    }

    #[inline]
    fn offset(self) -> usize {
        (self.0 & u64::from(u32::MAX)) as usize
    }
}

impl fmt::Debug for PoolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "PoolRef(NULL)")
        } else {
            write!(f, "PoolRef({}:{})", self.chunk(), self.offset())
        }
    }
}

/// A chunk of pool memory obtained from the backend.
struct PoolChunk {
    data: Box<[u8]>,
    used: usize,
}

impl PoolChunk {
    #[inline]
    fn remaining(&self) -> usize {
        self.data.len() - self.used
    }
}

/// Bump arena for uninlined column values.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use strata_common::memory::{HeapBackend, Pool};
///
/// let mut pool = Pool::new(Arc::new(HeapBackend::new()), 4096);
/// let r = pool.allocate(b"hello").unwrap();
/// assert_eq!(pool.get(r).unwrap(), b"hello");
/// ```
pub struct Pool {
    backend: Arc<dyn Backend>,
    chunk_size: usize,
    chunks: Vec<PoolChunk>,
}

impl Pool {
    /// Creates an empty pool. No memory is requested until the first allocation.
    ///
    /// The chunk size is clamped to at least `MIN_POOL_CHUNK_SIZE`.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, chunk_size: usize) -> Self {
        Self {
            backend,
            chunk_size: chunk_size.max(MIN_POOL_CHUNK_SIZE),
            chunks: Vec::new(),
        }
    }

    /// Copies `bytes` into the pool and returns a reference to them.
    ///
    /// Values larger than the chunk size get a dedicated chunk.
    pub fn allocate(&mut self, bytes: &[u8]) -> StrataResult<PoolRef> {
        let value_len = u32::try_from(bytes.len()).map_err(|_| {
            StrataError::invalid_argument(format!(
                "pool value of {} bytes exceeds the 4 GB limit",
                bytes.len()
            ))
        })?;
        let needed = LENGTH_PREFIX + bytes.len();

        let fits = self
            .chunks
            .last()
            .map_or(false, |chunk| chunk.remaining() >= needed);
        if !fits {
            self.grow(needed)?;
        }

        let chunk_index = self.chunks.len() - 1;
        let chunk = &mut self.chunks[chunk_index];
        let offset = chunk.used;

        chunk.data[offset..offset + LENGTH_PREFIX].copy_from_slice(&value_len.to_le_bytes());
        chunk.data[offset + LENGTH_PREFIX..offset + needed].copy_from_slice(bytes);
        chunk.used += needed;

        let chunk_index = u32::try_from(chunk_index)
            .map_err(|_| StrataError::internal("pool chunk count exceeds u32"))?;
        let offset = u32::try_from(offset)
            .map_err(|_| StrataError::internal("pool chunk offset exceeds u32"))?;
        Ok(PoolRef::new(chunk_index, offset))
    }

    /// Returns the bytes behind a reference.
    ///
    /// Fails with `Corruption` if the reference does not point at a value
    /// written by this pool.
    pub fn get(&self, reference: PoolRef) -> StrataResult<&[u8]> {
        if reference.is_null() {
            return Err(StrataError::corruption("dereferenced a NULL pool reference"));
        }

        let chunk = self.chunks.get(reference.chunk()).ok_or_else(|| {
            StrataError::corruption(format!("{:?} names a missing chunk", reference))
        })?;

        let start = reference.offset();
        if start + LENGTH_PREFIX > chunk.used {
            return Err(StrataError::corruption(format!(
                "{:?} points past the used area of its chunk",
                reference
            )));
        }

        let mut prefix = [0u8; LENGTH_PREFIX];
        prefix.copy_from_slice(&chunk.data[start..start + LENGTH_PREFIX]);
        let len = u32::from_le_bytes(prefix) as usize;

        let end = start + LENGTH_PREFIX + len;
        if end > chunk.used {
            return Err(StrataError::corruption(format!(
                "{:?} has length {} beyond its chunk",
                reference, len
            )));
        }

        Ok(&chunk.data[start + LENGTH_PREFIX..end])
    }

    /// Forgets every value while keeping the chunks for reuse.
    ///
    /// All outstanding references become invalid.
    pub fn reset(&mut self) {
        for chunk in &mut self.chunks {
            chunk.data[..chunk.used].fill(0);
            chunk.used = 0;
        }
    }

    /// Bytes occupied by values and their length prefixes.
    #[must_use]
    pub fn bytes_used(&self) -> usize {
        self.chunks.iter().map(|c| c.used).sum()
    }

    /// Bytes requested from the backend.
    #[must_use]
    pub fn total_allocated(&self) -> usize {
        self.chunks.iter().map(|c| c.data.len()).sum()
    }

    /// Number of chunks obtained from the backend.
    #[inline]
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Default chunk size.
    #[inline]
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn grow(&mut self, min_size: usize) -> StrataResult<()> {
        let size = self.chunk_size.max(min_size);
        let data = self.backend.allocate(size)?;

        tracing::trace!(
            size,
            chunks = self.chunks.len() + 1,
            backend = self.backend.name(),
            "pool grew"
        );

        self.chunks.push(PoolChunk { data, used: 0 });
        Ok(())
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        for chunk in self.chunks.drain(..) {
            self.backend.free(chunk.data);
        }
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("chunk_size", &self.chunk_size)
            .field("chunk_count", &self.chunks.len())
            .field("bytes_used", &self.bytes_used())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::HeapBackend;

    fn pool(chunk_size: usize) -> (Arc<HeapBackend>, Pool) {
        let backend = Arc::new(HeapBackend::new());
        let pool = Pool::new(backend.clone(), chunk_size);
        (backend, pool)
    }

    #[test]
    fn test_lazy_chunk_allocation() {
        let (backend, pool) = pool(4096);
        assert_eq!(pool.chunk_count(), 0);
        assert_eq!(backend.allocated_bytes(), 0);
    }

    #[test]
    fn test_allocate_and_get() {
        let (_backend, mut pool) = pool(4096);

        let a = pool.allocate(b"alpha").unwrap();
        let b = pool.allocate(b"").unwrap();
        let c = pool.allocate(b"gamma ray").unwrap();

        assert_eq!(pool.get(a).unwrap(), b"alpha");
        assert_eq!(pool.get(b).unwrap(), b"");
        assert_eq!(pool.get(c).unwrap(), b"gamma ray");
        assert_eq!(pool.bytes_used(), 3 * LENGTH_PREFIX + 5 + 9);
    }

    #[test]
    fn test_grows_into_new_chunks() {
        let (_backend, mut pool) = pool(MIN_POOL_CHUNK_SIZE);
        let value = vec![7u8; 600];

        let first = pool.allocate(&value).unwrap();
        let second = pool.allocate(&value).unwrap();
        assert_eq!(pool.chunk_count(), 2);
        assert_eq!(pool.get(first).unwrap(), &value[..]);
        assert_eq!(pool.get(second).unwrap(), &value[..]);
    }

    #[test]
    fn test_oversized_value_gets_dedicated_chunk() {
        let (_backend, mut pool) = pool(MIN_POOL_CHUNK_SIZE);
        let large = vec![1u8; MIN_POOL_CHUNK_SIZE * 3];

        let r = pool.allocate(&large).unwrap();
        assert_eq!(pool.get(r).unwrap().len(), large.len());
        assert!(pool.total_allocated() >= large.len() + LENGTH_PREFIX);
    }

    #[test]
    fn test_invalid_references() {
        let (_backend, mut pool) = pool(4096);
        pool.allocate(b"x").unwrap();

        assert!(pool.get(PoolRef::NULL).unwrap_err().is_corruption());
        assert!(pool.get(PoolRef::new(9, 0)).unwrap_err().is_corruption());
        assert!(pool.get(PoolRef::new(0, 2048)).unwrap_err().is_corruption());
    }

    #[test]
    fn test_reset_and_drop_return_memory() {
        let (backend, mut pool) = pool(4096);
        pool.allocate(b"payload").unwrap();
        assert_eq!(backend.allocated_bytes(), 4096);

        pool.reset();
        assert_eq!(pool.bytes_used(), 0);
        assert_eq!(pool.chunk_count(), 1);

        drop(pool);
        assert_eq!(backend.allocated_bytes(), 0);
    }

    #[test]
    fn test_backend_exhaustion_surfaces() {
        let backend = Arc::new(HeapBackend::with_limit(MIN_POOL_CHUNK_SIZE));
        let mut pool = Pool::new(backend, MIN_POOL_CHUNK_SIZE);

        pool.allocate(&[0u8; 100]).unwrap();
        let err = pool.allocate(&vec![0u8; MIN_POOL_CHUNK_SIZE]).unwrap_err();
        assert!(matches!(err, StrataError::Allocation { .. }));
    }

    #[test]
    fn test_raw_roundtrip() {
        let r = PoolRef::new(3, 17);
        assert_eq!(PoolRef::from_raw(r.as_raw()), r);
        assert!(!r.is_null());
        assert!(PoolRef::from_raw(u64::MAX).is_null());
    }
}
