//! Storage backends.
//!
//! A backend is the memory provider behind tiles and pools. The engine only
//! depends on its allocate/free contract; the heap backend is the default
//! implementation.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{StrataError, StrataResult};

/// Memory provider for tile storage.
///
/// Buffers returned by [`Backend::allocate`] are zero-filled and must be
/// handed back through [`Backend::free`] so the backend's accounting stays
/// accurate.
pub trait Backend: Send + Sync + fmt::Debug {
    /// Allocates `size` zeroed bytes.
    fn allocate(&self, size: usize) -> StrataResult<Box<[u8]>>;

    /// Returns a buffer previously obtained from [`Backend::allocate`].
    fn free(&self, buffer: Box<[u8]>);

    /// Short name of the backend, used in diagnostics.
    fn name(&self) -> &'static str;

    /// Bytes currently handed out.
    fn allocated_bytes(&self) -> usize;
}

/// Heap-backed memory provider with optional byte limit.
///
/// # Example
///
/// ```rust
/// use strata_common::memory::{Backend, HeapBackend};
///
/// let backend = HeapBackend::with_limit(1024);
/// let buffer = backend.allocate(512).unwrap();
/// assert_eq!(backend.allocated_bytes(), 512);
/// assert!(backend.allocate(1024).is_err());
/// backend.free(buffer);
/// assert_eq!(backend.allocated_bytes(), 0);
/// ```
pub struct HeapBackend {
    /// Bytes currently handed out.
    allocated: AtomicUsize,
    /// Maximum bytes handed out at once.
    limit: Option<usize>,
}

impl HeapBackend {
    /// Creates an unbounded heap backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            allocated: AtomicUsize::new(0),
            limit: None,
        }
    }

    /// Creates a heap backend that refuses to hand out more than `limit` bytes.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            allocated: AtomicUsize::new(0),
            limit: Some(limit),
        }
    }

    /// Creates a heap backend from an optional limit.
    #[must_use]
    pub fn from_limit(limit: Option<usize>) -> Self {
        limit.map_or_else(Self::new, Self::with_limit)
    }

    /// Returns the configured limit.
    #[inline]
    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    fn reserve(&self, size: usize) -> StrataResult<()> {
        let limit = self.limit;
        self.allocated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let next = current.checked_add(size)?;
                match limit {
                    Some(limit) if next > limit => None,
                    _ => Some(next),
                }
            })
            .map(|_| ())
            .map_err(|current| {
                StrataError::allocation(
                    size,
                    format!(
                        "heap backend limit {} reached ({} bytes in use)",
                        limit.unwrap_or(usize::MAX),
                        current
                    ),
                )
            })
    }
}

impl Default for HeapBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for HeapBackend {
    fn allocate(&self, size: usize) -> StrataResult<Box<[u8]>> {
        self.reserve(size)?;

        let mut buffer = Vec::new();
        if let Err(e) = buffer.try_reserve_exact(size) {
            self.allocated.fetch_sub(size, Ordering::AcqRel);
            return Err(StrataError::allocation(size, e.to_string()));
        }
        buffer.resize(size, 0);

        tracing::trace!(size, total = self.allocated_bytes(), "heap backend allocation");
        Ok(buffer.into_boxed_slice())
    }

    fn free(&self, buffer: Box<[u8]>) {
        self.allocated.fetch_sub(buffer.len(), Ordering::AcqRel);
    }

    fn name(&self) -> &'static str {
        "heap"
    }

    fn allocated_bytes(&self) -> usize {
        self.allocated.load(Ordering::Acquire)
    }
}

impl fmt::Debug for HeapBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapBackend")
            .field("allocated", &self.allocated_bytes())
            .field("limit", &self.limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_allocation_is_zeroed() {
        let backend = HeapBackend::new();
        let buffer = backend.allocate(256).unwrap();
        assert_eq!(buffer.len(), 256);
        assert!(buffer.iter().all(|b| *b == 0));
        backend.free(buffer);
    }

    #[test]
    fn test_accounting() {
        let backend = HeapBackend::new();
        let a = backend.allocate(100).unwrap();
        let b = backend.allocate(50).unwrap();
        assert_eq!(backend.allocated_bytes(), 150);

        backend.free(a);
        assert_eq!(backend.allocated_bytes(), 50);
        backend.free(b);
        assert_eq!(backend.allocated_bytes(), 0);
    }

    #[test]
    fn test_limit_exhaustion() {
        let backend = HeapBackend::with_limit(100);
        let a = backend.allocate(80).unwrap();

        let err = backend.allocate(30).unwrap_err();
        assert!(matches!(err, StrataError::Allocation { requested: 30, .. }));

        // Failed allocations leave the accounting untouched
        assert_eq!(backend.allocated_bytes(), 80);

        backend.free(a);
        assert!(backend.allocate(100).is_ok());
    }

    #[test]
    fn test_concurrent_limit() {
        let backend = Arc::new(HeapBackend::with_limit(64 * 10));
        let mut handles = vec![];

        for _ in 0..4 {
            let backend = Arc::clone(&backend);
            handles.push(thread::spawn(move || {
                let mut kept = Vec::new();
                for _ in 0..10 {
                    if let Ok(buffer) = backend.allocate(64) {
                        kept.push(buffer);
                    }
                }
                kept
            }));
        }

        let kept: Vec<_> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(kept.len(), 10);
        assert_eq!(backend.allocated_bytes(), 640);
    }
}
