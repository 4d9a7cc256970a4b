//! Log sinks.
//!
//! Storage hands finished records to a [`LogSink`]. The sink decides where
//! frames go; [`MemoryLogSink`] keeps them in a buffer, which is what tests
//! and the dump tooling use.

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;

use crate::error::WalResult;
use crate::record::{decode_all, LogRecord};

/// Destination for log records.
pub trait LogSink: Send + Sync {
    /// Frames and stores one record.
    fn append(&self, record: LogRecord) -> WalResult<()>;

    /// Number of records accepted so far.
    fn record_count(&self) -> usize;
}

#[derive(Debug, Default)]
struct SinkState {
    frames: BytesMut,
    records: usize,
}

/// Sink that collects frames in memory.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    state: Mutex<SinkState>,
}

impl MemoryLogSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every frame appended so far.
    pub fn bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.state.lock().frames)
    }

    /// Total framed bytes.
    pub fn len(&self) -> usize {
        self.state.lock().frames.len()
    }

    /// Returns true if nothing was appended.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decodes every stored frame.
    pub fn records(&self) -> WalResult<Vec<LogRecord>> {
        decode_all(&self.state.lock().frames)
    }

    /// Removes and returns the stored frames.
    pub fn drain(&self) -> Bytes {
        let mut state = self.state.lock();
        state.records = 0;
        state.frames.split().freeze()
    }
}

impl LogSink for MemoryLogSink {
    fn append(&self, record: LogRecord) -> WalResult<()> {
        let mut state = self.state.lock();
        let before = state.frames.len();
        record.encode_to(&mut state.frames)?;
        state.records += 1;
        tracing::trace!(
            kind = %record.kind(),
            txn = %record.txn_id(),
            bytes = state.frames.len() - before,
            "appended log record"
        );
        Ok(())
    }

    fn record_count(&self) -> usize {
        self.state.lock().records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use strata_common::types::{CommitId, TxnId};

    #[test]
    fn test_append_and_decode() {
        let sink = MemoryLogSink::new();
        assert!(sink.is_empty());

        sink.append(LogRecord::TransactionBegin { txn_id: TxnId::new(1) }).unwrap();
        sink.append(LogRecord::TransactionCommit {
            txn_id: TxnId::new(1),
            commit_id: CommitId::new(2),
        })
        .unwrap();

        assert_eq!(sink.record_count(), 2);
        let records = sink.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].txn_id(), TxnId::new(1));

        let drained = sink.drain();
        assert_eq!(decode_all(&drained).unwrap(), records);
        assert!(sink.is_empty());
        assert_eq!(sink.record_count(), 0);
    }

    #[test]
    fn test_concurrent_appends_keep_frames_whole() {
        let sink = Arc::new(MemoryLogSink::new());
        let handles: Vec<_> = (1..=4u64)
            .map(|t| {
                let sink = Arc::clone(&sink);
                thread::spawn(move || {
                    for _ in 0..100 {
                        sink.append(LogRecord::TransactionBegin { txn_id: TxnId::new(t) })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let records = sink.records().unwrap();
        assert_eq!(records.len(), 400);
        for t in 1..=4u64 {
            let count = records.iter().filter(|r| r.txn_id() == TxnId::new(t)).count();
            assert_eq!(count, 100);
        }
    }
}
