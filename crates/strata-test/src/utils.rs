use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once};

use bytes::Bytes;

use strata_common::memory::{Backend, HeapBackend};
use strata_common::types::{CommitId, Oid, TupleLocation, TxnId};
use strata_common::{StorageConfig, StrataResult};
use strata_storage::catalog::{Column, Schema, ValueType};
use strata_storage::table::DataTable;
use strata_storage::tuple::{Tuple, Value};
use strata_wal::{LogRecord, LogSink, TupleRecord, WalResult};

static INIT_LOGGING: Once = Once::new();

/// Installs a test subscriber once; honours `RUST_LOG`.
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Unbounded heap backend.
pub fn backend() -> Arc<dyn Backend> {
    Arc::new(HeapBackend::new())
}

/// `(id INTEGER NOT NULL, name VARCHAR(64))`; `name` lives in the pool.
pub fn people_schema() -> Schema {
    Schema::new(vec![
        Column::fixed("id", ValueType::Integer, false),
        Column::varchar("name", 64, true),
    ])
    .expect("people schema is valid")
}

/// A row of [`people_schema`].
pub fn person(id: i32, name: Option<&str>) -> Tuple {
    Tuple::new(vec![Value::Integer(id), name.into()])
}

/// Hands out transaction and commit ids the way a transaction manager
/// would: strictly increasing, never invalid.
#[derive(Debug)]
pub struct Clock {
    next_txn: AtomicU64,
    last_commit: AtomicU64,
}

impl Default for Clock {
    fn default() -> Self {
        Self {
            next_txn: AtomicU64::new(TxnId::MIN.as_u64()),
            last_commit: AtomicU64::new(1),
        }
    }
}

impl Clock {
    /// Starts a transaction.
    pub fn begin(&self) -> TxnId {
        TxnId::new(self.next_txn.fetch_add(1, Ordering::SeqCst))
    }

    /// Allocates the next commit id.
    pub fn next_commit(&self) -> CommitId {
        CommitId::new(self.last_commit.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Latest commit id handed out.
    pub fn last_commit(&self) -> CommitId {
        CommitId::new(self.last_commit.load(Ordering::SeqCst))
    }
}

/// A table whose every write is mirrored into a log sink.
pub struct LoggedTable<S: LogSink> {
    /// Storage.
    pub table: DataTable,
    /// Log destination.
    pub sink: S,
    /// Id source.
    pub clock: Clock,
}

impl<S: LogSink> LoggedTable<S> {
    /// Creates a people table logging into `sink`.
    pub fn new(config: &StorageConfig, sink: S) -> StrataResult<Self> {
        let table = DataTable::new(
            Oid::new(1),
            Oid::new(10),
            "people",
            people_schema(),
            config,
            backend(),
        )?;
        Ok(Self {
            table,
            sink,
            clock: Clock::default(),
        })
    }

    fn tuple_record(
        &self,
        txn: TxnId,
        insert: TupleLocation,
        delete: TupleLocation,
        payload: Bytes,
    ) -> TupleRecord {
        TupleRecord {
            txn_id: txn,
            database_id: self.table.database_id(),
            table_id: self.table.table_id(),
            insert_location: insert,
            delete_location: delete,
            payload,
        }
    }

    /// Inserts and commits `tuple` in its own transaction.
    pub fn insert_committed(&self, tuple: &Tuple) -> WalResult<(TupleLocation, CommitId)> {
        let txn = self.clock.begin();
        self.sink.append(LogRecord::TransactionBegin { txn_id: txn })?;

        let location = self.table.insert_tuple(txn, tuple)?;
        let payload = TupleRecord::encode_payload(self.table.schema(), tuple)?;
        self.sink.append(LogRecord::TupleInsert(self.tuple_record(
            txn,
            location,
            TupleLocation::INVALID,
            payload,
        )))?;

        let cid = self.clock.next_commit();
        self.table.commit_insert(location, cid)?;
        self.sink.append(LogRecord::TransactionCommit {
            txn_id: txn,
            commit_id: cid,
        })?;
        Ok((location, cid))
    }

    /// Deletes and commits the version at `location`.
    pub fn delete_committed(&self, location: TupleLocation) -> WalResult<CommitId> {
        let txn = self.clock.begin();
        self.sink.append(LogRecord::TransactionBegin { txn_id: txn })?;
        self.table.delete_tuple(txn, location)?;
        self.sink.append(LogRecord::TupleDelete(self.tuple_record(
            txn,
            TupleLocation::INVALID,
            location,
            Bytes::new(),
        )))?;

        let cid = self.clock.next_commit();
        self.table.commit_delete(location, cid)?;
        self.sink.append(LogRecord::TransactionCommit {
            txn_id: txn,
            commit_id: cid,
        })?;
        Ok(cid)
    }
}
