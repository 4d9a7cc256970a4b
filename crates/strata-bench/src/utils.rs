//! Benchmark data generators.

use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use strata_common::memory::HeapBackend;
use strata_common::types::{CommitId, Oid, TxnId};
use strata_common::StorageConfig;
use strata_storage::catalog::{Column, Schema, ValueType};
use strata_storage::table::DataTable;
use strata_storage::tuple::{Tuple, Value};

/// Generates random alphanumeric text.
pub fn random_string(rng: &mut StdRng, len: usize) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Account-like schema mixing fixed, inlined and pooled columns.
pub fn account_schema() -> Schema {
    Schema::new(vec![
        Column::fixed("id", ValueType::BigInt, false),
        Column::fixed("balance", ValueType::Double, true),
        Column::varchar("region", 8, true),
        Column::varchar("owner", 64, true),
    ])
    .expect("benchmark schema is valid")
}

/// Generates `count` rows for [`account_schema`].
pub fn generate_accounts(count: usize) -> Vec<Tuple> {
    let mut rng = StdRng::seed_from_u64(42);
    let regions = ["eu", "us", "apac", "latam"];
    (0..count as i64)
        .map(|i| {
            let owner_len = rng.gen_range(8..48);
            Tuple::new(vec![
                Value::BigInt(i),
                Value::Double(rng.gen_range(0.0..10_000.0)),
                Value::from(regions[rng.gen_range(0..regions.len())]),
                Value::Varchar(random_string(&mut rng, owner_len)),
            ])
        })
        .collect()
}

/// Table filled with committed rows, every third one deleted at `cid + 1`.
pub fn populated_table(rows: &[Tuple], tuples_per_group: usize, cid: CommitId) -> DataTable {
    let config = StorageConfig::default().with_tuples_per_tile_group(tuples_per_group);
    let table = DataTable::new(
        Oid::new(1),
        Oid::new(1),
        "accounts",
        account_schema(),
        &config,
        Arc::new(HeapBackend::new()),
    )
    .expect("benchmark table is valid");

    let writer = TxnId::new(1);
    let deleter = TxnId::new(2);
    for (i, row) in rows.iter().enumerate() {
        let location = table.insert_tuple(writer, row).expect("insert");
        table.commit_insert(location, cid).expect("commit");
        if i % 3 == 2 {
            table.delete_tuple(deleter, location).expect("delete");
            table
                .commit_delete(location, CommitId::new(cid.as_u64() + 1))
                .expect("commit delete");
        }
    }
    table
}
