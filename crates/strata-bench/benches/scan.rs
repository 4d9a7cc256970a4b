//! Scan benchmarks for Strata.
//!
//! Benchmarks for:
//! - The raw visibility predicate
//! - Sequential scans with and without a slot predicate
//! - Materializing scan output

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use strata_bench::utils::{generate_accounts, populated_table};
use strata_common::constants::DEFAULT_POOL_CHUNK_SIZE;
use strata_common::memory::HeapBackend;
use strata_common::types::{CommitId, TxnId};
use strata_executor::{SeqScan, Snapshot};
use strata_storage::tile_group::is_visible_version;
use strata_storage::tuple::Value;

/// Benchmark the visibility predicate over a grid of slot states.
fn bench_visibility_predicate(c: &mut Criterion) {
    let reader = TxnId::new(5);
    let cid = CommitId::new(50);
    let states: Vec<(TxnId, CommitId, CommitId)> = (0..1024u64)
        .map(|i| {
            let owner = if i % 4 == 0 { reader } else { TxnId::INVALID };
            let begin = CommitId::new(i % 100);
            let end = if i % 3 == 0 { CommitId::INFINITY } else { CommitId::new(i % 100 + 10) };
            (owner, begin, end)
        })
        .collect();

    c.bench_function("scan/visibility_predicate", |b| {
        b.iter(|| {
            states
                .iter()
                .filter(|(owner, begin, end)| is_visible_version(*owner, *begin, *end, reader, cid))
                .count()
        });
    });
}

/// Benchmark scanning every tile group of a table.
fn bench_seq_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan/seq_scan");
    let cid = CommitId::new(10);
    let snapshot = Snapshot::new(TxnId::new(99), CommitId::new(20));

    for size in [10_000, 100_000].iter() {
        let table = populated_table(&generate_accounts(*size), 1000, cid);
        let groups = table.tile_groups();

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("all", size), size, |b, _| {
            b.iter(|| {
                let visible: usize = SeqScan::new(&groups, vec![], snapshot)
                    .map(|tile| tile.unwrap().visible_count())
                    .sum();
                black_box(visible)
            });
        });
        group.bench_with_input(BenchmarkId::new("filtered", size), size, |b, _| {
            b.iter(|| {
                let visible: usize = SeqScan::new(&groups, vec![0, 1], snapshot)
                    .with_predicate(|g, slot| {
                        Ok(matches!(g.value(slot, 1)?, Value::Double(v) if v > 5000.0))
                    })
                    .map(|tile| tile.unwrap().visible_count())
                    .sum();
                black_box(visible)
            });
        });
    }

    group.finish();
}

/// Benchmark copying scan output into owned tiles.
fn bench_materialize(c: &mut Criterion) {
    let table = populated_table(&generate_accounts(10_000), 1000, CommitId::new(10));
    let groups = table.tile_groups();
    let snapshot = Snapshot::new(TxnId::new(99), CommitId::new(20));

    c.bench_function("scan/materialize", |b| {
        b.iter(|| {
            let rows: usize = SeqScan::new(&groups, vec![0, 3], snapshot)
                .map(|tile| {
                    tile.unwrap()
                        .materialize(Arc::new(HeapBackend::new()), DEFAULT_POOL_CHUNK_SIZE)
                        .unwrap()
                        .row_count()
                })
                .sum();
            black_box(rows)
        });
    });
}

criterion_group!(benches, bench_visibility_predicate, bench_seq_scan, bench_materialize);
criterion_main!(benches);
