use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use mutation::{row_with_cells, Cell, ClusteringKey, DecoratedKey, Memtable, Partition};
use schema::{ColumnDefinition, ColumnType, Schema};
use sstable::{ReaderConcurrencySemaphore, SSTable, SSTableWriter};
use sstable_tool::{run_consumer, CustomConsumer, DumpingConsumer, PartitionSet, StreamOptions};
use tempfile::tempdir;

const N_PARTITIONS: i32 = 10_000;
const ROWS: i32 = 4;
const VALUE_SIZE: usize = 100;

fn schema() -> Schema {
    Schema::new(
        "bench",
        "tbl",
        ColumnDefinition::new("pk", ColumnType::Int),
        vec![ColumnDefinition::new("ck", ColumnType::Int)],
        vec![],
        vec![ColumnDefinition::new("v", ColumnType::Blob)],
    )
    .unwrap()
}

fn key(i: i32) -> DecoratedKey {
    DecoratedKey::from_raw(i.to_be_bytes().to_vec())
}

fn build_memtable() -> Memtable {
    let mut mem = Memtable::new();
    for k in 0..N_PARTITIONS {
        let mut p = Partition::new(key(k));
        for c in 0..ROWS {
            let ck = ClusteringKey::new(vec![c.to_be_bytes().to_vec()]);
            p.upsert_row(row_with_cells(ck, [(0, Cell::live(1, vec![b'x'; VALUE_SIZE]))]));
        }
        mem.apply(p);
    }
    mem
}

/// A handful of partitions spread over the whole sstable.
fn sparse_filter() -> PartitionSet {
    (0..N_PARTITIONS).step_by(1_000).map(key).collect()
}

fn filtered_scan_benchmark(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let data = SSTableWriter::write_from_memtable(dir.path(), 1, &schema(), &build_memtable()).unwrap();
    let sst = SSTable::open(&data).unwrap();
    let semaphore = ReaderConcurrencySemaphore::new("bench", None);
    let filter = sparse_filter();

    for (name, no_skips) in [("filtered_scan_skip_10k", false), ("filtered_scan_no_skips_10k", true)] {
        let options = StreamOptions {
            no_skips,
            ..StreamOptions::default()
        };
        c.bench_function(name, |b| {
            b.iter(|| {
                let permit = semaphore.obtain_permit("bench");
                run_consumer(&mut CustomConsumer, &[sst.clone()], &permit, &filter, options).unwrap();
            });
        });
    }
}

fn dump_benchmark(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let schema = schema();
    let data = SSTableWriter::write_from_memtable(dir.path(), 1, &schema, &build_memtable()).unwrap();
    let sst = SSTable::open(&data).unwrap();
    let semaphore = ReaderConcurrencySemaphore::new("bench", None);

    c.bench_function("dump_full_10k", |b| {
        b.iter_batched(
            || Vec::with_capacity(8 << 20),
            |out| {
                let permit = semaphore.obtain_permit("bench");
                let mut consumer = DumpingConsumer::new(&schema, out);
                run_consumer(
                    &mut consumer,
                    &[sst.clone()],
                    &permit,
                    &PartitionSet::new(),
                    StreamOptions::default(),
                )
                .unwrap();
                consumer.into_inner()
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, filtered_scan_benchmark, dump_benchmark);
criterion_main!(benches);
