mod component_tests;
mod describe_tests;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mutation::{
    row_with_cells, Cell, ClusteringKey, DecoratedKey, Memtable, MutationFragment, Partition,
};
use schema::{ColumnDefinition, ColumnType, Schema};

use crate::{FragmentReader, ReaderConcurrencySemaphore, ReaderPermit, SSTable, SSTableWriter, WriterOptions};

/// `pk int, ck int, s text static, v text`.
pub(crate) fn test_schema() -> Schema {
    Schema::new(
        "ks",
        "tbl",
        ColumnDefinition::new("pk", ColumnType::Int),
        vec![ColumnDefinition::new("ck", ColumnType::Int)],
        vec![ColumnDefinition::new("s", ColumnType::Text)],
        vec![ColumnDefinition::new("v", ColumnType::Text)],
    )
    .expect("valid schema")
}

pub(crate) fn int_key(i: i32) -> DecoratedKey {
    DecoratedKey::from_raw(i.to_be_bytes().to_vec())
}

pub(crate) fn ck(i: i32) -> ClusteringKey {
    ClusteringKey::new(vec![i.to_be_bytes().to_vec()])
}

/// A partition with `rows` clustering rows, values `"<pk>:<ck>"`.
pub(crate) fn partition(pk: i32, rows: i32, ts: i64) -> Partition {
    let mut p = Partition::new(int_key(pk));
    for c in 0..rows {
        let value = format!("{}:{}", pk, c).into_bytes();
        p.upsert_row(row_with_cells(ck(c), [(0, Cell::live(ts, value))]));
    }
    p
}

pub(crate) fn memtable(keys: impl IntoIterator<Item = i32>, rows: i32, ts: i64) -> Memtable {
    let mut m = Memtable::new();
    for k in keys {
        m.apply(partition(k, rows, ts));
    }
    m
}

pub(crate) fn write(dir: &Path, generation: u64, mem: &Memtable) -> anyhow::Result<PathBuf> {
    Ok(SSTableWriter::write_from_memtable(dir, generation, &test_schema(), mem)?)
}

pub(crate) fn write_with(
    dir: &Path,
    generation: u64,
    mem: &Memtable,
    options: WriterOptions,
) -> anyhow::Result<PathBuf> {
    Ok(SSTableWriter::new(options).write(dir, generation, &test_schema(), mem)?)
}

pub(crate) fn open(path: &Path) -> anyhow::Result<Arc<SSTable>> {
    Ok(SSTable::open(path)?)
}

pub(crate) fn permit() -> ReaderPermit {
    ReaderConcurrencySemaphore::new("test", None).obtain_permit("test")
}

pub(crate) fn collect(reader: &mut impl FragmentReader) -> anyhow::Result<Vec<MutationFragment>> {
    let mut out = Vec::new();
    while let Some(f) = reader.next_fragment()? {
        out.push(f);
    }
    Ok(out)
}

pub(crate) fn partition_keys(fragments: &[MutationFragment]) -> Vec<DecoratedKey> {
    fragments
        .iter()
        .filter_map(|f| match f {
            MutationFragment::PartitionStart(ps) => Some(ps.key.clone()),
            _ => None,
        })
        .collect()
}
