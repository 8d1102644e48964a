mod histogram_tests;
mod operation_tests;
mod output_tests;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mutation::{
    row_with_cells, Cell, ClusteringKey, ClusteringRow, DecoratedKey, Memtable, MutationFragment,
    Partition, PartitionStart, RangeTombstone, StaticRow,
};
use schema::{ColumnDefinition, ColumnType, Schema};
use sstable::{
    FragmentReader, ReaderConcurrencySemaphore, ReaderPermit, SSTable, SSTableWriter,
    WriterOptions,
};

use crate::consumer::{Flow, SstableConsumer, CONTINUE, STOP};

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
    Ok(SSTableWriter::write_from_memtable(
        dir,
        generation,
        &test_schema(),
        mem,
    )?)
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

/// Flips one byte in the middle of a file.
pub(crate) fn corrupt(path: &Path) -> anyhow::Result<()> {
    corrupt_at(path, 2)
}

/// Flips the byte at `len / divisor`.
pub(crate) fn corrupt_at(path: &Path, divisor: usize) -> anyhow::Result<()> {
    let mut bytes = std::fs::read(path)?;
    let pos = bytes.len() / divisor;
    bytes[pos] ^= 0xff;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// A reader over a fixed fragment list, for streams no sstable would
/// contain. A failing reader reports a malformed Data component once the
/// list runs out.
pub(crate) struct VecReader {
    fragments: VecDeque<MutationFragment>,
    fail_at_end: bool,
}

impl VecReader {
    pub(crate) fn new(fragments: Vec<MutationFragment>) -> Self {
        Self {
            fragments: fragments.into(),
            fail_at_end: false,
        }
    }

    pub(crate) fn failing(fragments: Vec<MutationFragment>) -> Self {
        Self {
            fail_at_end: true,
            ..Self::new(fragments)
        }
    }
}

impl FragmentReader for VecReader {
    fn next_fragment(&mut self) -> sstable::Result<Option<MutationFragment>> {
        match self.fragments.pop_front() {
            None if self.fail_at_end => Err(sstable::SstableError::Malformed {
                path: PathBuf::from("vec"),
                component: sstable::Component::Data,
                reason: "bad checksum".to_string(),
            }),
            next => Ok(next),
        }
    }

    fn peek(&mut self) -> sstable::Result<Option<&MutationFragment>> {
        Ok(self.fragments.front())
    }

    fn next_partition(&mut self) -> sstable::Result<()> {
        while let Some(f) = self.fragments.front() {
            if f.is_partition_start() {
                break;
            }
            let end = f.is_end_of_partition();
            self.fragments.pop_front();
            if end {
                break;
            }
        }
        Ok(())
    }
}

/// Records every call as a short event string and stops where told to.
///
/// ```text
/// start  sstable:<name>|sstable:merged  ps:<hex key>  sr  cr  rt  pe  end_sstable  end
/// ```
#[derive(Debug, Default)]
pub(crate) struct RecordingConsumer {
    pub(crate) events: Vec<String>,
    pub(crate) stop_on_new_sstable: bool,
    pub(crate) stop_on_row: bool,
    pub(crate) stop_on_partition_end: bool,
    pub(crate) stop_on_end_of_sstable: bool,
}

/// Checks that every started sstable is ended and every started partition
/// is closed before anything else begins.
pub(crate) fn assert_well_formed(events: &[String]) {
    let mut in_sstable = false;
    let mut in_partition = false;
    for e in events {
        match e.as_str() {
            "start" | "end" => {
                assert!(!in_sstable, "{} inside an sstable: {:?}", e, events);
            }
            "end_sstable" => {
                assert!(in_sstable && !in_partition, "unbalanced end_sstable: {:?}", events);
                in_sstable = false;
            }
            "pe" => {
                assert!(in_partition, "pe outside a partition: {:?}", events);
                in_partition = false;
            }
            e if e.starts_with("sstable:") => {
                assert!(!in_sstable, "{} before end_sstable: {:?}", e, events);
                in_sstable = true;
            }
            e if e.starts_with("ps:") => {
                assert!(in_sstable && !in_partition, "{} inside a partition: {:?}", e, events);
                in_partition = true;
            }
            _ => assert!(in_partition, "{} outside a partition: {:?}", e, events),
        }
    }
    assert!(!in_sstable && !in_partition, "stream left open: {:?}", events);
}

impl RecordingConsumer {
    fn flow(stop: bool) -> Flow {
        if stop {
            STOP
        } else {
            CONTINUE
        }
    }

    /// Keys of the partitions that were started, in order.
    pub(crate) fn partitions(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| e.strip_prefix("ps:").map(str::to_string))
            .collect()
    }
}

impl SstableConsumer for RecordingConsumer {
    fn on_start_of_stream(&mut self) -> crate::Result<()> {
        self.events.push("start".into());
        Ok(())
    }

    fn on_new_sstable(&mut self, sstable: Option<&SSTable>) -> crate::Result<Flow> {
        let name = sstable.map_or_else(|| "merged".to_string(), SSTable::filename);
        self.events.push(format!("sstable:{}", name));
        Ok(Self::flow(self.stop_on_new_sstable))
    }

    fn consume_partition_start(&mut self, ps: PartitionStart) -> crate::Result<Flow> {
        self.events.push(format!("ps:{}", ps.key.to_hex()));
        Ok(CONTINUE)
    }

    fn consume_static_row(&mut self, _sr: StaticRow) -> crate::Result<Flow> {
        self.events.push("sr".into());
        Ok(CONTINUE)
    }

    fn consume_clustering_row(&mut self, _cr: ClusteringRow) -> crate::Result<Flow> {
        self.events.push("cr".into());
        Ok(Self::flow(self.stop_on_row))
    }

    fn consume_range_tombstone(&mut self, _rt: RangeTombstone) -> crate::Result<Flow> {
        self.events.push("rt".into());
        Ok(CONTINUE)
    }

    fn consume_partition_end(&mut self) -> crate::Result<Flow> {
        self.events.push("pe".into());
        Ok(Self::flow(self.stop_on_partition_end))
    }

    fn on_end_of_sstable(&mut self) -> crate::Result<Flow> {
        self.events.push("end_sstable".into());
        Ok(Self::flow(self.stop_on_end_of_sstable))
    }

    fn on_end_of_stream(&mut self) -> crate::Result<()> {
        self.events.push("end".into());
        Ok(())
    }
}
