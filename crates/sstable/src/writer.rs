use std::collections::BTreeMap;
use std::fs::{rename, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use mutation::{AtomicCell, Cell, ClusteringKey, Memtable, MutationFragment, Row, Tombstone};
use schema::Schema;
use tracing::debug;
use uuid::Uuid;

use crate::compress::compress_chunks;
use crate::descriptor::Descriptor;
use crate::error::{Component, ComponentContext, Result, SstableError};
use crate::format::{encode_fragment, write_record};
use crate::index::{write_index_entry, IndexEntry};
use crate::scylla_metadata::{
    Feature, LargeDataStatsEntry, LargeDataType, ScyllaMetadata, TokenBound, TokenRange,
};
use crate::statistics::{
    CompactionMetadata, EstimatedHistogram, ReplayPosition, SerializationHeader, Statistics,
    StatsMetadata, StreamingHistogram, ValidationMetadata,
};
use crate::summary::{Summary, DEFAULT_MIN_INDEX_INTERVAL};

pub const PARTITIONER: &str = "org.apache.cassandra.dht.Murmur3Partitioner";
const BLOOM_FILTER_FP_CHANCE: f64 = 0.01;
/// Compression ratio recorded for uncompressed sstables.
const NO_COMPRESSION_RATIO: f64 = -1.0;

const LARGE_PARTITION_THRESHOLD: u64 = 1000 * 1024 * 1024;
const LARGE_ROW_THRESHOLD: u64 = 10 * 1024 * 1024;
const LARGE_CELL_THRESHOLD: u64 = 1024 * 1024;
const ROWS_IN_PARTITION_THRESHOLD: u64 = 100_000;

/// Knobs of [`SSTableWriter`].
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Chunk length for LZ4 compression of the Data component; `None`
    /// writes it uncompressed.
    pub compression_chunk_len: Option<u32>,
    pub min_index_interval: u32,
    /// Write the Scylla component.
    pub scylla_metadata: bool,
    /// Run identifier for the Scylla component; random when `None`.
    pub run_identifier: Option<Uuid>,
    pub origin: String,
    pub extension_attributes: BTreeMap<String, String>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            compression_chunk_len: None,
            min_index_interval: DEFAULT_MIN_INDEX_INTERVAL,
            scylla_metadata: true,
            run_identifier: None,
            origin: "memtable".to_string(),
            extension_attributes: BTreeMap::new(),
        }
    }
}

/// Writes a [`Memtable`] to disk as a complete set of sstable components.
///
/// Every component is written to a temporary file, fsynced, and renamed
/// into place. The TOC goes last: an sstable without a TOC does not exist
/// as far as [`SSTable::open`](crate::SSTable::open) is concerned, so a
/// crash mid-write leaves nothing half-visible.
pub struct SSTableWriter {
    options: WriterOptions,
}

impl SSTableWriter {
    pub fn new(options: WriterOptions) -> Self {
        Self { options }
    }

    /// Flushes `mem` with default options, returning the Data component
    /// path.
    ///
    /// # Errors
    ///
    /// [`SstableError::Empty`] for an empty memtable, otherwise I/O errors.
    pub fn write_from_memtable(
        dir: &Path,
        generation: u64,
        schema: &Schema,
        mem: &Memtable,
    ) -> Result<PathBuf> {
        Self::new(WriterOptions::default()).write(dir, generation, schema, mem)
    }

    pub fn write(
        &self,
        dir: &Path,
        generation: u64,
        schema: &Schema,
        mem: &Memtable,
    ) -> Result<PathBuf> {
        if mem.is_empty() {
            return Err(SstableError::Empty);
        }
        let descriptor = Descriptor::new(dir, generation);

        let mut data = Vec::new();
        let mut index = Vec::with_capacity(mem.len());
        let mut collector = StatsCollector::new();
        let mut body = Vec::with_capacity(256);
        for partition in mem.iter() {
            let offset = data.len() as u64;
            index.push(IndexEntry {
                key: partition.key().clone(),
                data_offset: offset,
            });
            let mut rows = 0u64;
            for fragment in partition.fragments() {
                let before = data.len();
                body.clear();
                let kind = encode_fragment(&fragment, &mut body)
                    .in_component(&descriptor.path(Component::Data), Component::Data)?;
                write_record(&mut data, kind, &body)
                    .in_component(&descriptor.path(Component::Data), Component::Data)?;
                if matches!(fragment, MutationFragment::ClusteringRow(_)) {
                    rows += 1;
                    collector.observe_row_size((data.len() - before) as u64);
                }
                collector.observe_fragment(&fragment);
            }
            collector.end_partition((data.len() as u64) - offset, rows);
        }

        let mut components = vec![Component::Data, Component::Index, Component::Summary];
        let uncompressed_len = data.len();
        let (data, compression_ratio) = match self.options.compression_chunk_len {
            Some(chunk_len) => {
                let (compressed, info) = compress_chunks(&data, chunk_len);
                let mut buf = Vec::new();
                info.write_to(&mut buf)
                    .in_component(&descriptor.path(Component::CompressionInfo), Component::CompressionInfo)?;
                write_component(&descriptor, Component::CompressionInfo, &buf)?;
                components.push(Component::CompressionInfo);
                let ratio = compressed.len() as f64 / uncompressed_len as f64;
                (compressed, ratio)
            }
            None => (data, NO_COMPRESSION_RATIO),
        };
        write_component(&descriptor, Component::Data, &data)?;

        let mut index_buf = Vec::new();
        for entry in &index {
            write_index_entry(&mut index_buf, entry)
                .in_component(&descriptor.path(Component::Index), Component::Index)?;
        }
        write_component(&descriptor, Component::Index, &index_buf)?;

        let summary = Summary::build(&index, self.options.min_index_interval);
        let mut summary_buf = Vec::new();
        summary
            .write_to(&mut summary_buf)
            .in_component(&descriptor.path(Component::Summary), Component::Summary)?;
        write_component(&descriptor, Component::Summary, &summary_buf)?;

        let large_data = collector.large_data.clone();
        let mut statistics = Statistics::new(
            ValidationMetadata {
                partitioner: PARTITIONER.to_string(),
                filter_chance: BLOOM_FILTER_FP_CHANCE,
            },
            CompactionMetadata {
                ancestors: Vec::new(),
                cardinality: Vec::new(),
            },
            collector.finish(compression_ratio),
            SerializationHeader::for_schema(schema),
        );
        let mut stats_buf = Vec::new();
        statistics
            .write_to(&mut stats_buf)
            .in_component(&descriptor.path(Component::Statistics), Component::Statistics)?;
        write_component(&descriptor, Component::Statistics, &stats_buf)?;
        components.push(Component::Statistics);

        if self.options.scylla_metadata {
            let meta = ScyllaMetadata {
                sharding: Some(vec![TokenRange {
                    left: TokenBound {
                        exclusive: false,
                        token: i64::MIN,
                    },
                    right: TokenBound {
                        exclusive: false,
                        token: i64::MAX,
                    },
                }]),
                features: Some(
                    [
                        Feature::NonCompoundRangeTombstones,
                        Feature::ShadowableTombstones,
                        Feature::CorrectStaticCompact,
                        Feature::CorrectEmptyCounters,
                        Feature::CorrectUDTsInCollections,
                    ]
                    .into_iter()
                    .fold(0, |mask, f| mask | f as u64),
                ),
                extension_attributes: Some(self.options.extension_attributes.clone()),
                run_identifier: Some(self.options.run_identifier.unwrap_or_else(Uuid::new_v4)),
                large_data_stats: Some(large_data),
                origin: Some(self.options.origin.clone()),
            };
            let mut buf = Vec::new();
            meta.write_to(&mut buf)
                .in_component(&descriptor.path(Component::Scylla), Component::Scylla)?;
            write_component(&descriptor, Component::Scylla, &buf)?;
            components.push(Component::Scylla);
        }

        components.push(Component::Toc);
        components.sort();
        let toc: String = components
            .iter()
            .map(|c| format!("{}\n", c.name()))
            .collect();
        write_component(&descriptor, Component::Toc, toc.as_bytes())?;

        let data_path = descriptor.path(Component::Data);
        debug!(
            sstable = %data_path.display(),
            partitions = index.len(),
            data_bytes = uncompressed_len,
            compressed = self.options.compression_chunk_len.is_some(),
            "wrote sstable"
        );
        Ok(data_path)
    }
}

/// Writes one component via a temporary file and an atomic rename.
fn write_component(descriptor: &Descriptor, component: Component, bytes: &[u8]) -> Result<()> {
    let path = descriptor.path(component);
    let tmp_path = path.with_extension("tmp");
    let write = || -> std::io::Result<()> {
        let raw = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        let mut file = BufWriter::new(raw);
        file.write_all(bytes)?;
        file.flush()?;
        file.into_inner()?.sync_all()?;
        rename(&tmp_path, &path)?;
        Ok(())
    };
    write().in_component(&path, component)?;

    // A crash after rename but before the directory sync can lose the entry.
    if let Ok(dir) = File::open(descriptor.dir()) {
        let _ = dir.sync_all();
    }
    Ok(())
}

/// Accumulates the Stats block and large-data counters while writing.
struct StatsCollector {
    partition_sizes: EstimatedHistogram,
    cell_counts: EstimatedHistogram,
    drop_times: StreamingHistogram,
    min_timestamp: i64,
    max_timestamp: i64,
    min_deletion_time: i64,
    max_deletion_time: i64,
    min_ttl: i32,
    max_ttl: i32,
    min_clustering: Option<ClusteringKey>,
    max_clustering: Option<ClusteringKey>,
    columns: i64,
    rows: i64,
    partition_cells: i64,
    large_data: BTreeMap<LargeDataType, LargeDataStatsEntry>,
}

impl StatsCollector {
    fn new() -> Self {
        let threshold = |threshold| LargeDataStatsEntry {
            threshold,
            ..LargeDataStatsEntry::default()
        };
        Self {
            partition_sizes: EstimatedHistogram::new(EstimatedHistogram::DEFAULT_BUCKET_COUNT),
            cell_counts: EstimatedHistogram::new(EstimatedHistogram::DEFAULT_BUCKET_COUNT),
            drop_times: StreamingHistogram::new(StreamingHistogram::DEFAULT_MAX_BIN_SIZE),
            min_timestamp: i64::MAX,
            max_timestamp: i64::MIN,
            min_deletion_time: i64::MAX,
            max_deletion_time: i64::MIN,
            min_ttl: i32::MAX,
            max_ttl: i32::MIN,
            min_clustering: None,
            max_clustering: None,
            columns: 0,
            rows: 0,
            partition_cells: 0,
            large_data: BTreeMap::from([
                (LargeDataType::PartitionSize, threshold(LARGE_PARTITION_THRESHOLD)),
                (LargeDataType::RowSize, threshold(LARGE_ROW_THRESHOLD)),
                (LargeDataType::CellSize, threshold(LARGE_CELL_THRESHOLD)),
                (LargeDataType::RowsInPartition, threshold(ROWS_IN_PARTITION_THRESHOLD)),
            ]),
        }
    }

    fn observe_timestamp(&mut self, ts: i64) {
        self.min_timestamp = self.min_timestamp.min(ts);
        self.max_timestamp = self.max_timestamp.max(ts);
    }

    fn observe_deletion(&mut self, deletion_time: i64) {
        self.min_deletion_time = self.min_deletion_time.min(deletion_time);
        self.max_deletion_time = self.max_deletion_time.max(deletion_time);
        self.drop_times.update(deletion_time as f64);
    }

    fn observe_tombstone(&mut self, t: Option<Tombstone>) {
        if let Some(t) = t {
            self.observe_timestamp(t.timestamp);
            self.observe_deletion(t.deletion_time);
        }
    }

    fn observe_ttl(&mut self, ttl: i32) {
        self.min_ttl = self.min_ttl.min(ttl);
        self.max_ttl = self.max_ttl.max(ttl);
    }

    fn observe_atomic(&mut self, cell: &AtomicCell) {
        self.columns += 1;
        self.partition_cells += 1;
        self.observe_timestamp(cell.timestamp());
        match cell {
            AtomicCell::Live { value, expiry, .. } => {
                self.observe_cell_size(value.len() as u64);
                if let Some(e) = expiry {
                    self.observe_ttl(e.ttl);
                    self.observe_deletion(e.expires_at);
                }
            }
            AtomicCell::Dead { deletion_time, .. } => self.observe_deletion(*deletion_time),
        }
    }

    fn observe_cell_size(&mut self, size: u64) {
        if let Some(e) = self.large_data.get_mut(&LargeDataType::CellSize) {
            e.observe(size);
        }
    }

    fn observe_row_size(&mut self, size: u64) {
        if let Some(e) = self.large_data.get_mut(&LargeDataType::RowSize) {
            e.observe(size);
        }
    }

    fn observe_cells(&mut self, row: &Row) {
        for (_, cell) in row.cells() {
            match cell {
                Cell::Atomic(a) => self.observe_atomic(a),
                Cell::Collection(m) => {
                    self.observe_tombstone(m.tombstone);
                    for c in m.cells.values() {
                        self.observe_atomic(c);
                    }
                }
            }
        }
    }

    fn observe_fragment(&mut self, fragment: &MutationFragment) {
        match fragment {
            MutationFragment::PartitionStart(ps) => self.observe_tombstone(ps.tombstone),
            MutationFragment::StaticRow(sr) => self.observe_cells(&sr.cells),
            MutationFragment::ClusteringRow(cr) => {
                self.rows += 1;
                if let Some(m) = cr.marker {
                    self.observe_timestamp(m.timestamp);
                    if let Some(e) = m.expiry {
                        self.observe_ttl(e.ttl);
                    }
                }
                self.observe_tombstone(cr.tombstone);
                self.observe_cells(&cr.cells);
                if self.min_clustering.as_ref().map_or(true, |min| cr.key < *min) {
                    self.min_clustering = Some(cr.key.clone());
                }
                if self.max_clustering.as_ref().map_or(true, |max| cr.key > *max) {
                    self.max_clustering = Some(cr.key.clone());
                }
            }
            MutationFragment::RangeTombstone(rt) => self.observe_tombstone(Some(rt.tombstone)),
            MutationFragment::PartitionEnd => {}
        }
    }

    fn end_partition(&mut self, size: u64, rows: u64) {
        self.partition_sizes.add(size as i64);
        self.cell_counts.add(self.partition_cells);
        self.partition_cells = 0;
        if let Some(e) = self.large_data.get_mut(&LargeDataType::PartitionSize) {
            e.observe(size);
        }
        if let Some(e) = self.large_data.get_mut(&LargeDataType::RowsInPartition) {
            e.observe(rows);
        }
    }

    fn finish(self, compression_ratio: f64) -> StatsMetadata {
        // Empty ranges collapse to zero rather than leaking the sentinels.
        let or_zero64 = |min: i64, max: i64| if min > max { (0, 0) } else { (min, max) };
        let (min_timestamp, max_timestamp) = or_zero64(self.min_timestamp, self.max_timestamp);
        let (min_deletion, max_deletion) = or_zero64(self.min_deletion_time, self.max_deletion_time);
        let (min_ttl, max_ttl) = if self.min_ttl > self.max_ttl {
            (0, 0)
        } else {
            (self.min_ttl, self.max_ttl)
        };
        let clamp = |t: i64| t.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
        StatsMetadata {
            estimated_partition_size: self.partition_sizes,
            estimated_cells_count: self.cell_counts,
            position: ReplayPosition::default(),
            min_timestamp,
            max_timestamp,
            min_local_deletion_time: clamp(min_deletion),
            max_local_deletion_time: clamp(max_deletion),
            min_ttl,
            max_ttl,
            compression_ratio,
            estimated_tombstone_drop_time: self.drop_times,
            sstable_level: 0,
            repaired_at: 0,
            min_column_names: self.min_clustering.map(|k| k.0).unwrap_or_default(),
            max_column_names: self.max_clustering.map(|k| k.0).unwrap_or_default(),
            has_legacy_counter_shards: false,
            columns_count: self.columns,
            rows_count: self.rows,
            commitlog_lower_bound: ReplayPosition::default(),
            commitlog_intervals: Vec::new(),
        }
    }
}
