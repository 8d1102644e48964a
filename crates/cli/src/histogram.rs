//! The `writetime-histogram` operation.
//!
//! Every timestamp found in the data (partition, row and range tombstones,
//! row markers, cells and collection tombstones) is truncated to the
//! bucket unit and counted. The result lands in
//! `<output-dir>/histogram.json`:
//!
//! ```json
//! {"buckets":[1690848000000000,1693526400000000],"counts":[12,3]}
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use mutation::{Cell, ClusteringRow, PartitionStart, RangeTombstone, Row, StaticRow, Timestamp};
use serde::Serialize;
use sstable::SSTable;
use tracing::info;

use crate::consumer::{Flow, SstableConsumer, CONTINUE};
use crate::error::{Result, ToolError};

/// Average Gregorian year.
const SECONDS_PER_YEAR: i64 = 31_556_952;
const MICROS_PER_SECOND: i64 = 1_000_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Bucket {
    Years,
    #[default]
    Months,
    Weeks,
    Days,
    Hours,
}

impl Bucket {
    pub fn seconds(self) -> i64 {
        match self {
            Bucket::Years => SECONDS_PER_YEAR,
            Bucket::Months => SECONDS_PER_YEAR / 12,
            Bucket::Weeks => 7 * 24 * 3600,
            Bucket::Days => 24 * 3600,
            Bucket::Hours => 3600,
        }
    }

    /// Start of the bucket holding `ts`, in microseconds.
    pub fn truncate(self, ts: Timestamp) -> Timestamp {
        let unit = self.seconds() * MICROS_PER_SECOND;
        ts / unit * unit
    }
}

impl FromStr for Bucket {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "years" => Ok(Bucket::Years),
            "months" => Ok(Bucket::Months),
            "weeks" => Ok(Bucket::Weeks),
            "days" => Ok(Bucket::Days),
            "hours" => Ok(Bucket::Hours),
            other => Err(ToolError::InvalidOptionValue {
                operation: "writetime-histogram".to_string(),
                option: "bucket".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct HistogramFile {
    pub buckets: Vec<Timestamp>,
    pub counts: Vec<u64>,
}

pub struct WritetimeHistogramConsumer {
    bucket: Bucket,
    output_dir: PathBuf,
    histogram: BTreeMap<Timestamp, u64>,
    partitions: u64,
    rows: u64,
    cells: u64,
    timestamps: u64,
}

impl WritetimeHistogramConsumer {
    pub fn new(bucket: Bucket, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            bucket,
            output_dir: output_dir.into(),
            histogram: BTreeMap::new(),
            partitions: 0,
            rows: 0,
            cells: 0,
            timestamps: 0,
        }
    }

    pub fn histogram(&self) -> &BTreeMap<Timestamp, u64> {
        &self.histogram
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join("histogram.json")
    }

    fn collect(&mut self, ts: Timestamp) {
        *self.histogram.entry(self.bucket.truncate(ts)).or_insert(0) += 1;
        self.timestamps += 1;
    }

    fn collect_row(&mut self, row: &Row) {
        for (_, cell) in row.cells() {
            match cell {
                Cell::Atomic(c) => {
                    self.cells += 1;
                    self.collect(c.timestamp());
                }
                Cell::Collection(m) => {
                    if let Some(t) = m.tombstone {
                        self.collect(t.timestamp);
                    }
                    for c in m.cells.values() {
                        self.cells += 1;
                        self.collect(c.timestamp());
                    }
                }
            }
        }
    }

    fn write_json(&self, path: &Path) -> Result<()> {
        let file = HistogramFile {
            buckets: self.histogram.keys().copied().collect(),
            counts: self.histogram.values().copied().collect(),
        };
        let mut out = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut out, &file)?;
        out.flush()?;
        Ok(())
    }
}

impl SstableConsumer for WritetimeHistogramConsumer {
    fn on_start_of_stream(&mut self) -> Result<()> {
        Ok(())
    }

    fn on_new_sstable(&mut self, _sstable: Option<&SSTable>) -> Result<Flow> {
        Ok(CONTINUE)
    }

    fn consume_partition_start(&mut self, ps: PartitionStart) -> Result<Flow> {
        self.partitions += 1;
        if let Some(t) = ps.tombstone {
            self.collect(t.timestamp);
        }
        Ok(CONTINUE)
    }

    fn consume_static_row(&mut self, sr: StaticRow) -> Result<Flow> {
        self.rows += 1;
        self.collect_row(&sr.cells);
        Ok(CONTINUE)
    }

    fn consume_clustering_row(&mut self, cr: ClusteringRow) -> Result<Flow> {
        if let Some(marker) = cr.marker {
            self.collect(marker.timestamp);
        }
        if let Some(t) = cr.tombstone {
            self.collect(t.timestamp);
        }
        self.rows += 1;
        self.collect_row(&cr.cells);
        Ok(CONTINUE)
    }

    fn consume_range_tombstone(&mut self, rt: RangeTombstone) -> Result<Flow> {
        self.collect(rt.tombstone.timestamp);
        Ok(CONTINUE)
    }

    fn consume_partition_end(&mut self) -> Result<Flow> {
        Ok(CONTINUE)
    }

    fn on_end_of_sstable(&mut self) -> Result<Flow> {
        Ok(CONTINUE)
    }

    fn on_end_of_stream(&mut self) -> Result<()> {
        if self.histogram.is_empty() {
            info!("Histogram empty, no data to write");
            return Ok(());
        }
        info!(
            "Histogram has {} entries, collected from {} partitions, {} rows, {} cells: {} timestamps total",
            self.histogram.len(),
            self.partitions,
            self.rows,
            self.cells,
            self.timestamps
        );
        let path = self.output_path();
        self.write_json(&path)?;
        info!("Histogram written to {}", path.display());
        Ok(())
    }
}
