//! The Statistics component.
//!
//! A table of `(metadata_type u32, offset u32)` pairs (preceded by its
//! length as u32) followed by the metadata blocks it points at. Four block
//! types exist: Validation, Compaction, Stats and Serialization. Offsets are
//! from the start of the file.

use std::io::{self, Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use schema::{ColumnDefinition, ColumnType, Schema, SchemaError};

use crate::error::invalid_data;
use crate::format::{read_bytes, read_string, write_bytes, write_string, MAX_KEY_BYTES};

/// Sanity bound for element counts read from disk.
const MAX_ELEMENTS: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetadataType {
    Validation,
    Compaction,
    Stats,
    Serialization,
}

impl MetadataType {
    fn from_u32(v: u32) -> io::Result<Self> {
        Ok(match v {
            0 => MetadataType::Validation,
            1 => MetadataType::Compaction,
            2 => MetadataType::Stats,
            3 => MetadataType::Serialization,
            other => return Err(invalid_data(format!("unknown metadata type {}", other))),
        })
    }

    fn as_u32(self) -> u32 {
        match self {
            MetadataType::Validation => 0,
            MetadataType::Compaction => 1,
            MetadataType::Stats => 2,
            MetadataType::Serialization => 3,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MetadataType::Validation => "validation",
            MetadataType::Compaction => "compaction",
            MetadataType::Stats => "stats",
            MetadataType::Serialization => "serialization",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationMetadata {
    pub partitioner: String,
    pub filter_chance: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionMetadata {
    pub ancestors: Vec<u32>,
    pub cardinality: Vec<u8>,
}

/// Histogram with exponentially growing bucket bounds.
///
/// `buckets` has one more element than `bucket_offsets`: the last bucket
/// counts values above the largest offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstimatedHistogram {
    pub bucket_offsets: Vec<i64>,
    pub buckets: Vec<i64>,
}

impl EstimatedHistogram {
    pub const DEFAULT_BUCKET_COUNT: usize = 90;

    /// Offsets 1, 2, 3, ... growing by ~20% per bucket.
    pub fn new(bucket_count: usize) -> Self {
        let mut offsets = Vec::with_capacity(bucket_count);
        let mut last = 1i64;
        offsets.push(last);
        for _ in 1..bucket_count {
            let next = ((last as f64) * 1.2).round() as i64;
            last = if next == last { last + 1 } else { next };
            offsets.push(last);
        }
        Self {
            buckets: vec![0; offsets.len() + 1],
            bucket_offsets: offsets,
        }
    }

    pub fn add(&mut self, value: i64) {
        let index = self.bucket_offsets.partition_point(|&off| off < value);
        self.buckets[index] += 1;
    }

    #[must_use]
    pub fn count(&self) -> i64 {
        self.buckets.iter().sum()
    }

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.buckets.len() as u32)?;
        for (i, bucket) in self.buckets.iter().enumerate() {
            let offset = match i {
                0 => self.bucket_offsets.first().copied().unwrap_or(0),
                _ => self.bucket_offsets[i - 1],
            };
            w.write_i64::<LittleEndian>(offset)?;
            w.write_i64::<LittleEndian>(*bucket)?;
        }
        Ok(())
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let len = read_count(r)?;
        let mut bucket_offsets = Vec::with_capacity(len.saturating_sub(1));
        let mut buckets = Vec::with_capacity(len);
        for i in 0..len {
            let offset = r.read_i64::<LittleEndian>()?;
            if i > 0 {
                bucket_offsets.push(offset);
            }
            buckets.push(r.read_i64::<LittleEndian>()?);
        }
        Ok(Self {
            bucket_offsets,
            buckets,
        })
    }
}

/// Bounded-size histogram of a numeric stream; close bins are merged once
/// the bin count exceeds `max_bin_size`.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamingHistogram {
    pub max_bin_size: u32,
    /// `(point, count)` sorted by point.
    pub bins: Vec<(f64, u64)>,
}

impl StreamingHistogram {
    pub const DEFAULT_MAX_BIN_SIZE: u32 = 100;

    pub fn new(max_bin_size: u32) -> Self {
        Self {
            max_bin_size: max_bin_size.max(1),
            bins: Vec::new(),
        }
    }

    pub fn update(&mut self, point: f64) {
        let at = self.bins.partition_point(|(p, _)| *p < point);
        match self.bins.get_mut(at) {
            Some((p, count)) if *p == point => *count += 1,
            _ => self.bins.insert(at, (point, 1)),
        }
        if self.bins.len() > self.max_bin_size as usize {
            self.merge_closest();
        }
    }

    fn merge_closest(&mut self) {
        let Some(i) = (0..self.bins.len().saturating_sub(1))
            .min_by(|&a, &b| {
                let da = self.bins[a + 1].0 - self.bins[a].0;
                let db = self.bins[b + 1].0 - self.bins[b].0;
                da.total_cmp(&db)
            })
        else {
            return;
        };
        let (p1, c1) = self.bins[i];
        let (p2, c2) = self.bins.remove(i + 1);
        let total = c1 + c2;
        self.bins[i] = ((p1 * c1 as f64 + p2 * c2 as f64) / total as f64, total);
    }

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.max_bin_size)?;
        w.write_u32::<LittleEndian>(self.bins.len() as u32)?;
        for (point, count) in &self.bins {
            w.write_f64::<LittleEndian>(*point)?;
            w.write_u64::<LittleEndian>(*count)?;
        }
        Ok(())
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let max_bin_size = r.read_u32::<LittleEndian>()?;
        let len = read_count(r)?;
        let bins = (0..len)
            .map(|_| Ok((r.read_f64::<LittleEndian>()?, r.read_u64::<LittleEndian>()?)))
            .collect::<io::Result<Vec<_>>>()?;
        Ok(Self { max_bin_size, bins })
    }
}

/// A commitlog position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReplayPosition {
    pub id: u64,
    pub pos: u32,
}

impl ReplayPosition {
    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u64::<LittleEndian>(self.id)?;
        w.write_u32::<LittleEndian>(self.pos)
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(Self {
            id: r.read_u64::<LittleEndian>()?,
            pos: r.read_u32::<LittleEndian>()?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitlogInterval {
    pub start: ReplayPosition,
    pub end: ReplayPosition,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsMetadata {
    pub estimated_partition_size: EstimatedHistogram,
    pub estimated_cells_count: EstimatedHistogram,
    pub position: ReplayPosition,
    pub min_timestamp: i64,
    pub max_timestamp: i64,
    pub min_local_deletion_time: i32,
    pub max_local_deletion_time: i32,
    pub min_ttl: i32,
    pub max_ttl: i32,
    pub compression_ratio: f64,
    pub estimated_tombstone_drop_time: StreamingHistogram,
    pub sstable_level: u32,
    pub repaired_at: u64,
    pub min_column_names: Vec<Vec<u8>>,
    pub max_column_names: Vec<Vec<u8>>,
    pub has_legacy_counter_shards: bool,
    pub columns_count: i64,
    pub rows_count: i64,
    pub commitlog_lower_bound: ReplayPosition,
    pub commitlog_intervals: Vec<CommitlogInterval>,
}

/// Name and type of one static or regular column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDesc {
    pub name: String,
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializationHeader {
    pub min_timestamp_base: u64,
    pub min_local_deletion_time_base: u64,
    pub min_ttl_base: u64,
    pub pk_type_name: String,
    pub clustering_key_types_names: Vec<String>,
    pub static_columns: Vec<ColumnDesc>,
    pub regular_columns: Vec<ColumnDesc>,
}

impl SerializationHeader {
    /// Describes the columns of `schema`.
    pub fn for_schema(schema: &Schema) -> Self {
        let desc = |c: &ColumnDefinition| ColumnDesc {
            name: c.name.clone(),
            type_name: c.ty.to_string(),
        };
        Self {
            min_timestamp_base: 0,
            min_local_deletion_time_base: 0,
            min_ttl_base: 0,
            pk_type_name: schema.partition_key().ty.to_string(),
            clustering_key_types_names: schema
                .clustering_key()
                .iter()
                .map(|c| c.ty.to_string())
                .collect(),
            static_columns: schema.static_columns().iter().map(desc).collect(),
            regular_columns: schema.regular_columns().iter().map(desc).collect(),
        }
    }

    /// Rebuilds a schema. Key column names are not stored, so the partition
    /// key is called `pk` and clustering columns `ck0`, `ck1`, ...
    pub fn to_schema(&self, keyspace: &str, table: &str) -> Result<Schema, SchemaError> {
        let resolve = |c: &ColumnDesc| -> Result<ColumnDefinition, SchemaError> {
            Ok(ColumnDefinition::new(c.name.clone(), ColumnType::parse(&c.type_name)?))
        };
        let clustering = self
            .clustering_key_types_names
            .iter()
            .enumerate()
            .map(|(i, t)| Ok(ColumnDefinition::new(format!("ck{}", i), ColumnType::parse(t)?)))
            .collect::<Result<Vec<_>, SchemaError>>()?;
        Schema::new(
            keyspace,
            table,
            ColumnDefinition::new("pk", ColumnType::parse(&self.pk_type_name)?),
            clustering,
            self.static_columns.iter().map(resolve).collect::<Result<_, _>>()?,
            self.regular_columns.iter().map(resolve).collect::<Result<_, _>>()?,
        )
    }
}

/// Contents of the Statistics component.
#[derive(Debug, Clone, PartialEq)]
pub struct Statistics {
    /// Block table in file order.
    pub offsets: Vec<(MetadataType, u32)>,
    pub validation: Option<ValidationMetadata>,
    pub compaction: Option<CompactionMetadata>,
    pub stats: Option<StatsMetadata>,
    pub serialization: Option<SerializationHeader>,
}

impl Statistics {
    pub fn new(
        validation: ValidationMetadata,
        compaction: CompactionMetadata,
        stats: StatsMetadata,
        serialization: SerializationHeader,
    ) -> Self {
        Self {
            offsets: Vec::new(),
            validation: Some(validation),
            compaction: Some(compaction),
            stats: Some(stats),
            serialization: Some(serialization),
        }
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut raw = Vec::new();
        r.read_to_end(&mut raw)?;
        let mut header = raw.as_slice();
        let count = read_count(&mut header)?;
        let mut offsets = Vec::with_capacity(count);
        for _ in 0..count {
            let ty = MetadataType::from_u32(header.read_u32::<LittleEndian>()?)?;
            let offset = header.read_u32::<LittleEndian>()?;
            offsets.push((ty, offset));
        }

        let mut stats = Statistics {
            offsets: offsets.clone(),
            validation: None,
            compaction: None,
            stats: None,
            serialization: None,
        };
        for (ty, offset) in offsets {
            let mut block = Cursor::new(raw.as_slice());
            block.set_position(u64::from(offset));
            if offset as usize >= raw.len() {
                return Err(invalid_data(format!(
                    "{} block offset {} beyond end of file",
                    ty.as_str(),
                    offset
                )));
            }
            match ty {
                MetadataType::Validation => {
                    stats.validation = Some(ValidationMetadata {
                        partitioner: read_string(&mut block)?,
                        filter_chance: block.read_f64::<LittleEndian>()?,
                    });
                }
                MetadataType::Compaction => {
                    let n = read_count(&mut block)?;
                    let ancestors = (0..n)
                        .map(|_| block.read_u32::<LittleEndian>())
                        .collect::<io::Result<Vec<_>>>()?;
                    let cardinality = read_bytes(&mut block, MAX_ELEMENTS)?;
                    stats.compaction = Some(CompactionMetadata {
                        ancestors,
                        cardinality,
                    });
                }
                MetadataType::Stats => stats.stats = Some(read_stats(&mut block)?),
                MetadataType::Serialization => {
                    stats.serialization = Some(read_serialization_header(&mut block)?);
                }
            }
        }
        Ok(stats)
    }

    /// Writes all present blocks in type order and records their offsets.
    pub fn write_to<W: Write>(&mut self, w: &mut W) -> io::Result<()> {
        let mut blocks: Vec<(MetadataType, Vec<u8>)> = Vec::new();
        if let Some(v) = &self.validation {
            let mut buf = Vec::new();
            write_string(&mut buf, &v.partitioner)?;
            buf.write_f64::<LittleEndian>(v.filter_chance)?;
            blocks.push((MetadataType::Validation, buf));
        }
        if let Some(c) = &self.compaction {
            let mut buf = Vec::new();
            buf.write_u32::<LittleEndian>(c.ancestors.len() as u32)?;
            for a in &c.ancestors {
                buf.write_u32::<LittleEndian>(*a)?;
            }
            write_bytes(&mut buf, &c.cardinality)?;
            blocks.push((MetadataType::Compaction, buf));
        }
        if let Some(s) = &self.stats {
            let mut buf = Vec::new();
            write_stats(&mut buf, s)?;
            blocks.push((MetadataType::Stats, buf));
        }
        if let Some(h) = &self.serialization {
            let mut buf = Vec::new();
            write_serialization_header(&mut buf, h)?;
            blocks.push((MetadataType::Serialization, buf));
        }

        let mut offset = 4 + 8 * blocks.len() as u32;
        self.offsets.clear();
        for (ty, buf) in &blocks {
            self.offsets.push((*ty, offset));
            offset += buf.len() as u32;
        }

        w.write_u32::<LittleEndian>(blocks.len() as u32)?;
        for (ty, off) in &self.offsets {
            w.write_u32::<LittleEndian>(ty.as_u32())?;
            w.write_u32::<LittleEndian>(*off)?;
        }
        for (_, buf) in &blocks {
            w.write_all(buf)?;
        }
        Ok(())
    }
}

fn read_count<R: Read>(r: &mut R) -> io::Result<usize> {
    let n = r.read_u32::<LittleEndian>()? as usize;
    if n > MAX_ELEMENTS {
        return Err(invalid_data(format!(
            "element count {} exceeds maximum {}",
            n, MAX_ELEMENTS
        )));
    }
    Ok(n)
}

fn write_names<W: Write>(w: &mut W, names: &[Vec<u8>]) -> io::Result<()> {
    w.write_u32::<LittleEndian>(names.len() as u32)?;
    for n in names {
        write_bytes(w, n)?;
    }
    Ok(())
}

fn read_names<R: Read>(r: &mut R) -> io::Result<Vec<Vec<u8>>> {
    let n = read_count(r)?;
    (0..n).map(|_| read_bytes(r, MAX_KEY_BYTES)).collect()
}

fn write_stats<W: Write>(w: &mut W, s: &StatsMetadata) -> io::Result<()> {
    s.estimated_partition_size.write_to(w)?;
    s.estimated_cells_count.write_to(w)?;
    s.position.write_to(w)?;
    w.write_i64::<LittleEndian>(s.min_timestamp)?;
    w.write_i64::<LittleEndian>(s.max_timestamp)?;
    w.write_i32::<LittleEndian>(s.min_local_deletion_time)?;
    w.write_i32::<LittleEndian>(s.max_local_deletion_time)?;
    w.write_i32::<LittleEndian>(s.min_ttl)?;
    w.write_i32::<LittleEndian>(s.max_ttl)?;
    w.write_f64::<LittleEndian>(s.compression_ratio)?;
    s.estimated_tombstone_drop_time.write_to(w)?;
    w.write_u32::<LittleEndian>(s.sstable_level)?;
    w.write_u64::<LittleEndian>(s.repaired_at)?;
    write_names(w, &s.min_column_names)?;
    write_names(w, &s.max_column_names)?;
    w.write_u8(u8::from(s.has_legacy_counter_shards))?;
    w.write_i64::<LittleEndian>(s.columns_count)?;
    w.write_i64::<LittleEndian>(s.rows_count)?;
    s.commitlog_lower_bound.write_to(w)?;
    w.write_u32::<LittleEndian>(s.commitlog_intervals.len() as u32)?;
    for i in &s.commitlog_intervals {
        i.start.write_to(w)?;
        i.end.write_to(w)?;
    }
    Ok(())
}

fn read_stats<R: Read>(r: &mut R) -> io::Result<StatsMetadata> {
    Ok(StatsMetadata {
        estimated_partition_size: EstimatedHistogram::read_from(r)?,
        estimated_cells_count: EstimatedHistogram::read_from(r)?,
        position: ReplayPosition::read_from(r)?,
        min_timestamp: r.read_i64::<LittleEndian>()?,
        max_timestamp: r.read_i64::<LittleEndian>()?,
        min_local_deletion_time: r.read_i32::<LittleEndian>()?,
        max_local_deletion_time: r.read_i32::<LittleEndian>()?,
        min_ttl: r.read_i32::<LittleEndian>()?,
        max_ttl: r.read_i32::<LittleEndian>()?,
        compression_ratio: r.read_f64::<LittleEndian>()?,
        estimated_tombstone_drop_time: StreamingHistogram::read_from(r)?,
        sstable_level: r.read_u32::<LittleEndian>()?,
        repaired_at: r.read_u64::<LittleEndian>()?,
        min_column_names: read_names(r)?,
        max_column_names: read_names(r)?,
        has_legacy_counter_shards: r.read_u8()? != 0,
        columns_count: r.read_i64::<LittleEndian>()?,
        rows_count: r.read_i64::<LittleEndian>()?,
        commitlog_lower_bound: ReplayPosition::read_from(r)?,
        commitlog_intervals: {
            let n = read_count(r)?;
            (0..n)
                .map(|_| {
                    Ok(CommitlogInterval {
                        start: ReplayPosition::read_from(r)?,
                        end: ReplayPosition::read_from(r)?,
                    })
                })
                .collect::<io::Result<Vec<_>>>()?
        },
    })
}

fn write_column_descs<W: Write>(w: &mut W, cols: &[ColumnDesc]) -> io::Result<()> {
    w.write_u32::<LittleEndian>(cols.len() as u32)?;
    for c in cols {
        write_string(w, &c.name)?;
        write_string(w, &c.type_name)?;
    }
    Ok(())
}

fn read_column_descs<R: Read>(r: &mut R) -> io::Result<Vec<ColumnDesc>> {
    let n = read_count(r)?;
    (0..n)
        .map(|_| {
            Ok(ColumnDesc {
                name: read_string(r)?,
                type_name: read_string(r)?,
            })
        })
        .collect()
}

fn write_serialization_header<W: Write>(w: &mut W, h: &SerializationHeader) -> io::Result<()> {
    w.write_u64::<LittleEndian>(h.min_timestamp_base)?;
    w.write_u64::<LittleEndian>(h.min_local_deletion_time_base)?;
    w.write_u64::<LittleEndian>(h.min_ttl_base)?;
    write_string(w, &h.pk_type_name)?;
    w.write_u32::<LittleEndian>(h.clustering_key_types_names.len() as u32)?;
    for t in &h.clustering_key_types_names {
        write_string(w, t)?;
    }
    write_column_descs(w, &h.static_columns)?;
    write_column_descs(w, &h.regular_columns)
}

fn read_serialization_header<R: Read>(r: &mut R) -> io::Result<SerializationHeader> {
    let min_timestamp_base = r.read_u64::<LittleEndian>()?;
    let min_local_deletion_time_base = r.read_u64::<LittleEndian>()?;
    let min_ttl_base = r.read_u64::<LittleEndian>()?;
    let pk_type_name = read_string(r)?;
    let n = read_count(r)?;
    let clustering_key_types_names = (0..n)
        .map(|_| read_string(r))
        .collect::<io::Result<Vec<_>>>()?;
    Ok(SerializationHeader {
        min_timestamp_base,
        min_local_deletion_time_base,
        min_ttl_base,
        pk_type_name,
        clustering_key_types_names,
        static_columns: read_column_descs(r)?,
        regular_columns: read_column_descs(r)?,
    })
}
