//! Field-by-field reflection over metadata blocks.
//!
//! A [`Describe`] type hands each of its fields, by name and in declaration
//! order, to a [`FieldVisitor`]. Dumpers implement the visitor; the types
//! stay free of any output format. Implementations destructure `self` so a
//! field added to a struct fails to compile until it is described.

use crate::statistics::{
    ColumnDesc, CommitlogInterval, CompactionMetadata, EstimatedHistogram, ReplayPosition,
    SerializationHeader, StatsMetadata, StreamingHistogram, ValidationMetadata,
};

/// One field value as seen by a visitor.
pub enum FieldValue<'a> {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Str(&'a str),
    Bytes(&'a [u8]),
    Array(Vec<FieldValue<'a>>),
    Record(&'a dyn Describe),
    EstimatedHistogram(&'a EstimatedHistogram),
    StreamingHistogram(&'a StreamingHistogram),
    ReplayPosition(ReplayPosition),
    CommitlogInterval(CommitlogInterval),
}

pub trait FieldVisitor {
    fn visit_field(&mut self, name: &'static str, value: FieldValue<'_>);
}

pub trait Describe {
    fn describe(&self, visitor: &mut dyn FieldVisitor);
}

impl Describe for ValidationMetadata {
    fn describe(&self, v: &mut dyn FieldVisitor) {
        let ValidationMetadata {
            partitioner,
            filter_chance,
        } = self;
        v.visit_field("partitioner", FieldValue::Str(partitioner));
        v.visit_field("filter_chance", FieldValue::Float(*filter_chance));
    }
}

impl Describe for CompactionMetadata {
    fn describe(&self, v: &mut dyn FieldVisitor) {
        let CompactionMetadata {
            ancestors,
            cardinality,
        } = self;
        v.visit_field(
            "ancestors",
            FieldValue::Array(ancestors.iter().map(|a| FieldValue::UInt(u64::from(*a))).collect()),
        );
        v.visit_field(
            "cardinality",
            FieldValue::Array(cardinality.iter().map(|c| FieldValue::UInt(u64::from(*c))).collect()),
        );
    }
}

impl Describe for StatsMetadata {
    fn describe(&self, v: &mut dyn FieldVisitor) {
        let StatsMetadata {
            estimated_partition_size,
            estimated_cells_count,
            position,
            min_timestamp,
            max_timestamp,
            min_local_deletion_time,
            max_local_deletion_time,
            min_ttl,
            max_ttl,
            compression_ratio,
            estimated_tombstone_drop_time,
            sstable_level,
            repaired_at,
            min_column_names,
            max_column_names,
            has_legacy_counter_shards,
            columns_count,
            rows_count,
            commitlog_lower_bound,
            commitlog_intervals,
        } = self;
        v.visit_field(
            "estimated_partition_size",
            FieldValue::EstimatedHistogram(estimated_partition_size),
        );
        v.visit_field(
            "estimated_cells_count",
            FieldValue::EstimatedHistogram(estimated_cells_count),
        );
        v.visit_field("position", FieldValue::ReplayPosition(*position));
        v.visit_field("min_timestamp", FieldValue::Int(*min_timestamp));
        v.visit_field("max_timestamp", FieldValue::Int(*max_timestamp));
        v.visit_field(
            "min_local_deletion_time",
            FieldValue::Int(i64::from(*min_local_deletion_time)),
        );
        v.visit_field(
            "max_local_deletion_time",
            FieldValue::Int(i64::from(*max_local_deletion_time)),
        );
        v.visit_field("min_ttl", FieldValue::Int(i64::from(*min_ttl)));
        v.visit_field("max_ttl", FieldValue::Int(i64::from(*max_ttl)));
        v.visit_field("compression_ratio", FieldValue::Float(*compression_ratio));
        v.visit_field(
            "estimated_tombstone_drop_time",
            FieldValue::StreamingHistogram(estimated_tombstone_drop_time),
        );
        v.visit_field("sstable_level", FieldValue::UInt(u64::from(*sstable_level)));
        v.visit_field("repaired_at", FieldValue::UInt(*repaired_at));
        v.visit_field("min_column_names", byte_array(min_column_names));
        v.visit_field("max_column_names", byte_array(max_column_names));
        v.visit_field(
            "has_legacy_counter_shards",
            FieldValue::Bool(*has_legacy_counter_shards),
        );
        v.visit_field("columns_count", FieldValue::Int(*columns_count));
        v.visit_field("rows_count", FieldValue::Int(*rows_count));
        v.visit_field(
            "commitlog_lower_bound",
            FieldValue::ReplayPosition(*commitlog_lower_bound),
        );
        v.visit_field(
            "commitlog_intervals",
            FieldValue::Array(
                commitlog_intervals
                    .iter()
                    .map(|i| FieldValue::CommitlogInterval(*i))
                    .collect(),
            ),
        );
    }
}

impl Describe for ColumnDesc {
    fn describe(&self, v: &mut dyn FieldVisitor) {
        let ColumnDesc { name, type_name } = self;
        v.visit_field("name", FieldValue::Str(name));
        v.visit_field("type_name", FieldValue::Str(type_name));
    }
}

impl Describe for SerializationHeader {
    fn describe(&self, v: &mut dyn FieldVisitor) {
        let SerializationHeader {
            min_timestamp_base,
            min_local_deletion_time_base,
            min_ttl_base,
            pk_type_name,
            clustering_key_types_names,
            static_columns,
            regular_columns,
        } = self;
        v.visit_field("min_timestamp_base", FieldValue::UInt(*min_timestamp_base));
        v.visit_field(
            "min_local_deletion_time_base",
            FieldValue::UInt(*min_local_deletion_time_base),
        );
        v.visit_field("min_ttl_base", FieldValue::UInt(*min_ttl_base));
        v.visit_field("pk_type_name", FieldValue::Str(pk_type_name));
        v.visit_field(
            "clustering_key_types_names",
            FieldValue::Array(
                clustering_key_types_names
                    .iter()
                    .map(|t| FieldValue::Str(t))
                    .collect(),
            ),
        );
        v.visit_field("static_columns", record_array(static_columns));
        v.visit_field("regular_columns", record_array(regular_columns));
    }
}

fn byte_array(values: &[Vec<u8>]) -> FieldValue<'_> {
    FieldValue::Array(values.iter().map(|v| FieldValue::Bytes(v)).collect())
}

fn record_array<T: Describe>(records: &[T]) -> FieldValue<'_> {
    FieldValue::Array(
        records
            .iter()
            .map(|r| FieldValue::Record(r as &dyn Describe))
            .collect(),
    )
}
