//! The mutation fragment: one typed record of a partition's ordered stream.
//!
//! Within a partition the order is always
//!
//! ```text
//! PartitionStart, StaticRow?, (ClusteringRow | RangeTombstone)*, PartitionEnd
//! ```
//!
//! with clustering rows and range tombstones in clustering order, and
//! partitions in strictly increasing [`DecoratedKey`] order.

use std::fmt;

use crate::cell::{merge_tombstones, Row, RowMarker, Tombstone};
use crate::clustering::{ClusteringBound, ClusteringKey, PositionInPartition};
use crate::keys::DecoratedKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionStart {
    pub key: DecoratedKey,
    pub tombstone: Option<Tombstone>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticRow {
    pub cells: Row,
}

impl StaticRow {
    pub fn apply(&mut self, other: StaticRow) {
        self.cells.apply(other.cells);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusteringRow {
    pub key: ClusteringKey,
    pub marker: Option<RowMarker>,
    pub tombstone: Option<Tombstone>,
    pub cells: Row,
}

impl ClusteringRow {
    pub fn new(key: ClusteringKey) -> Self {
        Self {
            key,
            marker: None,
            tombstone: None,
            cells: Row::new(),
        }
    }

    pub fn with_marker(mut self, marker: RowMarker) -> Self {
        self.marker = Some(marker);
        self
    }

    pub fn with_tombstone(mut self, tombstone: Tombstone) -> Self {
        self.tombstone = Some(tombstone);
        self
    }

    pub fn with_cells(mut self, cells: Row) -> Self {
        self.cells = cells;
        self
    }

    /// Merges another version of the same row into this one.
    pub fn apply(&mut self, other: ClusteringRow) {
        debug_assert_eq!(self.key, other.key);
        self.marker = self.marker.max(other.marker);
        self.tombstone = merge_tombstones(self.tombstone, other.tombstone);
        self.cells.apply(other.cells);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeTombstone {
    pub start: ClusteringBound,
    pub end: ClusteringBound,
    pub tombstone: Tombstone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentKind {
    PartitionStart,
    StaticRow,
    ClusteringRow,
    RangeTombstone,
    PartitionEnd,
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FragmentKind::PartitionStart => "partition start",
            FragmentKind::StaticRow => "static row",
            FragmentKind::ClusteringRow => "clustering row",
            FragmentKind::RangeTombstone => "range tombstone",
            FragmentKind::PartitionEnd => "partition end",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationFragment {
    PartitionStart(PartitionStart),
    StaticRow(StaticRow),
    ClusteringRow(ClusteringRow),
    RangeTombstone(RangeTombstone),
    PartitionEnd,
}

impl MutationFragment {
    pub fn kind(&self) -> FragmentKind {
        match self {
            MutationFragment::PartitionStart(_) => FragmentKind::PartitionStart,
            MutationFragment::StaticRow(_) => FragmentKind::StaticRow,
            MutationFragment::ClusteringRow(_) => FragmentKind::ClusteringRow,
            MutationFragment::RangeTombstone(_) => FragmentKind::RangeTombstone,
            MutationFragment::PartitionEnd => FragmentKind::PartitionEnd,
        }
    }

    pub fn is_partition_start(&self) -> bool {
        matches!(self, MutationFragment::PartitionStart(_))
    }

    pub fn is_end_of_partition(&self) -> bool {
        matches!(self, MutationFragment::PartitionEnd)
    }

    /// Position of the fragment within its partition. Range tombstones are
    /// placed at their start bound.
    pub fn position(&self) -> PositionInPartition {
        match self {
            MutationFragment::PartitionStart(_) => PositionInPartition::partition_start(),
            MutationFragment::StaticRow(_) => PositionInPartition::static_row(),
            MutationFragment::ClusteringRow(cr) => PositionInPartition::for_row(&cr.key),
            MutationFragment::RangeTombstone(rt) => rt.start.position(),
            MutationFragment::PartitionEnd => PositionInPartition::partition_end(),
        }
    }
}
