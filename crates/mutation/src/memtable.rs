//! In-memory, sorted collection of partitions.
//!
//! A [`Memtable`] accumulates partition mutations keyed by decorated key and
//! reconciles repeated writes to the same partition, row, or cell. It is the
//! input of the sstable writer, which turns each [`Partition`] into its
//! ordered fragment run.

use std::collections::BTreeMap;

use crate::cell::{merge_tombstones, Cell, Row, Tombstone};
use crate::clustering::ClusteringKey;
use crate::fragment::{ClusteringRow, MutationFragment, PartitionStart, RangeTombstone, StaticRow};
use crate::keys::DecoratedKey;

/// All the data of one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    key: DecoratedKey,
    tombstone: Option<Tombstone>,
    static_row: Option<StaticRow>,
    rows: BTreeMap<ClusteringKey, ClusteringRow>,
    range_tombstones: Vec<RangeTombstone>,
}

impl Partition {
    pub fn new(key: DecoratedKey) -> Self {
        Self {
            key,
            tombstone: None,
            static_row: None,
            rows: BTreeMap::new(),
            range_tombstones: Vec::new(),
        }
    }

    pub fn key(&self) -> &DecoratedKey {
        &self.key
    }

    pub fn tombstone(&self) -> Option<Tombstone> {
        self.tombstone
    }

    pub fn delete(&mut self, tombstone: Tombstone) {
        self.tombstone = merge_tombstones(self.tombstone, Some(tombstone));
    }

    pub fn set_static_cell(&mut self, column: u32, cell: Cell) {
        self.static_row
            .get_or_insert_with(StaticRow::default)
            .cells
            .insert(column, cell);
    }

    pub fn upsert_row(&mut self, row: ClusteringRow) {
        match self.rows.get_mut(&row.key) {
            Some(existing) => existing.apply(row),
            None => {
                self.rows.insert(row.key.clone(), row);
            }
        }
    }

    pub fn add_range_tombstone(&mut self, rt: RangeTombstone) {
        self.range_tombstones.push(rt);
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Merges another version of the same partition into this one.
    pub fn apply(&mut self, other: Partition) {
        debug_assert_eq!(self.key, other.key);
        self.tombstone = merge_tombstones(self.tombstone, other.tombstone);
        if let Some(sr) = other.static_row {
            match &mut self.static_row {
                Some(mine) => mine.apply(sr),
                None => self.static_row = Some(sr),
            }
        }
        for row in other.rows.into_values() {
            self.upsert_row(row);
        }
        self.range_tombstones.extend(other.range_tombstones);
    }

    /// The partition as an ordered fragment run, start to end.
    pub fn fragments(&self) -> Vec<MutationFragment> {
        let mut clustered: Vec<MutationFragment> = self
            .rows
            .values()
            .cloned()
            .map(MutationFragment::ClusteringRow)
            .chain(
                self.range_tombstones
                    .iter()
                    .cloned()
                    .map(MutationFragment::RangeTombstone),
            )
            .collect();
        clustered.sort_by_key(MutationFragment::position);

        let mut out = Vec::with_capacity(clustered.len() + 3);
        out.push(MutationFragment::PartitionStart(PartitionStart {
            key: self.key.clone(),
            tombstone: self.tombstone,
        }));
        if let Some(sr) = self.static_row.as_ref().filter(|sr| !sr.cells.is_empty()) {
            out.push(MutationFragment::StaticRow(sr.clone()));
        }
        out.extend(clustered);
        out.push(MutationFragment::PartitionEnd);
        out
    }
}

/// Sorted partitions, ready to be flushed to an sstable.
#[derive(Debug, Default)]
pub struct Memtable {
    partitions: BTreeMap<DecoratedKey, Partition>,
}

impl Memtable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a partition, merging it with any existing version.
    pub fn apply(&mut self, partition: Partition) {
        match self.partitions.get_mut(&partition.key) {
            Some(existing) => existing.apply(partition),
            None => {
                self.partitions.insert(partition.key.clone(), partition);
            }
        }
    }

    /// Convenience for the common case of writing one row.
    pub fn put_row(&mut self, key: DecoratedKey, row: ClusteringRow) {
        let mut p = Partition::new(key);
        p.upsert_row(row);
        self.apply(p);
    }

    /// Partitions in decorated-key order.
    pub fn iter(&self) -> impl Iterator<Item = &Partition> {
        self.partitions.values()
    }

    pub fn get(&self, key: &DecoratedKey) -> Option<&Partition> {
        self.partitions.get(key)
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}

/// Builds a row with the given cells; handy for fixtures.
pub fn row_with_cells(key: ClusteringKey, cells: impl IntoIterator<Item = (u32, Cell)>) -> ClusteringRow {
    ClusteringRow::new(key).with_cells(cells.into_iter().collect::<Row>())
}
