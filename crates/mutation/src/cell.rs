//! Cells, rows, and tombstones with last-write-wins reconciliation.
//!
//! When the same cell is observed in several sstables the one with the
//! higher write timestamp wins. On equal timestamps a deletion beats a live
//! value, and two live values are ordered by their bytes, so the outcome
//! does not depend on which sstable was read first.

use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Write timestamp, microseconds since the Unix epoch.
pub type Timestamp = i64;

/// A deletion marker.
///
/// `deletion_time` is the local deletion time in seconds since the epoch.
/// Ordering (timestamp first) gives tombstone precedence: the greater one
/// shadows the lesser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tombstone {
    pub timestamp: Timestamp,
    pub deletion_time: i64,
}

impl Tombstone {
    pub fn new(timestamp: Timestamp, deletion_time: i64) -> Self {
        Self {
            timestamp,
            deletion_time,
        }
    }
}

/// Keeps the greater of two optional tombstones.
pub fn merge_tombstones(a: Option<Tombstone>, b: Option<Tombstone>) -> Option<Tombstone> {
    a.max(b)
}

/// Time-to-live attached to a live cell or row marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Expiry {
    pub ttl: i32,
    /// Seconds since the epoch at which the value expires.
    pub expires_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AtomicCell {
    Live {
        timestamp: Timestamp,
        value: Vec<u8>,
        expiry: Option<Expiry>,
    },
    Dead {
        timestamp: Timestamp,
        deletion_time: i64,
    },
}

impl AtomicCell {
    pub fn live(timestamp: Timestamp, value: impl Into<Vec<u8>>) -> Self {
        AtomicCell::Live {
            timestamp,
            value: value.into(),
            expiry: None,
        }
    }

    pub fn dead(timestamp: Timestamp, deletion_time: i64) -> Self {
        AtomicCell::Dead {
            timestamp,
            deletion_time,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            AtomicCell::Live { timestamp, .. } | AtomicCell::Dead { timestamp, .. } => *timestamp,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, AtomicCell::Live { .. })
    }

    /// Returns the winner of two versions of the same cell.
    pub fn reconcile(self, other: AtomicCell) -> AtomicCell {
        if precedence(&other, &self) == Ordering::Greater {
            other
        } else {
            self
        }
    }
}

fn precedence(a: &AtomicCell, b: &AtomicCell) -> Ordering {
    a.timestamp().cmp(&b.timestamp()).then_with(|| match (a, b) {
        (AtomicCell::Dead { .. }, AtomicCell::Live { .. }) => Ordering::Greater,
        (AtomicCell::Live { .. }, AtomicCell::Dead { .. }) => Ordering::Less,
        (
            AtomicCell::Dead { deletion_time: da, .. },
            AtomicCell::Dead { deletion_time: db, .. },
        ) => da.cmp(db),
        (
            AtomicCell::Live { value: va, expiry: ea, .. },
            AtomicCell::Live { value: vb, expiry: eb, .. },
        ) => va.cmp(vb).then_with(|| ea.cmp(eb)),
    })
}

/// The cells of one non-frozen collection column, keyed by cell path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CollectionMutation {
    pub tombstone: Option<Tombstone>,
    pub cells: BTreeMap<Vec<u8>, AtomicCell>,
}

impl CollectionMutation {
    pub fn apply(&mut self, other: CollectionMutation) {
        self.tombstone = merge_tombstones(self.tombstone, other.tombstone);
        for (path, cell) in other.cells {
            merge_into(&mut self.cells, path, cell, AtomicCell::reconcile);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Cell {
    Atomic(AtomicCell),
    Collection(CollectionMutation),
}

impl Cell {
    pub fn live(timestamp: Timestamp, value: impl Into<Vec<u8>>) -> Self {
        Cell::Atomic(AtomicCell::live(timestamp, value))
    }

    /// Highest timestamp carried by the cell, if any.
    pub fn max_timestamp(&self) -> Option<Timestamp> {
        match self {
            Cell::Atomic(c) => Some(c.timestamp()),
            Cell::Collection(m) => m
                .cells
                .values()
                .map(AtomicCell::timestamp)
                .chain(m.tombstone.map(|t| t.timestamp))
                .max(),
        }
    }

    pub fn reconcile(self, other: Cell) -> Cell {
        match (self, other) {
            (Cell::Atomic(a), Cell::Atomic(b)) => Cell::Atomic(a.reconcile(b)),
            (Cell::Collection(mut a), Cell::Collection(b)) => {
                a.apply(b);
                Cell::Collection(a)
            }
            // Mismatched shapes only arise from conflicting schemas; keep the newer write.
            (a, b) => {
                if b.max_timestamp() > a.max_timestamp() {
                    b
                } else {
                    a
                }
            }
        }
    }
}

/// Cells of a row keyed by column id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Row {
    cells: BTreeMap<u32, Cell>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: u32, cell: Cell) {
        merge_into(&mut self.cells, column, cell, Cell::reconcile);
    }

    pub fn with_cell(mut self, column: u32, cell: Cell) -> Self {
        self.insert(column, cell);
        self
    }

    pub fn apply(&mut self, other: Row) {
        for (column, cell) in other.cells {
            self.insert(column, cell);
        }
    }

    /// Drops the cells whose column is rejected by `keep`.
    pub fn retain_columns(&mut self, mut keep: impl FnMut(u32) -> bool) {
        self.cells.retain(|column, _| keep(*column));
    }

    pub fn cells(&self) -> impl Iterator<Item = (u32, &Cell)> {
        self.cells.iter().map(|(id, cell)| (*id, cell))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl FromIterator<(u32, Cell)> for Row {
    fn from_iter<I: IntoIterator<Item = (u32, Cell)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, cell) in iter {
            row.insert(column, cell);
        }
        row
    }
}

/// Liveness marker of a clustering row, independent of its cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowMarker {
    pub timestamp: Timestamp,
    pub expiry: Option<Expiry>,
}

impl RowMarker {
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            expiry: None,
        }
    }
}

fn merge_into<K: Ord, V>(map: &mut BTreeMap<K, V>, key: K, value: V, reconcile: fn(V, V) -> V) {
    let merged = match map.remove(&key) {
        Some(existing) => reconcile(existing, value),
        None => value,
    };
    map.insert(key, merged);
}
