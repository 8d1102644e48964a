//! # Mutation - the partition data model
//!
//! Types shared by every layer that reads or writes table data:
//!
//! - [`DecoratedKey`] and [`Token`]: partition identity and global order.
//! - [`ClusteringKey`], [`ClusteringBound`], [`PositionInPartition`]: order
//!   of rows and range tombstones inside a partition.
//! - [`Cell`], [`Row`], [`Tombstone`]: cell data with last-write-wins
//!   reconciliation.
//! - [`MutationFragment`]: the typed record of a partition's ordered stream.
//! - [`Memtable`]: sorted in-memory partitions, the input of the sstable
//!   writer.
//! - [`MutationFragmentStreamValidator`]: checks a stream against the
//!   ordering contract.

mod cell;
mod clustering;
mod fragment;
mod keys;
mod memtable;
mod validator;

pub use cell::{
    merge_tombstones, AtomicCell, Cell, CollectionMutation, Expiry, Row, RowMarker, Timestamp,
    Tombstone,
};
pub use clustering::{BoundKind, ClusteringBound, ClusteringKey, PositionInPartition, Region};
pub use fragment::{
    ClusteringRow, FragmentKind, MutationFragment, PartitionStart, RangeTombstone, StaticRow,
};
pub use keys::{DecoratedKey, Token};
pub use memtable::{row_with_cells, Memtable, Partition};
pub use validator::{MutationFragmentStreamValidator, ValidationError};

#[cfg(test)]
mod tests;
