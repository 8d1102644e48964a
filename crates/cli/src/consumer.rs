//! The consumer protocol.
//!
//! An operation that looks at the data itself implements [`SstableConsumer`]
//! and is driven by [`consume_reader`](crate::consume_reader). The driver
//! calls, in order:
//!
//! ```text
//! on_start_of_stream
//! per sstable (once, with None, when merging):
//!     on_new_sstable            Break: go straight to on_end_of_sstable
//!     per partition:
//!         consume_partition_start
//!         consume_static_row     Break on any of these: skip the rest of the
//!         consume_clustering_row partition, then consume_partition_end
//!         consume_range_tombstone
//!         consume_partition_end  Break: skip the rest of the sstable
//!     on_end_of_sstable         Break: do not open further sstables
//! on_end_of_stream              always called
//! ```

use std::ops::ControlFlow;

use mutation::{ClusteringRow, MutationFragment, PartitionStart, RangeTombstone, StaticRow};
use sstable::SSTable;

use crate::error::Result;

/// Whether the driver should keep feeding the current scope.
pub type Flow = ControlFlow<()>;

pub const CONTINUE: Flow = ControlFlow::Continue(());
pub const STOP: Flow = ControlFlow::Break(());

pub trait SstableConsumer {
    fn on_start_of_stream(&mut self) -> Result<()>;

    /// `sstable` is `None` when the inputs are merged into one stream.
    fn on_new_sstable(&mut self, sstable: Option<&SSTable>) -> Result<Flow>;

    fn consume_partition_start(&mut self, ps: PartitionStart) -> Result<Flow>;

    fn consume_static_row(&mut self, sr: StaticRow) -> Result<Flow>;

    fn consume_clustering_row(&mut self, cr: ClusteringRow) -> Result<Flow>;

    fn consume_range_tombstone(&mut self, rt: RangeTombstone) -> Result<Flow>;

    fn consume_partition_end(&mut self) -> Result<Flow>;

    fn on_end_of_sstable(&mut self) -> Result<Flow>;

    fn on_end_of_stream(&mut self) -> Result<()>;
}

/// Hands one fragment to the matching consumer method.
pub fn dispatch<C: SstableConsumer + ?Sized>(consumer: &mut C, fragment: MutationFragment) -> Result<Flow> {
    match fragment {
        MutationFragment::PartitionStart(ps) => consumer.consume_partition_start(ps),
        MutationFragment::StaticRow(sr) => consumer.consume_static_row(sr),
        MutationFragment::ClusteringRow(cr) => consumer.consume_clustering_row(cr),
        MutationFragment::RangeTombstone(rt) => consumer.consume_range_tombstone(rt),
        MutationFragment::PartitionEnd => consumer.consume_partition_end(),
    }
}

/// Scaffold for ad-hoc investigations: consumes everything, does nothing.
#[derive(Debug, Default)]
pub struct CustomConsumer;

impl SstableConsumer for CustomConsumer {
    fn on_start_of_stream(&mut self) -> Result<()> {
        Ok(())
    }

    fn on_new_sstable(&mut self, _sstable: Option<&SSTable>) -> Result<Flow> {
        Ok(CONTINUE)
    }

    fn consume_partition_start(&mut self, _ps: PartitionStart) -> Result<Flow> {
        Ok(CONTINUE)
    }

    fn consume_static_row(&mut self, _sr: StaticRow) -> Result<Flow> {
        Ok(CONTINUE)
    }

    fn consume_clustering_row(&mut self, _cr: ClusteringRow) -> Result<Flow> {
        Ok(CONTINUE)
    }

    fn consume_range_tombstone(&mut self, _rt: RangeTombstone) -> Result<Flow> {
        Ok(CONTINUE)
    }

    fn consume_partition_end(&mut self) -> Result<Flow> {
        Ok(CONTINUE)
    }

    fn on_end_of_sstable(&mut self) -> Result<Flow> {
        Ok(CONTINUE)
    }

    fn on_end_of_stream(&mut self) -> Result<()> {
        Ok(())
    }
}
