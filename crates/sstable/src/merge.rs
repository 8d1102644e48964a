//! Merging reader over several [`FragmentReader`]s.
//!
//! Produces one stream in global order. Partitions with the same key in
//! several sources come out once: partition tombstones are merged, equal
//! static and clustering rows are reconciled cell by cell, and range
//! tombstones with identical bounds are merged into one.
//!
//! Two heaps drive the merge, both min-ordered by reversing `Ord` the way a
//! `BinaryHeap` wants it: one over the next partition key of every idle
//! source, one over the next in-partition position of every source that
//! contributes to the current partition.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use mutation::{
    merge_tombstones, DecoratedKey, MutationFragment, PartitionStart, PositionInPartition,
};
use tracing::{trace, warn};

use crate::error::Result;
use crate::reader::FragmentReader;

/// Next partition of one source.
struct KeyEntry {
    key: DecoratedKey,
    source: usize,
}

impl PartialEq for KeyEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyEntry {}

impl PartialOrd for KeyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Smallest key first; lower source index on ties.
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// Next fragment position of one source inside the current partition.
struct PositionEntry {
    position: PositionInPartition,
    source: usize,
}

impl PartialEq for PositionEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PositionEntry {}

impl PartialOrd for PositionEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PositionEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .position
            .cmp(&self.position)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// Merges N fragment streams into one.
pub struct CombinedReader<R> {
    sources: Vec<R>,
    partitions: BinaryHeap<KeyEntry>,
    positions: BinaryHeap<PositionEntry>,
    /// Sources contributing to the current partition.
    active: Vec<usize>,
    inside: bool,
    peeked: Option<MutationFragment>,
}

impl<R: FragmentReader> CombinedReader<R> {
    pub fn new(sources: Vec<R>) -> Result<Self> {
        let mut reader = Self {
            partitions: BinaryHeap::with_capacity(sources.len()),
            positions: BinaryHeap::with_capacity(sources.len()),
            active: Vec::with_capacity(sources.len()),
            sources,
            inside: false,
            peeked: None,
        };
        for source in 0..reader.sources.len() {
            reader.queue_partition(source)?;
        }
        Ok(reader)
    }

    #[must_use]
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Puts `source` back on the partition heap if it has another partition.
    fn queue_partition(&mut self, source: usize) -> Result<()> {
        loop {
            match self.sources[source].peek()? {
                None => return Ok(()),
                Some(MutationFragment::PartitionStart(ps)) => {
                    let key = ps.key.clone();
                    self.partitions.push(KeyEntry { key, source });
                    return Ok(());
                }
                Some(other) => {
                    warn!(source, kind = %other.kind(), "dropping fragment outside of a partition");
                    self.sources[source].next_fragment()?;
                }
            }
        }
    }

    /// Queues the next in-partition fragment of `source`, consuming its
    /// `PartitionEnd` when the source is done with the partition.
    fn queue_position(&mut self, source: usize) -> Result<()> {
        let position = match self.sources[source].peek()? {
            None | Some(MutationFragment::PartitionStart(_)) => return Ok(()),
            Some(MutationFragment::PartitionEnd) => None,
            Some(f) => Some(f.position()),
        };
        match position {
            Some(position) => self.positions.push(PositionEntry { position, source }),
            None => {
                self.sources[source].next_fragment()?;
            }
        }
        Ok(())
    }

    fn start_partition(&mut self) -> Result<Option<MutationFragment>> {
        let Some(first) = self.partitions.pop() else {
            return Ok(None);
        };
        let mut sources = vec![first.source];
        while self.partitions.peek().is_some_and(|e| e.key == first.key) {
            if let Some(e) = self.partitions.pop() {
                sources.push(e.source);
            }
        }

        let mut tombstone = None;
        for &source in &sources {
            if let Some(MutationFragment::PartitionStart(ps)) = self.sources[source].next_fragment()? {
                tombstone = merge_tombstones(tombstone, ps.tombstone);
            }
        }
        trace!(key = %first.key, sources = sources.len(), "merging partition");
        for &source in &sources {
            self.queue_position(source)?;
        }
        self.active = sources;
        self.inside = true;
        Ok(Some(MutationFragment::PartitionStart(PartitionStart {
            key: first.key,
            tombstone,
        })))
    }

    fn end_partition(&mut self) -> Result<()> {
        self.inside = false;
        self.positions.clear();
        for source in std::mem::take(&mut self.active) {
            self.queue_partition(source)?;
        }
        Ok(())
    }

    fn produce(&mut self) -> Result<Option<MutationFragment>> {
        if !self.inside {
            return self.start_partition();
        }
        let Some(top) = self.positions.pop() else {
            self.end_partition()?;
            return Ok(Some(MutationFragment::PartitionEnd));
        };
        let Some(mut merged) = self.sources[top.source].next_fragment()? else {
            return self.produce();
        };

        let mut deferred = Vec::new();
        while self
            .positions
            .peek()
            .is_some_and(|e| e.position == top.position)
        {
            let Some(entry) = self.positions.pop() else {
                break;
            };
            let mergeable = match (&merged, self.sources[entry.source].peek()?) {
                (MutationFragment::StaticRow(_), Some(MutationFragment::StaticRow(_))) => true,
                (MutationFragment::ClusteringRow(_), Some(MutationFragment::ClusteringRow(_))) => {
                    true
                }
                (
                    MutationFragment::RangeTombstone(a),
                    Some(MutationFragment::RangeTombstone(b)),
                ) => a.start == b.start && a.end == b.end,
                _ => false,
            };
            if !mergeable {
                deferred.push(entry);
                continue;
            }
            match (&mut merged, self.sources[entry.source].next_fragment()?) {
                (MutationFragment::StaticRow(a), Some(MutationFragment::StaticRow(b))) => {
                    a.apply(b)
                }
                (MutationFragment::ClusteringRow(a), Some(MutationFragment::ClusteringRow(b))) => {
                    a.apply(b)
                }
                (MutationFragment::RangeTombstone(a), Some(MutationFragment::RangeTombstone(b))) => {
                    a.tombstone = a.tombstone.max(b.tombstone)
                }
                _ => {}
            }
            self.queue_position(entry.source)?;
        }
        self.positions.extend(deferred);
        self.queue_position(top.source)?;
        Ok(Some(merged))
    }
}

impl<R: FragmentReader> FragmentReader for CombinedReader<R> {
    fn next_fragment(&mut self) -> Result<Option<MutationFragment>> {
        match self.peeked.take() {
            Some(f) => Ok(Some(f)),
            None => self.produce(),
        }
    }

    fn peek(&mut self) -> Result<Option<&MutationFragment>> {
        if self.peeked.is_none() {
            self.peeked = self.produce()?;
        }
        Ok(self.peeked.as_ref())
    }

    fn next_partition(&mut self) -> Result<()> {
        match &self.peeked {
            Some(MutationFragment::PartitionStart(_)) => return Ok(()),
            Some(MutationFragment::PartitionEnd) => {
                self.peeked = None;
                return Ok(());
            }
            Some(_) => self.peeked = None,
            None => {}
        }
        if !self.inside {
            return Ok(());
        }
        for &source in &self.active {
            self.sources[source].next_partition()?;
        }
        self.end_partition()
    }
}
