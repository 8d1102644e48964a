//! The driving loop: readers in, consumer calls out.
//!
//! [`consume_sstables`] opens one reader per sstable (or one combined
//! reader over all of them), [`consume_reader`] walks a reader and feeds a
//! [`SstableConsumer`], applying the partition filter and honouring the
//! consumer's stop requests.
//!
//! A partition rejected by the filter never reaches the consumer. It is
//! skipped with [`FragmentReader::next_partition`], which lets an indexed
//! reader seek past it, or, with `no_skips`, by reading and discarding its
//! fragments. Both produce the same consumer calls.

use std::sync::Arc;

use mutation::MutationFragment;
use sstable::{
    ColumnSelection, CombinedReader, FragmentReader, PartitionRange, ReaderPermit, SSTable,
    SSTableReader,
};
use tracing::{debug, error, trace};

use crate::consumer::{dispatch, Flow, SstableConsumer};
use crate::error::{Result, ToolError};
use crate::filter::PartitionSet;

/// Stream-wide flags shared by every consumer operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamOptions {
    pub merge: bool,
    pub no_skips: bool,
}

pub(crate) fn make_reader(
    sstable: &Arc<SSTable>,
    permit: &ReaderPermit,
    crawling: bool,
) -> sstable::Result<SSTableReader> {
    if crawling {
        sstable.make_crawling_reader(permit)
    } else {
        sstable.make_reader(PartitionRange::full(), ColumnSelection::All, permit)
    }
}

/// Opens readers for `sstables` and hands each one to `consume`.
///
/// Unmerged, sstables are processed in the given order until `consume`
/// returns `Break`. A failing sstable is logged and the remaining ones are
/// still processed; the call then fails with
/// [`ToolError::SstablesFailed`]. Merged, any failure aborts the stream.
pub fn consume_sstables<F>(
    sstables: &[Arc<SSTable>],
    permit: &ReaderPermit,
    merge: bool,
    crawling: bool,
    mut consume: F,
) -> Result<()>
where
    F: FnMut(&mut dyn FragmentReader, Option<&SSTable>) -> Result<Flow>,
{
    debug!(sstables = sstables.len(), merge, crawling, "consuming sstables");
    if merge {
        let readers = sstables
            .iter()
            .map(|sst| make_reader(sst, permit, crawling))
            .collect::<sstable::Result<Vec<_>>>()?;
        let mut combined = CombinedReader::new(readers)?;
        return consume(&mut combined, None).map(|_| ());
    }

    let mut failed = 0;
    for sst in sstables {
        let outcome = make_reader(sst, permit, crawling)
            .map_err(ToolError::from)
            .and_then(|mut reader| consume(&mut reader, Some(sst.as_ref())));
        match outcome {
            Ok(flow) if flow.is_break() => {
                debug!("consumer requested a full stop");
                break;
            }
            Ok(_) => {}
            Err(ToolError::Sstable(e)) => {
                error!("{}", e);
                failed += 1;
            }
            Err(e) => return Err(e),
        }
    }
    if failed > 0 {
        return Err(ToolError::SstablesFailed {
            failed,
            total: sstables.len(),
        });
    }
    Ok(())
}

/// Feeds one reader to `consumer`, from `on_new_sstable` to
/// `on_end_of_sstable`. Returns what `on_end_of_sstable` returned.
///
/// If the reader fails, the open partition (if any) is closed and
/// `on_end_of_sstable` is called before the error is returned.
pub fn consume_reader<R, C>(
    reader: &mut R,
    consumer: &mut C,
    sstable: Option<&SSTable>,
    filter: Option<&PartitionSet>,
    no_skips: bool,
) -> Result<Flow>
where
    R: FragmentReader + ?Sized,
    C: SstableConsumer + ?Sized,
{
    if consumer.on_new_sstable(sstable)?.is_break() {
        debug!("consumer skipped the sstable");
        return consumer.on_end_of_sstable();
    }
    let mut session = ConsumptionSession::new(filter, no_skips);
    if let Err(e) = session.run(reader, consumer) {
        if session.open {
            debug!("reader failed inside a partition, closing it");
            let _ = consumer.consume_partition_end()?;
        }
        let _ = consumer.on_end_of_sstable()?;
        return Err(e);
    }
    let name = sstable.map_or_else(|| "merged stream".to_string(), SSTable::filename);
    debug!(
        sstable = %name,
        partitions = session.partitions,
        rejected = session.rejected,
        stopped_early = session.stopped_early,
        fragments = session.fragments,
        "sstable consumed"
    );
    consumer.on_end_of_sstable()
}

/// Per-reader state of [`consume_reader`].
struct ConsumptionSession<'a> {
    filter: Option<&'a PartitionSet>,
    no_skips: bool,
    /// A partition start was delivered and its end was not.
    open: bool,
    partitions: u64,
    rejected: u64,
    stopped_early: u64,
    fragments: u64,
}

impl<'a> ConsumptionSession<'a> {
    fn new(filter: Option<&'a PartitionSet>, no_skips: bool) -> Self {
        Self {
            filter,
            no_skips,
            open: false,
            partitions: 0,
            rejected: 0,
            stopped_early: 0,
            fragments: 0,
        }
    }

    fn run<R, C>(&mut self, reader: &mut R, consumer: &mut C) -> Result<()>
    where
        R: FragmentReader + ?Sized,
        C: SstableConsumer + ?Sized,
    {
        while let Some(fragment) = reader.next_fragment()? {
            self.fragments += 1;
            trace!(kind = %fragment.kind(), "consume");
            let flow = match fragment {
                MutationFragment::PartitionStart(ps) => {
                    if self.filter.is_some_and(|f| !f.admits(&ps.key)) {
                        self.rejected += 1;
                        self.skip_partition(reader)?;
                        continue;
                    }
                    self.partitions += 1;
                    let flow = consumer.consume_partition_start(ps)?;
                    self.open = true;
                    flow
                }
                MutationFragment::PartitionEnd => {
                    self.open = false;
                    if consumer.consume_partition_end()?.is_break() {
                        debug!("consumer stopped at partition end, skipping rest of sstable");
                        return Ok(());
                    }
                    continue;
                }
                other => dispatch(consumer, other)?,
            };
            if flow.is_break() {
                self.stopped_early += 1;
                self.skip_partition(reader)?;
                self.open = false;
                if consumer.consume_partition_end()?.is_break() {
                    debug!("consumer stopped at partition end, skipping rest of sstable");
                    return Ok(());
                }
            }
        }
        if self.open {
            debug!("stream ended inside a partition, closing it");
            self.open = false;
            let _ = consumer.consume_partition_end()?;
        }
        Ok(())
    }

    /// Drops the rest of the current partition, its end included.
    fn skip_partition<R: FragmentReader + ?Sized>(&mut self, reader: &mut R) -> Result<()> {
        if self.no_skips {
            while let Some(fragment) = reader.next_fragment()? {
                self.fragments += 1;
                if fragment.is_end_of_partition() {
                    break;
                }
            }
        } else {
            trace!("skipping to next partition");
            reader.next_partition()?;
        }
        Ok(())
    }
}

/// Runs a consumer over `sstables` from `on_start_of_stream` to
/// `on_end_of_stream`.
///
/// Without a partition filter there is nothing to skip, so crawling
/// readers are used and the index is never read.
pub fn run_consumer<C: SstableConsumer + ?Sized>(
    consumer: &mut C,
    sstables: &[Arc<SSTable>],
    permit: &ReaderPermit,
    partitions: &PartitionSet,
    options: StreamOptions,
) -> Result<()> {
    consumer.on_start_of_stream()?;
    let filter = (!partitions.is_empty()).then_some(partitions);
    let crawling = options.no_skips || filter.is_none();
    let streamed = consume_sstables(sstables, permit, options.merge, crawling, |reader, sst| {
        consume_reader(reader, consumer, sst, filter, options.no_skips)
    });
    let ended = consumer.on_end_of_stream();
    streamed.and(ended)
}
