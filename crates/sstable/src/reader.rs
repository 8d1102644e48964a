use std::io::{Seek, SeekFrom};
use std::sync::Arc;

use mutation::{DecoratedKey, MutationFragment};
use tracing::{debug, trace};

use crate::error::{Component, ComponentContext, Result};
use crate::format::{decode_fragment, read_record, RawRecord, KIND_PARTITION_END};
use crate::index::IndexCursor;
use crate::permit::ReaderPermit;
use crate::sstable::{ColumnSelection, DataInput, PartitionRange, SSTable};

/// A pull-based producer of mutation fragments.
///
/// Fragments come out in stream order: partitions in increasing
/// [`DecoratedKey`] order, and within each partition the order documented on
/// [`MutationFragment`].
pub trait FragmentReader {
    /// Next fragment, or `None` at end of stream.
    fn next_fragment(&mut self) -> Result<Option<MutationFragment>>;

    /// The fragment [`next_fragment`](Self::next_fragment) would return.
    fn peek(&mut self) -> Result<Option<&MutationFragment>>;

    /// Drops what is left of the current partition, including its
    /// `PartitionEnd`. The next fragment is the following `PartitionStart`
    /// (or end of stream). Between partitions this does nothing.
    fn next_partition(&mut self) -> Result<()>;
}

impl<R: FragmentReader + ?Sized> FragmentReader for Box<R> {
    fn next_fragment(&mut self) -> Result<Option<MutationFragment>> {
        (**self).next_fragment()
    }

    fn peek(&mut self) -> Result<Option<&MutationFragment>> {
        (**self).peek()
    }

    fn next_partition(&mut self) -> Result<()> {
        (**self).next_partition()
    }
}

/// Reads the fragments of one sstable.
///
/// Two flavours exist. An *indexed* reader (from
/// [`SSTable::make_reader`]) seeks to the first partition of its range with
/// the summary and index, and skips partitions by jumping to the next index
/// entry. A *crawling* reader (from [`SSTable::make_crawling_reader`])
/// never opens the index: it reads the Data component front to back and
/// skips by reading record frames without decoding them.
///
/// Both verify every record checksum they read.
pub struct SSTableReader {
    sstable: Arc<SSTable>,
    input: Box<dyn DataInput>,
    /// Offset of the next record in the uncompressed data stream.
    pos: u64,
    range: PartitionRange,
    selection: ColumnSelection,
    /// `None` for crawling readers.
    index: Option<IndexCursor>,
    buffered: Option<MutationFragment>,
    /// Key of the partition the last fetched fragment belongs to.
    current_key: Option<DecoratedKey>,
    /// A `PartitionStart` was fetched and its `PartitionEnd` was not.
    inside: bool,
    eos: bool,
    _permit: ReaderPermit,
}

impl SSTableReader {
    pub(crate) fn indexed(
        sstable: Arc<SSTable>,
        range: PartitionRange,
        selection: ColumnSelection,
        permit: ReaderPermit,
    ) -> Result<Self> {
        let input = sstable.open_data()?;
        let index_path = sstable.index_path();
        let start_position = match &range.start {
            std::ops::Bound::Unbounded => 0,
            std::ops::Bound::Included(key) | std::ops::Bound::Excluded(key) => {
                sstable.summary().index_position_for(key)
            }
        };
        let mut index = IndexCursor::open(&index_path, start_position)?;
        let mut reader = Self::with_input(sstable, input, range, selection, permit);

        let first = index.advance_until(|key| !reader.range.before_start(key))?;
        match first {
            Some(entry) if !reader.range.after_end(&entry.key) => {
                debug!(
                    sstable = %reader.sstable.filename(),
                    key = %entry.key,
                    offset = entry.data_offset,
                    "positioned reader at range start"
                );
                reader.seek_to(entry.data_offset)?;
            }
            _ => reader.eos = true,
        }
        reader.index = Some(index);
        Ok(reader)
    }

    pub(crate) fn crawling(sstable: Arc<SSTable>, permit: ReaderPermit) -> Result<Self> {
        let input = sstable.open_data()?;
        Ok(Self::with_input(
            sstable,
            input,
            PartitionRange::full(),
            ColumnSelection::All,
            permit,
        ))
    }

    fn with_input(
        sstable: Arc<SSTable>,
        input: Box<dyn DataInput>,
        range: PartitionRange,
        selection: ColumnSelection,
        permit: ReaderPermit,
    ) -> Self {
        Self {
            sstable,
            input,
            pos: 0,
            range,
            selection,
            index: None,
            buffered: None,
            current_key: None,
            inside: false,
            eos: false,
            _permit: permit,
        }
    }

    pub fn sstable(&self) -> &Arc<SSTable> {
        &self.sstable
    }

    #[must_use]
    pub fn is_crawling(&self) -> bool {
        self.index.is_none()
    }

    fn seek_to(&mut self, offset: u64) -> Result<()> {
        let path = self.sstable.data_path();
        self.input
            .seek(SeekFrom::Start(offset))
            .in_component(path, Component::Data)?;
        self.pos = offset;
        Ok(())
    }

    fn read_raw(&mut self) -> Result<Option<RawRecord>> {
        if self.pos >= self.sstable.data_len() {
            return Ok(None);
        }
        let record = read_record(&mut self.input, self.pos)
            .in_component(self.sstable.data_path(), Component::Data)?;
        if let Some(r) = &record {
            self.pos += r.frame_len();
        }
        Ok(record)
    }

    fn fetch(&mut self) -> Result<Option<MutationFragment>> {
        loop {
            if self.eos {
                return Ok(None);
            }
            let Some(raw) = self.read_raw()? else {
                self.eos = true;
                return Ok(None);
            };
            let mut fragment = decode_fragment(raw.kind, &raw.body)
                .in_component(self.sstable.data_path(), Component::Data)?;
            match &mut fragment {
                MutationFragment::PartitionStart(ps) => {
                    if self.range.after_end(&ps.key) {
                        self.eos = true;
                        return Ok(None);
                    }
                    self.current_key = Some(ps.key.clone());
                    self.inside = true;
                    if self.range.before_start(&ps.key) {
                        self.skip_partition()?;
                        continue;
                    }
                }
                MutationFragment::PartitionEnd => self.inside = false,
                MutationFragment::StaticRow(sr) => {
                    if let ColumnSelection::Only { static_columns, .. } = &self.selection {
                        sr.cells.retain_columns(|c| static_columns.contains(&c));
                    }
                }
                MutationFragment::ClusteringRow(cr) => {
                    if let ColumnSelection::Only {
                        regular_columns, ..
                    } = &self.selection
                    {
                        cr.cells.retain_columns(|c| regular_columns.contains(&c));
                    }
                }
                MutationFragment::RangeTombstone(_) => {}
            }
            return Ok(Some(fragment));
        }
    }

    /// Moves past the rest of the partition being fetched.
    fn skip_partition(&mut self) -> Result<()> {
        self.inside = false;
        let Some(current) = self.current_key.clone() else {
            return Ok(());
        };
        if let Some(index) = self.index.as_mut() {
            let next = index.next_after(&current)?;
            return match next {
                Some(entry) => {
                    trace!(from = %current, to = %entry.key, offset = entry.data_offset, "index skip");
                    self.seek_to(entry.data_offset)
                }
                None => {
                    self.eos = true;
                    Ok(())
                }
            };
        }
        while let Some(raw) = self.read_raw()? {
            if raw.kind == KIND_PARTITION_END {
                return Ok(());
            }
        }
        self.eos = true;
        Ok(())
    }
}

impl FragmentReader for SSTableReader {
    fn next_fragment(&mut self) -> Result<Option<MutationFragment>> {
        match self.buffered.take() {
            Some(f) => Ok(Some(f)),
            None => self.fetch(),
        }
    }

    fn peek(&mut self) -> Result<Option<&MutationFragment>> {
        if self.buffered.is_none() {
            self.buffered = self.fetch()?;
        }
        Ok(self.buffered.as_ref())
    }

    fn next_partition(&mut self) -> Result<()> {
        match &self.buffered {
            Some(MutationFragment::PartitionStart(_)) => return Ok(()),
            Some(MutationFragment::PartitionEnd) => {
                self.buffered = None;
                return Ok(());
            }
            Some(_) => self.buffered = None,
            None => {}
        }
        if self.inside {
            self.skip_partition()?;
        }
        Ok(())
    }
}
