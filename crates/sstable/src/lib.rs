//! # SSTable - Sorted String Table
//!
//! Immutable, on-disk table files and the readers that stream them as
//! [`mutation::MutationFragment`]s.
//!
//! An sstable is a set of component files sharing a name prefix
//! (`<version>-<generation>-<format>-`), see [`Descriptor`]:
//!
//! ```text
//! ┌──────────────────┬────────────────────────────────────────────────┐
//! │ Data.db          │ framed, CRC32-checked fragment records          │
//! │                  │ (LZ4-chunked when CompressionInfo is present)   │
//! ├──────────────────┼────────────────────────────────────────────────┤
//! │ Index.db         │ key -> data offset, one entry per partition     │
//! ├──────────────────┼────────────────────────────────────────────────┤
//! │ Summary.db       │ every min_index_interval-th index entry         │
//! ├──────────────────┼────────────────────────────────────────────────┤
//! │ CompressionInfo  │ chunk length and chunk offsets (optional)       │
//! ├──────────────────┼────────────────────────────────────────────────┤
//! │ Statistics.db    │ validation, compaction, stats, serialization    │
//! ├──────────────────┼────────────────────────────────────────────────┤
//! │ Scylla.db        │ sharding, features, run id, large data (opt.)   │
//! ├──────────────────┼────────────────────────────────────────────────┤
//! │ TOC.txt          │ the components present, written last            │
//! └──────────────────┴────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. Each module documents its own layout.
//!
//! ## Reading
//!
//! [`SSTable::open`] loads the small components. Readers implement
//! [`FragmentReader`]: [`SSTable::make_reader`] gives an index-backed
//! reader over a [`PartitionRange`], [`SSTable::make_crawling_reader`] a
//! reader that ignores the index. [`CombinedReader`] merges any number of
//! readers into one ordered stream. Every reader holds a [`ReaderPermit`].
//!
//! ## Writing
//!
//! [`SSTableWriter`] flushes a [`mutation::Memtable`]. This crate only
//! writes sstables to produce test fixtures; tools never modify them.

mod compress;
mod describe;
mod descriptor;
mod error;
mod format;
mod index;
mod merge;
mod permit;
mod reader;
mod scylla_metadata;
mod sstable;
mod statistics;
mod summary;
mod writer;

pub use compress::{compress_chunks, CompressedReader, CompressionInfo, DEFAULT_CHUNK_LEN, LZ4_COMPRESSOR};
pub use describe::{Describe, FieldValue, FieldVisitor};
pub use descriptor::{Descriptor, DEFAULT_FORMAT, DEFAULT_VERSION};
pub use error::{Component, Result, SstableError};
pub use format::{
    decode_fragment, encode_fragment, read_record, write_record, RawRecord, FRAME_HEADER_BYTES,
    KIND_CLUSTERING_ROW, KIND_PARTITION_END, KIND_PARTITION_START, KIND_RANGE_TOMBSTONE,
    KIND_STATIC_ROW, MAX_KEY_BYTES, MAX_RECORD_BYTES,
};
pub use index::{read_index_entry, write_index_entry, IndexCursor, IndexEntry};
pub use merge::CombinedReader;
pub use permit::{ReaderConcurrencySemaphore, ReaderPermit};
pub use reader::{FragmentReader, SSTableReader};
pub use scylla_metadata::{
    Feature, LargeDataStatsEntry, LargeDataType, ScyllaMetadata, ScyllaMetadataType, TokenBound,
    TokenRange,
};
pub use sstable::{ColumnSelection, DataInput, PartitionRange, SSTable};
pub use statistics::{
    ColumnDesc, CommitlogInterval, CompactionMetadata, EstimatedHistogram, MetadataType,
    ReplayPosition, SerializationHeader, Statistics, StatsMetadata, StreamingHistogram,
    ValidationMetadata,
};
pub use summary::{Summary, SummaryEntry, SummaryHeader, BASE_SAMPLING_LEVEL, DEFAULT_MIN_INDEX_INTERVAL};
pub use writer::{SSTableWriter, WriterOptions, PARTITIONER};

#[cfg(test)]
mod tests;
