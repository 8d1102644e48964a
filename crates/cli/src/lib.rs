//! # sstable-tool - offline sstable inspection
//!
//! Operations over one or more sstables, selected by name:
//!
//! ```text
//! dump                   every fragment as text
//! dump-index             index entries
//! dump-compression-info  compression parameters and chunk offsets
//! dump-summary           summary header, samples, first/last key
//! dump-statistics        the statistics metadata blocks
//! dump-scylla-metadata   sharding, features, run id, large data stats
//! writetime-histogram    histogram of write timestamps (JSON)
//! custom                 consumes everything, does nothing
//! validate               checks the fragment stream ordering
//! ```
//!
//! Data operations implement [`SstableConsumer`] and are driven by
//! [`run_consumer`], which applies the partition filter ([`PartitionSet`])
//! and the consumer's stop requests. With `merge`, all sstables are read
//! as one stream through a [`sstable::CombinedReader`].
//!
//! [`run`] is the entry point used by the binary.

mod components;
mod config;
mod consumer;
mod driver;
mod dump;
mod error;
mod filter;
mod histogram;
mod operation;
mod text_dumper;
mod validate;

pub use components::{
    check_flags_unusable, dump_compression_info, dump_index, dump_scylla_metadata,
    dump_statistics, dump_summary,
};
pub use config::{env_or, ToolConfig, MAX_READERS_VAR, OUTPUT_DIR_VAR};
pub use consumer::{dispatch, CustomConsumer, Flow, SstableConsumer, CONTINUE, STOP};
pub use driver::{consume_reader, consume_sstables, run_consumer, StreamOptions};
pub use dump::DumpingConsumer;
pub use error::{Result, ToolError};
pub use filter::PartitionSet;
pub use histogram::{Bucket, HistogramFile, WritetimeHistogramConsumer};
pub use operation::{
    open_sstables, resolve_schema, run, Invocation, Operation, OperationKind, OperationOption,
    OperationOptions, OPERATIONS,
};
pub use text_dumper::TextDumper;
pub use validate::{run_validation, validate_stream, Verdict};

#[cfg(test)]
mod tests;
