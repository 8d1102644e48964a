//! The operation registry and the entry point that runs one invocation.
//!
//! Every operation declares the `--operation-option` names it accepts.
//! Options are checked, keys parsed, sstables opened and the schema
//! resolved before anything is streamed, so a configuration error never
//! leaves partial output behind.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use schema::Schema;
use sstable::{ReaderConcurrencySemaphore, SSTable, SerializationHeader};
use tracing::{debug, info};

use crate::components::{self, check_flags_unusable};
use crate::config::ToolConfig;
use crate::consumer::CustomConsumer;
use crate::driver::{run_consumer, StreamOptions};
use crate::dump::DumpingConsumer;
use crate::error::{Result, ToolError};
use crate::filter::PartitionSet;
use crate::histogram::{Bucket, WritetimeHistogramConsumer};
use crate::validate::run_validation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Dump,
    DumpIndex,
    DumpCompressionInfo,
    DumpSummary,
    DumpStatistics,
    DumpScyllaMetadata,
    WritetimeHistogram,
    Custom,
    Validate,
}

impl OperationKind {
    /// The registry entry; [`OPERATIONS`] lists kinds in declaration order.
    pub fn operation(self) -> &'static Operation {
        &OPERATIONS[self as usize]
    }
}

#[derive(Debug)]
pub struct OperationOption {
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct Operation {
    pub name: &'static str,
    pub description: &'static str,
    pub options: &'static [OperationOption],
    pub kind: OperationKind,
}

impl Operation {
    pub fn find(name: &str) -> Option<&'static Operation> {
        OPERATIONS.iter().find(|op| op.name == name)
    }

    /// Whether the operation reads partitions from the Data component.
    pub fn streams_data(&self) -> bool {
        matches!(
            self.kind,
            OperationKind::Dump
                | OperationKind::WritetimeHistogram
                | OperationKind::Custom
                | OperationKind::Validate
        )
    }

    fn accepts(&self, option: &str) -> bool {
        self.options.iter().any(|o| o.name == option)
    }
}

pub static OPERATIONS: &[Operation] = &[
    Operation {
        name: "dump",
        description: "Dump the content of the sstable(s) as text",
        options: &[],
        kind: OperationKind::Dump,
    },
    Operation {
        name: "dump-index",
        description: "Dump the content of the index component",
        options: &[],
        kind: OperationKind::DumpIndex,
    },
    Operation {
        name: "dump-compression-info",
        description: "Dump the content of the compression-info component",
        options: &[],
        kind: OperationKind::DumpCompressionInfo,
    },
    Operation {
        name: "dump-summary",
        description: "Dump the content of the summary component",
        options: &[],
        kind: OperationKind::DumpSummary,
    },
    Operation {
        name: "dump-statistics",
        description: "Dump the content of the statistics component",
        options: &[],
        kind: OperationKind::DumpStatistics,
    },
    Operation {
        name: "dump-scylla-metadata",
        description: "Dump the content of the scylla-metadata component",
        options: &[],
        kind: OperationKind::DumpScyllaMetadata,
    },
    Operation {
        name: "writetime-histogram",
        description: "Generate a histogram of all the timestamps (writetime)",
        options: &[OperationOption {
            name: "bucket",
            description: "the unit of time to use as bucket, one of (years, months, weeks, days, hours)",
        }],
        kind: OperationKind::WritetimeHistogram,
    },
    Operation {
        name: "custom",
        description: "Hackable custom operation for expert users, does nothing by default",
        options: &[],
        kind: OperationKind::Custom,
    },
    Operation {
        name: "validate",
        description: "Validate the content of the sstable(s) with the mutation fragment stream validator",
        options: &[],
        kind: OperationKind::Validate,
    },
];

/// `--operation-option` values, merged into one map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationOptions {
    values: BTreeMap<String, String>,
}

impl OperationOptions {
    /// Parses `KEY=VALUE[:KEY=VALUE...]` arguments. A key given twice keeps
    /// the last value.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        let mut values = BTreeMap::new();
        for arg in args {
            for pair in arg.as_ref().split(':').filter(|p| !p.is_empty()) {
                let (key, value) = pair
                    .split_once('=')
                    .filter(|(k, _)| !k.is_empty())
                    .ok_or_else(|| ToolError::MalformedOption(arg.as_ref().to_string()))?;
                values.insert(key.to_string(), value.to_string());
            }
        }
        Ok(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Rejects options `operation` does not declare.
    pub fn check_against(&self, operation: &Operation) -> Result<()> {
        match self.values.keys().find(|k| !operation.accepts(k)) {
            Some(unknown) => Err(ToolError::UnknownOption {
                operation: operation.name.to_string(),
                option: unknown.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// One run of the tool, as given on the command line.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub operation: &'static Operation,
    pub sstables: Vec<PathBuf>,
    pub schema_file: Option<PathBuf>,
    pub partitions: Vec<String>,
    pub partitions_file: Option<PathBuf>,
    pub stream: StreamOptions,
    pub operation_options: OperationOptions,
}

impl Invocation {
    pub fn new(operation: &'static Operation, sstables: Vec<PathBuf>) -> Self {
        Self {
            operation,
            sstables,
            schema_file: None,
            partitions: Vec::new(),
            partitions_file: None,
            stream: StreamOptions::default(),
            operation_options: OperationOptions::default(),
        }
    }
}

pub fn open_sstables(paths: &[PathBuf]) -> Result<Vec<Arc<SSTable>>> {
    paths
        .iter()
        .map(|path| {
            if !path.exists() {
                return Err(ToolError::MissingSstable(path.clone()));
            }
            Ok(SSTable::open(path)?)
        })
        .collect()
}

/// The schema given with `--schema-file`, or the one stored in the first
/// sstable. Under `merge` every sstable must agree with it.
pub fn resolve_schema(
    schema_file: Option<&Path>,
    sstables: &[Arc<SSTable>],
    merge: bool,
) -> Result<Schema> {
    let schema = match (schema_file, sstables.first()) {
        (Some(path), _) => Schema::load_from_file(path)?,
        (None, Some(first)) => first.derive_schema()?,
        (None, None) => return Err(ToolError::NoSstables),
    };
    debug!(keyspace = schema.keyspace(), table = schema.table(), "schema resolved");
    if merge {
        let expected = SerializationHeader::for_schema(&schema);
        for sst in sstables {
            check_header(sst, &expected)?;
        }
    }
    Ok(schema)
}

fn check_header(sst: &SSTable, expected: &SerializationHeader) -> Result<()> {
    let Some(header) = sst.serialization_header() else {
        return Ok(());
    };
    let mismatch = |reason: String| ToolError::SchemaMismatch {
        sstable: sst.filename(),
        reason,
    };
    if header.pk_type_name != expected.pk_type_name {
        return Err(mismatch(format!(
            "partition key type {} != {}",
            header.pk_type_name, expected.pk_type_name
        )));
    }
    if header.clustering_key_types_names != expected.clustering_key_types_names {
        return Err(mismatch(format!(
            "clustering key types [{}] != [{}]",
            header.clustering_key_types_names.join(", "),
            expected.clustering_key_types_names.join(", ")
        )));
    }
    if header.static_columns != expected.static_columns {
        return Err(mismatch("static columns differ".to_string()));
    }
    if header.regular_columns != expected.regular_columns {
        return Err(mismatch("regular columns differ".to_string()));
    }
    Ok(())
}

/// Runs `invocation`, writing operation output to `out`.
pub fn run(invocation: &Invocation, config: &ToolConfig, out: &mut dyn Write) -> Result<()> {
    let op = invocation.operation;
    invocation.operation_options.check_against(op)?;
    let bucket = match invocation.operation_options.get("bucket") {
        Some(value) => value.parse::<Bucket>()?,
        None => Bucket::default(),
    };
    if invocation.sstables.is_empty() {
        return Err(ToolError::NoSstables);
    }
    let partitions = PartitionSet::parse(
        &invocation.partitions,
        invocation.partitions_file.as_deref(),
    )?;
    let sstables = open_sstables(&invocation.sstables)?;
    let schema = resolve_schema(
        invocation.schema_file.as_deref(),
        &sstables,
        invocation.stream.merge,
    )?;

    let semaphore = ReaderConcurrencySemaphore::new("sstable-tool", config.max_readers);
    let permit = semaphore.obtain_permit(op.name);
    info!(operation = op.name, sstables = sstables.len(), "running");

    let stream = invocation.stream;
    if !op.streams_data() {
        check_flags_unusable(op.name, &partitions, stream, false);
    }
    match op.kind {
        OperationKind::Dump => {
            let mut consumer = DumpingConsumer::new(&schema, out);
            run_consumer(&mut consumer, &sstables, &permit, &partitions, stream)
        }
        OperationKind::WritetimeHistogram => {
            let mut consumer = WritetimeHistogramConsumer::new(bucket, &config.output_dir);
            run_consumer(&mut consumer, &sstables, &permit, &partitions, stream)
        }
        OperationKind::Custom => {
            run_consumer(&mut CustomConsumer, &sstables, &permit, &partitions, stream)
        }
        OperationKind::Validate => {
            check_flags_unusable(op.name, &partitions, stream, true);
            run_validation(&sstables, &permit, stream.merge, out)
        }
        OperationKind::DumpIndex => components::dump_index(&sstables, &schema, out),
        OperationKind::DumpCompressionInfo => components::dump_compression_info(&sstables, out),
        OperationKind::DumpSummary => components::dump_summary(&sstables, &schema, out),
        OperationKind::DumpStatistics => components::dump_statistics(&sstables, out),
        OperationKind::DumpScyllaMetadata => components::dump_scylla_metadata(&sstables, out),
    }
}
