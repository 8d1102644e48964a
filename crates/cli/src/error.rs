use std::path::PathBuf;

use thiserror::Error;

/// Everything that can make an invocation fail.
///
/// Configuration errors are detected before any sstable is streamed and
/// exit with status 2; everything else exits with 1.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("operation {operation} doesn't have option {option}")]
    UnknownOption { operation: String, option: String },

    #[error("malformed operation option '{0}', expected KEY=VALUE[:KEY=VALUE...]")]
    MalformedOption(String),

    #[error("invalid value for {operation} option {option}: {value}")]
    InvalidOptionValue {
        operation: String,
        option: String,
        value: String,
    },

    #[error("no sstables specified on the command line")]
    NoSstables,

    #[error("sstable {} does not exist", .0.display())]
    MissingSstable(PathBuf),

    #[error("invalid partition key '{key}': {source}")]
    InvalidPartitionKey {
        key: String,
        #[source]
        source: hex::FromHexError,
    },

    #[error("could not read partitions file {}: {source}", .path.display())]
    PartitionsFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not load schema: {0}")]
    Schema(#[from] schema::SchemaError),

    #[error("sstable {sstable} does not match the schema: {reason}")]
    SchemaMismatch { sstable: String, reason: String },

    #[error(transparent)]
    Sstable(#[from] sstable::SstableError),

    #[error("could not write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("could not encode histogram: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{failed} of {total} sstable(s) could not be processed")]
    SstablesFailed { failed: usize, total: usize },
}

impl ToolError {
    /// Process exit status for this error.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        if self.is_configuration_error() {
            2
        } else {
            1
        }
    }

    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ToolError::UnknownOption { .. }
                | ToolError::MalformedOption(_)
                | ToolError::InvalidOptionValue { .. }
                | ToolError::NoSstables
                | ToolError::MissingSstable(_)
                | ToolError::InvalidPartitionKey { .. }
                | ToolError::PartitionsFile { .. }
                | ToolError::Schema(_)
                | ToolError::SchemaMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ToolError>;
