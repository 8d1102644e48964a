//! # sstable-tool
//!
//! Examines sstables without a running node.
//!
//! ```text
//! $ sstable-tool dump me-1-big-Data.db
//! $ sstable-tool dump --partition 00000007 --schema-file users.json me-1-big-Data.db
//! $ sstable-tool writetime-histogram --operation-option bucket=hours me-*-big-Data.db
//! $ sstable-tool validate --merge me-1-big-Data.db me-2-big-Data.db
//! ```
//!
//! Output goes to stdout; logs go to stderr, filtered by `RUST_LOG`
//! (default `warn`). Exit status: 0 on success, 2 for configuration
//! errors, 1 for anything else.
//!
//! ## Configuration
//!
//! ```text
//! SSTABLE_TOOL_OUTPUT_DIR   output directory for histogram.json (default: ".")
//! SSTABLE_TOOL_MAX_READERS  reader permit limit                 (default: 0 = unlimited)
//! ```

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use sstable_tool::{
    run, Invocation, OperationKind, OperationOptions, StreamOptions, ToolConfig, ToolError,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sstable-tool")]
#[command(about = "Examine the content of sstables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dump the content of the sstable(s) as text.
    Dump(CommonArgs),
    /// Dump the content of the index component.
    DumpIndex(CommonArgs),
    /// Dump the content of the compression-info component.
    DumpCompressionInfo(CommonArgs),
    /// Dump the content of the summary component.
    DumpSummary(CommonArgs),
    /// Dump the content of the statistics component.
    DumpStatistics(CommonArgs),
    /// Dump the content of the scylla-metadata component.
    DumpScyllaMetadata(CommonArgs),
    /// Generate a histogram of write timestamps (option: bucket).
    WritetimeHistogram(CommonArgs),
    /// Consume the sstable(s) and do nothing.
    Custom(CommonArgs),
    /// Validate the fragment stream of the sstable(s).
    Validate(CommonArgs),
}

impl Command {
    fn into_parts(self) -> (OperationKind, CommonArgs) {
        match self {
            Command::Dump(a) => (OperationKind::Dump, a),
            Command::DumpIndex(a) => (OperationKind::DumpIndex, a),
            Command::DumpCompressionInfo(a) => (OperationKind::DumpCompressionInfo, a),
            Command::DumpSummary(a) => (OperationKind::DumpSummary, a),
            Command::DumpStatistics(a) => (OperationKind::DumpStatistics, a),
            Command::DumpScyllaMetadata(a) => (OperationKind::DumpScyllaMetadata, a),
            Command::WritetimeHistogram(a) => (OperationKind::WritetimeHistogram, a),
            Command::Custom(a) => (OperationKind::Custom, a),
            Command::Validate(a) => (OperationKind::Validate, a),
        }
    }
}

#[derive(Args)]
struct CommonArgs {
    /// Data component paths of the sstables to examine.
    sstables: Vec<PathBuf>,
    /// JSON schema file; by default the schema is read from the first sstable.
    #[arg(long)]
    schema_file: Option<PathBuf>,
    /// Partition key to restrict the operation to, hex encoded (repeatable).
    #[arg(long = "partition")]
    partitions: Vec<String>,
    /// File with whitespace-separated hex partition keys.
    #[arg(long)]
    partitions_file: Option<PathBuf>,
    /// Read all sstables as one merged stream.
    #[arg(long, default_value_t = false)]
    merge: bool,
    /// Never use the index to skip partitions.
    #[arg(long, default_value_t = false)]
    no_skips: bool,
    /// Operation option, KEY=VALUE[:KEY=VALUE...] (repeatable).
    #[arg(long = "operation-option")]
    operation_options: Vec<String>,
    /// Directory for output files; overrides SSTABLE_TOOL_OUTPUT_DIR.
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

fn invocation(kind: OperationKind, args: CommonArgs) -> Result<Invocation, ToolError> {
    let mut inv = Invocation::new(kind.operation(), args.sstables);
    inv.schema_file = args.schema_file;
    inv.partitions = args.partitions;
    inv.partitions_file = args.partitions_file;
    inv.stream = StreamOptions {
        merge: args.merge,
        no_skips: args.no_skips,
    };
    inv.operation_options = OperationOptions::parse(&args.operation_options)?;
    Ok(inv)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let (kind, args) = Cli::parse().command.into_parts();
    let config = ToolConfig::from_env().with_output_dir(args.output_dir.clone());
    let stdout = io::stdout();
    let result = invocation(kind, args).and_then(|inv| run(&inv, &config, &mut stdout.lock()));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
