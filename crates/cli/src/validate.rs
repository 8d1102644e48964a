//! The `validate` operation.
//!
//! Each sstable (or the merged stream) is read with a crawling reader, as
//! the index cannot be trusted on a suspect file, and every fragment is
//! checked by a [`MutationFragmentStreamValidator`]. A record that fails
//! to decode makes the stream invalid; it is not an error of the run.

use std::io::Write;
use std::sync::Arc;

use mutation::MutationFragmentStreamValidator;
use sstable::{CombinedReader, FragmentReader, ReaderPermit, SSTable, SstableError};
use tracing::{error, info};

use crate::driver::make_reader;
use crate::error::{Result, ToolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Valid => "valid",
            Verdict::Invalid => "invalid",
        }
    }
}

/// Runs the validator over a whole stream.
///
/// Decode failures of the reader end the stream as [`Verdict::Invalid`];
/// any other reader error is returned.
pub fn validate_stream<R: FragmentReader + ?Sized>(reader: &mut R, name: &str) -> Result<Verdict> {
    let mut validator = MutationFragmentStreamValidator::new();
    loop {
        let fragment = match reader.next_fragment() {
            Ok(Some(fragment)) => fragment,
            Ok(None) => break,
            Err(e) => return invalid_or_fail(name, e),
        };
        if let Err(e) = validator.validate(&fragment) {
            error!("{}: {}", name, e);
            return Ok(Verdict::Invalid);
        }
    }
    if let Err(e) = validator.on_end_of_stream() {
        error!("{}: {}", name, e);
        return Ok(Verdict::Invalid);
    }
    info!(
        partitions = validator.partitions(),
        fragments = validator.fragments(),
        "{} checked",
        name
    );
    Ok(Verdict::Valid)
}

fn invalid_or_fail(name: &str, e: SstableError) -> Result<Verdict> {
    if e.is_malformed() {
        error!("{}: {}", name, e);
        Ok(Verdict::Invalid)
    } else {
        Err(e.into())
    }
}

fn report<W: Write + ?Sized>(out: &mut W, name: &str, verdict: Verdict) -> Result<()> {
    info!("validated {}: {}", name, verdict.as_str());
    writeln!(out, "{{validation: {}: {}}}", name, verdict.as_str())?;
    Ok(())
}

fn validate_one(sstable: &Arc<SSTable>, permit: &ReaderPermit) -> Result<Verdict> {
    let name = sstable.filename();
    info!("validating {}", name);
    match make_reader(sstable, permit, true) {
        Ok(mut reader) => validate_stream(&mut reader, &name),
        Err(e) => invalid_or_fail(&name, e),
    }
}

fn validate_merged(sstables: &[Arc<SSTable>], permit: &ReaderPermit) -> Result<Verdict> {
    const NAME: &str = "the stream";
    info!("validating {}", NAME);
    let readers = sstables
        .iter()
        .map(|sst| make_reader(sst, permit, true))
        .collect::<sstable::Result<Vec<_>>>();
    let readers = match readers {
        Ok(readers) => readers,
        Err(e) => return invalid_or_fail(NAME, e),
    };
    match CombinedReader::new(readers) {
        Ok(mut combined) => validate_stream(&mut combined, NAME),
        Err(e) => invalid_or_fail(NAME, e),
    }
}

fn validate_each<W: Write + ?Sized>(
    sstables: &[Arc<SSTable>],
    permit: &ReaderPermit,
    out: &mut W,
) -> Result<()> {
    let mut failed = 0;
    for sst in sstables {
        match validate_one(sst, permit) {
            Ok(verdict) => report(out, &sst.filename(), verdict)?,
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

/// Validates `sstables` and prints one verdict line per stream.
///
/// Invalid data does not fail the run. An sstable that cannot be read at
/// all is logged, the rest are still validated, and the run fails at the
/// end; under `merge` it fails immediately.
pub fn run_validation<W: Write + ?Sized>(
    sstables: &[Arc<SSTable>],
    permit: &ReaderPermit,
    merge: bool,
    out: &mut W,
) -> Result<()> {
    writeln!(out, "{{stream_start}}")?;
    let result = if merge {
        validate_merged(sstables, permit).and_then(|v| report(out, "the stream", v))
    } else {
        validate_each(sstables, permit, out)
    };
    writeln!(out, "{{stream_end}}")?;
    out.flush()?;
    result
}
