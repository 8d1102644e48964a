//! Dumps of the auxiliary components: index, compression info, summary,
//! statistics and scylla metadata.
//!
//! These operations read the component files directly, one sstable after
//! the other. They never stream data, so the partition filter and the
//! `--merge` / `--no-skips` flags do not apply to them.

use std::io::Write;
use std::sync::Arc;

use schema::Schema;
use sstable::{Feature, MetadataType, SSTable, ScyllaMetadata, ScyllaMetadataType, Statistics};
use tracing::warn;

use crate::driver::StreamOptions;
use crate::dump::format_partition_key;
use crate::error::Result;
use crate::filter::PartitionSet;
use crate::text_dumper::TextDumper;

/// Warns about command-line flags that `operation` ignores.
pub fn check_flags_unusable(
    operation: &str,
    partitions: &PartitionSet,
    options: StreamOptions,
    streams_data: bool,
) {
    if !partitions.is_empty() {
        warn!("partition-filter is not supported for {}, ignoring", operation);
    }
    if streams_data {
        return;
    }
    if options.merge {
        warn!("--merge not supported for {}, ignoring", operation);
    }
    if options.no_skips {
        warn!("--no-skips not supported for {}, ignoring", operation);
    }
}

/// Frames per-sstable output in `{stream_start}` / `{stream_end}`.
fn for_each_sstable<W, F>(sstables: &[Arc<SSTable>], out: &mut W, mut dump: F) -> Result<()>
where
    W: Write + ?Sized,
    F: FnMut(&SSTable, &mut W) -> Result<()>,
{
    writeln!(out, "{{stream_start}}")?;
    for sst in sstables {
        dump(sst.as_ref(), &mut *out)?;
    }
    writeln!(out, "{{stream_end}}")?;
    out.flush()?;
    Ok(())
}

pub fn dump_index<W: Write + ?Sized>(
    sstables: &[Arc<SSTable>],
    schema: &Schema,
    out: &mut W,
) -> Result<()> {
    for_each_sstable(sstables, out, |sst, out| {
        writeln!(out, "{{sstable_index_start: {}}}", sst.filename())?;
        for entry in sst.index_entries()? {
            writeln!(
                out,
                "{}: {}",
                entry.data_offset,
                format_partition_key(schema, entry.key.key())
            )?;
        }
        writeln!(out, "{{sstable_index_end}}")?;
        Ok(())
    })
}

pub fn dump_compression_info<W: Write + ?Sized>(
    sstables: &[Arc<SSTable>],
    out: &mut W,
) -> Result<()> {
    for_each_sstable(sstables, out, |sst, out| {
        writeln!(out, "{{sstable_compression_info_start: {}}}", sst.filename())?;
        if let Some(info) = sst.compression() {
            writeln!(out, "{{name: {}}}", info.name)?;
            let options: Vec<String> = info
                .options
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            writeln!(out, "{{options: {}}}", options.join(", "))?;
            writeln!(out, "{{chunk_len: {}}}", info.chunk_len)?;
            writeln!(out, "{{data_len: {}}}", info.data_len)?;
            writeln!(out, "{{offsets_start}}")?;
            for (i, offset) in info.offsets.iter().enumerate() {
                writeln!(out, "[{}]: {}", i, offset)?;
            }
            writeln!(out, "{{offsets_end}}")?;
        }
        writeln!(out, "{{sstable_compression_info_end}}")?;
        Ok(())
    })
}

pub fn dump_summary<W: Write + ?Sized>(
    sstables: &[Arc<SSTable>],
    schema: &Schema,
    out: &mut W,
) -> Result<()> {
    for_each_sstable(sstables, out, |sst, out| {
        let summary = sst.summary();
        let h = &summary.header;
        writeln!(out, "{{sstable_summary_start: {}}}", sst.filename())?;
        writeln!(
            out,
            "{{header: min_index_interval: {}, size: {}, memory_size: {}, sampling_level: {}, size_at_full_sampling: {}}}",
            h.min_index_interval, h.size, h.memory_size, h.sampling_level, h.size_at_full_sampling
        )?;
        writeln!(out, "{{positions:")?;
        for (i, p) in summary.positions.iter().enumerate() {
            writeln!(out, "[{}]: {}", i, p)?;
        }
        writeln!(out, "}}")?;
        writeln!(out, "{{entries:")?;
        for (i, e) in summary.entries.iter().enumerate() {
            writeln!(
                out,
                "[{}]: {{summary_entry: token: {}, key: {}, position: {}}}",
                i,
                e.token,
                format_partition_key(schema, &e.key),
                e.position
            )?;
        }
        writeln!(out, "}}")?;
        writeln!(out, "{{first_key: {}}}", format_partition_key(schema, &summary.first_key))?;
        writeln!(out, "{{last_key: {}}}", format_partition_key(schema, &summary.last_key))?;
        writeln!(out, "{{sstable_summary_end}}")?;
        Ok(())
    })
}

/// Name used for the `{<block>_start}` tags; the offsets line uses
/// [`MetadataType::as_str`].
fn block_name(ty: MetadataType) -> &'static str {
    match ty {
        MetadataType::Serialization => "serialization_header",
        other => other.as_str(),
    }
}

fn render_block(stats: &Statistics, ty: MetadataType) -> Option<String> {
    match ty {
        MetadataType::Validation => stats.validation.as_ref().map(|b| TextDumper::dump(b)),
        MetadataType::Compaction => stats.compaction.as_ref().map(|b| TextDumper::dump(b)),
        MetadataType::Stats => stats.stats.as_ref().map(|b| TextDumper::dump(b)),
        MetadataType::Serialization => stats.serialization.as_ref().map(|b| TextDumper::dump(b)),
    }
}

pub fn dump_statistics<W: Write + ?Sized>(sstables: &[Arc<SSTable>], out: &mut W) -> Result<()> {
    for_each_sstable(sstables, out, |sst, out| {
        let stats = sst.statistics();
        writeln!(out, "{{sstable_statistics_start: {}}}", sst.filename())?;
        let offsets: Vec<String> = stats
            .offsets
            .iter()
            .map(|(ty, offset)| format!("{}={}", ty.as_str(), offset))
            .collect();
        writeln!(out, "{{offsets: {}}}", offsets.join(", "))?;
        writeln!(out, "{{contents_start}}")?;
        for (ty, _) in &stats.offsets {
            let Some(rendered) = render_block(stats, *ty) else {
                continue;
            };
            writeln!(out, "{{{}_start}}", block_name(*ty))?;
            write!(out, "{}", rendered)?;
            writeln!(out, "{{{}_end}}", block_name(*ty))?;
        }
        writeln!(out, "{{contents_end}}")?;
        writeln!(out, "{{sstable_statistics_end}}")?;
        Ok(())
    })
}

fn write_scylla_metadata<W: Write + ?Sized>(m: &ScyllaMetadata, out: &mut W) -> Result<()> {
    if let Some(ranges) = &m.sharding {
        writeln!(out, "{{{}:", ScyllaMetadataType::Sharding.name())?;
        for range in ranges {
            writeln!(out, "{}", range)?;
        }
        writeln!(out, "}}")?;
    }
    if let Some(mask) = m.features {
        writeln!(
            out,
            "{{{}: ({}): {}}}",
            ScyllaMetadataType::Features.name(),
            mask,
            Feature::names_in(mask).join(" | ")
        )?;
    }
    if let Some(attrs) = &m.extension_attributes {
        writeln!(out, "{{{}:", ScyllaMetadataType::ExtensionAttributes.name())?;
        for (k, v) in attrs {
            writeln!(out, "{}: {}", k, v)?;
        }
        writeln!(out, "}}")?;
    }
    if let Some(id) = &m.run_identifier {
        writeln!(out, "{{{}: {}}}", ScyllaMetadataType::RunIdentifier.name(), id)?;
    }
    if let Some(stats) = &m.large_data_stats {
        writeln!(out, "{{{}:", ScyllaMetadataType::LargeDataStats.name())?;
        for (ty, e) in stats {
            writeln!(
                out,
                "{}: {{max_value: {}, threshold: {}, above_threshold: {}}}",
                ty.name(),
                e.max_value,
                e.threshold,
                e.above_threshold
            )?;
        }
        writeln!(out, "}}")?;
    }
    if let Some(origin) = &m.origin {
        writeln!(out, "{{{}: {}}}", ScyllaMetadataType::SSTableOrigin.name(), origin)?;
    }
    Ok(())
}

pub fn dump_scylla_metadata<W: Write + ?Sized>(
    sstables: &[Arc<SSTable>],
    out: &mut W,
) -> Result<()> {
    for_each_sstable(sstables, out, |sst, out| {
        writeln!(out, "{{sstable_scylla_metadata_start: {}}}", sst.filename())?;
        if let Some(m) = sst.scylla_metadata() {
            write_scylla_metadata(m, out)?;
        }
        writeln!(out, "{{sstable_scylla_metadata_end}}")?;
        Ok(())
    })
}
