use super::*;
use crate::*;
use anyhow::Result;
use mutation::{BoundKind, ClusteringBound, RowMarker, Tombstone};
use sstable::{
    CommitlogInterval, Describe, EstimatedHistogram, FieldValue, FieldVisitor, ReplayPosition,
    ValidationMetadata, PARTITIONER,
};
use tempfile::tempdir;
use uuid::Uuid;

fn dump_op(kind: OperationKind, sstables: Vec<PathBuf>) -> Result<String> {
    let inv = Invocation::new(kind.operation(), sstables);
    let mut out = Vec::new();
    run(&inv, &ToolConfig::default(), &mut out)?;
    Ok(String::from_utf8(out)?)
}

/// Partition 7: tombstone, static row, one row, one range tombstone.
fn rich_memtable() -> Memtable {
    let mut p = Partition::new(int_key(7));
    p.delete(Tombstone::new(500, 1_600_000_000));
    p.set_static_cell(0, Cell::live(1000, b"alice".to_vec()));
    p.upsert_row(
        row_with_cells(ck(1), [(0, Cell::live(1000, b"hello".to_vec()))])
            .with_marker(RowMarker::new(1000)),
    );
    p.add_range_tombstone(RangeTombstone {
        start: ClusteringBound::new(ck(2), BoundKind::InclStart),
        end: ClusteringBound::new(ck(5), BoundKind::ExclEnd),
        tombstone: Tombstone::new(900, 1_700_000_000),
    });
    let mut mem = Memtable::new();
    mem.apply(p);
    mem
}

// -------------------- dump --------------------

#[test]
fn dump_renders_every_fragment_kind() -> Result<()> {
    let dir = tempdir()?;
    let data = write(dir.path(), 1, &rich_memtable())?;
    let out = dump_op(OperationKind::Dump, vec![data.clone()])?;

    let expected = format!(
        "{{stream_start}}\n\
         {{sstable_start: filename {}}}\n\
         {{partition_start: {{key: 7 (00000007), token: {}}}, tombstone: {{timestamp: 500, deletion_time: 1600000000}}}}\n\
         {{static_row: {{s: alice @1000}}}}\n\
         {{clustering_row: {{key: [1], marker: {{timestamp: 1000}}, cells: {{v: hello @1000}}}}}}\n\
         {{range_tombstone: {{start: incl_start [2], end: excl_end [5], tombstone: {{timestamp: 900, deletion_time: 1700000000}}}}}}\n\
         {{partition_end}}\n\
         {{sstable_end}}\n\
         {{stream_end}}\n",
        data.display(),
        int_key(7).token()
    );
    assert_eq!(out, expected);
    Ok(())
}

#[test]
fn dump_shows_dead_cells_and_unknown_columns() -> Result<()> {
    let schema = test_schema();
    let mut consumer = DumpingConsumer::new(&schema, Vec::new());
    let row = ClusteringRow::new(ck(3)).with_cells(
        mutation::Row::new()
            .with_cell(0, Cell::Atomic(mutation::AtomicCell::dead(77, 123)))
            .with_cell(9, Cell::live(78, vec![0xca, 0xfe])),
    );
    assert!(consumer.consume_clustering_row(row)?.is_continue());
    let out = String::from_utf8(consumer.into_inner())?;
    assert_eq!(
        out,
        "{clustering_row: {key: [3], cells: {v: dead @77 deleted at 123, #9: cafe @78}}}\n"
    );
    Ok(())
}

#[test]
fn merged_dump_has_single_anonymous_sstable() -> Result<()> {
    let dir = tempdir()?;
    let a = write(dir.path(), 1, &memtable([1], 1, 1))?;
    let b = write(dir.path(), 2, &memtable([2], 1, 1))?;
    let mut inv = Invocation::new(OperationKind::Dump.operation(), vec![a, b]);
    inv.stream.merge = true;
    let mut out = Vec::new();
    run(&inv, &ToolConfig::default(), &mut out)?;
    let out = String::from_utf8(out)?;
    assert_eq!(out.matches("{sstable_start}").count(), 1);
    assert_eq!(out.matches("{partition_start:").count(), 2);
    assert!(!out.contains("filename"));
    Ok(())
}

#[test]
fn dump_with_filter_shows_only_that_partition() -> Result<()> {
    let dir = tempdir()?;
    let data = write(dir.path(), 1, &memtable(0..10, 2, 1))?;
    let mut inv = Invocation::new(OperationKind::Dump.operation(), vec![data]);
    inv.partitions = vec![int_key(4).to_hex()];
    let mut out = Vec::new();
    run(&inv, &ToolConfig::default(), &mut out)?;
    let out = String::from_utf8(out)?;
    assert_eq!(out.matches("{partition_start:").count(), 1);
    assert!(out.contains("{key: 4 (00000004)"));
    assert_eq!(out.matches("{clustering_row:").count(), 2);
    Ok(())
}

// -------------------- Component dumps --------------------

#[test]
fn index_dump_lists_every_partition() -> Result<()> {
    let dir = tempdir()?;
    let data = write(dir.path(), 1, &memtable(0..4, 1, 1))?;
    let sst = open(&data)?;
    let out = dump_op(OperationKind::DumpIndex, vec![data])?;

    let mut expected = format!("{{stream_start}}\n{{sstable_index_start: {}}}\n", sst.filename());
    for entry in sst.index_entries()? {
        let raw = entry.key.key();
        let value = i32::from_be_bytes(raw.try_into()?);
        expected.push_str(&format!("{}: {} ({})\n", entry.data_offset, value, hex::encode(raw)));
    }
    expected.push_str("{sstable_index_end}\n{stream_end}\n");
    assert_eq!(out, expected);
    assert_eq!(out.lines().count(), 4 + 4);
    Ok(())
}

#[test]
fn compression_info_dump() -> Result<()> {
    let dir = tempdir()?;
    let plain = write(dir.path(), 1, &memtable(0..4, 1, 1))?;
    let out = dump_op(OperationKind::DumpCompressionInfo, vec![plain.clone()])?;
    assert_eq!(
        out,
        format!(
            "{{stream_start}}\n{{sstable_compression_info_start: {}}}\n{{sstable_compression_info_end}}\n{{stream_end}}\n",
            plain.display()
        )
    );

    let options = WriterOptions {
        compression_chunk_len: Some(256),
        ..WriterOptions::default()
    };
    let compressed = write_with(dir.path(), 2, &memtable(0..40, 4, 1), options)?;
    let info = open(&compressed)?
        .compression()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("no compression info"))?;
    let out = dump_op(OperationKind::DumpCompressionInfo, vec![compressed])?;
    assert!(out.contains("{name: LZ4Compressor}\n"));
    assert!(out.contains("{chunk_len: 256}\n"));
    assert!(out.contains(&format!("{{data_len: {}}}\n", info.data_len)));
    let offsets: Vec<&str> = out
        .lines()
        .skip_while(|l| *l != "{offsets_start}")
        .skip(1)
        .take_while(|l| *l != "{offsets_end}")
        .collect();
    assert_eq!(offsets.len(), info.offsets.len());
    assert_eq!(offsets[0], format!("[0]: {}", info.offsets[0]));
    Ok(())
}

#[test]
fn summary_dump() -> Result<()> {
    let dir = tempdir()?;
    let options = WriterOptions {
        min_index_interval: 3,
        ..WriterOptions::default()
    };
    let data = write_with(dir.path(), 1, &memtable(0..10, 1, 1), options)?;
    let sst = open(&data)?;
    let summary = sst.summary();
    let out = dump_op(OperationKind::DumpSummary, vec![data])?;

    let h = &summary.header;
    assert!(out.contains(&format!(
        "{{header: min_index_interval: 3, size: {}, memory_size: {}, sampling_level: {}, size_at_full_sampling: {}}}\n",
        h.size, h.memory_size, h.sampling_level, h.size_at_full_sampling
    )));
    let first = &summary.entries[0];
    assert!(out.contains(&format!(
        "[0]: {{summary_entry: token: {}, key: {} ({}), position: {}}}\n",
        first.token,
        i32::from_be_bytes(first.key.as_slice().try_into()?),
        hex::encode(&first.key),
        first.position
    )));
    assert!(out.contains(&format!("{{first_key: {}", i32::from_be_bytes(summary.first_key.as_slice().try_into()?))));
    assert!(out.contains("{last_key: "));
    assert!(out.ends_with("{sstable_summary_end}\n{stream_end}\n"));
    Ok(())
}

#[test]
fn statistics_dump_has_every_block_in_offset_order() -> Result<()> {
    let dir = tempdir()?;
    let data = write(dir.path(), 1, &memtable(0..3, 2, 1))?;
    let out = dump_op(OperationKind::DumpStatistics, vec![data])?;

    let markers: Vec<&str> = out
        .lines()
        .filter(|l| l.ends_with("_start}") || l.ends_with("_end}"))
        .collect();
    assert_eq!(
        markers,
        [
            "{stream_start}",
            "{contents_start}",
            "{validation_start}",
            "{validation_end}",
            "{compaction_start}",
            "{compaction_end}",
            "{stats_start}",
            "{stats_end}",
            "{serialization_header_start}",
            "{serialization_header_end}",
            "{contents_end}",
            "{sstable_statistics_end}",
            "{stream_end}",
        ]
    );
    assert!(out.contains("{offsets: validation=36, compaction="));
    let offsets = out.lines().find(|l| l.starts_with("{offsets: ")).unwrap_or_default();
    assert!(offsets.contains(", serialization="), "{}", offsets);
    assert!(!offsets.contains("serialization_header"));
    assert!(out.contains(&format!("{{partitioner: {}}}\n", PARTITIONER)));
    assert!(out.contains("{pk_type_name: int}\n"));
    Ok(())
}

#[test]
fn scylla_metadata_dump() -> Result<()> {
    let dir = tempdir()?;
    let run_id = Uuid::new_v4();
    let mut options = WriterOptions {
        run_identifier: Some(run_id),
        ..WriterOptions::default()
    };
    options
        .extension_attributes
        .insert("owner".to_string(), "tests".to_string());
    let data = write_with(dir.path(), 1, &memtable(0..3, 1, 1), options)?;
    let out = dump_op(OperationKind::DumpScyllaMetadata, vec![data.clone()])?;

    assert!(out.starts_with(&format!(
        "{{stream_start}}\n{{sstable_scylla_metadata_start: {}}}\n{{Sharding:\n",
        data.display()
    )));
    assert!(out.contains("{Features: ("));
    assert!(out.contains("{ExtensionAttributes:\nowner: tests\n}\n"));
    assert!(out.contains(&format!("{{RunIdentifier: {}}}\n", run_id)));
    assert!(out.contains("{LargeDataStats:\npartition_size: {max_value: "));
    assert!(out.contains("{SSTableOrigin: memtable}\n"));

    let bare = write_with(
        dir.path(),
        2,
        &memtable([1], 1, 1),
        WriterOptions {
            scylla_metadata: false,
            ..WriterOptions::default()
        },
    )?;
    let out = dump_op(OperationKind::DumpScyllaMetadata, vec![bare.clone()])?;
    assert_eq!(
        out,
        format!(
            "{{stream_start}}\n{{sstable_scylla_metadata_start: {}}}\n{{sstable_scylla_metadata_end}}\n{{stream_end}}\n",
            bare.display()
        )
    );
    Ok(())
}

// -------------------- Text dumper --------------------

struct Sample {
    histogram: EstimatedHistogram,
}

impl Describe for Sample {
    fn describe(&self, v: &mut dyn FieldVisitor) {
        v.visit_field("id", FieldValue::Int(-3));
        v.visit_field("raw", FieldValue::Bytes(&[0xab, 0x01]));
        v.visit_field(
            "list",
            FieldValue::Array(vec![FieldValue::UInt(4), FieldValue::Str("x")]),
        );
        v.visit_field("sizes", FieldValue::EstimatedHistogram(&self.histogram));
        v.visit_field(
            "position",
            FieldValue::ReplayPosition(ReplayPosition { id: 9, pos: 12 }),
        );
        v.visit_field(
            "interval",
            FieldValue::CommitlogInterval(CommitlogInterval {
                start: ReplayPosition { id: 1, pos: 2 },
                end: ReplayPosition { id: 3, pos: 4 },
            }),
        );
    }
}

#[test]
fn text_dumper_renders_each_field_kind() {
    let sample = Sample {
        histogram: EstimatedHistogram {
            bucket_offsets: vec![1, 2],
            buckets: vec![5, 6, 7],
        },
    };
    assert_eq!(
        TextDumper::dump(&sample),
        "{id: -3}\n\
         {raw: ab01}\n\
         {list:\n[0]: 4\n[1]: x\n}\n\
         {sizes:\n[0]: offset: 1, value: 5\n[1]: offset: 1, value: 6\n[2]: offset: 2, value: 7\n}\n\
         {position: id: 9, pos: 12}\n\
         {interval: {start: id: 1, pos: 2} {end: id: 3, pos: 4}}\n"
    );
}

#[test]
fn text_dumper_renders_records_inline() {
    let validation = ValidationMetadata {
        partitioner: "p".to_string(),
        filter_chance: 0.5,
    };
    assert_eq!(
        TextDumper::dump(&validation),
        "{partitioner: p}\n{filter_chance: 0.5}\n"
    );

    let header = sstable::SerializationHeader::for_schema(&test_schema());
    let rendered = TextDumper::dump(&header);
    assert!(rendered.contains("{static_columns:\n[0]: {name: s} {type_name: text}\n}\n"));
    assert!(rendered.contains("{clustering_key_types_names:\n[0]: int\n}\n"));
}
