use super::*;
use crate::*;
use anyhow::Result;
use tempfile::tempdir;

fn run_to_string(inv: &Invocation, config: &ToolConfig) -> crate::Result<String> {
    let mut out = Vec::new();
    run(inv, config, &mut out)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn invocation(kind: OperationKind, sstables: Vec<PathBuf>) -> Invocation {
    Invocation::new(kind.operation(), sstables)
}

// -------------------- Registry --------------------

#[test]
fn every_kind_maps_to_its_registry_entry() {
    for op in OPERATIONS {
        assert!(std::ptr::eq(op.kind.operation(), op));
        assert!(std::ptr::eq(Operation::find(op.name).unwrap(), op));
    }
    assert_eq!(OPERATIONS.len(), 9);
    assert!(Operation::find("scrub").is_none());
}

#[test]
fn only_writetime_histogram_declares_options() {
    for op in OPERATIONS {
        let names: Vec<&str> = op.options.iter().map(|o| o.name).collect();
        if op.kind == OperationKind::WritetimeHistogram {
            assert_eq!(names, ["bucket"]);
        } else {
            assert!(names.is_empty(), "{} declares {:?}", op.name, names);
        }
    }
}

// -------------------- Operation options --------------------

#[test]
fn options_parse_colon_separated_pairs() -> Result<()> {
    let opts = OperationOptions::parse(&["a=1:b=2", "c=3", "a=4"])?;
    assert_eq!(opts.get("a"), Some("4"));
    assert_eq!(opts.get("b"), Some("2"));
    assert_eq!(opts.get("c"), Some("3"));
    assert_eq!(opts.get("d"), None);
    assert!(OperationOptions::parse::<&str>(&[])?.is_empty());
    Ok(())
}

#[test]
fn option_without_value_is_malformed() {
    for bad in ["bucket", "=hours", "bucket=hours:days"] {
        let err = OperationOptions::parse(&[bad]).unwrap_err();
        assert!(matches!(err, ToolError::MalformedOption(_)), "{}", bad);
        assert_eq!(err.exit_code(), 2);
    }
}

#[test]
fn unknown_option_is_rejected_before_streaming() -> Result<()> {
    let mut inv = invocation(OperationKind::Dump, vec![PathBuf::from("/nonexistent")]);
    inv.operation_options = OperationOptions::parse(&["bucket=hours"])?;
    let err = run_to_string(&inv, &ToolConfig::default()).unwrap_err();
    assert_eq!(err.to_string(), "operation dump doesn't have option bucket");
    assert_eq!(err.exit_code(), 2);
    Ok(())
}

#[test]
fn invalid_bucket_value_is_rejected() -> Result<()> {
    let mut inv = invocation(OperationKind::WritetimeHistogram, vec![]);
    inv.operation_options = OperationOptions::parse(&["bucket=decades"])?;
    let err = run_to_string(&inv, &ToolConfig::default()).unwrap_err();
    assert!(matches!(err, ToolError::InvalidOptionValue { .. }));
    assert_eq!(err.exit_code(), 2);
    Ok(())
}

// -------------------- Inputs --------------------

#[test]
fn no_sstables_is_a_configuration_error() {
    let inv = invocation(OperationKind::Dump, vec![]);
    let err = run_to_string(&inv, &ToolConfig::default()).unwrap_err();
    assert_eq!(err.to_string(), "no sstables specified on the command line");
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn missing_sstable_is_a_configuration_error() -> Result<()> {
    let dir = tempdir()?;
    let inv = invocation(
        OperationKind::Dump,
        vec![dir.path().join("me-1-big-Data.db")],
    );
    let err = run_to_string(&inv, &ToolConfig::default()).unwrap_err();
    assert!(matches!(err, ToolError::MissingSstable(_)));
    assert_eq!(err.exit_code(), 2);
    Ok(())
}

#[test]
fn undecodable_partition_key_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let data = write(dir.path(), 1, &memtable([1], 1, 1))?;
    let mut inv = invocation(OperationKind::Dump, vec![data]);
    inv.partitions = vec!["zz".to_string()];
    let err = run_to_string(&inv, &ToolConfig::default()).unwrap_err();
    assert!(matches!(err, ToolError::InvalidPartitionKey { .. }));
    assert_eq!(err.exit_code(), 2);
    Ok(())
}

#[test]
fn partitions_file_keys_are_whitespace_separated() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("keys.txt");
    std::fs::write(
        &path,
        format!("  {}\n\n{}\t{}", int_key(1).to_hex(), int_key(2).to_hex(), int_key(3).to_hex()),
    )?;
    let set = PartitionSet::parse(&[int_key(4).to_hex()], Some(&path))?;
    assert_eq!(set.len(), 4);
    for k in 1..=4 {
        assert!(set.admits(&int_key(k)));
    }
    assert!(!set.admits(&int_key(5)));
    Ok(())
}

#[test]
fn missing_partitions_file_is_a_configuration_error() -> Result<()> {
    let dir = tempdir()?;
    let err = PartitionSet::parse(&[], Some(&dir.path().join("nope"))).unwrap_err();
    assert!(matches!(err, ToolError::PartitionsFile { .. }));
    assert_eq!(err.exit_code(), 2);
    Ok(())
}

// -------------------- Schema --------------------

#[test]
fn schema_is_derived_from_first_sstable() -> Result<()> {
    let dir = tempdir()?;
    let sst = open(&write(dir.path(), 1, &memtable([1], 1, 1))?)?;
    let schema = resolve_schema(None, &[sst], false)?;
    assert_eq!(schema.partition_key().name, "pk");
    assert_eq!(schema.clustering_key()[0].name, "ck0");
    assert_eq!(schema.regular_columns()[0].name, "v");
    assert_eq!(schema.static_columns()[0].name, "s");
    Ok(())
}

#[test]
fn schema_file_takes_precedence() -> Result<()> {
    let dir = tempdir()?;
    let sst = open(&write(dir.path(), 1, &memtable([1], 1, 1))?)?;
    let path = dir.path().join("schema.json");
    std::fs::write(&path, serde_json::to_string(&test_schema().to_schema_file())?)?;
    let schema = resolve_schema(Some(&path), &[sst], true)?;
    assert_eq!(schema.keyspace(), "ks");
    assert_eq!(schema.clustering_key()[0].name, "ck");
    Ok(())
}

#[test]
fn merging_sstables_of_different_tables_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let a = write(dir.path(), 1, &memtable([1], 1, 1))?;
    let other = Schema::new(
        "ks",
        "other",
        ColumnDefinition::new("id", ColumnType::Text),
        vec![],
        vec![],
        vec![ColumnDefinition::new("v", ColumnType::Text)],
    )?;
    let mut mem = Memtable::new();
    let mut p = Partition::new(DecoratedKey::from_raw(b"x".to_vec()));
    p.upsert_row(row_with_cells(ClusteringKey::new(vec![]), [(0, Cell::live(1, b"v".to_vec()))]));
    mem.apply(p);
    let b = SSTableWriter::write_from_memtable(dir.path(), 2, &other, &mem)?;

    let sstables = open_sstables(&[a, b])?;
    let err = resolve_schema(None, &sstables, true).unwrap_err();
    assert!(matches!(err, ToolError::SchemaMismatch { .. }));
    assert_eq!(err.exit_code(), 2);
    // Without merging each sstable is read on its own.
    resolve_schema(None, &sstables, false)?;
    Ok(())
}

// -------------------- Running --------------------

#[test]
fn histogram_lands_in_configured_output_dir() -> Result<()> {
    let dir = tempdir()?;
    let data = write(dir.path(), 1, &memtable([1, 2], 2, 7))?;
    let out_dir = tempdir()?;
    let config = ToolConfig::default().with_output_dir(Some(out_dir.path().to_path_buf()));
    let mut inv = invocation(OperationKind::WritetimeHistogram, vec![data]);
    inv.operation_options = OperationOptions::parse(&["bucket=hours"])?;

    let stdout = run_to_string(&inv, &config)?;
    assert!(stdout.is_empty());
    let text = std::fs::read_to_string(out_dir.path().join("histogram.json"))?;
    let json: serde_json::Value = serde_json::from_str(&text)?;
    assert_eq!(json, serde_json::json!({"buckets": [0], "counts": [4]}));
    Ok(())
}

#[test]
fn custom_operation_prints_nothing() -> Result<()> {
    let dir = tempdir()?;
    let data = write(dir.path(), 1, &memtable(0..5, 2, 7))?;
    let inv = invocation(OperationKind::Custom, vec![data]);
    assert_eq!(run_to_string(&inv, &ToolConfig::default())?, "");
    Ok(())
}

#[test]
fn validate_reports_each_sstable() -> Result<()> {
    let dir = tempdir()?;
    let good = write(dir.path(), 1, &memtable(0..5, 2, 7))?;
    let bad = write(dir.path(), 2, &memtable(0..50, 4, 7))?;
    corrupt(&bad)?;
    let inv = invocation(OperationKind::Validate, vec![good.clone(), bad.clone()]);
    let out = run_to_string(&inv, &ToolConfig::default())?;
    let expected = format!(
        "{{stream_start}}\n{{validation: {}: valid}}\n{{validation: {}: invalid}}\n{{stream_end}}\n",
        good.display(),
        bad.display()
    );
    assert_eq!(out, expected);
    Ok(())
}

#[test]
fn validate_merged_reports_the_stream() -> Result<()> {
    let dir = tempdir()?;
    let a = write(dir.path(), 1, &memtable([1, 2], 1, 7))?;
    let b = write(dir.path(), 2, &memtable([2, 3], 1, 8))?;
    let mut inv = invocation(OperationKind::Validate, vec![a, b]);
    inv.stream.merge = true;
    let out = run_to_string(&inv, &ToolConfig::default())?;
    assert_eq!(
        out,
        "{stream_start}\n{validation: the stream: valid}\n{stream_end}\n"
    );
    Ok(())
}

#[test]
fn validator_catches_out_of_order_stream() -> Result<()> {
    let (first, second) = if int_key(1) < int_key(2) {
        (int_key(2), int_key(1))
    } else {
        (int_key(1), int_key(2))
    };
    let start = |key| {
        MutationFragment::PartitionStart(PartitionStart {
            key,
            tombstone: None,
        })
    };
    let mut reader = VecReader::new(vec![
        start(first),
        MutationFragment::PartitionEnd,
        start(second),
        MutationFragment::PartitionEnd,
    ]);
    assert_eq!(validate_stream(&mut reader, "test")?, Verdict::Invalid);

    let mut unclosed = VecReader::new(vec![start(int_key(1))]);
    assert_eq!(validate_stream(&mut unclosed, "test")?, Verdict::Invalid);
    Ok(())
}

// -------------------- Configuration --------------------

#[test]
fn output_dir_flag_overrides_default() {
    let config = ToolConfig::default();
    assert_eq!(config.output_dir, PathBuf::from("."));
    assert_eq!(config.max_readers, None);
    let config = config.with_output_dir(Some(PathBuf::from("/tmp/out")));
    assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
    assert_eq!(config.with_output_dir(None).output_dir, PathBuf::from("/tmp/out"));
}

#[test]
fn env_or_falls_back_to_default() {
    assert_eq!(env_or("SSTABLE_TOOL_TEST_UNSET_VARIABLE", "fallback"), "fallback");
}
