use super::*;
use crate::*;
use anyhow::Result;
use mutation::{AtomicCell, CollectionMutation, RowMarker, Tombstone};
use tempfile::tempdir;

const MINUTE: i64 = 60 * 1_000_000;
const HOUR: i64 = 60 * MINUTE;

fn read_histogram(path: &Path) -> Result<serde_json::Value> {
    Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
}

// -------------------- Buckets --------------------

#[test]
fn bucket_names_parse() -> Result<()> {
    assert_eq!("years".parse::<Bucket>()?, Bucket::Years);
    assert_eq!("months".parse::<Bucket>()?, Bucket::Months);
    assert_eq!("weeks".parse::<Bucket>()?, Bucket::Weeks);
    assert_eq!("days".parse::<Bucket>()?, Bucket::Days);
    assert_eq!("hours".parse::<Bucket>()?, Bucket::Hours);
    assert_eq!(Bucket::default(), Bucket::Months);
    Ok(())
}

#[test]
fn invalid_bucket_is_a_configuration_error() {
    let err = "minutes".parse::<Bucket>().unwrap_err();
    assert_eq!(
        err.to_string(),
        "invalid value for writetime-histogram option bucket: minutes"
    );
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn bucket_units_use_average_calendar() {
    assert_eq!(Bucket::Years.seconds(), 31_556_952);
    assert_eq!(Bucket::Months.seconds(), 2_629_746);
    assert_eq!(Bucket::Weeks.seconds(), 604_800);
    assert_eq!(Bucket::Days.seconds(), 86_400);
    assert_eq!(Bucket::Hours.seconds(), 3_600);
}

#[test]
fn truncation_goes_toward_zero() {
    assert_eq!(Bucket::Hours.truncate(5 * HOUR + 59 * MINUTE), 5 * HOUR);
    assert_eq!(Bucket::Hours.truncate(-(HOUR + MINUTE)), -HOUR);
    assert_eq!(Bucket::Hours.truncate(-MINUTE), 0);
}

// -------------------- Collection --------------------

#[test]
fn two_cells_in_same_hour_share_a_bucket() -> Result<()> {
    let dir = tempdir()?;
    let base = 1_000 * HOUR + 5 * MINUTE;
    let mut p = Partition::new(int_key(1));
    p.upsert_row(row_with_cells(ck(0), [(0, Cell::live(base, b"a".to_vec()))]));
    p.upsert_row(row_with_cells(ck(1), [(0, Cell::live(base + 10 * MINUTE, b"b".to_vec()))]));
    let mut mem = Memtable::new();
    mem.apply(p);
    let sst = open(&write(dir.path(), 1, &mem)?)?;

    let out = tempdir()?;
    let mut consumer = WritetimeHistogramConsumer::new(Bucket::Hours, out.path());
    run_consumer(
        &mut consumer,
        &[sst],
        &permit(),
        &PartitionSet::new(),
        StreamOptions::default(),
    )?;

    let json = read_histogram(&out.path().join("histogram.json"))?;
    assert_eq!(json["buckets"], serde_json::json!([1_000 * HOUR]));
    assert_eq!(json["counts"], serde_json::json!([2]));
    Ok(())
}

#[test]
fn every_timestamp_bearing_value_is_counted() -> Result<()> {
    let mut consumer = WritetimeHistogramConsumer::new(Bucket::Days, tempdir()?.path());
    let mut flows = vec![
        consumer.consume_partition_start(PartitionStart {
            key: int_key(1),
            tombstone: Some(Tombstone::new(10, 0)),
        })?,
        consumer.consume_static_row(StaticRow {
            cells: mutation::Row::new().with_cell(0, Cell::live(20, b"s".to_vec())),
        })?,
    ];

    let mut collection = CollectionMutation {
        tombstone: Some(Tombstone::new(30, 0)),
        ..CollectionMutation::default()
    };
    collection.cells.insert(b"k1".to_vec(), AtomicCell::live(31, b"v".to_vec()));
    collection.cells.insert(b"k2".to_vec(), AtomicCell::dead(32, 0));
    let row = ClusteringRow::new(ck(0))
        .with_marker(RowMarker::new(40))
        .with_tombstone(Tombstone::new(41, 0))
        .with_cells(
            mutation::Row::new()
                .with_cell(0, Cell::live(42, b"v".to_vec()))
                .with_cell(1, Cell::Collection(collection)),
        );
    flows.push(consumer.consume_clustering_row(row)?);
    flows.push(consumer.consume_range_tombstone(RangeTombstone {
        start: mutation::ClusteringBound::bottom(),
        end: mutation::ClusteringBound::top(),
        tombstone: Tombstone::new(50, 0),
    })?);
    flows.push(consumer.consume_partition_end()?);
    assert!(flows.iter().all(|f| f.is_continue()));

    // partition tombstone, static cell, marker, row tombstone, atomic cell,
    // collection tombstone, two collection cells, range tombstone
    let total: u64 = consumer.histogram().values().sum();
    assert_eq!(total, 9);
    assert_eq!(consumer.histogram().len(), 1);
    Ok(())
}

#[test]
fn empty_histogram_writes_nothing() -> Result<()> {
    let out = tempdir()?;
    let mut consumer = WritetimeHistogramConsumer::new(Bucket::Months, out.path());
    consumer.on_start_of_stream()?;
    consumer.on_end_of_stream()?;
    assert!(!consumer.output_path().exists());
    Ok(())
}

#[test]
fn histogram_counts_sum_to_timestamps_seen() -> Result<()> {
    let dir = tempdir()?;
    let mut mem = Memtable::new();
    for k in 0..10 {
        mem.apply(partition(k, 3, i64::from(k) * 40 * 24 * HOUR));
    }
    let sst = open(&write(dir.path(), 1, &mem)?)?;
    let out = tempdir()?;
    let mut consumer = WritetimeHistogramConsumer::new(Bucket::Months, out.path());
    run_consumer(
        &mut consumer,
        &[sst],
        &permit(),
        &PartitionSet::new(),
        StreamOptions::default(),
    )?;

    let json = read_histogram(&consumer.output_path())?;
    let counts: Vec<u64> = serde_json::from_value(json["counts"].clone())?;
    let buckets: Vec<i64> = serde_json::from_value(json["buckets"].clone())?;
    assert_eq!(counts.iter().sum::<u64>(), 30);
    assert_eq!(counts.len(), buckets.len());
    assert!(buckets.windows(2).all(|w| w[0] < w[1]));
    Ok(())
}
