use super::*;
use crate::*;
use anyhow::Result;
use std::io::{Cursor, Read, Seek, SeekFrom};

// -------------------- Descriptor --------------------

#[test]
fn descriptor_parses_data_path() -> Result<()> {
    let desc = Descriptor::from_path(Path::new("/var/lib/t/me-42-big-Data.db"))?;
    assert_eq!(desc.generation(), 42);
    assert_eq!(desc.version(), "me");
    assert_eq!(desc.format(), "big");
    assert_eq!(
        desc.path(Component::Toc),
        PathBuf::from("/var/lib/t/me-42-big-TOC.txt")
    );
    assert_eq!(
        Descriptor::from_path(Path::new("me-1-big-Index.db"))?.dir(),
        Path::new(".")
    );
    Ok(())
}

#[test]
fn descriptor_rejects_foreign_names() {
    for name in ["data.sst", "me-x-big-Data.db", "me-1-big-Bogus.db", "me-1-big"] {
        let err = Descriptor::from_path(Path::new(name)).unwrap_err();
        assert!(matches!(err, SstableError::InvalidName { .. }), "{}", name);
    }
}

// -------------------- Record framing --------------------

#[test]
fn read_record_detects_bad_checksum() -> Result<()> {
    let mut buf = Vec::new();
    write_record(&mut buf, KIND_STATIC_ROW, b"payload")?;
    let last = buf.len() - 1;
    buf[last] ^= 1;
    let err = read_record(&mut buf.as_slice(), 0).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    Ok(())
}

#[test]
fn read_record_rejects_unknown_kind_and_huge_length() {
    let unknown = [9u8, 0, 0, 0, 0, 0, 0, 0, 0];
    assert!(read_record(&mut unknown.as_slice(), 0).is_err());

    let mut huge = vec![KIND_PARTITION_END];
    huge.extend_from_slice(&u32::MAX.to_le_bytes());
    huge.extend_from_slice(&[0; 4]);
    let err = read_record(&mut huge.as_slice(), 0).unwrap_err();
    assert!(err.to_string().contains("exceeds maximum"));
}

#[test]
fn decode_rejects_trailing_bytes() -> Result<()> {
    let mut body = Vec::new();
    let kind = encode_fragment(&mutation::MutationFragment::PartitionEnd, &mut body)?;
    body.push(0);
    assert!(decode_fragment(kind, &body).is_err());
    Ok(())
}

// -------------------- Compression --------------------

#[test]
fn compressed_reader_seeks_across_chunks() -> Result<()> {
    let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    let (on_disk, info) = compress_chunks(&data, 1024);
    assert_eq!(info.offsets.len(), 10);

    let mut reader = CompressedReader::new(Cursor::new(on_disk), info)?;
    assert_eq!(reader.data_len(), 10_000);
    let mut all = Vec::new();
    reader.read_to_end(&mut all)?;
    assert_eq!(all, data);

    reader.seek(SeekFrom::Start(1020))?;
    let mut window = [0u8; 10];
    reader.read_exact(&mut window)?;
    assert_eq!(&window[..], &data[1020..1030]);
    Ok(())
}

#[test]
fn compressed_chunk_corruption_is_detected() -> Result<()> {
    let data = vec![7u8; 5000];
    let (mut on_disk, info) = compress_chunks(&data, 2048);
    let second = info.offsets[1] as usize;
    on_disk[second + 2] ^= 0x55;
    let mut reader = CompressedReader::new(Cursor::new(on_disk), info)?;
    reader.seek(SeekFrom::Start(3000))?;
    let err = reader.read(&mut [0u8; 4]).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    assert!(err.to_string().contains("chunk 1"));
    Ok(())
}

#[test]
fn compression_info_rejects_offset_count_mismatch() -> Result<()> {
    let (_, mut info) = compress_chunks(&[1u8; 3000], 1024);
    info.offsets.pop();
    let mut buf = Vec::new();
    info.write_to(&mut buf)?;
    assert!(CompressionInfo::read_from(&mut buf.as_slice()).is_err());
    Ok(())
}

// -------------------- Summary --------------------

#[test]
fn summary_lookup_lands_at_or_before_key() -> Result<()> {
    let mut keys: Vec<DecoratedKey> = (0..100).map(int_key).collect();
    keys.sort();
    let mut offset = 0;
    let entries: Vec<IndexEntry> = keys
        .iter()
        .map(|k| {
            let e = IndexEntry {
                key: k.clone(),
                data_offset: offset,
            };
            offset += 100;
            e
        })
        .collect();
    let summary = Summary::build(&entries, 10);
    assert_eq!(summary.entries.len(), 10);

    let index_positions: Vec<u64> = entries
        .iter()
        .scan(0u64, |pos, e| {
            let here = *pos;
            *pos += e.encoded_len();
            Some(here)
        })
        .collect();
    for (i, key) in keys.iter().enumerate() {
        let sampled = (i / 10) * 10;
        assert_eq!(summary.index_position_for(key), index_positions[sampled]);
    }
    let below = DecoratedKey::from_raw(b"x".to_vec());
    if below < keys[0] {
        assert_eq!(summary.index_position_for(&below), 0);
    }
    Ok(())
}

#[test]
fn summary_rejects_impossible_size() {
    let mut buf = Vec::new();
    buf.extend_from_slice(&128u32.to_le_bytes());
    buf.extend_from_slice(&1_000_000u32.to_le_bytes());
    buf.extend_from_slice(&16u64.to_le_bytes());
    buf.extend_from_slice(&128u32.to_le_bytes());
    buf.extend_from_slice(&1_000_000u32.to_le_bytes());
    let err = Summary::read_from(&mut buf.as_slice()).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}

// -------------------- Statistics --------------------

#[test]
fn statistics_offsets_point_at_blocks() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let sst = open(&write(dir.path(), 1, &memtable(0..3, 2, 1))?)?;
    let stats = sst.statistics();
    let types: Vec<MetadataType> = stats.offsets.iter().map(|(t, _)| *t).collect();
    assert_eq!(
        types,
        vec![
            MetadataType::Validation,
            MetadataType::Compaction,
            MetadataType::Stats,
            MetadataType::Serialization
        ]
    );
    assert_eq!(stats.offsets[0].1, 4 + 8 * 4);
    assert!(stats.offsets.windows(2).all(|w| w[0].1 < w[1].1));
    Ok(())
}

#[test]
fn estimated_histogram_buckets_values() {
    let mut h = EstimatedHistogram::new(10);
    assert_eq!(h.bucket_offsets, vec![1, 2, 3, 4, 5, 6, 7, 8, 10, 12]);
    h.add(1);
    h.add(9);
    h.add(10);
    h.add(1_000);
    assert_eq!(h.buckets[0], 1);
    assert_eq!(h.buckets[8], 2);
    assert_eq!(h.buckets[10], 1);
    assert_eq!(h.count(), 4);
}

#[test]
fn streaming_histogram_stays_bounded() {
    let mut h = StreamingHistogram::new(5);
    for v in 0..100 {
        h.update(f64::from(v));
    }
    assert_eq!(h.bins.len(), 5);
    assert_eq!(h.bins.iter().map(|(_, c)| c).sum::<u64>(), 100);
    assert!(h.bins.windows(2).all(|w| w[0].0 < w[1].0));
}

// -------------------- Scylla metadata --------------------

#[test]
fn scylla_metadata_skips_unknown_entries() -> Result<()> {
    let meta = ScyllaMetadata {
        origin: Some("compaction".to_string()),
        features: Some(Feature::ShadowableTombstones as u64),
        ..ScyllaMetadata::default()
    };
    let mut buf = Vec::new();
    meta.write_to(&mut buf)?;
    // bump the entry count and append an entry of an unknown type
    let count = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) + 1;
    buf[..4].copy_from_slice(&count.to_le_bytes());
    buf.extend_from_slice(&77u32.to_le_bytes());
    buf.extend_from_slice(&3u32.to_le_bytes());
    buf.extend_from_slice(b"xyz");

    let read = ScyllaMetadata::read_from(&mut buf.as_slice())?;
    assert_eq!(read, meta);
    Ok(())
}

#[test]
fn token_range_display_marks_exclusive_ends() {
    let range = TokenRange {
        left: TokenBound {
            exclusive: true,
            token: -5,
        },
        right: TokenBound {
            exclusive: false,
            token: 9,
        },
    };
    assert_eq!(range.to_string(), "(-5, 9]");
}

#[test]
fn feature_names_follow_bit_order() {
    let mask = Feature::CorrectUDTsInCollections as u64 | Feature::NonCompoundPIEntries as u64;
    assert_eq!(
        Feature::names_in(mask),
        vec!["NonCompoundPIEntries", "CorrectUDTsInCollections"]
    );
}
