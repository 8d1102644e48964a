//! Data component record framing and the fragment codec.
//!
//! ## Record frame
//!
//! ```text
//! [kind: u8][body_len: u32 LE][crc32: u32 LE][body ...]
//! ```
//!
//! The CRC32 covers the body only. One record carries one mutation
//! fragment; `kind` is one of the `KIND_*` constants.
//!
//! ## Bodies
//!
//! ```text
//! partition start   key_len u32 | key | tombstone?
//! static row        row
//! clustering row    clustering | marker? | tombstone? | row
//! range tombstone   bound | bound | tombstone
//! partition end     (empty)
//!
//! tombstone?   u8 present | [timestamp i64 | deletion_time i64]
//! clustering   count u16 | (len u32 | bytes)*
//! bound        kind u8 | clustering
//! marker?      u8 present | [timestamp i64 | expiry?]
//! expiry?      u8 present | [ttl i32 | expires_at i64]
//! row          count u32 | cell*
//! cell         column u32 | 0 u8 | atomic
//!              column u32 | 1 u8 | tombstone? | count u32 | (path_len u32 | path | atomic)*
//! atomic       0 u8 | timestamp i64 | expiry? | len u32 | value     (live)
//!              1 u8 | timestamp i64 | deletion_time i64            (dead)
//! ```
//!
//! All integers are little-endian.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use mutation::{
    AtomicCell, BoundKind, Cell, ClusteringBound, ClusteringKey, ClusteringRow, CollectionMutation,
    DecoratedKey, Expiry, MutationFragment, PartitionStart, RangeTombstone, Row, RowMarker,
    StaticRow, Tombstone,
};

use crate::error::invalid_data;

pub const KIND_PARTITION_START: u8 = 0;
pub const KIND_STATIC_ROW: u8 = 1;
pub const KIND_CLUSTERING_ROW: u8 = 2;
pub const KIND_RANGE_TOMBSTONE: u8 = 3;
pub const KIND_PARTITION_END: u8 = 4;

/// Size of the frame header: kind + body_len + crc32.
pub const FRAME_HEADER_BYTES: u64 = 1 + 4 + 4;

/// Maximum key size we'll allocate during reads (64 KiB). Prevents OOM on corrupt files.
pub const MAX_KEY_BYTES: usize = 64 * 1024;
/// Maximum record body size (64 MiB).
pub const MAX_RECORD_BYTES: usize = 64 * 1024 * 1024;
/// Maximum single value size (16 MiB).
const MAX_VALUE_BYTES: usize = 16 * 1024 * 1024;

/// A framed record whose body has been checksum-verified but not decoded.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub kind: u8,
    pub body: Vec<u8>,
}

impl RawRecord {
    /// Bytes the record occupies in the (uncompressed) data stream.
    #[must_use]
    pub fn frame_len(&self) -> u64 {
        FRAME_HEADER_BYTES + self.body.len() as u64
    }
}

/// Writes one framed record.
pub fn write_record<W: Write>(w: &mut W, kind: u8, body: &[u8]) -> io::Result<()> {
    if body.len() > MAX_RECORD_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "record too large",
        ));
    }
    let mut hasher = Crc32::new();
    hasher.update(body);
    w.write_u8(kind)?;
    w.write_u32::<LittleEndian>(body.len() as u32)?;
    w.write_u32::<LittleEndian>(hasher.finalize())?;
    w.write_all(body)
}

/// Reads one framed record; `Ok(None)` on a clean end of stream.
///
/// `offset` is only used to make checksum errors locatable.
pub fn read_record<R: Read>(r: &mut R, offset: u64) -> io::Result<Option<RawRecord>> {
    let mut kind = [0u8; 1];
    loop {
        match r.read(&mut kind) {
            Ok(0) => return Ok(None),
            Ok(_) => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    let kind = kind[0];
    if kind > KIND_PARTITION_END {
        return Err(invalid_data(format!(
            "unknown record kind {} at offset {}",
            kind, offset
        )));
    }
    let body_len = r.read_u32::<LittleEndian>()? as usize;
    if body_len > MAX_RECORD_BYTES {
        return Err(invalid_data(format!(
            "record at offset {} claims {} bytes, exceeds maximum {}",
            offset, body_len, MAX_RECORD_BYTES
        )));
    }
    let stored_crc = r.read_u32::<LittleEndian>()?;
    let mut body = vec![0u8; body_len];
    r.read_exact(&mut body)?;

    let mut hasher = Crc32::new();
    hasher.update(&body);
    let actual_crc = hasher.finalize();
    if actual_crc != stored_crc {
        return Err(invalid_data(format!(
            "CRC32 mismatch at offset {}: expected {:#010x}, got {:#010x}",
            offset, stored_crc, actual_crc
        )));
    }
    Ok(Some(RawRecord { kind, body }))
}

// -------------------- Encoding --------------------

/// Serializes a fragment body, returning the record kind.
pub fn encode_fragment(fragment: &MutationFragment, buf: &mut Vec<u8>) -> io::Result<u8> {
    match fragment {
        MutationFragment::PartitionStart(ps) => {
            write_bytes(buf, ps.key.key())?;
            write_opt_tombstone(buf, ps.tombstone)?;
            Ok(KIND_PARTITION_START)
        }
        MutationFragment::StaticRow(sr) => {
            write_row(buf, &sr.cells)?;
            Ok(KIND_STATIC_ROW)
        }
        MutationFragment::ClusteringRow(cr) => {
            write_clustering(buf, &cr.key)?;
            match cr.marker {
                Some(m) => {
                    buf.write_u8(1)?;
                    buf.write_i64::<LittleEndian>(m.timestamp)?;
                    write_opt_expiry(buf, m.expiry)?;
                }
                None => buf.write_u8(0)?,
            }
            write_opt_tombstone(buf, cr.tombstone)?;
            write_row(buf, &cr.cells)?;
            Ok(KIND_CLUSTERING_ROW)
        }
        MutationFragment::RangeTombstone(rt) => {
            write_bound(buf, &rt.start)?;
            write_bound(buf, &rt.end)?;
            write_tombstone(buf, rt.tombstone)?;
            Ok(KIND_RANGE_TOMBSTONE)
        }
        MutationFragment::PartitionEnd => Ok(KIND_PARTITION_END),
    }
}

pub(crate) fn write_bytes<W: Write>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    w.write_u32::<LittleEndian>(bytes.len() as u32)?;
    w.write_all(bytes)
}

pub(crate) fn write_string<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    if s.len() > u16::MAX as usize {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "string too long"));
    }
    w.write_u16::<LittleEndian>(s.len() as u16)?;
    w.write_all(s.as_bytes())
}

fn write_tombstone<W: Write>(w: &mut W, t: Tombstone) -> io::Result<()> {
    w.write_i64::<LittleEndian>(t.timestamp)?;
    w.write_i64::<LittleEndian>(t.deletion_time)
}

fn write_opt_tombstone<W: Write>(w: &mut W, t: Option<Tombstone>) -> io::Result<()> {
    match t {
        Some(t) => {
            w.write_u8(1)?;
            write_tombstone(w, t)
        }
        None => w.write_u8(0),
    }
}

fn write_opt_expiry<W: Write>(w: &mut W, e: Option<Expiry>) -> io::Result<()> {
    match e {
        Some(e) => {
            w.write_u8(1)?;
            w.write_i32::<LittleEndian>(e.ttl)?;
            w.write_i64::<LittleEndian>(e.expires_at)
        }
        None => w.write_u8(0),
    }
}

pub(crate) fn write_clustering<W: Write>(w: &mut W, key: &ClusteringKey) -> io::Result<()> {
    w.write_u16::<LittleEndian>(key.components().len() as u16)?;
    for c in key.components() {
        write_bytes(w, c)?;
    }
    Ok(())
}

fn write_bound<W: Write>(w: &mut W, bound: &ClusteringBound) -> io::Result<()> {
    w.write_u8(match bound.kind {
        BoundKind::InclStart => 0,
        BoundKind::ExclStart => 1,
        BoundKind::InclEnd => 2,
        BoundKind::ExclEnd => 3,
    })?;
    write_clustering(w, &bound.prefix)
}

fn write_atomic<W: Write>(w: &mut W, cell: &AtomicCell) -> io::Result<()> {
    match cell {
        AtomicCell::Live {
            timestamp,
            value,
            expiry,
        } => {
            w.write_u8(0)?;
            w.write_i64::<LittleEndian>(*timestamp)?;
            write_opt_expiry(w, *expiry)?;
            write_bytes(w, value)
        }
        AtomicCell::Dead {
            timestamp,
            deletion_time,
        } => {
            w.write_u8(1)?;
            w.write_i64::<LittleEndian>(*timestamp)?;
            w.write_i64::<LittleEndian>(*deletion_time)
        }
    }
}

fn write_row<W: Write>(w: &mut W, row: &Row) -> io::Result<()> {
    w.write_u32::<LittleEndian>(row.len() as u32)?;
    for (column, cell) in row.cells() {
        w.write_u32::<LittleEndian>(column)?;
        match cell {
            Cell::Atomic(a) => {
                w.write_u8(0)?;
                write_atomic(w, a)?;
            }
            Cell::Collection(m) => {
                w.write_u8(1)?;
                write_opt_tombstone(w, m.tombstone)?;
                w.write_u32::<LittleEndian>(m.cells.len() as u32)?;
                for (path, c) in &m.cells {
                    write_bytes(w, path)?;
                    write_atomic(w, c)?;
                }
            }
        }
    }
    Ok(())
}

// -------------------- Decoding --------------------

/// Decodes a record body produced by [`encode_fragment`].
pub fn decode_fragment(kind: u8, body: &[u8]) -> io::Result<MutationFragment> {
    let mut r = body;
    let fragment = match kind {
        KIND_PARTITION_START => {
            let key = read_bytes(&mut r, MAX_KEY_BYTES)?;
            let tombstone = read_opt_tombstone(&mut r)?;
            MutationFragment::PartitionStart(PartitionStart {
                key: DecoratedKey::from_raw(key),
                tombstone,
            })
        }
        KIND_STATIC_ROW => MutationFragment::StaticRow(StaticRow {
            cells: read_row(&mut r)?,
        }),
        KIND_CLUSTERING_ROW => {
            let key = read_clustering(&mut r)?;
            let marker = match r.read_u8()? {
                0 => None,
                _ => Some(RowMarker {
                    timestamp: r.read_i64::<LittleEndian>()?,
                    expiry: read_opt_expiry(&mut r)?,
                }),
            };
            let tombstone = read_opt_tombstone(&mut r)?;
            let cells = read_row(&mut r)?;
            MutationFragment::ClusteringRow(ClusteringRow {
                key,
                marker,
                tombstone,
                cells,
            })
        }
        KIND_RANGE_TOMBSTONE => MutationFragment::RangeTombstone(RangeTombstone {
            start: read_bound(&mut r)?,
            end: read_bound(&mut r)?,
            tombstone: read_tombstone(&mut r)?,
        }),
        KIND_PARTITION_END => MutationFragment::PartitionEnd,
        other => return Err(invalid_data(format!("unknown record kind {}", other))),
    };
    if !r.is_empty() {
        return Err(invalid_data(format!(
            "{} trailing bytes after {}",
            r.len(),
            fragment.kind()
        )));
    }
    Ok(fragment)
}

pub(crate) fn read_bytes<R: Read>(r: &mut R, max: usize) -> io::Result<Vec<u8>> {
    let len = r.read_u32::<LittleEndian>()? as usize;
    if len > max {
        return Err(invalid_data(format!(
            "length {} exceeds maximum {}",
            len, max
        )));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub(crate) fn read_string<R: Read>(r: &mut R) -> io::Result<String> {
    let len = r.read_u16::<LittleEndian>()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| invalid_data(format!("string is not UTF-8: {}", e)))
}

fn read_tombstone<R: Read>(r: &mut R) -> io::Result<Tombstone> {
    Ok(Tombstone {
        timestamp: r.read_i64::<LittleEndian>()?,
        deletion_time: r.read_i64::<LittleEndian>()?,
    })
}

fn read_opt_tombstone<R: Read>(r: &mut R) -> io::Result<Option<Tombstone>> {
    match r.read_u8()? {
        0 => Ok(None),
        _ => read_tombstone(r).map(Some),
    }
}

fn read_opt_expiry<R: Read>(r: &mut R) -> io::Result<Option<Expiry>> {
    match r.read_u8()? {
        0 => Ok(None),
        _ => Ok(Some(Expiry {
            ttl: r.read_i32::<LittleEndian>()?,
            expires_at: r.read_i64::<LittleEndian>()?,
        })),
    }
}

pub(crate) fn read_clustering<R: Read>(r: &mut R) -> io::Result<ClusteringKey> {
    let count = r.read_u16::<LittleEndian>()?;
    let components = (0..count)
        .map(|_| read_bytes(r, MAX_KEY_BYTES))
        .collect::<io::Result<Vec<_>>>()?;
    Ok(ClusteringKey::new(components))
}

fn read_bound<R: Read>(r: &mut R) -> io::Result<ClusteringBound> {
    let kind = match r.read_u8()? {
        0 => BoundKind::InclStart,
        1 => BoundKind::ExclStart,
        2 => BoundKind::InclEnd,
        3 => BoundKind::ExclEnd,
        other => return Err(invalid_data(format!("unknown bound kind {}", other))),
    };
    Ok(ClusteringBound::new(read_clustering(r)?, kind))
}

fn read_atomic<R: Read>(r: &mut R) -> io::Result<AtomicCell> {
    match r.read_u8()? {
        0 => {
            let timestamp = r.read_i64::<LittleEndian>()?;
            let expiry = read_opt_expiry(r)?;
            let value = read_bytes(r, MAX_VALUE_BYTES)?;
            Ok(AtomicCell::Live {
                timestamp,
                value,
                expiry,
            })
        }
        1 => Ok(AtomicCell::Dead {
            timestamp: r.read_i64::<LittleEndian>()?,
            deletion_time: r.read_i64::<LittleEndian>()?,
        }),
        other => Err(invalid_data(format!("unknown cell flag {}", other))),
    }
}

fn read_row<R: Read>(r: &mut R) -> io::Result<Row> {
    let count = r.read_u32::<LittleEndian>()?;
    let mut row = Row::new();
    for _ in 0..count {
        let column = r.read_u32::<LittleEndian>()?;
        let cell = match r.read_u8()? {
            0 => Cell::Atomic(read_atomic(r)?),
            1 => {
                let tombstone = read_opt_tombstone(r)?;
                let n = r.read_u32::<LittleEndian>()?;
                let mut cells = BTreeMap::new();
                for _ in 0..n {
                    let path = read_bytes(r, MAX_KEY_BYTES)?;
                    cells.insert(path, read_atomic(r)?);
                }
                Cell::Collection(CollectionMutation { tombstone, cells })
            }
            other => return Err(invalid_data(format!("unknown cell kind {}", other))),
        };
        row.insert(column, cell);
    }
    Ok(row)
}
