//! The Summary component: a sparse sample of the index.
//!
//! One entry is kept for every `min_index_interval` index entries; its
//! `position` is the byte offset of the sampled entry in the Index file. A
//! lookup binary-searches the samples and then scans at most
//! `min_index_interval` index entries.
//!
//! ```text
//! header     min_index_interval u32 | size u32 | memory_size u64
//!            | sampling_level u32 | size_at_full_sampling u32
//! positions  u32 * size          offset of each entry within the entries block
//! entries    (key_len u32 | key | token i64 | position u64) * size
//! first_key  key_len u32 | key
//! last_key   key_len u32 | key
//! ```

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use mutation::DecoratedKey;

use crate::error::invalid_data;
use crate::format::{read_bytes, write_bytes, MAX_KEY_BYTES};
use crate::index::IndexEntry;

pub const DEFAULT_MIN_INDEX_INTERVAL: u32 = 128;
pub const BASE_SAMPLING_LEVEL: u32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryHeader {
    pub min_index_interval: u32,
    pub size: u32,
    pub memory_size: u64,
    pub sampling_level: u32,
    pub size_at_full_sampling: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryEntry {
    pub key: Vec<u8>,
    pub token: i64,
    /// Offset of the sampled entry in the Index component.
    pub position: u64,
}

impl SummaryEntry {
    fn encoded_len(&self) -> u64 {
        4 + self.key.len() as u64 + 8 + 8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub header: SummaryHeader,
    pub positions: Vec<u32>,
    pub entries: Vec<SummaryEntry>,
    pub first_key: Vec<u8>,
    pub last_key: Vec<u8>,
}

impl Summary {
    /// Samples an index. `index` must be in decorated-key order.
    pub fn build(index: &[IndexEntry], min_index_interval: u32) -> Self {
        let interval = min_index_interval.max(1) as usize;
        let mut entries = Vec::with_capacity(index.len() / interval + 1);
        let mut index_position = 0u64;
        for (i, e) in index.iter().enumerate() {
            if i % interval == 0 {
                entries.push(SummaryEntry {
                    key: e.key.key().to_vec(),
                    token: e.key.token().0,
                    position: index_position,
                });
            }
            index_position += e.encoded_len();
        }

        let mut positions = Vec::with_capacity(entries.len());
        let mut memory_size = 0u64;
        for e in &entries {
            positions.push(memory_size as u32);
            memory_size += e.encoded_len();
        }

        let size = entries.len() as u32;
        Self {
            header: SummaryHeader {
                min_index_interval: interval as u32,
                size,
                memory_size,
                sampling_level: BASE_SAMPLING_LEVEL,
                size_at_full_sampling: size,
            },
            positions,
            entries,
            first_key: index.first().map(|e| e.key.key().to_vec()).unwrap_or_default(),
            last_key: index.last().map(|e| e.key.key().to_vec()).unwrap_or_default(),
        }
    }

    /// Index offset to start scanning from to find `key`: the position of
    /// the last sample at or before it, or 0.
    #[must_use]
    pub fn index_position_for(&self, key: &DecoratedKey) -> u64 {
        let target = (key.token().0, key.key());
        let after = self
            .entries
            .partition_point(|e| (e.token, e.key.as_slice()) <= target);
        match after {
            0 => 0,
            n => self.entries[n - 1].position,
        }
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let header = SummaryHeader {
            min_index_interval: r.read_u32::<LittleEndian>()?,
            size: r.read_u32::<LittleEndian>()?,
            memory_size: r.read_u64::<LittleEndian>()?,
            sampling_level: r.read_u32::<LittleEndian>()?,
            size_at_full_sampling: r.read_u32::<LittleEndian>()?,
        };
        if header.min_index_interval == 0 {
            return Err(invalid_data("min_index_interval is zero"));
        }
        let size = header.size as usize;
        // Every entry takes at least 20 bytes; refuse sizes that cannot fit.
        if header.memory_size < size as u64 * 20 {
            return Err(invalid_data(format!(
                "summary claims {} entries in {} bytes",
                size, header.memory_size
            )));
        }
        let positions = (0..size)
            .map(|_| r.read_u32::<LittleEndian>())
            .collect::<io::Result<Vec<_>>>()?;
        let mut entries = Vec::with_capacity(size);
        for _ in 0..size {
            let key = read_bytes(r, MAX_KEY_BYTES)?;
            let token = r.read_i64::<LittleEndian>()?;
            let position = r.read_u64::<LittleEndian>()?;
            entries.push(SummaryEntry {
                key,
                token,
                position,
            });
        }
        let first_key = read_bytes(r, MAX_KEY_BYTES)?;
        let last_key = read_bytes(r, MAX_KEY_BYTES)?;
        Ok(Self {
            header,
            positions,
            entries,
            first_key,
            last_key,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let h = &self.header;
        w.write_u32::<LittleEndian>(h.min_index_interval)?;
        w.write_u32::<LittleEndian>(h.size)?;
        w.write_u64::<LittleEndian>(h.memory_size)?;
        w.write_u32::<LittleEndian>(h.sampling_level)?;
        w.write_u32::<LittleEndian>(h.size_at_full_sampling)?;
        for p in &self.positions {
            w.write_u32::<LittleEndian>(*p)?;
        }
        for e in &self.entries {
            write_bytes(w, &e.key)?;
            w.write_i64::<LittleEndian>(e.token)?;
            w.write_u64::<LittleEndian>(e.position)?;
        }
        write_bytes(w, &self.first_key)?;
        write_bytes(w, &self.last_key)
    }
}
