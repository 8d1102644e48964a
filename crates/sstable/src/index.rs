//! The Index component: one entry per partition, in decorated-key order.
//!
//! ```text
//! [key_len: u32 LE][key][data_offset: u64 LE]
//! ```
//!
//! `data_offset` is the position of the partition's first record in the
//! uncompressed data stream.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use mutation::DecoratedKey;

use crate::error::{invalid_data, Component, ComponentContext, Result};
use crate::format::MAX_KEY_BYTES;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: DecoratedKey,
    pub data_offset: u64,
}

impl IndexEntry {
    /// Serialized size of the entry.
    #[must_use]
    pub fn encoded_len(&self) -> u64 {
        4 + self.key.key().len() as u64 + 8
    }
}

pub fn write_index_entry<W: Write>(w: &mut W, entry: &IndexEntry) -> io::Result<()> {
    w.write_u32::<LittleEndian>(entry.key.key().len() as u32)?;
    w.write_all(entry.key.key())?;
    w.write_u64::<LittleEndian>(entry.data_offset)
}

/// Reads one entry; `Ok(None)` on a clean end of file.
pub fn read_index_entry<R: Read>(r: &mut R) -> io::Result<Option<IndexEntry>> {
    let key_len = match r.read_u32::<LittleEndian>() {
        Ok(n) => n as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    if key_len > MAX_KEY_BYTES {
        return Err(invalid_data(format!(
            "corrupt index: key_len {} exceeds maximum {}",
            key_len, MAX_KEY_BYTES
        )));
    }
    let mut key = vec![0u8; key_len];
    r.read_exact(&mut key)?;
    let data_offset = r.read_u64::<LittleEndian>()?;
    Ok(Some(IndexEntry {
        key: DecoratedKey::from_raw(key),
        data_offset,
    }))
}

/// Forward-only cursor over the Index component.
///
/// Readers use it to find where the next partition starts without decoding
/// the data in between.
pub struct IndexCursor {
    input: BufReader<File>,
    path: PathBuf,
}

impl IndexCursor {
    /// Opens the index positioned at byte `offset` (normally taken from the
    /// summary).
    pub fn open(path: &Path, offset: u64) -> Result<Self> {
        let mut file = File::open(path).in_component(path, Component::Index)?;
        file.seek(SeekFrom::Start(offset))
            .in_component(path, Component::Index)?;
        Ok(Self {
            input: BufReader::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn next_entry(&mut self) -> Result<Option<IndexEntry>> {
        read_index_entry(&mut self.input).in_component(&self.path, Component::Index)
    }

    /// First entry whose key sorts after `key`.
    pub fn next_after(&mut self, key: &DecoratedKey) -> Result<Option<IndexEntry>> {
        while let Some(entry) = self.next_entry()? {
            if entry.key > *key {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// First entry accepted by `reached`, e.g. the first key at or after a
    /// range start.
    pub fn advance_until(
        &mut self,
        mut reached: impl FnMut(&DecoratedKey) -> bool,
    ) -> Result<Option<IndexEntry>> {
        while let Some(entry) = self.next_entry()? {
            if reached(&entry.key) {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }
}

/// Loads every entry of an Index component.
pub fn read_all(path: &Path) -> Result<Vec<IndexEntry>> {
    let mut cursor = IndexCursor::open(path, 0)?;
    let mut entries = Vec::new();
    while let Some(entry) = cursor.next_entry()? {
        entries.push(entry);
    }
    Ok(entries)
}
