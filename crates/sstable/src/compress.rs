//! Chunked LZ4 compression of the Data component.
//!
//! The uncompressed data stream is cut into chunks of `chunk_len` bytes
//! (the last one may be shorter). On disk each chunk is
//!
//! ```text
//! [lz4 block, uncompressed size prepended][crc32 of the block: u32 LE]
//! ```
//!
//! and the CompressionInfo component records where every chunk starts:
//!
//! ```text
//! name            u16 len | bytes
//! options         u32 count | (u16 len | key | u16 len | value)*
//! chunk_len       u32
//! data_len        u64      uncompressed length
//! offsets         u32 count | u64*
//! ```
//!
//! [`CompressedReader`] turns that back into a seekable view of the
//! uncompressed stream, so the record decoder never knows the difference.

use std::io::{self, Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;

use crate::error::invalid_data;
use crate::format::{read_string, write_string};

pub const LZ4_COMPRESSOR: &str = "LZ4Compressor";
pub const DEFAULT_CHUNK_LEN: u32 = 4096;

const MAX_CHUNK_LEN: u32 = 64 * 1024 * 1024;

/// Contents of the CompressionInfo component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionInfo {
    pub name: String,
    pub options: Vec<(String, String)>,
    pub chunk_len: u32,
    pub data_len: u64,
    pub offsets: Vec<u64>,
}

impl CompressionInfo {
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let name = read_string(r)?;
        let option_count = r.read_u32::<LittleEndian>()?;
        let mut options = Vec::new();
        for _ in 0..option_count {
            let key = read_string(r)?;
            let value = read_string(r)?;
            options.push((key, value));
        }
        let chunk_len = r.read_u32::<LittleEndian>()?;
        if chunk_len == 0 || chunk_len > MAX_CHUNK_LEN {
            return Err(invalid_data(format!("invalid chunk_len {}", chunk_len)));
        }
        let data_len = r.read_u64::<LittleEndian>()?;
        let count = r.read_u32::<LittleEndian>()? as u64;
        let expected = data_len.div_ceil(u64::from(chunk_len));
        if count != expected {
            return Err(invalid_data(format!(
                "{} chunk offsets for {} bytes of data, expected {}",
                count, data_len, expected
            )));
        }
        let offsets = (0..count)
            .map(|_| r.read_u64::<LittleEndian>())
            .collect::<io::Result<Vec<_>>>()?;
        if offsets.windows(2).any(|w| w[0] >= w[1]) {
            return Err(invalid_data("chunk offsets are not increasing"));
        }
        Ok(Self {
            name,
            options,
            chunk_len,
            data_len,
            offsets,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_string(w, &self.name)?;
        w.write_u32::<LittleEndian>(self.options.len() as u32)?;
        for (key, value) in &self.options {
            write_string(w, key)?;
            write_string(w, value)?;
        }
        w.write_u32::<LittleEndian>(self.chunk_len)?;
        w.write_u64::<LittleEndian>(self.data_len)?;
        w.write_u32::<LittleEndian>(self.offsets.len() as u32)?;
        for off in &self.offsets {
            w.write_u64::<LittleEndian>(*off)?;
        }
        Ok(())
    }
}

/// Compresses `data` chunk by chunk, returning the on-disk bytes and the
/// matching [`CompressionInfo`].
pub fn compress_chunks(data: &[u8], chunk_len: u32) -> (Vec<u8>, CompressionInfo) {
    let chunk_len = chunk_len.clamp(1, MAX_CHUNK_LEN);
    let mut out = Vec::with_capacity(data.len() / 2);
    let mut offsets = Vec::with_capacity(data.len() / chunk_len as usize + 1);
    for chunk in data.chunks(chunk_len as usize) {
        offsets.push(out.len() as u64);
        let compressed = lz4_flex::compress_prepend_size(chunk);
        let mut hasher = Crc32::new();
        hasher.update(&compressed);
        out.extend_from_slice(&compressed);
        out.extend_from_slice(&hasher.finalize().to_le_bytes());
    }
    let info = CompressionInfo {
        name: LZ4_COMPRESSOR.to_string(),
        options: vec![("chunk_length_in_kb".to_string(), (chunk_len / 1024).max(1).to_string())],
        chunk_len,
        data_len: data.len() as u64,
        offsets,
    };
    (out, info)
}

/// Seekable reader over the uncompressed view of a compressed Data file.
///
/// Holds one decompressed chunk at a time.
pub struct CompressedReader<R> {
    inner: R,
    info: CompressionInfo,
    file_len: u64,
    /// Position in the uncompressed stream.
    pos: u64,
    chunk: Vec<u8>,
    chunk_index: Option<usize>,
}

impl<R: Read + Seek> CompressedReader<R> {
    pub fn new(mut inner: R, info: CompressionInfo) -> io::Result<Self> {
        let file_len = inner.seek(SeekFrom::End(0))?;
        if let Some(&last) = info.offsets.last() {
            if last >= file_len {
                return Err(invalid_data(format!(
                    "chunk offset {} beyond end of file ({} bytes)",
                    last, file_len
                )));
            }
        }
        Ok(Self {
            inner,
            info,
            file_len,
            pos: 0,
            chunk: Vec::new(),
            chunk_index: None,
        })
    }

    /// Uncompressed length of the data stream.
    pub fn data_len(&self) -> u64 {
        self.info.data_len
    }

    fn load_chunk(&mut self, index: usize) -> io::Result<()> {
        if self.chunk_index == Some(index) {
            return Ok(());
        }
        let start = self.info.offsets[index];
        let end = self
            .info
            .offsets
            .get(index + 1)
            .copied()
            .unwrap_or(self.file_len);
        let on_disk = end.saturating_sub(start) as usize;
        if on_disk < 4 {
            return Err(invalid_data(format!("chunk {} is too short", index)));
        }

        let mut buf = vec![0u8; on_disk];
        self.inner.seek(SeekFrom::Start(start))?;
        self.inner.read_exact(&mut buf)?;
        let (compressed, crc) = buf.split_at(on_disk - 4);
        let stored = u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]);
        let mut hasher = Crc32::new();
        hasher.update(compressed);
        let actual = hasher.finalize();
        if actual != stored {
            return Err(invalid_data(format!(
                "CRC32 mismatch in compressed chunk {} at offset {}: expected {:#010x}, got {:#010x}",
                index, start, stored, actual
            )));
        }

        let chunk = lz4_flex::decompress_size_prepended(compressed)
            .map_err(|e| invalid_data(format!("chunk {}: {}", index, e)))?;
        let expected = (self.info.data_len - index as u64 * u64::from(self.info.chunk_len))
            .min(u64::from(self.info.chunk_len)) as usize;
        if chunk.len() != expected {
            return Err(invalid_data(format!(
                "chunk {} decompressed to {} bytes, expected {}",
                index,
                chunk.len(),
                expected
            )));
        }
        self.chunk = chunk;
        self.chunk_index = Some(index);
        Ok(())
    }
}

impl<R: Read + Seek> Read for CompressedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.info.data_len || buf.is_empty() {
            return Ok(0);
        }
        let chunk_len = u64::from(self.info.chunk_len);
        let index = (self.pos / chunk_len) as usize;
        self.load_chunk(index)?;
        let within = (self.pos % chunk_len) as usize;
        let available = &self.chunk[within..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for CompressedReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(d) => self.pos.checked_add_signed(d),
            SeekFrom::End(d) => self.info.data_len.checked_add_signed(d),
        };
        match target {
            Some(n) => {
                self.pos = n;
                Ok(n)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of data",
            )),
        }
    }
}
