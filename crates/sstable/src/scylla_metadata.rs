//! The optional Scylla component.
//!
//! ```text
//! count u32 | (type u32 | size u32 | body[size])*
//! ```
//!
//! Entry types this reader does not know are skipped using `size`.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use uuid::Uuid;

use crate::error::invalid_data;
use crate::format::{read_string, write_string};

const MAX_ENTRIES: u32 = 1024;
const MAX_ENTRY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScyllaMetadataType {
    Sharding = 1,
    Features = 2,
    ExtensionAttributes = 3,
    RunIdentifier = 4,
    LargeDataStats = 5,
    SSTableOrigin = 6,
}

impl ScyllaMetadataType {
    fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            1 => ScyllaMetadataType::Sharding,
            2 => ScyllaMetadataType::Features,
            3 => ScyllaMetadataType::ExtensionAttributes,
            4 => ScyllaMetadataType::RunIdentifier,
            5 => ScyllaMetadataType::LargeDataStats,
            6 => ScyllaMetadataType::SSTableOrigin,
            _ => return None,
        })
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ScyllaMetadataType::Sharding => "Sharding",
            ScyllaMetadataType::Features => "Features",
            ScyllaMetadataType::ExtensionAttributes => "ExtensionAttributes",
            ScyllaMetadataType::RunIdentifier => "RunIdentifier",
            ScyllaMetadataType::LargeDataStats => "LargeDataStats",
            ScyllaMetadataType::SSTableOrigin => "SSTableOrigin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBound {
    pub exclusive: bool,
    pub token: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenRange {
    pub left: TokenBound,
    pub right: TokenBound,
}

impl fmt::Display for TokenRange {
    /// `[a, b]`, with `(` / `)` for exclusive ends.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}, {}{}",
            if self.left.exclusive { '(' } else { '[' },
            self.left.token,
            self.right.token,
            if self.right.exclusive { ')' } else { ']' }
        )
    }
}

/// Bits of the Features entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    NonCompoundPIEntries = 1,
    NonCompoundRangeTombstones = 2,
    ShadowableTombstones = 4,
    CorrectStaticCompact = 8,
    CorrectEmptyCounters = 16,
    CorrectUDTsInCollections = 32,
}

impl Feature {
    pub const ALL: [Feature; 6] = [
        Feature::NonCompoundPIEntries,
        Feature::NonCompoundRangeTombstones,
        Feature::ShadowableTombstones,
        Feature::CorrectStaticCompact,
        Feature::CorrectEmptyCounters,
        Feature::CorrectUDTsInCollections,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Feature::NonCompoundPIEntries => "NonCompoundPIEntries",
            Feature::NonCompoundRangeTombstones => "NonCompoundRangeTombstones",
            Feature::ShadowableTombstones => "ShadowableTombstones",
            Feature::CorrectStaticCompact => "CorrectStaticCompact",
            Feature::CorrectEmptyCounters => "CorrectEmptyCounters",
            Feature::CorrectUDTsInCollections => "CorrectUDTsInCollections",
        }
    }

    /// Names of the features set in `mask`, in bit order.
    pub fn names_in(mask: u64) -> Vec<&'static str> {
        Self::ALL
            .into_iter()
            .filter(|f| mask & (*f as u64) != 0)
            .map(Feature::name)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LargeDataType {
    PartitionSize = 1,
    RowSize = 2,
    CellSize = 3,
    RowsInPartition = 4,
}

impl LargeDataType {
    fn from_u32(v: u32) -> io::Result<Self> {
        Ok(match v {
            1 => LargeDataType::PartitionSize,
            2 => LargeDataType::RowSize,
            3 => LargeDataType::CellSize,
            4 => LargeDataType::RowsInPartition,
            other => return Err(invalid_data(format!("unknown large data type {}", other))),
        })
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            LargeDataType::PartitionSize => "partition_size",
            LargeDataType::RowSize => "row_size",
            LargeDataType::CellSize => "cell_size",
            LargeDataType::RowsInPartition => "rows_in_partition",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LargeDataStatsEntry {
    pub max_value: u64,
    pub threshold: u64,
    pub above_threshold: u32,
}

impl LargeDataStatsEntry {
    /// Accounts one observed value.
    pub fn observe(&mut self, value: u64) {
        self.max_value = self.max_value.max(value);
        if value > self.threshold {
            self.above_threshold += 1;
        }
    }
}

/// Contents of the Scylla component; absent entries are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScyllaMetadata {
    pub sharding: Option<Vec<TokenRange>>,
    pub features: Option<u64>,
    pub extension_attributes: Option<BTreeMap<String, String>>,
    pub run_identifier: Option<Uuid>,
    pub large_data_stats: Option<BTreeMap<LargeDataType, LargeDataStatsEntry>>,
    pub origin: Option<String>,
}

impl ScyllaMetadata {
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let count = r.read_u32::<LittleEndian>()?;
        if count > MAX_ENTRIES {
            return Err(invalid_data(format!("{} scylla metadata entries", count)));
        }
        let mut meta = ScyllaMetadata::default();
        for _ in 0..count {
            let ty = r.read_u32::<LittleEndian>()?;
            let size = r.read_u32::<LittleEndian>()? as usize;
            if size > MAX_ENTRY_BYTES {
                return Err(invalid_data(format!(
                    "scylla metadata entry {} claims {} bytes",
                    ty, size
                )));
            }
            let mut body = vec![0u8; size];
            r.read_exact(&mut body)?;
            let Some(ty) = ScyllaMetadataType::from_u32(ty) else {
                continue;
            };
            let mut b = body.as_slice();
            match ty {
                ScyllaMetadataType::Sharding => {
                    let n = b.read_u32::<LittleEndian>()?;
                    let ranges = (0..n)
                        .map(|_| {
                            Ok(TokenRange {
                                left: read_token_bound(&mut b)?,
                                right: read_token_bound(&mut b)?,
                            })
                        })
                        .collect::<io::Result<Vec<_>>>()?;
                    meta.sharding = Some(ranges);
                }
                ScyllaMetadataType::Features => {
                    meta.features = Some(b.read_u64::<LittleEndian>()?);
                }
                ScyllaMetadataType::ExtensionAttributes => {
                    let n = b.read_u32::<LittleEndian>()?;
                    let mut attrs = BTreeMap::new();
                    for _ in 0..n {
                        let k = read_string(&mut b)?;
                        attrs.insert(k, read_string(&mut b)?);
                    }
                    meta.extension_attributes = Some(attrs);
                }
                ScyllaMetadataType::RunIdentifier => {
                    let mut raw = [0u8; 16];
                    b.read_exact(&mut raw)?;
                    meta.run_identifier = Some(Uuid::from_bytes(raw));
                }
                ScyllaMetadataType::LargeDataStats => {
                    let n = b.read_u32::<LittleEndian>()?;
                    let mut stats = BTreeMap::new();
                    for _ in 0..n {
                        let ty = LargeDataType::from_u32(b.read_u32::<LittleEndian>()?)?;
                        stats.insert(
                            ty,
                            LargeDataStatsEntry {
                                max_value: b.read_u64::<LittleEndian>()?,
                                threshold: b.read_u64::<LittleEndian>()?,
                                above_threshold: b.read_u32::<LittleEndian>()?,
                            },
                        );
                    }
                    meta.large_data_stats = Some(stats);
                }
                ScyllaMetadataType::SSTableOrigin => {
                    meta.origin = Some(read_string(&mut b)?);
                }
            }
            if !b.is_empty() {
                return Err(invalid_data(format!(
                    "{} trailing bytes in {} entry",
                    b.len(),
                    ty.name()
                )));
            }
        }
        Ok(meta)
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let mut entries: Vec<(ScyllaMetadataType, Vec<u8>)> = Vec::new();
        if let Some(ranges) = &self.sharding {
            let mut b = Vec::new();
            b.write_u32::<LittleEndian>(ranges.len() as u32)?;
            for r in ranges {
                write_token_bound(&mut b, r.left)?;
                write_token_bound(&mut b, r.right)?;
            }
            entries.push((ScyllaMetadataType::Sharding, b));
        }
        if let Some(mask) = self.features {
            entries.push((ScyllaMetadataType::Features, mask.to_le_bytes().to_vec()));
        }
        if let Some(attrs) = &self.extension_attributes {
            let mut b = Vec::new();
            b.write_u32::<LittleEndian>(attrs.len() as u32)?;
            for (k, v) in attrs {
                write_string(&mut b, k)?;
                write_string(&mut b, v)?;
            }
            entries.push((ScyllaMetadataType::ExtensionAttributes, b));
        }
        if let Some(id) = self.run_identifier {
            entries.push((ScyllaMetadataType::RunIdentifier, id.as_bytes().to_vec()));
        }
        if let Some(stats) = &self.large_data_stats {
            let mut b = Vec::new();
            b.write_u32::<LittleEndian>(stats.len() as u32)?;
            for (ty, e) in stats {
                b.write_u32::<LittleEndian>(*ty as u32)?;
                b.write_u64::<LittleEndian>(e.max_value)?;
                b.write_u64::<LittleEndian>(e.threshold)?;
                b.write_u32::<LittleEndian>(e.above_threshold)?;
            }
            entries.push((ScyllaMetadataType::LargeDataStats, b));
        }
        if let Some(origin) = &self.origin {
            let mut b = Vec::new();
            write_string(&mut b, origin)?;
            entries.push((ScyllaMetadataType::SSTableOrigin, b));
        }

        w.write_u32::<LittleEndian>(entries.len() as u32)?;
        for (ty, body) in entries {
            w.write_u32::<LittleEndian>(ty as u32)?;
            w.write_u32::<LittleEndian>(body.len() as u32)?;
            w.write_all(&body)?;
        }
        Ok(())
    }
}

fn read_token_bound<R: Read>(r: &mut R) -> io::Result<TokenBound> {
    Ok(TokenBound {
        exclusive: r.read_u8()? != 0,
        token: r.read_i64::<LittleEndian>()?,
    })
}

fn write_token_bound<W: Write>(w: &mut W, b: TokenBound) -> io::Result<()> {
    w.write_u8(u8::from(b.exclusive))?;
    w.write_i64::<LittleEndian>(b.token)
}
