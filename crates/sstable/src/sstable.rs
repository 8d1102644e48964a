//! The [`SSTable`] handle: metadata loaded once, shared by every reader.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mutation::DecoratedKey;
use schema::{Schema, SchemaError};
use tracing::debug;

use crate::compress::{CompressedReader, CompressionInfo};
use crate::descriptor::Descriptor;
use crate::error::{Component, ComponentContext, Result, SstableError};
use crate::index::{self, IndexEntry};
use crate::permit::ReaderPermit;
use crate::reader::SSTableReader;
use crate::scylla_metadata::ScyllaMetadata;
use crate::statistics::{SerializationHeader, Statistics};
use crate::summary::Summary;

/// Uncompressed view of the Data component.
pub trait DataInput: Read + Seek + Send {}

impl<T: Read + Seek + Send> DataInput for T {}

/// A range of partitions in decorated-key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionRange {
    pub start: Bound<DecoratedKey>,
    pub end: Bound<DecoratedKey>,
}

impl PartitionRange {
    pub fn full() -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Unbounded,
        }
    }

    pub fn singular(key: DecoratedKey) -> Self {
        Self {
            start: Bound::Included(key.clone()),
            end: Bound::Included(key),
        }
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        matches!(
            (&self.start, &self.end),
            (Bound::Unbounded, Bound::Unbounded)
        )
    }

    /// `key` sorts before the start of the range.
    #[must_use]
    pub fn before_start(&self, key: &DecoratedKey) -> bool {
        match &self.start {
            Bound::Included(s) => key < s,
            Bound::Excluded(s) => key <= s,
            Bound::Unbounded => false,
        }
    }

    /// `key` sorts after the end of the range.
    #[must_use]
    pub fn after_end(&self, key: &DecoratedKey) -> bool {
        match &self.end {
            Bound::Included(e) => key > e,
            Bound::Excluded(e) => key >= e,
            Bound::Unbounded => false,
        }
    }

    #[must_use]
    pub fn contains(&self, key: &DecoratedKey) -> bool {
        !self.before_start(key) && !self.after_end(key)
    }
}

/// Which static and regular columns a reader returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ColumnSelection {
    #[default]
    All,
    Only {
        static_columns: BTreeSet<u32>,
        regular_columns: BTreeSet<u32>,
    },
}

/// An opened sstable.
///
/// Summary, Statistics and the optional CompressionInfo and Scylla
/// components are parsed by [`open`](SSTable::open); Data and Index are read
/// lazily by readers.
#[derive(Debug)]
pub struct SSTable {
    descriptor: Descriptor,
    data_path: PathBuf,
    components: BTreeSet<Component>,
    summary: Summary,
    statistics: Statistics,
    compression: Option<CompressionInfo>,
    scylla_metadata: Option<ScyllaMetadata>,
    data_len: u64,
}

impl SSTable {
    /// Opens the sstable whose Data component is at `data_path`.
    ///
    /// # Errors
    ///
    /// [`SstableError::InvalidName`] if the path does not follow the naming
    /// scheme, [`SstableError::MissingComponent`] if the TOC or a required
    /// component is absent, and I/O or decode errors from the metadata
    /// components.
    pub fn open(data_path: &Path) -> Result<Arc<Self>> {
        let descriptor = Descriptor::from_path(data_path)?;
        let components = read_toc(&descriptor)?;
        for required in [
            Component::Data,
            Component::Index,
            Component::Summary,
            Component::Statistics,
        ] {
            let path = descriptor.path(required);
            if !components.contains(&required) || !path.exists() {
                return Err(SstableError::MissingComponent {
                    path,
                    component: required,
                });
            }
        }

        let summary = read_component(&descriptor, Component::Summary, Summary::read_from)?;
        let statistics = read_component(&descriptor, Component::Statistics, Statistics::read_from)?;
        let compression = match components.contains(&Component::CompressionInfo) {
            true => Some(read_component(
                &descriptor,
                Component::CompressionInfo,
                CompressionInfo::read_from,
            )?),
            false => None,
        };
        let scylla_metadata = match components.contains(&Component::Scylla) {
            true => Some(read_component(
                &descriptor,
                Component::Scylla,
                ScyllaMetadata::read_from,
            )?),
            false => None,
        };

        let data_path = descriptor.path(Component::Data);
        let data_len = match &compression {
            Some(info) => info.data_len,
            None => fs::metadata(&data_path)
                .in_component(&data_path, Component::Data)?
                .len(),
        };
        debug!(
            sstable = %data_path.display(),
            components = components.len(),
            compressed = compression.is_some(),
            data_len,
            "opened sstable"
        );
        Ok(Arc::new(Self {
            descriptor,
            data_path,
            components,
            summary,
            statistics,
            compression,
            scylla_metadata,
            data_len,
        }))
    }

    /// The Data component path, as shown to users.
    #[must_use]
    pub fn filename(&self) -> String {
        self.data_path.display().to_string()
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn has_component(&self, component: Component) -> bool {
        self.components.contains(&component)
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn compression(&self) -> Option<&CompressionInfo> {
        self.compression.as_ref()
    }

    pub fn scylla_metadata(&self) -> Option<&ScyllaMetadata> {
        self.scylla_metadata.as_ref()
    }

    pub fn serialization_header(&self) -> Option<&SerializationHeader> {
        self.statistics.serialization.as_ref()
    }

    /// Schema rebuilt from the serialization header.
    pub fn derive_schema(&self) -> Result<Schema> {
        let header = self.serialization_header().ok_or_else(|| {
            SstableError::malformed(
                &self.descriptor.path(Component::Statistics),
                Component::Statistics,
                "no serialization header",
            )
        })?;
        header
            .to_schema("sstable", "sstable")
            .map_err(|e: SchemaError| {
                SstableError::malformed(
                    &self.descriptor.path(Component::Statistics),
                    Component::Statistics,
                    e.to_string(),
                )
            })
    }

    /// Uncompressed length of the data stream.
    #[must_use]
    pub fn data_len(&self) -> u64 {
        self.data_len
    }

    /// Every Index entry, in order.
    pub fn index_entries(&self) -> Result<Vec<IndexEntry>> {
        index::read_all(&self.index_path())
    }

    pub(crate) fn index_path(&self) -> PathBuf {
        self.descriptor.path(Component::Index)
    }

    pub(crate) fn open_data(&self) -> Result<Box<dyn DataInput>> {
        let file = File::open(&self.data_path).in_component(&self.data_path, Component::Data)?;
        match &self.compression {
            Some(info) => {
                let reader = CompressedReader::new(file, info.clone())
                    .in_component(&self.data_path, Component::Data)?;
                Ok(Box::new(reader))
            }
            None => Ok(Box::new(BufReader::new(file))),
        }
    }

    /// A reader over the partitions of `range`, positioned with the summary
    /// and index.
    pub fn make_reader(
        self: &Arc<Self>,
        range: PartitionRange,
        selection: ColumnSelection,
        permit: &ReaderPermit,
    ) -> Result<SSTableReader> {
        SSTableReader::indexed(Arc::clone(self), range, selection, permit.clone())
    }

    /// A reader that walks the Data component start to end without
    /// touching the index.
    pub fn make_crawling_reader(self: &Arc<Self>, permit: &ReaderPermit) -> Result<SSTableReader> {
        SSTableReader::crawling(Arc::clone(self), permit.clone())
    }
}

fn read_toc(descriptor: &Descriptor) -> Result<BTreeSet<Component>> {
    let path = descriptor.path(Component::Toc);
    if !path.exists() {
        return Err(SstableError::MissingComponent {
            path,
            component: Component::Toc,
        });
    }
    let text = fs::read_to_string(&path).in_component(&path, Component::Toc)?;
    let mut components = BTreeSet::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let component = Component::ALL
            .into_iter()
            .find(|c| c.name() == line)
            .ok_or_else(|| {
                SstableError::malformed(&path, Component::Toc, format!("unknown component {}", line))
            })?;
        components.insert(component);
    }
    Ok(components)
}

fn read_component<T>(
    descriptor: &Descriptor,
    component: Component,
    parse: impl FnOnce(&mut BufReader<File>) -> std::io::Result<T>,
) -> Result<T> {
    let path = descriptor.path(component);
    let file = File::open(&path).in_component(&path, component)?;
    parse(&mut BufReader::new(file)).in_component(&path, component)
}
