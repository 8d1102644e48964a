use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// One file of an sstable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Component {
    Data,
    Index,
    Summary,
    CompressionInfo,
    Statistics,
    Scylla,
    Toc,
}

impl Component {
    pub const ALL: [Component; 7] = [
        Component::Data,
        Component::Index,
        Component::Summary,
        Component::CompressionInfo,
        Component::Statistics,
        Component::Scylla,
        Component::Toc,
    ];

    /// Name as it appears in file names and in the TOC.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Component::Data => "Data",
            Component::Index => "Index",
            Component::Summary => "Summary",
            Component::CompressionInfo => "CompressionInfo",
            Component::Statistics => "Statistics",
            Component::Scylla => "Scylla",
            Component::Toc => "TOC",
        }
    }

    /// The trailing part of the component's file name.
    #[must_use]
    pub fn file_suffix(self) -> &'static str {
        match self {
            Component::Data => "Data.db",
            Component::Index => "Index.db",
            Component::Summary => "Summary.db",
            Component::CompressionInfo => "CompressionInfo.db",
            Component::Statistics => "Statistics.db",
            Component::Scylla => "Scylla.db",
            Component::Toc => "TOC.txt",
        }
    }

    pub fn from_file_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.file_suffix() == suffix)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors raised while opening or reading an sstable.
///
/// Every variant that concerns an existing file names the file and the
/// component, so a diagnostic is enough to locate the damage.
#[derive(Debug, Error)]
pub enum SstableError {
    #[error("{}: {component}: {source}", .path.display())]
    Io {
        path: PathBuf,
        component: Component,
        #[source]
        source: io::Error,
    },

    /// The bytes were read but do not decode: bad checksum, truncated
    /// record, impossible length, unknown tag.
    #[error("{}: {component}: malformed: {reason}", .path.display())]
    Malformed {
        path: PathBuf,
        component: Component,
        reason: String,
    },

    #[error("{}: missing required component {component}", .path.display())]
    MissingComponent { path: PathBuf, component: Component },

    #[error("invalid sstable file name {name}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("refusing to write an empty sstable")]
    Empty,
}

impl SstableError {
    pub(crate) fn malformed(path: &Path, component: Component, reason: impl Into<String>) -> Self {
        SstableError::Malformed {
            path: path.to_path_buf(),
            component,
            reason: reason.into(),
        }
    }

    /// Decode failures, as opposed to the file being unreadable.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(self, SstableError::Malformed { .. })
    }
}

pub type Result<T> = std::result::Result<T, SstableError>;

/// Attaches file and component to an [`io::Result`].
///
/// The codecs report decode failures as `InvalidData` (and truncation as
/// `UnexpectedEof`); those become [`SstableError::Malformed`].
pub(crate) trait ComponentContext<T> {
    fn in_component(self, path: &Path, component: Component) -> Result<T>;
}

impl<T> ComponentContext<T> for io::Result<T> {
    fn in_component(self, path: &Path, component: Component) -> Result<T> {
        self.map_err(|source| match source.kind() {
            io::ErrorKind::InvalidData => SstableError::malformed(path, component, source.to_string()),
            io::ErrorKind::UnexpectedEof => {
                SstableError::malformed(path, component, format!("truncated: {}", source))
            }
            _ => SstableError::Io {
                path: path.to_path_buf(),
                component,
                source,
            },
        })
    }
}

pub(crate) fn invalid_data(reason: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, reason.into())
}
