//! Component file naming.
//!
//! Every component of an sstable lives next to the others in one directory
//! and is named `<version>-<generation>-<format>-<Component>`, e.g.
//! `me-3-big-Data.db` and `me-3-big-TOC.txt`. Users point tools at the Data
//! component; the other paths are derived from it.

use std::path::{Path, PathBuf};

use crate::error::{Component, Result, SstableError};

pub const DEFAULT_VERSION: &str = "me";
pub const DEFAULT_FORMAT: &str = "big";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    dir: PathBuf,
    version: String,
    generation: u64,
    format: String,
}

impl Descriptor {
    pub fn new(dir: impl Into<PathBuf>, generation: u64) -> Self {
        Self {
            dir: dir.into(),
            version: DEFAULT_VERSION.to_string(),
            generation,
            format: DEFAULT_FORMAT.to_string(),
        }
    }

    /// Parses the path of any component, normally the Data component.
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SstableError::InvalidName {
                name: path.display().to_string(),
                reason: "not a file name".to_string(),
            })?;
        let invalid = |reason: &str| SstableError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = name.splitn(4, '-');
        let (Some(version), Some(generation), Some(format), Some(suffix)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid("expected <version>-<generation>-<format>-<Component>"));
        };
        let generation = generation
            .parse::<u64>()
            .map_err(|_| invalid("generation is not a number"))?;
        if Component::from_file_suffix(suffix).is_none() {
            return Err(invalid("unknown component"));
        }

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(Self {
            dir,
            version: version.to_string(),
            generation,
            format: format.to_string(),
        })
    }

    #[must_use]
    pub fn path(&self, component: Component) -> PathBuf {
        self.dir.join(format!(
            "{}-{}-{}-{}",
            self.version,
            self.generation,
            self.format,
            component.file_suffix()
        ))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn format(&self) -> &str {
        &self.format
    }
}
