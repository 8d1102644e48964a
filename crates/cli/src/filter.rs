//! The set of partitions a run is restricted to.
//!
//! Keys are given as the hex encoding of the raw partition key, on the
//! command line (`--partition`, repeatable) and/or in a file
//! (`--partitions-file`) holding whitespace-separated keys.

use std::collections::HashSet;
use std::path::Path;

use mutation::DecoratedKey;
use tracing::{info, trace};

use crate::error::{Result, ToolError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionSet {
    keys: HashSet<DecoratedKey>,
}

impl PartitionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects keys from literal arguments and an optional keys file.
    pub fn parse(literal: &[String], file: Option<&Path>) -> Result<Self> {
        let mut set = Self::new();
        for key in literal {
            set.insert_hex(key)?;
        }
        if let Some(path) = file {
            let text = std::fs::read_to_string(path).map_err(|source| ToolError::PartitionsFile {
                path: path.to_path_buf(),
                source,
            })?;
            for key in text.split_whitespace() {
                set.insert_hex(key)?;
            }
        }
        if !set.is_empty() {
            info!("filtering enabled, {} partition(s) to filter for", set.len());
        }
        Ok(set)
    }

    fn insert_hex(&mut self, key: &str) -> Result<()> {
        let decorated = DecoratedKey::from_hex(key).map_err(|source| ToolError::InvalidPartitionKey {
            key: key.to_string(),
            source,
        })?;
        self.keys.insert(decorated);
        Ok(())
    }

    pub fn insert(&mut self, key: DecoratedKey) {
        self.keys.insert(key);
    }

    /// Filter verdict for one partition.
    #[must_use]
    pub fn admits(&self, key: &DecoratedKey) -> bool {
        let pass = self.keys.contains(key);
        trace!(key = %key, pass, "filter");
        pass
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<DecoratedKey> for PartitionSet {
    fn from_iter<I: IntoIterator<Item = DecoratedKey>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}
