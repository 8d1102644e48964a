//! Checks a fragment stream against the ordering contract.
//!
//! The validator is fed one fragment at a time and reports the first
//! violation it sees: a fragment kind that cannot follow the previous one, a
//! partition key that does not strictly increase, a clustering position that
//! goes backwards, or a stream that ends with a partition still open.

use thiserror::Error;

use crate::clustering::PositionInPartition;
use crate::fragment::{FragmentKind, MutationFragment};
use crate::keys::DecoratedKey;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unexpected {got} after {previous}")]
    UnexpectedKind {
        previous: &'static str,
        got: FragmentKind,
    },

    #[error("partition key {key} does not sort after previous partition {previous}")]
    KeyOutOfOrder { previous: String, key: String },

    #[error("{kind} in partition {key} goes backwards in clustering order")]
    PositionOutOfOrder { key: String, kind: FragmentKind },

    #[error("stream ended inside partition {key}")]
    UnclosedPartition { key: String },
}

/// Streaming validator; one instance per fragment stream.
#[derive(Debug, Default)]
pub struct MutationFragmentStreamValidator {
    previous_key: Option<DecoratedKey>,
    current: Option<OpenPartition>,
    /// Kind of the last fragment inside the open partition.
    last_kind: Option<FragmentKind>,
    partitions: u64,
    fragments: u64,
}

#[derive(Debug)]
struct OpenPartition {
    key: DecoratedKey,
    position: PositionInPartition,
}

impl MutationFragmentStreamValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the next fragment of the stream.
    pub fn validate(&mut self, fragment: &MutationFragment) -> Result<(), ValidationError> {
        self.fragments += 1;
        match fragment {
            MutationFragment::PartitionStart(ps) => {
                if self.current.is_some() {
                    return Err(self.unexpected(FragmentKind::PartitionStart));
                }
                if let Some(prev) = &self.previous_key {
                    if ps.key <= *prev {
                        return Err(ValidationError::KeyOutOfOrder {
                            previous: prev.to_string(),
                            key: ps.key.to_string(),
                        });
                    }
                }
                self.current = Some(OpenPartition {
                    key: ps.key.clone(),
                    position: PositionInPartition::partition_start(),
                });
                self.last_kind = Some(FragmentKind::PartitionStart);
                self.partitions += 1;
                Ok(())
            }
            MutationFragment::PartitionEnd => {
                let Some(open) = self.current.take() else {
                    return Err(self.unexpected(FragmentKind::PartitionEnd));
                };
                self.previous_key = Some(open.key);
                self.last_kind = None;
                Ok(())
            }
            other => {
                let kind = other.kind();
                let static_misplaced = kind == FragmentKind::StaticRow
                    && self.last_kind != Some(FragmentKind::PartitionStart);
                if self.current.is_none() || static_misplaced {
                    return Err(self.unexpected(kind));
                }
                let position = other.position();
                if let Some(open) = self.current.as_mut() {
                    if position < open.position {
                        return Err(ValidationError::PositionOutOfOrder {
                            key: open.key.to_string(),
                            kind,
                        });
                    }
                    open.position = position;
                }
                self.last_kind = Some(kind);
                Ok(())
            }
        }
    }

    /// Checks that the stream did not end inside a partition.
    pub fn on_end_of_stream(&self) -> Result<(), ValidationError> {
        match &self.current {
            Some(open) => Err(ValidationError::UnclosedPartition {
                key: open.key.to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn partitions(&self) -> u64 {
        self.partitions
    }

    pub fn fragments(&self) -> u64 {
        self.fragments
    }

    fn unexpected(&self, got: FragmentKind) -> ValidationError {
        let previous = match (self.last_kind, self.previous_key.is_some()) {
            (Some(FragmentKind::PartitionStart), _) => "partition start",
            (Some(FragmentKind::StaticRow), _) => "static row",
            (Some(FragmentKind::ClusteringRow), _) => "clustering row",
            (Some(FragmentKind::RangeTombstone), _) => "range tombstone",
            (Some(FragmentKind::PartitionEnd), _) | (None, true) => "partition end",
            (None, false) => "start of stream",
        };
        ValidationError::UnexpectedKind { previous, got }
    }
}
