//! # Schema - table structure for sstable inspection
//!
//! Describes the columns of the table whose sstables are being read:
//! the partition key, the clustering key components, and the static and
//! regular columns. Data files refer to static and regular columns by
//! their position in the respective list (the *column id*).
//!
//! A schema is either loaded from a JSON schema file:
//!
//! ```json
//! {
//!   "keyspace": "ks",
//!   "table": "events",
//!   "partition_key": { "name": "id", "type": "int" },
//!   "clustering_key": [ { "name": "ts", "type": "bigint" } ],
//!   "static_columns": [ { "name": "owner", "type": "text" } ],
//!   "regular_columns": [ { "name": "tags", "type": "set<text>" } ]
//! }
//! ```
//!
//! or rebuilt from the serialization header an sstable carries in its
//! statistics component (see the `sstable` crate).

mod types;

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub use types::ColumnType;

/// Position of a static or regular column within its kind.
pub type ColumnId = u32;

/// Errors raised while building or loading a schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("could not read schema file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse schema file {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid type '{name}': {reason}")]
    InvalidType { name: String, reason: String },

    /// A well-formed type used where it is not allowed, e.g. a non-frozen
    /// collection as a key component.
    #[error("invalid column '{column}': {reason}")]
    InvalidColumn { column: String, reason: String },
}

/// Which part of the table a column belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    PartitionKey,
    ClusteringKey,
    Static,
    Regular,
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    pub ty: ColumnType,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// The resolved structure of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    keyspace: String,
    table: String,
    partition_key: ColumnDefinition,
    clustering_key: Vec<ColumnDefinition>,
    static_columns: Vec<ColumnDefinition>,
    regular_columns: Vec<ColumnDefinition>,
}

impl Schema {
    /// Builds a schema, rejecting key columns that are not atomic.
    pub fn new(
        keyspace: impl Into<String>,
        table: impl Into<String>,
        partition_key: ColumnDefinition,
        clustering_key: Vec<ColumnDefinition>,
        static_columns: Vec<ColumnDefinition>,
        regular_columns: Vec<ColumnDefinition>,
    ) -> Result<Self, SchemaError> {
        for key_col in std::iter::once(&partition_key).chain(&clustering_key) {
            if key_col.ty.is_multi_cell() {
                return Err(SchemaError::InvalidColumn {
                    column: key_col.name.clone(),
                    reason: format!("non-frozen collection {} cannot be part of a key", key_col.ty),
                });
            }
        }
        Ok(Self {
            keyspace: keyspace.into(),
            table: table.into(),
            partition_key,
            clustering_key,
            static_columns,
            regular_columns,
        })
    }

    /// Loads a schema from a JSON schema file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file: SchemaFile = serde_json::from_str(&raw).map_err(|source| SchemaError::Json {
            path: path.display().to_string(),
            source,
        })?;
        file.into_schema()
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn partition_key(&self) -> &ColumnDefinition {
        &self.partition_key
    }

    pub fn clustering_key(&self) -> &[ColumnDefinition] {
        &self.clustering_key
    }

    pub fn static_columns(&self) -> &[ColumnDefinition] {
        &self.static_columns
    }

    pub fn regular_columns(&self) -> &[ColumnDefinition] {
        &self.regular_columns
    }

    /// Looks up a static or regular column by id.
    pub fn column_at(&self, kind: ColumnKind, id: ColumnId) -> Option<&ColumnDefinition> {
        let columns = match kind {
            ColumnKind::Static => &self.static_columns,
            ColumnKind::Regular => &self.regular_columns,
            ColumnKind::PartitionKey => return (id == 0).then_some(&self.partition_key),
            ColumnKind::ClusteringKey => &self.clustering_key,
        };
        columns.get(id as usize)
    }

    /// Renders a raw partition key through the partition key type.
    pub fn format_partition_key(&self, raw: &[u8]) -> String {
        self.partition_key.ty.format_value(raw)
    }

    /// Renders clustering key components, e.g. `[1, "a"]` becomes `[1, a]`.
    /// Components beyond the declared clustering columns are shown as hex.
    pub fn format_clustering_prefix(&self, components: &[Vec<u8>]) -> String {
        let rendered: Vec<String> = components
            .iter()
            .enumerate()
            .map(|(i, c)| match self.clustering_key.get(i) {
                Some(col) => col.ty.format_value(c),
                None => hex::encode(c),
            })
            .collect();
        format!("[{}]", rendered.join(", "))
    }

    /// Serializable description, the inverse of [`Schema::load_from_file`].
    pub fn to_schema_file(&self) -> SchemaFile {
        let describe = |c: &ColumnDefinition| ColumnSpec {
            name: c.name.clone(),
            ty: c.ty.to_string(),
        };
        SchemaFile {
            keyspace: self.keyspace.clone(),
            table: self.table.clone(),
            partition_key: describe(&self.partition_key),
            clustering_key: self.clustering_key.iter().map(describe).collect(),
            static_columns: self.static_columns.iter().map(describe).collect(),
            regular_columns: self.regular_columns.iter().map(describe).collect(),
        }
    }
}

/// On-disk (JSON) form of a schema; types are kept as their names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaFile {
    pub keyspace: String,
    pub table: String,
    pub partition_key: ColumnSpec,
    #[serde(default)]
    pub clustering_key: Vec<ColumnSpec>,
    #[serde(default)]
    pub static_columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub regular_columns: Vec<ColumnSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

impl ColumnSpec {
    fn resolve(&self) -> Result<ColumnDefinition, SchemaError> {
        Ok(ColumnDefinition::new(self.name.clone(), ColumnType::parse(&self.ty)?))
    }
}

impl SchemaFile {
    pub fn into_schema(self) -> Result<Schema, SchemaError> {
        let resolve_all = |specs: &[ColumnSpec]| -> Result<Vec<ColumnDefinition>, SchemaError> {
            specs.iter().map(ColumnSpec::resolve).collect()
        };
        Schema::new(
            self.keyspace.clone(),
            self.table.clone(),
            self.partition_key.resolve()?,
            resolve_all(&self.clustering_key)?,
            resolve_all(&self.static_columns)?,
            resolve_all(&self.regular_columns)?,
        )
    }
}
