//! Catalog data model.
//!
//! A dump produces a *catalog*: one manifest listing named entries, each
//! backed by one or more chunk files. [`RowSet`] is the in-progress state
//! of one entry while workers are writing; [`Manifest`] and
//! [`ManifestEntry`] are its durable form.

pub mod catalog;
pub mod writer;

pub use catalog::{Catalog, CatalogReader, CatalogWriter, ChunkSinkFactory};
pub use writer::{WorkFailure, WorkManager, WriteRowSetManager};

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{FerryError, Result};
use crate::resolve::DatabaseInfo;
use crate::types::{ColumnHandle, SqlTypeCode};

/// Identity of one catalog entry: a name plus the format that wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Entry name (table name, or a generated name for ad hoc queries).
    pub name: String,
    /// Format identifier ("csv", "jsonl", ...).
    pub format: String,
}

impl CatalogEntry {
    pub fn new(name: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            format: format.into(),
        }
    }
}

impl std::fmt::Display for CatalogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.name, self.format)
    }
}

/// A column in an entry's manifest: name plus logical-type alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogColumn {
    pub name: String,
    pub type_alias: String,
}

impl CatalogColumn {
    /// Build the manifest column for a resolved column handle.
    pub fn from_handle(handle: &ColumnHandle) -> Self {
        Self {
            name: handle.name.clone(),
            type_alias: handle.type_code.alias().to_string(),
        }
    }

    /// Resolve back to a column handle, failing on an unknown alias.
    pub fn to_handle(&self) -> Result<ColumnHandle> {
        let code = SqlTypeCode::from_alias(&self.type_alias).ok_or_else(|| {
            FerryError::UnsupportedType {
                type_name: self.type_alias.clone(),
                type_code: 0,
            }
        })?;
        Ok(ColumnHandle::new(self.name.clone(), code))
    }
}

/// A contiguous, independently written slice of one entry's rows.
///
/// Identified by `(split_index, seq)`: the owning worker's split plus the
/// chunk's position within that worker. Created by exactly one worker and
/// immutable once that worker finishes; `row_count` only grows while the
/// worker is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub split_index: usize,
    pub seq: usize,
    pub row_count: u64,
}

impl Chunk {
    pub fn new(split_index: usize, seq: usize) -> Self {
        Self {
            split_index,
            seq,
            row_count: 0,
        }
    }

    /// Data file name for this chunk within its entry.
    pub fn file_name(&self, entry: &CatalogEntry) -> String {
        format!(
            "{}.{:04}.{:04}.{}",
            entry.name, self.split_index, self.seq, entry.format
        )
    }

    /// Manifest ordering key.
    pub fn order_key(&self) -> (usize, usize) {
        (self.split_index, self.seq)
    }
}

#[derive(Debug, Default)]
struct RowSetInner {
    columns: Vec<CatalogColumn>,
    row_count: u64,
    chunks: Vec<Chunk>,
}

/// In-progress aggregated state of one catalog entry.
///
/// Shared across the entry's workers; every mutation goes through the
/// row set's own lock. Workers never share chunks, so chunk-local counts
/// need no locking until they are folded in here.
#[derive(Debug)]
pub struct RowSet {
    entry: CatalogEntry,
    inner: Mutex<RowSetInner>,
}

impl RowSet {
    pub fn new(entry: CatalogEntry) -> Self {
        Self {
            entry,
            inner: Mutex::new(RowSetInner::default()),
        }
    }

    pub fn entry(&self) -> &CatalogEntry {
        &self.entry
    }

    /// Set the column manifest. Called exactly once per row set, by the
    /// first worker to start (guarded by the write manager's start map).
    pub(crate) fn set_columns(&self, columns: Vec<CatalogColumn>) {
        self.inner.lock().expect("row set lock").columns = columns;
    }

    /// Fold a finished chunk's row count into the total.
    pub(crate) fn add_rows(&self, rows: u64) {
        self.inner.lock().expect("row set lock").row_count += rows;
    }

    /// Replace the assembled chunk list.
    pub(crate) fn set_chunks(&self, chunks: Vec<Chunk>) {
        self.inner.lock().expect("row set lock").chunks = chunks;
    }

    pub fn row_count(&self) -> u64 {
        self.inner.lock().expect("row set lock").row_count
    }

    pub fn columns(&self) -> Vec<CatalogColumn> {
        self.inner.lock().expect("row set lock").columns.clone()
    }

    pub fn chunks(&self) -> Vec<Chunk> {
        self.inner.lock().expect("row set lock").chunks.clone()
    }

    /// Durable form for the manifest.
    pub fn to_manifest_entry(&self) -> ManifestEntry {
        let inner = self.inner.lock().expect("row set lock");
        ManifestEntry {
            name: self.entry.name.clone(),
            format: self.entry.format.clone(),
            columns: inner.columns.clone(),
            row_count: inner.row_count,
            chunks: inner.chunks.clone(),
        }
    }
}

/// Durable manifest form of one entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub format: String,
    pub columns: Vec<CatalogColumn>,
    pub row_count: u64,
    pub chunks: Vec<Chunk>,
}

impl ManifestEntry {
    pub fn entry(&self) -> CatalogEntry {
        CatalogEntry::new(self.name.clone(), self.format.clone())
    }
}

/// The catalog manifest: entry list plus the source engine's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub database: Option<DatabaseInfo>,
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Current manifest format version.
    pub const VERSION: u32 = 1;

    pub fn new(database: Option<DatabaseInfo>) -> Self {
        Self {
            version: Self::VERSION,
            database,
            entries: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_file_name() {
        let entry = CatalogEntry::new("users", "csv");
        let chunk = Chunk::new(2, 0);
        assert_eq!(chunk.file_name(&entry), "users.0002.0000.csv");
    }

    #[test]
    fn test_catalog_column_round_trip() {
        let handle = ColumnHandle::new("id", SqlTypeCode::Integer);
        let column = CatalogColumn::from_handle(&handle);
        assert_eq!(column.type_alias, "integer");
        assert_eq!(column.to_handle().unwrap(), handle);
    }

    #[test]
    fn test_catalog_column_unknown_alias() {
        let column = CatalogColumn {
            name: "x".into(),
            type_alias: "hologram".into(),
        };
        assert!(matches!(
            column.to_handle(),
            Err(FerryError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_row_set_accumulates() {
        let row_set = RowSet::new(CatalogEntry::new("users", "csv"));
        row_set.add_rows(25);
        row_set.add_rows(75);
        assert_eq!(row_set.row_count(), 100);

        let entry = row_set.to_manifest_entry();
        assert_eq!(entry.row_count, 100);
        assert_eq!(entry.name, "users");
    }
}
