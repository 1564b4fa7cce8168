//! Catalog persistence.
//!
//! Layout on disk: one `catalog.json` manifest plus one data file per
//! (entry, chunk), named by [`Chunk::file_name`]. Chunk files are written
//! independently by their owning workers; only manifest bookkeeping goes
//! through the writer, which flushes incrementally so a failed dump leaves
//! a diagnosable partial catalog.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{CatalogEntry, Chunk, Manifest, ManifestEntry, RowSet};
use crate::error::{FerryError, Result};
use crate::resolve::DatabaseInfo;

/// Manifest file name within a catalog directory.
pub const MANIFEST_FILE: &str = "catalog.json";

/// A catalog rooted at a directory.
#[derive(Debug, Clone)]
pub struct Catalog {
    dir: PathBuf,
}

impl Catalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Open the catalog for writing, creating the directory and an empty
    /// manifest.
    pub fn writer(&self, database: Option<DatabaseInfo>) -> Result<CatalogWriter> {
        fs::create_dir_all(&self.dir)?;
        let writer = CatalogWriter {
            dir: self.dir.clone(),
            manifest: Manifest::new(database),
        };
        writer.flush_manifest()?;
        Ok(writer)
    }

    /// Open the catalog for reading.
    pub fn reader(&self) -> Result<CatalogReader> {
        let path = self.dir.join(MANIFEST_FILE);
        let file = File::open(&path).map_err(|e| {
            FerryError::Config(format!("cannot open manifest {}: {}", path.display(), e))
        })?;
        let manifest: Manifest = serde_json::from_reader(BufReader::new(file))?;
        if manifest.version != Manifest::VERSION {
            return Err(FerryError::Config(format!(
                "unsupported catalog manifest version {} (expected {})",
                manifest.version,
                Manifest::VERSION
            )));
        }
        Ok(CatalogReader {
            dir: self.dir.clone(),
            manifest,
        })
    }
}

/// Incremental manifest writer plus chunk-file factory.
#[derive(Debug)]
pub struct CatalogWriter {
    dir: PathBuf,
    manifest: Manifest,
}

impl CatalogWriter {
    /// Register an entry before any of its chunks are written, so a
    /// failed dump still names the entry it was working on.
    pub fn add_entry(&mut self, entry: &CatalogEntry) -> Result<()> {
        if self.position_of(entry).is_none() {
            self.manifest.entries.push(ManifestEntry {
                name: entry.name.clone(),
                format: entry.format.clone(),
                columns: Vec::new(),
                row_count: 0,
                chunks: Vec::new(),
            });
            self.flush_manifest()?;
        }
        Ok(())
    }

    /// Create the data file for one chunk. Each chunk file is owned by a
    /// single worker; the writer itself is not involved in row IO.
    pub fn chunk_sink(&self, entry: &CatalogEntry, chunk: &Chunk) -> Result<BufWriter<File>> {
        self.sink_factory().create(entry, chunk)
    }

    /// A cloneable factory workers can carry to create their own chunk
    /// files without sharing the manifest writer.
    pub fn sink_factory(&self) -> ChunkSinkFactory {
        ChunkSinkFactory {
            dir: self.dir.clone(),
        }
    }

    /// Record a finalized row set into the manifest and flush it.
    pub fn record_row_set(&mut self, row_set: &RowSet) -> Result<()> {
        let recorded = row_set.to_manifest_entry();
        match self.position_of(row_set.entry()) {
            Some(idx) => self.manifest.entries[idx] = recorded,
            None => self.manifest.entries.push(recorded),
        }
        self.flush_manifest()
    }

    /// Close the writer with a final manifest flush.
    pub fn close(self) -> Result<()> {
        self.flush_manifest()
    }

    fn position_of(&self, entry: &CatalogEntry) -> Option<usize> {
        self.manifest
            .entries
            .iter()
            .position(|e| e.name == entry.name && e.format == entry.format)
    }

    fn flush_manifest(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.manifest)?;
        fs::write(self.dir.join(MANIFEST_FILE), json)?;
        Ok(())
    }
}

/// Creates chunk data files for workers.
#[derive(Debug, Clone)]
pub struct ChunkSinkFactory {
    dir: PathBuf,
}

impl ChunkSinkFactory {
    /// Create one chunk's data file.
    pub fn create(&self, entry: &CatalogEntry, chunk: &Chunk) -> Result<BufWriter<File>> {
        let path = self.dir.join(chunk.file_name(entry));
        debug!("Creating chunk file {}", path.display());
        Ok(BufWriter::new(File::create(path)?))
    }
}

/// Read side of a catalog.
#[derive(Debug)]
pub struct CatalogReader {
    dir: PathBuf,
    manifest: Manifest,
}

impl CatalogReader {
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.manifest.entries
    }

    /// Open one chunk's data file.
    pub fn chunk_source(&self, entry: &CatalogEntry, chunk: &Chunk) -> Result<BufReader<File>> {
        let path = self.dir.join(chunk.file_name(entry));
        let file = File::open(&path).map_err(|e| {
            FerryError::Config(format!("cannot open chunk {}: {}", path.display(), e))
        })?;
        Ok(BufReader::new(file))
    }
}
