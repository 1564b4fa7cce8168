//! Streaming load engine.
//!
//! A load reads a catalog manifest, parses each entry's chunk rows back
//! through the value format registry, and writes them to the target
//! through batched parameterized inserts. Entries are processed in
//! manifest order with chunks ordered by split index; a malformed value
//! aborts its entry with column context while later entries still run,
//! and connection loss aborts the whole job.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::backup::{Catalog, ManifestEntry};
use crate::config::{JobSettings, LoadSpec};
use crate::dialect::Dialect;
use crate::error::{FerryError, Result};
use crate::format::ValueFormatRegistry;
use crate::formats::{FormatFactory, FormatReader as _};
use crate::job::{EntryOutcome, JobReport};
use crate::session::TargetSession;
use crate::types::{ColumnHandle, Value};

/// Streaming load job.
pub struct LoadJob {
    resolver: Arc<crate::resolve::DialectResolver>,
    session: Arc<dyn TargetSession>,
    formats: Arc<FormatFactory>,
    catalog: Catalog,
    spec: LoadSpec,
    settings: JobSettings,
}

impl LoadJob {
    pub fn new(
        resolver: Arc<crate::resolve::DialectResolver>,
        session: Arc<dyn TargetSession>,
        formats: Arc<FormatFactory>,
        catalog: Catalog,
        spec: LoadSpec,
    ) -> Self {
        Self {
            resolver,
            session,
            formats,
            catalog,
            spec,
            settings: JobSettings::default(),
        }
    }

    /// Override the job settings (insert batch size).
    pub fn with_settings(mut self, settings: JobSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Execute the load.
    pub async fn execute(&self, cancel: watch::Receiver<bool>) -> Result<JobReport> {
        let started_at = Utc::now();

        let info = self.session.database_info().await?;
        let dialect = self.resolver.resolve(&info)?;
        info!("Loading into {} using dialect {}", info, dialect.name());

        let offset = self.spec.time_zone_offset()?;
        let session_tz = dialect.supports_session_time_zone();
        if session_tz && offset.is_some() {
            if let Some(sql) = dialect.session_time_zone_statement(offset) {
                self.session.execute(&sql).await?;
            }
        }
        let registry = ValueFormatRegistry::new(if session_tz { None } else { offset });

        let reader = self.catalog.reader()?;
        let entries: Vec<ManifestEntry> = reader
            .entries()
            .iter()
            .filter(|e| {
                self.spec.tables.is_empty()
                    || self
                        .spec
                        .tables
                        .iter()
                        .any(|t| t.eq_ignore_ascii_case(&e.name))
            })
            .cloned()
            .collect();

        let mut outcomes = Vec::with_capacity(entries.len());
        let mut fatal: Option<FerryError> = None;

        for entry in entries {
            if !*cancel.borrow() {
                info!("Load cancelled before entry {}", entry.name);
                break;
            }

            match self
                .load_entry(&entry, dialect.as_ref(), &registry, &reader, &cancel)
                .await
            {
                Ok(rows) => {
                    info!("Entry {}: loaded {} rows", entry.name, rows);
                    outcomes.push(EntryOutcome {
                        name: entry.name.clone(),
                        format: entry.format.clone(),
                        row_count: rows,
                        chunk_count: entry.chunks.len(),
                        error: None,
                    });
                }
                Err(err) => {
                    error!("Entry {} failed: {}", entry.name, err);
                    outcomes.push(EntryOutcome {
                        name: entry.name.clone(),
                        format: entry.format.clone(),
                        row_count: 0,
                        chunk_count: entry.chunks.len(),
                        error: Some(err.to_string()),
                    });
                    if err.is_fatal() {
                        fatal = Some(err);
                        break;
                    }
                }
            }
        }

        if session_tz && offset.is_some() {
            if let Some(sql) = dialect.session_time_zone_statement(None) {
                if let Err(err) = self.session.execute(&sql).await {
                    error!("Failed to restore session time zone: {}", err);
                }
            }
        }

        if let Some(err) = fatal {
            return Err(err);
        }
        Ok(JobReport::from_outcomes(
            outcomes,
            !*cancel.borrow(),
            started_at,
        ))
    }

    async fn load_entry(
        &self,
        entry: &ManifestEntry,
        dialect: &dyn Dialect,
        registry: &ValueFormatRegistry,
        reader: &crate::backup::CatalogReader,
        cancel: &watch::Receiver<bool>,
    ) -> Result<u64> {
        let handles: Vec<ColumnHandle> = entry
            .columns
            .iter()
            .map(|c| c.to_handle())
            .collect::<Result<_>>()?;
        if handles.is_empty() {
            return Err(FerryError::entry(
                &entry.name,
                "manifest entry has no column list",
            ));
        }

        let insert_sql = build_insert(dialect, self.spec.schema.as_deref(), &entry.name, &handles);
        debug!("Entry {}: {}", entry.name, insert_sql);

        let batch_rows = self.settings.effective_batch_rows();
        let mut batch: Vec<Vec<Value>> = Vec::with_capacity(batch_rows);
        let mut loaded = 0u64;

        let mut chunks = entry.chunks.clone();
        chunks.sort_by_key(crate::backup::Chunk::order_key);

        for chunk in &chunks {
            let source = reader.chunk_source(&entry.entry(), chunk)?;
            let mut format_reader = self
                .formats
                .create_reader(&entry.format, Box::new(source))?;
            format_reader.read_begin()?;

            let mut chunk_rows = 0u64;
            loop {
                if !*cancel.borrow() {
                    return Err(FerryError::Cancelled);
                }
                let Some(texts) = format_reader.read_row()? else {
                    break;
                };
                if texts.len() != handles.len() {
                    return Err(FerryError::entry(
                        &entry.name,
                        format!(
                            "chunk row has {} values but {} columns",
                            texts.len(),
                            handles.len()
                        ),
                    ));
                }

                let mut values = Vec::with_capacity(handles.len());
                for (handle, text) in handles.iter().zip(&texts) {
                    values.push(registry.set_value(handle, text.as_deref())?);
                }
                batch.push(values);
                chunk_rows += 1;

                if batch.len() >= batch_rows {
                    loaded += self.session.insert_batch(&insert_sql, &batch).await?;
                    batch.clear();
                }
            }
            format_reader.read_end()?;

            if chunk_rows != chunk.row_count {
                warn!(
                    "Entry {}: chunk {:?} holds {} rows, manifest says {}",
                    entry.name,
                    chunk.order_key(),
                    chunk_rows,
                    chunk.row_count
                );
            }
        }

        if !batch.is_empty() {
            loaded += self.session.insert_batch(&insert_sql, &batch).await?;
        }
        Ok(loaded)
    }
}

/// Render the parameterized INSERT for an entry.
fn build_insert(
    dialect: &dyn Dialect,
    schema: Option<&str>,
    table: &str,
    columns: &[ColumnHandle],
) -> String {
    let table_ref = match schema {
        Some(schema) => format!("{}.{}", dialect.quote(schema), dialect.quote(table)),
        None => dialect.quote(table),
    };
    let column_list = columns
        .iter()
        .map(|c| dialect.quote(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| dialect.param_placeholder(i))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table_ref, column_list, placeholders
    )
}
