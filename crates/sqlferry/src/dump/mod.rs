//! Streaming dump engine.
//!
//! A dump walks INIT → INSPECT → (per query: PREPARE → STREAM →
//! FINALIZE) → CLOSE:
//!
//! - INSPECT builds the database aggregate once, resolves the dialect and
//!   negotiates isolation and session time zone.
//! - PREPARE builds the query, opens a streaming cursor and associates a
//!   fresh catalog entry.
//! - STREAM pushes each row through the value format registry into the
//!   active format writer, checking the running flag before every row.
//! - FINALIZE closes the entry's writers and records final counts.
//! - CLOSE restores session state and closes the catalog writer.
//!
//! Each query is split into row windows executed by parallel workers; the
//! workers meet only in the [`WriteRowSetManager`]. A conversion error
//! aborts the current entry and the job proceeds to CLOSE so the partial
//! catalog stays diagnosable; connection loss aborts the whole job.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

use crate::backup::{
    Catalog, CatalogColumn, CatalogEntry, Chunk, ChunkSinkFactory, RowSet, WorkManager,
    WriteRowSetManager,
};
use crate::config::{DumpSpec, JobSettings};
use crate::dialect::{negotiate_isolation, set_session_time_zone, Dialect, IsolationLevel};
use crate::error::{FerryError, Result};
use crate::format::ValueFormatRegistry;
use crate::formats::{FormatFactory, FormatWriter};
use crate::job::{EntryOutcome, JobReport};
use crate::query::{split_query, NativeQueryBuilder, Query, QuerySplit, SelectQueryBuilder};
use crate::schema::{Database, Inspector, ObjectKind};
use crate::session::SourceSession;

/// Isolation preference for dumps: consistent reads when the engine has
/// them, read committed otherwise.
const DUMP_ISOLATION: &[IsolationLevel] =
    &[IsolationLevel::RepeatableRead, IsolationLevel::ReadCommitted];

/// Streaming dump job.
pub struct DumpJob {
    resolver: Arc<crate::resolve::DialectResolver>,
    inspector: Arc<dyn Inspector>,
    session: Arc<dyn SourceSession>,
    formats: Arc<FormatFactory>,
    catalog: Catalog,
    spec: DumpSpec,
    settings: JobSettings,
}

impl DumpJob {
    pub fn new(
        resolver: Arc<crate::resolve::DialectResolver>,
        inspector: Arc<dyn Inspector>,
        session: Arc<dyn SourceSession>,
        formats: Arc<FormatFactory>,
        catalog: Catalog,
        spec: DumpSpec,
    ) -> Self {
        Self {
            resolver,
            inspector,
            session,
            formats,
            catalog,
            spec,
            settings: JobSettings::default(),
        }
    }

    /// Override the job settings (workers, chunk rotation).
    pub fn with_settings(mut self, settings: JobSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Execute the dump. `cancel` is the job's running flag; flipping it
    /// false stops streaming within one row per worker.
    pub async fn execute(&self, cancel: watch::Receiver<bool>) -> Result<JobReport> {
        let started_at = Utc::now();

        // ===== INSPECT =====
        let database = self.inspector.inspect().await?;
        let dialect = self.resolver.resolve(database.info())?;
        info!(
            "Dumping from {} using dialect {}",
            database.info(),
            dialect.name()
        );

        negotiate_isolation(dialect.as_ref(), self.session.as_ref(), DUMP_ISOLATION).await?;

        let offset = self.spec.time_zone_offset()?;
        let session_tz = dialect.supports_session_time_zone();
        if session_tz && offset.is_some() {
            set_session_time_zone(dialect.as_ref(), self.session.as_ref(), offset).await?;
        }
        // The registry applies the zone only when the session cannot.
        let registry = Arc::new(ValueFormatRegistry::new(if session_tz {
            None
        } else {
            offset
        }));

        if !self.formats.supports(&self.spec.format) {
            return Err(FerryError::Config(format!(
                "unknown output format: {}",
                self.spec.format
            )));
        }

        let mut writer = self.catalog.writer(Some(database.info().clone()))?;
        let work = Arc::new(WorkManager::new());
        let manager = Arc::new(WriteRowSetManager::new(work.clone()));

        let plans = self.build_plans(&database, dialect.clone(), started_at)?;
        let mut outcomes = Vec::with_capacity(plans.len());
        let mut fatal: Option<FerryError> = None;

        // ===== per query: PREPARE / STREAM / FINALIZE =====
        for (query, entry) in plans {
            if !*cancel.borrow() {
                info!("Dump cancelled before entry {}", entry);
                break;
            }
            if work.has_failures() {
                // A failed entry stops the job; remaining queries are not
                // processed so the partial catalog stays diagnosable.
                break;
            }

            writer.add_entry(&entry)?;
            let row_set = Arc::new(RowSet::new(entry.clone()));
            let row_count = query.table().and_then(|t| t.row_count);
            let splits = split_query(
                &query,
                dialect.as_ref(),
                self.settings.effective_workers(),
                row_count,
            );
            debug!(
                "Entry {}: {} split(s), SQL: {}",
                entry,
                splits.len(),
                query.to_query()
            );

            let handles = self.spawn_workers(
                splits,
                dialect.clone(),
                registry.clone(),
                manager.clone(),
                row_set.clone(),
                writer.sink_factory(),
                cancel.clone(),
            );

            let mut entry_error: Option<FerryError> = None;
            for joined in join_all(handles).await {
                match joined {
                    Ok(Ok(rows)) => trace!("Entry {}: worker wrote {} rows", entry, rows),
                    Ok(Err(err)) => {
                        if entry_error.is_none() {
                            entry_error = Some(err);
                        }
                    }
                    Err(join_err) => {
                        manager
                            .work_manager()
                            .failure(&entry.name, format!("worker panicked: {}", join_err));
                        if entry_error.is_none() {
                            entry_error =
                                Some(FerryError::entry(&entry.name, "worker panicked"));
                        }
                    }
                }
            }

            // FINALIZE: record the entry even when it failed, so the
            // manifest names what was in flight.
            writer.record_row_set(&row_set)?;
            outcomes.push(EntryOutcome {
                name: entry.name.clone(),
                format: entry.format.clone(),
                row_count: row_set.row_count(),
                chunk_count: row_set.chunks().len(),
                error: entry_error.as_ref().map(|e| e.to_string()),
            });

            if let Some(err) = entry_error {
                error!("Entry {} failed: {}", entry, err);
                if err.is_fatal() {
                    fatal = Some(err);
                    break;
                }
            } else {
                info!(
                    "Entry {}: {} rows in {} chunk(s)",
                    entry,
                    row_set.row_count(),
                    row_set.chunks().len()
                );
            }
        }

        // ===== CLOSE =====
        if session_tz && offset.is_some() {
            if let Err(err) =
                set_session_time_zone(dialect.as_ref(), self.session.as_ref(), None).await
            {
                error!("Failed to restore session time zone: {}", err);
            }
        }
        writer.close()?;

        if let Some(err) = fatal {
            return Err(err);
        }
        Ok(JobReport::from_outcomes(
            outcomes,
            !*cancel.borrow(),
            started_at,
        ))
    }

    /// Build the (query, entry) plan list: configured tables (or every
    /// TABLE-kind object), then native queries.
    fn build_plans(
        &self,
        database: &Database,
        dialect: Arc<dyn Dialect>,
        started_at: DateTime<Utc>,
    ) -> Result<Vec<(Query, CatalogEntry)>> {
        let mut plans = Vec::new();

        if self.spec.tables.is_empty() {
            for table in database.list_tables() {
                if table.kind != ObjectKind::Table {
                    trace!(
                        "Skip {} {}",
                        table.kind.as_str(),
                        table.qualified_name(dialect.as_ref(), true)
                    );
                    continue;
                }
                let query = SelectQueryBuilder::new()
                    .dialect(dialect.clone())
                    .table(table.clone())
                    .qualify_names(true)
                    .build()?;
                plans.push((
                    Query::Select(query),
                    CatalogEntry::new(&table.name, &self.spec.format),
                ));
            }
        } else {
            for spec in &self.spec.tables {
                let table = database.find_table(&spec.name).ok_or_else(|| {
                    FerryError::Config(format!("table not found: {}", spec.name))
                })?;
                let mut builder = SelectQueryBuilder::new()
                    .dialect(dialect.clone())
                    .table(table.clone())
                    .columns(spec.columns.clone())
                    .qualify_names(true);
                if let Some(ref filter) = spec.filter {
                    if !filter.is_empty() {
                        builder = builder.add_filter(filter.clone());
                    }
                }
                plans.push((
                    Query::Select(builder.build()?),
                    CatalogEntry::new(&table.name, &self.spec.format),
                ));
            }
        }

        for (index, text) in self.spec.queries.iter().enumerate() {
            let query = NativeQueryBuilder::new().query(text.clone()).build()?;
            let name = if self.spec.queries.len() == 1 {
                format!("query-{}", started_at.format("%H-%M-%S"))
            } else {
                format!("query-{}-{}", started_at.format("%H-%M-%S"), index)
            };
            plans.push((
                Query::Native(query),
                CatalogEntry::new(name, &self.spec.format),
            ));
        }

        Ok(plans)
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_workers(
        &self,
        splits: Vec<QuerySplit>,
        dialect: Arc<dyn Dialect>,
        registry: Arc<ValueFormatRegistry>,
        manager: Arc<WriteRowSetManager>,
        row_set: Arc<RowSet>,
        sinks: ChunkSinkFactory,
        cancel: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<Result<u64>>> {
        splits
            .into_iter()
            .map(|split| {
                let worker = SplitWorker {
                    session: self.session.clone(),
                    dialect: dialect.clone(),
                    registry: registry.clone(),
                    manager: manager.clone(),
                    row_set: row_set.clone(),
                    sinks: sinks.clone(),
                    formats: self.formats.clone(),
                    chunk_rows: self.settings.effective_chunk_rows(),
                    cancel: cancel.clone(),
                };
                tokio::spawn(async move { worker.run(split).await })
            })
            .collect()
    }
}

/// One worker: streams one query split into its own chunk files.
struct SplitWorker {
    session: Arc<dyn SourceSession>,
    dialect: Arc<dyn Dialect>,
    registry: Arc<ValueFormatRegistry>,
    manager: Arc<WriteRowSetManager>,
    row_set: Arc<RowSet>,
    sinks: ChunkSinkFactory,
    formats: Arc<FormatFactory>,
    chunk_rows: u64,
    cancel: watch::Receiver<bool>,
}

impl SplitWorker {
    async fn run(self, split: QuerySplit) -> Result<u64> {
        let entry = self.row_set.entry().name.clone();
        match self.stream_split(&split).await {
            Ok(rows) => Ok(rows),
            Err(err) => {
                // Record before returning so sibling workers observe
                // can_write() == false within one chunk.
                self.manager
                    .work_manager()
                    .failure(&entry, err.to_string());
                Err(err)
            }
        }
    }

    async fn stream_split(&self, split: &QuerySplit) -> Result<u64> {
        // PREPARE: forward-only cursor with the dialect's streaming hint.
        let mut stream = self
            .session
            .stream_query(&split.sql, self.dialect.stream_hint())
            .await?;

        let handles = self
            .dialect
            .type_registry()
            .resolve_columns(&stream.columns)?;
        let columns: Vec<CatalogColumn> =
            handles.iter().map(CatalogColumn::from_handle).collect();
        self.manager.write_start(&self.row_set, &columns);

        let mut state = WorkerState::new(split.split_index);
        let result = self.pump(&mut stream, &handles, &columns, &mut state).await;

        // FINALIZE this worker's part: write_end runs exactly once per
        // chunk, also on early abort, and rows already on disk stay
        // accounted for so a partial catalog remains diagnosable.
        if let Some((chunk, mut format_writer)) = state.open.take() {
            match format_writer.write_end() {
                Ok(()) => {}
                Err(end_err) if result.is_ok() => return Err(end_err),
                Err(end_err) => error!("Failed to close chunk writer: {}", end_err),
            }
            self.manager.write_end_chunk(&self.row_set, &chunk);
            state.finished.push(chunk);
        }
        self.manager
            .write_end(&self.row_set, split.split_index, state.finished);

        result.map(|()| state.rows_written)
    }

    /// STREAM: the running flag is checked before each row so external
    /// cancellation takes effect within one row.
    async fn pump(
        &self,
        stream: &mut crate::session::RowStream,
        handles: &[crate::types::ColumnHandle],
        columns: &[CatalogColumn],
        state: &mut WorkerState,
    ) -> Result<()> {
        let entry = self.row_set.entry().clone();
        let mut texts: Vec<Option<String>> = Vec::with_capacity(handles.len());

        while *self.cancel.borrow() {
            let Some(fetched) = stream.rows.recv().await else {
                break;
            };
            let row = fetched?;
            if row.values.len() != handles.len() {
                return Err(FerryError::entry(
                    &entry.name,
                    format!(
                        "row has {} values but {} columns",
                        row.values.len(),
                        handles.len()
                    ),
                ));
            }

            texts.clear();
            for (handle, value) in handles.iter().zip(&row.values) {
                texts.push(self.registry.get_value(handle, value)?);
            }

            if state.open.is_none() {
                // canWrite is polled before each chunk: once any failure
                // is recorded anywhere, stop cleanly instead of opening
                // another chunk.
                if !self.manager.can_write() {
                    break;
                }
                let chunk = Chunk::new(state.split_index, state.seq);
                state.seq += 1;
                let sink = self.sinks.create(&entry, &chunk)?;
                let mut format_writer =
                    self.formats.create_writer(&entry.format, Box::new(sink))?;
                format_writer.write_begin(columns)?;
                state.open = Some((chunk, format_writer));
            }

            let mut rotate = false;
            if let Some((chunk, format_writer)) = state.open.as_mut() {
                format_writer.write_row(&texts)?;
                self.manager.write_row(chunk);
                state.rows_written += 1;
                rotate = chunk.row_count >= self.chunk_rows;
            }
            if rotate {
                if let Some((chunk, mut format_writer)) = state.open.take() {
                    format_writer.write_end()?;
                    self.manager.write_end_chunk(&self.row_set, &chunk);
                    state.finished.push(chunk);
                }
            }
        }
        Ok(())
    }
}

/// Per-worker streaming state: the open chunk, finished chunks, and the
/// running totals.
struct WorkerState {
    split_index: usize,
    seq: usize,
    rows_written: u64,
    open: Option<(Chunk, Box<dyn FormatWriter>)>,
    finished: Vec<Chunk>,
}

impl WorkerState {
    fn new(split_index: usize) -> Self {
        Self {
            split_index,
            seq: 0,
            rows_written: 0,
            open: None,
            finished: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableSpec;
    use crate::resolve::{DatabaseInfo, DialectResolver};
    use crate::schema::{Column, Table};
    use crate::session::StaticInspector;
    use crate::types::SqlTypeCode;

    fn one_table_database() -> Database {
        let table = Table::new("users")
            .with_column(Column::new("id", SqlTypeCode::Integer))
            .with_row_count(10);
        let view = Table {
            kind: ObjectKind::View,
            ..Table::new("user_view")
        };
        Database::new(
            DatabaseInfo::new("MySQL").with_major_minor(8, 0),
            vec![table, view],
        )
    }

    fn job(spec: DumpSpec, dir: &std::path::Path) -> DumpJob {
        let database = one_table_database();
        let session = crate::session::MemorySession::new(database.info().clone()).with_table(
            "users",
            vec![crate::types::ColumnMeta::new("id", "int")],
            (0..10).map(|i| vec![crate::types::Value::I32(i)]).collect(),
        );
        DumpJob::new(
            Arc::new(DialectResolver::with_builtins()),
            Arc::new(StaticInspector::new(database)),
            Arc::new(session),
            Arc::new(FormatFactory::with_builtins()),
            Catalog::new(dir),
            spec,
        )
    }

    #[test]
    fn test_plans_skip_views() {
        let tmp = tempfile::tempdir().unwrap();
        let job = job(DumpSpec::default(), tmp.path());
        let dialect: Arc<dyn Dialect> = Arc::new(crate::dialect::MysqlDialect::new());
        let plans = job
            .build_plans(&one_table_database(), dialect, Utc::now())
            .unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].1.name, "users");
    }

    #[test]
    fn test_plans_native_query_entry_names() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = DumpSpec {
            tables: vec![TableSpec::named("users")],
            queries: vec!["select 1".into(), "select 2".into()],
            ..Default::default()
        };
        let job = job(spec, tmp.path());
        let dialect: Arc<dyn Dialect> = Arc::new(crate::dialect::MysqlDialect::new());
        let plans = job
            .build_plans(&one_table_database(), dialect, Utc::now())
            .unwrap();
        assert_eq!(plans.len(), 3);
        assert!(plans[1].1.name.starts_with("query-"));
        assert_ne!(plans[1].1.name, plans[2].1.name);
    }

    #[test]
    fn test_unknown_table_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = DumpSpec {
            tables: vec![TableSpec::named("missing")],
            ..Default::default()
        };
        let job = job(spec, tmp.path());
        let dialect: Arc<dyn Dialect> = Arc::new(crate::dialect::MysqlDialect::new());
        let err = job
            .build_plans(&one_table_database(), dialect, Utc::now())
            .unwrap_err();
        assert!(matches!(err, FerryError::Config(_)));
    }

    #[tokio::test]
    async fn test_simple_dump_executes() {
        let tmp = tempfile::tempdir().unwrap();
        let job = job(DumpSpec::default(), tmp.path()).with_settings(JobSettings {
            workers: Some(2),
            ..Default::default()
        });
        let control = crate::job::JobControl::new();
        let report = job.execute(control.watch()).await.unwrap();
        assert_eq!(report.status, crate::job::JobStatus::Completed);
        assert_eq!(report.rows_total, 10);
        assert_eq!(report.entries.len(), 1);
    }
}
