//! # sqlferry
//!
//! Heterogeneous database dump/load engine. sqlferry streams relational
//! data out of one engine into a portable, chunked catalog and loads it
//! into a different engine, without requiring the two engines to share a
//! wire protocol. It provides:
//!
//! - **Dialect resolution** picking the most specific strategy for a
//!   detected engine
//! - **A value format registry** that converts every column value into a
//!   dialect-neutral text form and back, losslessly
//! - **A streaming dump/load engine** that never materializes a full
//!   result set in memory
//! - **A chunked catalog** written by parallel workers and reassembled
//!   deterministically
//! - **Dialect-dispatched DDL generation** for schema objects
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sqlferry::{
//!     Catalog, DialectResolver, DumpJob, DumpSpec, FormatFactory, JobControl,
//! };
//!
//! # async fn run(
//! #     inspector: Arc<dyn sqlferry::Inspector>,
//! #     session: Arc<dyn sqlferry::SourceSession>,
//! # ) -> sqlferry::Result<()> {
//! let job = DumpJob::new(
//!     Arc::new(DialectResolver::with_builtins()),
//!     inspector,
//!     session,
//!     Arc::new(FormatFactory::with_builtins()),
//!     Catalog::new("backup/"),
//!     DumpSpec::default(),
//! );
//! let control = JobControl::new();
//! let report = job.execute(control.watch()).await?;
//! println!("dumped {} rows", report.rows_total);
//! # Ok(())
//! # }
//! ```

pub mod backup;
pub mod config;
pub mod dialect;
pub mod dump;
pub mod error;
pub mod format;
pub mod formats;
pub mod generator;
pub mod job;
pub mod load;
pub mod query;
pub mod resolve;
pub mod schema;
pub mod session;
pub mod types;

// Re-exports for convenient access
pub use backup::{Catalog, CatalogEntry, Chunk, Manifest, RowSet, WorkManager, WriteRowSetManager};
pub use config::{Config, DumpSpec, JobSettings, LoadSpec, TableSpec};
pub use dialect::{Dialect, IsolationLevel, MysqlDialect, NuodbDialect, PostgresDialect, StreamHint};
pub use dump::DumpJob;
pub use error::{FerryError, Result};
pub use format::ValueFormatRegistry;
pub use formats::{FormatFactory, FormatReader, FormatWriter};
pub use generator::{NamingStrategy, SchemaObject, ScriptGenerator, ScriptGeneratorContext};
pub use job::{EntryOutcome, JobControl, JobReport, JobStatus};
pub use load::LoadJob;
pub use query::{NativeQueryBuilder, Query, SelectQueryBuilder};
pub use resolve::{DatabaseInfo, DialectResolver};
pub use schema::{Column, Database, Inspector, ObjectKind, Table};
pub use session::{MemorySession, Row, RowStream, SourceSession, StaticInspector, TargetSession};
pub use types::{ColumnHandle, ColumnMeta, SqlTypeCode, TypeRegistry, Value};
