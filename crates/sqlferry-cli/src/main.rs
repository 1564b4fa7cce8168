//! Catalog command-line tools.
//!
//! The heavy lifting (dump/load against live engines) lives in the
//! library behind the session boundary; this binary works with catalogs
//! on disk: inspecting manifests, validating chunk files, and generating
//! target-dialect DDL from an entry's column manifest.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use sqlferry::{
    Catalog, Column, Database, DatabaseInfo, Dialect, FormatFactory, FormatReader as _,
    MysqlDialect, NuodbDialect, PostgresDialect, SchemaObject, ScriptGeneratorContext, Table,
};

#[derive(Parser)]
#[command(name = "sqlferry", version, about = "Catalog tools for sqlferry dumps")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a catalog's entries, row counts and chunks.
    Inspect {
        /// Catalog directory.
        dir: PathBuf,
    },
    /// Re-count every chunk file and compare against the manifest.
    Validate {
        /// Catalog directory.
        dir: PathBuf,
    },
    /// Generate target-dialect DDL from the catalog's column manifests.
    Schema {
        /// Catalog directory.
        dir: PathBuf,
        /// Target dialect: mysql, postgres or nuodb.
        #[arg(long, default_value = "nuodb")]
        dialect: String,
        /// Schema to qualify table names with.
        #[arg(long)]
        schema: Option<String>,
        /// Emit drop scripts instead of create scripts.
        #[arg(long)]
        drop: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Inspect { dir } => inspect(dir),
        Command::Validate { dir } => validate(dir),
        Command::Schema {
            dir,
            dialect,
            schema,
            drop,
        } => generate_schema(dir, &dialect, schema, drop),
    }
}

fn inspect(dir: PathBuf) -> anyhow::Result<()> {
    let reader = Catalog::new(&dir)
        .reader()
        .with_context(|| format!("reading catalog at {}", dir.display()))?;

    if let Some(ref database) = reader.manifest().database {
        println!("source: {}", database);
    }
    println!("{:<24} {:>8} {:>12} {:>8}", "entry", "format", "rows", "chunks");
    for entry in reader.entries() {
        println!(
            "{:<24} {:>8} {:>12} {:>8}",
            entry.name,
            entry.format,
            entry.row_count,
            entry.chunks.len()
        );
    }
    Ok(())
}

fn validate(dir: PathBuf) -> anyhow::Result<()> {
    let reader = Catalog::new(&dir)
        .reader()
        .with_context(|| format!("reading catalog at {}", dir.display()))?;
    let formats = FormatFactory::with_builtins();

    let mut mismatches = 0usize;
    for entry in reader.entries() {
        let mut counted = 0u64;
        for chunk in &entry.chunks {
            let source = reader.chunk_source(&entry.entry(), chunk)?;
            let mut format_reader = formats.create_reader(&entry.format, Box::new(source))?;
            format_reader.read_begin()?;
            let mut chunk_rows = 0u64;
            while let Some(row) = format_reader.read_row()? {
                if !entry.columns.is_empty() && row.len() != entry.columns.len() {
                    warn!(
                        "{}: chunk ({}, {}) row has {} values, expected {}",
                        entry.name,
                        chunk.split_index,
                        chunk.seq,
                        row.len(),
                        entry.columns.len()
                    );
                    mismatches += 1;
                }
                chunk_rows += 1;
            }
            format_reader.read_end()?;

            if chunk_rows != chunk.row_count {
                warn!(
                    "{}: chunk ({}, {}) holds {} rows, manifest says {}",
                    entry.name, chunk.split_index, chunk.seq, chunk_rows, chunk.row_count
                );
                mismatches += 1;
            }
            counted += chunk_rows;
        }
        if counted != entry.row_count {
            warn!(
                "{}: chunks hold {} rows, manifest says {}",
                entry.name, counted, entry.row_count
            );
            mismatches += 1;
        } else {
            println!("{}: OK ({} rows)", entry.name, counted);
        }
    }

    if mismatches > 0 {
        bail!("{} mismatch(es) found", mismatches);
    }
    Ok(())
}

fn generate_schema(
    dir: PathBuf,
    dialect_name: &str,
    schema: Option<String>,
    drop: bool,
) -> anyhow::Result<()> {
    let reader = Catalog::new(&dir)
        .reader()
        .with_context(|| format!("reading catalog at {}", dir.display()))?;

    let dialect: Arc<dyn Dialect> = match dialect_name {
        "mysql" => Arc::new(MysqlDialect::new()),
        "postgres" => Arc::new(PostgresDialect::new()),
        "nuodb" => Arc::new(NuodbDialect::new()),
        other => bail!("unknown dialect: {} (expected mysql, postgres or nuodb)", other),
    };

    let mut tables = Vec::new();
    for entry in reader.entries() {
        let mut table = Table::new(&entry.name);
        for column in &entry.columns {
            let handle = column.to_handle()?;
            table = table.with_column(Column::new(handle.name, handle.type_code));
        }
        tables.push(table);
    }
    let info = reader
        .manifest()
        .database
        .clone()
        .unwrap_or_else(|| DatabaseInfo::new("unknown"));
    let database = Database::new(info, tables);

    let mut ctx = ScriptGeneratorContext::new(dialect);
    if let Some(schema) = schema {
        ctx = ctx.with_schema(schema);
    }

    let scripts = if drop {
        ctx.drop_scripts(&SchemaObject::Database(&database))?
    } else {
        ctx.create_scripts(&SchemaObject::Database(&database))?
    };
    for script in scripts {
        println!("{};", script);
    }
    Ok(())
}
