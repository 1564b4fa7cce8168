//! Job configuration types with auto-tuning based on system resources.

use std::path::{Path, PathBuf};

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::info;

use crate::error::{FerryError, Result};

/// System resource information for auto-tuning.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Number of CPU cores.
    pub cpu_cores: usize,
    /// Total RAM in bytes.
    pub total_memory_bytes: u64,
}

impl SystemResources {
    /// Detect system resources.
    pub fn detect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();
        Self {
            cpu_cores: sys.cpus().len().max(1),
            total_memory_bytes: sys.total_memory(),
        }
    }

    /// Log detected system resources.
    pub fn log(&self) {
        info!(
            "System resources: {:.1} GB RAM, {} CPU cores",
            self.total_memory_bytes as f64 / (1024.0 * 1024.0 * 1024.0),
            self.cpu_cores
        );
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Catalog directory the job writes to or reads from.
    pub catalog_dir: PathBuf,

    /// Dump behavior.
    #[serde(default)]
    pub dump: DumpSpec,

    /// Load behavior.
    #[serde(default)]
    pub load: LoadSpec,

    /// Shared job settings.
    #[serde(default)]
    pub settings: JobSettings,
}

impl Config {
    /// Load a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_yaml::from_str(&text)?;
        Ok(config)
    }

    /// Apply auto-tuned defaults for values not explicitly set.
    pub fn with_auto_tuning(mut self) -> Self {
        let resources = SystemResources::detect();
        resources.log();
        self.settings = self.settings.with_auto_tuning(&resources);
        self
    }
}

/// What to dump.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpSpec {
    /// Tables to dump; empty means every TABLE-kind table in the schema.
    #[serde(default)]
    pub tables: Vec<TableSpec>,

    /// Ad hoc native queries to dump alongside the tables.
    #[serde(default)]
    pub queries: Vec<String>,

    /// Output format identifier (default: "jsonl").
    #[serde(default = "default_format")]
    pub format: String,

    /// Job time zone as a `±HH:MM` offset. Applied at the session level
    /// when the dialect supports it, otherwise by the value formats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl Default for DumpSpec {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            queries: Vec::new(),
            format: default_format(),
            time_zone: None,
        }
    }
}

impl DumpSpec {
    /// Parse the configured time zone offset.
    pub fn time_zone_offset(&self) -> Result<Option<FixedOffset>> {
        self.time_zone.as_deref().map(parse_offset).transpose()
    }
}

/// One table to dump.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSpec {
    /// Table name.
    pub name: String,

    /// Explicit column subset; empty means all columns.
    #[serde(default)]
    pub columns: Vec<String>,

    /// Filter fragment inserted verbatim into the WHERE clause.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl TableSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            filter: None,
        }
    }
}

/// What to load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadSpec {
    /// Target schema to qualify table names with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Entries to load; empty means every entry in the catalog.
    #[serde(default)]
    pub tables: Vec<String>,

    /// Job time zone as a `±HH:MM` offset (see [`DumpSpec::time_zone`]).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl LoadSpec {
    /// Parse the configured time zone offset.
    pub fn time_zone_offset(&self) -> Result<Option<FixedOffset>> {
        self.time_zone.as_deref().map(parse_offset).transpose()
    }
}

/// Shared job settings. `Option` fields distinguish "not set" (use the
/// auto-tuned default) from "explicitly set".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSettings {
    /// Parallel workers per query. Auto-tuned from CPU cores if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Rows per chunk file before rotating to the next chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_rows: Option<u64>,

    /// Rows per INSERT batch on load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_rows: Option<usize>,
}

impl JobSettings {
    /// Fill unset values from detected system resources.
    pub fn with_auto_tuning(mut self, resources: &SystemResources) -> Self {
        if self.workers.is_none() {
            self.workers = Some(resources.cpu_cores.clamp(1, 8));
        }
        self
    }

    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or(4).max(1)
    }

    pub fn effective_chunk_rows(&self) -> u64 {
        self.chunk_rows.unwrap_or(100_000).max(1)
    }

    pub fn effective_batch_rows(&self) -> usize {
        self.batch_rows.unwrap_or(5_000).max(1)
    }
}

fn default_format() -> String {
    "jsonl".to_string()
}

/// Parse a `±HH:MM` offset string.
pub fn parse_offset(text: &str) -> Result<FixedOffset> {
    let invalid = || FerryError::Config(format!("invalid time zone offset {:?} (expected ±HH:MM)", text));

    let (sign, rest) = match text.chars().next() {
        Some('+') => (1, &text[1..]),
        Some('-') => (-1, &text[1..]),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 14 || minutes > 59 {
        return Err(invalid());
    }
    let seconds = sign * (hours * 3600 + minutes * 60);
    FixedOffset::east_opt(seconds).ok_or_else(invalid)
}
