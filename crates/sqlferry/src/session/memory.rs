//! In-memory session, the reference implementation of the session
//! boundary.
//!
//! Used by the test suite and as a template for real drivers. It answers
//! full-table SELECTs against registered tables, honoring the row-window
//! clauses the query splitter appends, and records every statement and
//! insert it receives.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::dialect::StreamHint;
use crate::error::{FerryError, Result};
use crate::resolve::DatabaseInfo;
use crate::schema::{Database, Inspector};
use crate::types::{ColumnMeta, Value};

use super::{Row, RowStream, SourceSession, TargetSession};

/// A table registered with a [`MemorySession`].
#[derive(Debug, Clone)]
struct MemoryTable {
    name: String,
    columns: Vec<ColumnMeta>,
    rows: Vec<Vec<Value>>,
}

/// In-memory source and target session.
#[derive(Debug, Default)]
pub struct MemorySession {
    info: Option<DatabaseInfo>,
    tables: Vec<MemoryTable>,
    /// Statements whose text contains any of these substrings fail with
    /// `UnsupportedOperation` (for negotiation fallback tests).
    rejected: Vec<String>,
    /// Artificial per-row delay applied while streaming.
    row_delay: Option<Duration>,
    executed: Mutex<Vec<String>>,
    inserted: Mutex<HashMap<String, Vec<Vec<Value>>>>,
}

impl MemorySession {
    pub fn new(info: DatabaseInfo) -> Self {
        Self {
            info: Some(info),
            ..Default::default()
        }
    }

    /// Register a table with its result metadata and rows.
    pub fn with_table(
        mut self,
        name: impl Into<String>,
        columns: Vec<ColumnMeta>,
        rows: Vec<Vec<Value>>,
    ) -> Self {
        self.tables.push(MemoryTable {
            name: name.into(),
            columns,
            rows,
        });
        self
    }

    /// Reject statements containing `needle` with `UnsupportedOperation`.
    pub fn rejecting(mut self, needle: impl Into<String>) -> Self {
        self.rejected.push(needle.into());
        self
    }

    /// Delay each streamed row, exercising backpressure and interleaving.
    pub fn with_row_delay(mut self, delay: Duration) -> Self {
        self.row_delay = Some(delay);
        self
    }

    /// Statements executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().expect("executed lock").clone()
    }

    /// Rows inserted so far, keyed by the INSERT statement text.
    pub fn inserted(&self) -> HashMap<String, Vec<Vec<Value>>> {
        self.inserted.lock().expect("inserted lock").clone()
    }

    /// Total rows inserted across all statements.
    pub fn inserted_rows(&self) -> usize {
        self.inserted
            .lock()
            .expect("inserted lock")
            .values()
            .map(|rows| rows.len())
            .sum()
    }

    fn find_table(&self, sql: &str) -> Option<&MemoryTable> {
        let lowered = sql.to_lowercase();
        self.tables
            .iter()
            .find(|t| lowered.contains(&t.name.to_lowercase()))
    }
}

/// Parse the trailing row-window clause of a split query.
///
/// Recognizes `LIMIT n OFFSET m` (standard/postgres) and `LIMIT m, n`
/// (mysql). Returns (offset, limit), defaulting to the full range.
fn parse_window(sql: &str) -> (usize, Option<usize>) {
    let lowered = sql.to_lowercase();
    let Some(idx) = lowered.rfind(" limit ") else {
        return (0, None);
    };
    let tail = lowered[idx + " limit ".len()..].trim();
    if let Some((first, second)) = tail.split_once(" offset ") {
        let limit = first.trim().parse().ok();
        let offset = second.trim().parse().unwrap_or(0);
        (offset, limit)
    } else if let Some((first, second)) = tail.split_once(',') {
        let offset = first.trim().parse().unwrap_or(0);
        let limit = second.trim().parse().ok();
        (offset, limit)
    } else {
        (0, tail.parse().ok())
    }
}

#[async_trait]
impl SourceSession for MemorySession {
    async fn database_info(&self) -> Result<DatabaseInfo> {
        self.info
            .clone()
            .ok_or_else(|| FerryError::Session("no database info configured".into()))
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        for needle in &self.rejected {
            if sql.contains(needle.as_str()) {
                return Err(FerryError::UnsupportedOperation(sql.to_string()));
            }
        }
        self.executed.lock().expect("executed lock").push(sql.to_string());
        Ok(())
    }

    async fn stream_query(&self, sql: &str, _hint: StreamHint) -> Result<RowStream> {
        let table = self
            .find_table(sql)
            .ok_or_else(|| FerryError::Session(format!("no registered table matches: {}", sql)))?;

        let (offset, limit) = parse_window(sql);
        let window: Vec<Vec<Value>> = table
            .rows
            .iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();

        let columns = table.columns.clone();
        let delay = self.row_delay;
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            for (index, values) in window.into_iter().enumerate() {
                if let Some(delay) = delay {
                    // Uneven pacing makes worker interleavings vary.
                    tokio::time::sleep(delay * ((index % 3) as u32 + 1)).await;
                }
                if tx.send(Ok(Row::new(values))).await.is_err() {
                    break;
                }
            }
        });

        Ok(RowStream { columns, rows: rx })
    }
}

#[async_trait]
impl TargetSession for MemorySession {
    async fn database_info(&self) -> Result<DatabaseInfo> {
        SourceSession::database_info(self).await
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        SourceSession::execute(self, sql).await
    }

    async fn insert_batch(&self, sql: &str, rows: &[Vec<Value>]) -> Result<u64> {
        let mut inserted = self.inserted.lock().expect("inserted lock");
        inserted
            .entry(sql.to_string())
            .or_default()
            .extend(rows.iter().cloned());
        Ok(rows.len() as u64)
    }
}

/// Inspector that returns a pre-built database aggregate.
#[derive(Debug, Clone)]
pub struct StaticInspector {
    database: Database,
}

impl StaticInspector {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

#[async_trait]
impl Inspector for StaticInspector {
    async fn inspect(&self) -> Result<Database> {
        Ok(self.database.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> MemorySession {
        MemorySession::new(DatabaseInfo::new("MySQL").with_major_minor(8, 0)).with_table(
            "users",
            vec![
                ColumnMeta::new("id", "int"),
                ColumnMeta::new("name", "varchar"),
            ],
            (0..10)
                .map(|i| vec![Value::I32(i), Value::Text(format!("user-{}", i))])
                .collect(),
        )
    }

    #[test]
    fn test_parse_window() {
        assert_eq!(parse_window("SELECT * FROM t"), (0, None));
        assert_eq!(parse_window("SELECT * FROM t LIMIT 25 OFFSET 50"), (50, Some(25)));
        assert_eq!(parse_window("SELECT * FROM t LIMIT 50, 25"), (50, Some(25)));
        assert_eq!(parse_window("SELECT * FROM t LIMIT 25"), (0, Some(25)));
    }

    #[tokio::test]
    async fn test_stream_full_table() {
        let session = session();
        let mut stream = session
            .stream_query("SELECT `id`, `name` FROM `users`", StreamHint::RowByRow)
            .await
            .unwrap();
        assert_eq!(stream.columns.len(), 2);

        let mut count = 0;
        while let Some(row) = stream.rows.recv().await {
            row.unwrap();
            count += 1;
        }
        assert_eq!(count, 10);
    }

    #[tokio::test]
    async fn test_stream_window() {
        let session = session();
        let mut stream = session
            .stream_query("SELECT `id` FROM `users` LIMIT 8, 4", StreamHint::RowByRow)
            .await
            .unwrap();
        let mut ids = Vec::new();
        while let Some(row) = stream.rows.recv().await {
            ids.push(row.unwrap().values[0].clone());
        }
        // Only two rows remain past offset 8.
        assert_eq!(ids, vec![Value::I32(8), Value::I32(9)]);
    }

    #[tokio::test]
    async fn test_rejected_statement() {
        let session = session().rejecting("REPEATABLE READ");
        let err = SourceSession::execute(&session, "SET SESSION TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .await
            .unwrap_err();
        assert!(matches!(err, FerryError::UnsupportedOperation(_)));
    }
}
