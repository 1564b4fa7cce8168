//! Session boundary traits.
//!
//! Connection acquisition, pooling, and wire protocols live outside the
//! core behind these traits. The dump engine only needs three things from
//! a source: the engine's identity, a way to execute session-configuration
//! statements, and a forward-only streaming cursor; the load engine needs
//! the identity, DDL execution, and batched parameterized inserts.
//!
//! Row streaming uses a bounded channel so a slow format writer applies
//! backpressure to the cursor instead of buffering the whole result.

pub mod memory;

pub use memory::{MemorySession, StaticInspector};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::dialect::StreamHint;
use crate::error::Result;
use crate::resolve::DatabaseInfo;
use crate::types::{ColumnMeta, Value};

/// One fetched row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }
}

/// A live, forward-only result cursor.
///
/// `columns` is the result metadata as reported by the engine; `rows` is
/// a bounded stream that ends when the cursor is exhausted or yields an
/// error item on cursor failure.
pub struct RowStream {
    pub columns: Vec<ColumnMeta>,
    pub rows: mpsc::Receiver<Result<Row>>,
}

/// Read-side session boundary.
#[async_trait]
pub trait SourceSession: Send + Sync {
    /// Identity of the connected engine.
    async fn database_info(&self) -> Result<DatabaseInfo>;

    /// Execute a session-configuration or DDL statement.
    async fn execute(&self, sql: &str) -> Result<()>;

    /// Open a streaming, read-only cursor for `sql`.
    ///
    /// The `hint` comes from [`Dialect::stream_hint`](crate::dialect::Dialect::stream_hint)
    /// and tells the driver how to keep the cursor from buffering the
    /// whole result; its meaning is engine-specific.
    async fn stream_query(&self, sql: &str, hint: StreamHint) -> Result<RowStream>;
}

/// Write-side session boundary.
#[async_trait]
pub trait TargetSession: Send + Sync {
    /// Identity of the connected engine.
    async fn database_info(&self) -> Result<DatabaseInfo>;

    /// Execute a DDL or session statement.
    async fn execute(&self, sql: &str) -> Result<()>;

    /// Execute a parameterized INSERT once per row, returning the number
    /// of rows written.
    async fn insert_batch(&self, sql: &str, rows: &[Vec<Value>]) -> Result<u64>;
}
