//! SQL dialect strategies.
//!
//! A [`Dialect`] encapsulates one engine's identifier quoting, session
//! configuration statements, streaming behavior, and type registry. It is a
//! pure strategy: constructed once per resolved engine and reused for the
//! job's duration, with no mutable state of its own.
//!
//! Session-touching negotiation (transaction isolation, session time zone)
//! lives in the free functions [`negotiate_isolation`] and
//! [`set_session_time_zone`], which execute the dialect's statements
//! through the session boundary.

mod mysql;
mod nuodb;
mod postgres;

pub use mysql::MysqlDialect;
pub use nuodb::NuodbDialect;
pub use postgres::PostgresDialect;

use chrono::FixedOffset;
use tracing::debug;

use crate::error::{FerryError, Result};
use crate::schema::Column;
use crate::session::SourceSession;
use crate::types::TypeRegistry;

/// Transaction isolation levels, in the ANSI order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// ANSI SQL spelling of the level.
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Engine-specific result-streaming hint for the session driver.
///
/// The exact value is engine-specific and documented on each dialect; the
/// dump engine passes it through opaquely when opening a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamHint {
    /// No hint; the driver may buffer the whole result.
    Buffered,
    /// Fetch rows in batches of the given size over a server cursor.
    FetchSize(u32),
    /// Stream row by row without any client-side buffering.
    RowByRow,
}

/// SQL syntax and session strategy for one database engine.
pub trait Dialect: Send + Sync {
    /// Dialect identifier (e.g. "mysql", "postgres", "nuodb").
    fn name(&self) -> &str;

    /// Opening identifier quote character.
    fn open_quote(&self) -> char {
        '"'
    }

    /// Closing identifier quote character.
    fn close_quote(&self) -> char {
        '"'
    }

    /// Quote an identifier, escaping embedded closing quotes by doubling.
    fn quote(&self, ident: &str) -> String {
        let close = self.close_quote();
        let mut quoted = String::with_capacity(ident.len() + 2);
        quoted.push(self.open_quote());
        for ch in ident.chars() {
            quoted.push(ch);
            if ch == close {
                quoted.push(close);
            }
        }
        quoted.push(close);
        quoted
    }

    /// The registry mapping this engine's reported types to logical types.
    fn type_registry(&self) -> &TypeRegistry;

    /// Statement setting the given isolation level, or `None` when the
    /// engine does not support the level at all.
    fn isolation_statement(&self, level: IsolationLevel) -> Option<String> {
        Some(format!(
            "SET SESSION TRANSACTION ISOLATION LEVEL {}",
            level.as_sql()
        ))
    }

    /// Whether the engine can apply a time zone at the session level.
    ///
    /// When true, temporal values are dumped/loaded in the session zone and
    /// the value formats stay zone-naive; when false, the value formats
    /// apply the job time zone themselves (never both).
    fn supports_session_time_zone(&self) -> bool {
        false
    }

    /// Statement setting the session time zone, or resetting it to the
    /// engine default when `offset` is `None`. `None` return means the
    /// engine has no such statement.
    fn session_time_zone_statement(&self, _offset: Option<FixedOffset>) -> Option<String> {
        None
    }

    /// Streaming hint for forward-only result cursors.
    fn stream_hint(&self) -> StreamHint {
        StreamHint::Buffered
    }

    /// Row-window clause for query splitting.
    fn limit_clause(&self, offset: u64, limit: u64) -> String {
        format!("LIMIT {} OFFSET {}", limit, offset)
    }

    /// Parameter placeholder for the given 1-based index.
    fn param_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    /// DDL type name for a column, including length/precision/scale.
    fn type_ddl(&self, column: &Column) -> String;
}

/// Attempt each isolation level in priority order, silently falling back
/// when the engine does not support a level.
///
/// # Errors
///
/// Returns [`FerryError::UnsupportedOperation`] when none of the requested
/// levels succeed, which is fatal for the calling job.
pub async fn negotiate_isolation(
    dialect: &dyn Dialect,
    session: &dyn SourceSession,
    levels: &[IsolationLevel],
) -> Result<IsolationLevel> {
    for level in levels {
        let Some(sql) = dialect.isolation_statement(*level) else {
            continue;
        };
        match session.execute(&sql).await {
            Ok(()) => {
                debug!("Session isolation set to {}", level.as_sql());
                return Ok(*level);
            }
            Err(FerryError::UnsupportedOperation(_)) => continue,
            Err(err) => return Err(err),
        }
    }
    Err(FerryError::UnsupportedOperation(format!(
        "none of the requested isolation levels are supported by {}",
        dialect.name()
    )))
}

/// Apply (or with `None`, reset) the session time zone.
///
/// Call sites must check [`Dialect::supports_session_time_zone`] first;
/// on unsupported engines this is a no-op.
pub async fn set_session_time_zone(
    dialect: &dyn Dialect,
    session: &dyn SourceSession,
    offset: Option<FixedOffset>,
) -> Result<()> {
    if let Some(sql) = dialect.session_time_zone_statement(offset) {
        session.execute(&sql).await?;
    }
    Ok(())
}

/// Format a fixed offset as `±HH:MM`.
pub(crate) fn offset_as_hh_mm(offset: FixedOffset) -> String {
    let seconds = offset.local_minus_utc();
    let abs = seconds.unsigned_abs();
    format!(
        "{}{:02}:{:02}",
        if seconds < 0 { '-' } else { '+' },
        abs / 3600,
        (abs % 3600) / 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_formatting() {
        let plus = FixedOffset::east_opt(2 * 3600 + 30 * 60).unwrap();
        assert_eq!(offset_as_hh_mm(plus), "+02:30");

        let minus = FixedOffset::west_opt(5 * 3600).unwrap();
        assert_eq!(offset_as_hh_mm(minus), "-05:00");

        let utc = FixedOffset::east_opt(0).unwrap();
        assert_eq!(offset_as_hh_mm(utc), "+00:00");
    }

    #[test]
    fn test_default_quote_escapes_close_char() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.quote("users"), "\"users\"");
        assert_eq!(dialect.quote("odd\"name"), "\"odd\"\"name\"");
    }
}
