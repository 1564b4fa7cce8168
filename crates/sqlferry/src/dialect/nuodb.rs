//! NuoDB dialect (distributed SQL target).

use crate::schema::Column;
use crate::types::{SqlTypeCode, TypeRegistry};

use super::{Dialect, IsolationLevel, StreamHint};

/// NuoDB dialect.
///
/// NuoDB applies time zones through a per-connection property rather than
/// a session statement, so [`Dialect::supports_session_time_zone`] is
/// false and temporal values go through the zone-aware value formats.
#[derive(Debug)]
pub struct NuodbDialect {
    types: TypeRegistry,
}

impl NuodbDialect {
    pub fn new() -> Self {
        let mut types = TypeRegistry::new();
        types.register_name("boolean", SqlTypeCode::Boolean);
        types.register_name("smallint", SqlTypeCode::SmallInt);
        types.register_name("integer", SqlTypeCode::Integer);
        types.register_name("int", SqlTypeCode::Integer);
        types.register_name("bigint", SqlTypeCode::BigInt);
        types.register_name("double", SqlTypeCode::Double);
        types.register_name("double precision", SqlTypeCode::Double);
        types.register_name("number", SqlTypeCode::Numeric);
        types.register_name("numeric", SqlTypeCode::Numeric);
        types.register_name("decimal", SqlTypeCode::Decimal);
        types.register_name("char", SqlTypeCode::Char);
        types.register_name("character", SqlTypeCode::Char);
        types.register_name("string", SqlTypeCode::Varchar);
        types.register_name("varchar", SqlTypeCode::Varchar);
        types.register_name("text", SqlTypeCode::Clob);
        types.register_name("clob", SqlTypeCode::Clob);
        types.register_name("blob", SqlTypeCode::Blob);
        types.register_name("binary", SqlTypeCode::Binary);
        types.register_name("varbinary", SqlTypeCode::Varbinary);
        types.register_name("date", SqlTypeCode::Date);
        types.register_name("time", SqlTypeCode::Time);
        types.register_name("timestamp", SqlTypeCode::Timestamp);
        Self { types }
    }
}

impl Default for NuodbDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for NuodbDialect {
    fn name(&self) -> &str {
        "nuodb"
    }

    fn type_registry(&self) -> &TypeRegistry {
        &self.types
    }

    /// NuoDB exposes consistent-read and write-committed levels; the ANSI
    /// REPEATABLE READ spelling is not accepted.
    fn isolation_statement(&self, level: IsolationLevel) -> Option<String> {
        match level {
            IsolationLevel::ReadCommitted | IsolationLevel::Serializable => Some(format!(
                "SET TRANSACTION ISOLATION LEVEL {}",
                level.as_sql()
            )),
            IsolationLevel::ReadUncommitted | IsolationLevel::RepeatableRead => None,
        }
    }

    /// NuoDB streams through a bounded fetch window per round trip.
    fn stream_hint(&self) -> StreamHint {
        StreamHint::FetchSize(1_000)
    }

    fn type_ddl(&self, column: &Column) -> String {
        match column.type_code {
            SqlTypeCode::Bit | SqlTypeCode::Boolean => "BOOLEAN".into(),
            SqlTypeCode::TinyInt | SqlTypeCode::SmallInt => "SMALLINT".into(),
            SqlTypeCode::Integer => "INTEGER".into(),
            SqlTypeCode::BigInt => "BIGINT".into(),
            SqlTypeCode::Float | SqlTypeCode::Real | SqlTypeCode::Double => "DOUBLE".into(),
            SqlTypeCode::Numeric | SqlTypeCode::Decimal => match (column.precision, column.scale) {
                (Some(p), Some(s)) => format!("NUMERIC({}, {})", p, s),
                (Some(p), None) => format!("NUMERIC({})", p),
                _ => "NUMERIC".into(),
            },
            SqlTypeCode::Char | SqlTypeCode::NChar => {
                format!("CHAR({})", column.size.unwrap_or(1))
            }
            SqlTypeCode::Varchar | SqlTypeCode::NVarchar => match column.size {
                Some(size) => format!("VARCHAR({})", size),
                None => "STRING".into(),
            },
            SqlTypeCode::LongVarchar
            | SqlTypeCode::Clob
            | SqlTypeCode::NClob
            | SqlTypeCode::Xml
            | SqlTypeCode::Datalink => "TEXT".into(),
            SqlTypeCode::Binary => "BINARY".into(),
            SqlTypeCode::Varbinary | SqlTypeCode::RowId => "VARBINARY".into(),
            SqlTypeCode::LongVarbinary
            | SqlTypeCode::Blob
            | SqlTypeCode::Other
            | SqlTypeCode::Struct
            | SqlTypeCode::Ref => "BLOB".into(),
            SqlTypeCode::Date => "DATE".into(),
            SqlTypeCode::Time => "TIME".into(),
            SqlTypeCode::Timestamp | SqlTypeCode::TimestampTz => "TIMESTAMP".into(),
            SqlTypeCode::Guid => "STRING".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolation_support() {
        let dialect = NuodbDialect::new();
        assert!(dialect
            .isolation_statement(IsolationLevel::RepeatableRead)
            .is_none());
        assert!(dialect
            .isolation_statement(IsolationLevel::ReadCommitted)
            .is_some());
    }

    #[test]
    fn test_no_session_time_zone() {
        let dialect = NuodbDialect::new();
        assert!(!dialect.supports_session_time_zone());
        assert!(dialect.session_time_zone_statement(None).is_none());
    }
}
