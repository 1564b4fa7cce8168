//! PostgreSQL dialect.

use chrono::FixedOffset;

use crate::schema::Column;
use crate::types::{SqlTypeCode, TypeRegistry};

use super::{offset_as_hh_mm, Dialect, StreamHint};

/// PostgreSQL dialect (9.6+).
#[derive(Debug)]
pub struct PostgresDialect {
    types: TypeRegistry,
}

impl PostgresDialect {
    pub fn new() -> Self {
        let mut types = TypeRegistry::new();
        types.register_name("bool", SqlTypeCode::Boolean);
        types.register_name("boolean", SqlTypeCode::Boolean);
        types.register_name("int2", SqlTypeCode::SmallInt);
        types.register_name("smallint", SqlTypeCode::SmallInt);
        types.register_name("int4", SqlTypeCode::Integer);
        types.register_name("int", SqlTypeCode::Integer);
        types.register_name("integer", SqlTypeCode::Integer);
        types.register_name("int8", SqlTypeCode::BigInt);
        types.register_name("bigint", SqlTypeCode::BigInt);
        types.register_name("float4", SqlTypeCode::Real);
        types.register_name("real", SqlTypeCode::Real);
        types.register_name("float8", SqlTypeCode::Double);
        types.register_name("double precision", SqlTypeCode::Double);
        types.register_name("numeric", SqlTypeCode::Numeric);
        types.register_name("decimal", SqlTypeCode::Decimal);
        types.register_name("bpchar", SqlTypeCode::Char);
        types.register_name("char", SqlTypeCode::Char);
        types.register_name("character", SqlTypeCode::Char);
        types.register_name("varchar", SqlTypeCode::Varchar);
        types.register_name("character varying", SqlTypeCode::Varchar);
        types.register_name("text", SqlTypeCode::LongVarchar);
        types.register_name("bytea", SqlTypeCode::Varbinary);
        types.register_name("uuid", SqlTypeCode::Guid);
        types.register_name("date", SqlTypeCode::Date);
        types.register_name("time", SqlTypeCode::Time);
        types.register_name("timetz", SqlTypeCode::Time);
        types.register_name("timestamp", SqlTypeCode::Timestamp);
        types.register_name("timestamp without time zone", SqlTypeCode::Timestamp);
        types.register_name("timestamptz", SqlTypeCode::TimestampTz);
        types.register_name("timestamp with time zone", SqlTypeCode::TimestampTz);
        types.register_name("xml", SqlTypeCode::Xml);
        types.register_name("json", SqlTypeCode::LongVarchar);
        types.register_name("jsonb", SqlTypeCode::LongVarchar);
        Self { types }
    }
}

impl Default for PostgresDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn type_registry(&self) -> &TypeRegistry {
        &self.types
    }

    fn supports_session_time_zone(&self) -> bool {
        true
    }

    /// `SET TIME ZONE '±HH:MM'`; `None` resets to `SET TIME ZONE DEFAULT`.
    fn session_time_zone_statement(&self, offset: Option<FixedOffset>) -> Option<String> {
        Some(match offset {
            Some(offset) => format!("SET TIME ZONE '{}'", offset_as_hh_mm(offset)),
            None => "SET TIME ZONE DEFAULT".to_string(),
        })
    }

    /// PostgreSQL drivers stream through a server-side portal; the hint is
    /// the portal fetch size.
    fn stream_hint(&self) -> StreamHint {
        StreamHint::FetchSize(10_000)
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn type_ddl(&self, column: &Column) -> String {
        match column.type_code {
            SqlTypeCode::Bit | SqlTypeCode::Boolean => "BOOLEAN".into(),
            SqlTypeCode::TinyInt | SqlTypeCode::SmallInt => "SMALLINT".into(),
            SqlTypeCode::Integer => "INTEGER".into(),
            SqlTypeCode::BigInt => "BIGINT".into(),
            SqlTypeCode::Float | SqlTypeCode::Real => "REAL".into(),
            SqlTypeCode::Double => "DOUBLE PRECISION".into(),
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
                None => "VARCHAR".into(),
            },
            SqlTypeCode::LongVarchar
            | SqlTypeCode::Clob
            | SqlTypeCode::NClob
            | SqlTypeCode::Datalink => "TEXT".into(),
            SqlTypeCode::Binary
            | SqlTypeCode::Varbinary
            | SqlTypeCode::LongVarbinary
            | SqlTypeCode::Blob
            | SqlTypeCode::RowId
            | SqlTypeCode::Other
            | SqlTypeCode::Struct
            | SqlTypeCode::Ref => "BYTEA".into(),
            SqlTypeCode::Date => "DATE".into(),
            SqlTypeCode::Time => "TIME".into(),
            SqlTypeCode::Timestamp => "TIMESTAMP".into(),
            SqlTypeCode::TimestampTz => "TIMESTAMP WITH TIME ZONE".into(),
            SqlTypeCode::Guid => "UUID".into(),
            SqlTypeCode::Xml => "XML".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoting() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.quote("Users"), "\"Users\"");
    }

    #[test]
    fn test_placeholders() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.param_placeholder(1), "$1");
        assert_eq!(dialect.param_placeholder(12), "$12");
    }

    #[test]
    fn test_session_time_zone_statement() {
        let dialect = PostgresDialect::new();
        assert_eq!(
            dialect.session_time_zone_statement(None).unwrap(),
            "SET TIME ZONE DEFAULT"
        );
    }
}
