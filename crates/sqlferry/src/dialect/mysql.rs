//! MySQL/MariaDB dialect.

use chrono::FixedOffset;

use crate::schema::Column;
use crate::types::{SqlTypeCode, TypeRegistry};

use super::{offset_as_hh_mm, Dialect, StreamHint};

/// MySQL-family dialect (MySQL 5.5+, MariaDB 10+).
#[derive(Debug)]
pub struct MysqlDialect {
    types: TypeRegistry,
}

impl MysqlDialect {
    pub fn new() -> Self {
        let mut types = TypeRegistry::new();
        types.register_name("bit", SqlTypeCode::Bit);
        types.register_name("tinyint", SqlTypeCode::TinyInt);
        types.register_name("smallint", SqlTypeCode::SmallInt);
        types.register_name("year", SqlTypeCode::SmallInt);
        types.register_name("mediumint", SqlTypeCode::Integer);
        types.register_name("int", SqlTypeCode::Integer);
        types.register_name("integer", SqlTypeCode::Integer);
        types.register_name("bigint", SqlTypeCode::BigInt);
        types.register_name("float", SqlTypeCode::Float);
        types.register_name("double", SqlTypeCode::Double);
        types.register_name("double precision", SqlTypeCode::Double);
        types.register_name("decimal", SqlTypeCode::Decimal);
        types.register_name("numeric", SqlTypeCode::Numeric);
        types.register_name("char", SqlTypeCode::Char);
        types.register_name("varchar", SqlTypeCode::Varchar);
        types.register_name("tinytext", SqlTypeCode::LongVarchar);
        types.register_name("text", SqlTypeCode::LongVarchar);
        types.register_name("mediumtext", SqlTypeCode::Clob);
        types.register_name("longtext", SqlTypeCode::Clob);
        types.register_name("json", SqlTypeCode::LongVarchar);
        types.register_name("enum", SqlTypeCode::Varchar);
        types.register_name("set", SqlTypeCode::Varchar);
        types.register_name("binary", SqlTypeCode::Binary);
        types.register_name("varbinary", SqlTypeCode::Varbinary);
        types.register_name("tinyblob", SqlTypeCode::Varbinary);
        types.register_name("blob", SqlTypeCode::Blob);
        types.register_name("mediumblob", SqlTypeCode::Blob);
        types.register_name("longblob", SqlTypeCode::Blob);
        types.register_name("date", SqlTypeCode::Date);
        types.register_name("time", SqlTypeCode::Time);
        types.register_name("datetime", SqlTypeCode::Timestamp);
        types.register_name("timestamp", SqlTypeCode::Timestamp);
        types.register_name("geometry", SqlTypeCode::Other);
        Self { types }
    }
}

impl Default for MysqlDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn open_quote(&self) -> char {
        '`'
    }

    fn close_quote(&self) -> char {
        '`'
    }

    fn type_registry(&self) -> &TypeRegistry {
        &self.types
    }

    fn supports_session_time_zone(&self) -> bool {
        true
    }

    /// `SET @@session.time_zone = '±HH:MM'`; `None` resets to `SYSTEM`.
    fn session_time_zone_statement(&self, offset: Option<FixedOffset>) -> Option<String> {
        let value = match offset {
            Some(offset) => offset_as_hh_mm(offset),
            None => "SYSTEM".to_string(),
        };
        Some(format!("SET @@session.time_zone = '{}'", value))
    }

    /// MySQL drivers stream results only with the minimal fetch size
    /// (the wire-protocol row-by-row mode); any other value buffers the
    /// whole result on the client.
    fn stream_hint(&self) -> StreamHint {
        StreamHint::RowByRow
    }

    fn limit_clause(&self, offset: u64, limit: u64) -> String {
        format!("LIMIT {}, {}", offset, limit)
    }

    fn type_ddl(&self, column: &Column) -> String {
        match column.type_code {
            SqlTypeCode::Bit => "BIT".into(),
            SqlTypeCode::Boolean => "TINYINT(1)".into(),
            SqlTypeCode::TinyInt => "TINYINT".into(),
            SqlTypeCode::SmallInt => "SMALLINT".into(),
            SqlTypeCode::Integer => "INT".into(),
            SqlTypeCode::BigInt => "BIGINT".into(),
            SqlTypeCode::Float => "FLOAT".into(),
            SqlTypeCode::Real => "FLOAT".into(),
            SqlTypeCode::Double => "DOUBLE".into(),
            SqlTypeCode::Numeric | SqlTypeCode::Decimal => decimal_ddl("DECIMAL", column),
            SqlTypeCode::Char | SqlTypeCode::NChar => sized_ddl("CHAR", column, 1),
            SqlTypeCode::Varchar | SqlTypeCode::NVarchar => sized_ddl("VARCHAR", column, 255),
            SqlTypeCode::LongVarchar | SqlTypeCode::Xml | SqlTypeCode::Datalink => "TEXT".into(),
            SqlTypeCode::Clob | SqlTypeCode::NClob => "LONGTEXT".into(),
            SqlTypeCode::Binary => sized_ddl("BINARY", column, 1),
            SqlTypeCode::Varbinary | SqlTypeCode::RowId => sized_ddl("VARBINARY", column, 255),
            SqlTypeCode::LongVarbinary
            | SqlTypeCode::Blob
            | SqlTypeCode::Other
            | SqlTypeCode::Struct
            | SqlTypeCode::Ref => "LONGBLOB".into(),
            SqlTypeCode::Date => "DATE".into(),
            SqlTypeCode::Time => "TIME".into(),
            SqlTypeCode::Timestamp | SqlTypeCode::TimestampTz => "DATETIME".into(),
            SqlTypeCode::Guid => "CHAR(36)".into(),
        }
    }
}

fn sized_ddl(base: &str, column: &Column, default_size: u32) -> String {
    format!("{}({})", base, column.size.unwrap_or(default_size))
}

fn decimal_ddl(base: &str, column: &Column) -> String {
    match (column.precision, column.scale) {
        (Some(p), Some(s)) => format!("{}({}, {})", base, p, s),
        (Some(p), None) => format!("{}({})", base, p),
        _ => base.to_string(),
    }
}
