//! Logical SQL types and values.
//!
//! Engines report column types as engine-specific names and numeric codes.
//! This module defines the dialect-neutral side of that mapping:
//!
//! - [`SqlTypeCode`]: the closed set of logical SQL types the engine knows
//!   how to carry through a catalog
//! - [`TypeRegistry`]: per-dialect mapping from engine-reported type
//!   names/codes to logical types
//! - [`Value`]: a single column value in its logical representation

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FerryError, Result};

/// Closed set of logical SQL type codes.
///
/// Every column that passes through a dump or load is resolved to exactly
/// one of these codes; a column that resolves to none fails fast with
/// [`FerryError::UnsupportedType`]. The set deliberately mirrors the common
/// relational type system rather than any single engine's. The serde form
/// equals [`SqlTypeCode::alias`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlTypeCode {
    Bit,
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Real,
    Double,
    Numeric,
    Decimal,
    Char,
    Varchar,
    LongVarchar,
    NChar,
    NVarchar,
    Clob,
    NClob,
    Binary,
    Varbinary,
    LongVarbinary,
    Blob,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Guid,
    Xml,
    Datalink,
    RowId,
    /// Engine-opaque value carried through the versioned binary envelope.
    Other,
    Struct,
    Ref,
}

impl SqlTypeCode {
    /// Stable lowercase alias used in the catalog manifest's column list.
    pub fn alias(&self) -> &'static str {
        match self {
            SqlTypeCode::Bit => "bit",
            SqlTypeCode::Boolean => "boolean",
            SqlTypeCode::TinyInt => "tinyint",
            SqlTypeCode::SmallInt => "smallint",
            SqlTypeCode::Integer => "integer",
            SqlTypeCode::BigInt => "bigint",
            SqlTypeCode::Float => "float",
            SqlTypeCode::Real => "real",
            SqlTypeCode::Double => "double",
            SqlTypeCode::Numeric => "numeric",
            SqlTypeCode::Decimal => "decimal",
            SqlTypeCode::Char => "char",
            SqlTypeCode::Varchar => "varchar",
            SqlTypeCode::LongVarchar => "longvarchar",
            SqlTypeCode::NChar => "nchar",
            SqlTypeCode::NVarchar => "nvarchar",
            SqlTypeCode::Clob => "clob",
            SqlTypeCode::NClob => "nclob",
            SqlTypeCode::Binary => "binary",
            SqlTypeCode::Varbinary => "varbinary",
            SqlTypeCode::LongVarbinary => "longvarbinary",
            SqlTypeCode::Blob => "blob",
            SqlTypeCode::Date => "date",
            SqlTypeCode::Time => "time",
            SqlTypeCode::Timestamp => "timestamp",
            SqlTypeCode::TimestampTz => "timestamptz",
            SqlTypeCode::Guid => "guid",
            SqlTypeCode::Xml => "xml",
            SqlTypeCode::Datalink => "datalink",
            SqlTypeCode::RowId => "rowid",
            SqlTypeCode::Other => "other",
            SqlTypeCode::Struct => "struct",
            SqlTypeCode::Ref => "ref",
        }
    }

    /// Resolve a manifest alias back to a type code.
    pub fn from_alias(alias: &str) -> Option<SqlTypeCode> {
        ALL_TYPE_CODES.iter().copied().find(|c| c.alias() == alias)
    }

    /// True for character types where an empty string is a legal value
    /// distinct from NULL.
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            SqlTypeCode::Char
                | SqlTypeCode::Varchar
                | SqlTypeCode::LongVarchar
                | SqlTypeCode::NChar
                | SqlTypeCode::NVarchar
                | SqlTypeCode::Clob
                | SqlTypeCode::NClob
                | SqlTypeCode::Xml
        )
    }

    /// True for the temporal types that honor the job time zone.
    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            SqlTypeCode::Date | SqlTypeCode::Time | SqlTypeCode::Timestamp | SqlTypeCode::TimestampTz
        )
    }
}

/// All type codes, in declaration order.
pub const ALL_TYPE_CODES: &[SqlTypeCode] = &[
    SqlTypeCode::Bit,
    SqlTypeCode::Boolean,
    SqlTypeCode::TinyInt,
    SqlTypeCode::SmallInt,
    SqlTypeCode::Integer,
    SqlTypeCode::BigInt,
    SqlTypeCode::Float,
    SqlTypeCode::Real,
    SqlTypeCode::Double,
    SqlTypeCode::Numeric,
    SqlTypeCode::Decimal,
    SqlTypeCode::Char,
    SqlTypeCode::Varchar,
    SqlTypeCode::LongVarchar,
    SqlTypeCode::NChar,
    SqlTypeCode::NVarchar,
    SqlTypeCode::Clob,
    SqlTypeCode::NClob,
    SqlTypeCode::Binary,
    SqlTypeCode::Varbinary,
    SqlTypeCode::LongVarbinary,
    SqlTypeCode::Blob,
    SqlTypeCode::Date,
    SqlTypeCode::Time,
    SqlTypeCode::Timestamp,
    SqlTypeCode::TimestampTz,
    SqlTypeCode::Guid,
    SqlTypeCode::Xml,
    SqlTypeCode::Datalink,
    SqlTypeCode::RowId,
    SqlTypeCode::Other,
    SqlTypeCode::Struct,
    SqlTypeCode::Ref,
];

/// Column metadata as reported by the engine through the session boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    /// Column name.
    pub name: String,
    /// Engine-specific type name (e.g. "varchar", "datetime").
    pub native_type: String,
    /// Engine-specific numeric type code, when the driver reports one.
    pub native_code: Option<i32>,
    /// Whether the column allows NULL.
    pub nullable: bool,
}

impl ColumnMeta {
    /// Create column metadata with just a name and native type name.
    pub fn new(name: impl Into<String>, native_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            native_type: native_type.into(),
            native_code: None,
            nullable: true,
        }
    }

    /// Attach the engine's numeric type code.
    pub fn with_code(mut self, code: i32) -> Self {
        self.native_code = Some(code);
        self
    }
}

/// A column handle pairing a name with its resolved logical type.
///
/// This is the unit the value format registry operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnHandle {
    pub name: String,
    pub type_code: SqlTypeCode,
}

impl ColumnHandle {
    pub fn new(name: impl Into<String>, type_code: SqlTypeCode) -> Self {
        Self {
            name: name.into(),
            type_code,
        }
    }
}

/// Per-dialect mapping from engine-reported type names and codes to
/// logical [`SqlTypeCode`]s.
///
/// Each [`Dialect`](crate::dialect::Dialect) owns exactly one registry,
/// populated at construction. Lookups prefer the numeric code when the
/// driver reports one, falling back to the lowercased type name.
#[derive(Debug, Default, Clone)]
pub struct TypeRegistry {
    by_name: HashMap<String, SqlTypeCode>,
    by_code: HashMap<i32, SqlTypeCode>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine type name.
    pub fn register_name(&mut self, name: impl Into<String>, code: SqlTypeCode) {
        self.by_name.insert(name.into().to_lowercase(), code);
    }

    /// Register an engine numeric type code.
    pub fn register_code(&mut self, native_code: i32, code: SqlTypeCode) {
        self.by_code.insert(native_code, code);
    }

    /// Resolve column metadata to a logical type code.
    ///
    /// # Errors
    ///
    /// Returns [`FerryError::UnsupportedType`] when neither the numeric
    /// code nor the type name is registered. This is a hard stop for the
    /// current entry; values of unknown types are never coerced.
    pub fn resolve(&self, meta: &ColumnMeta) -> Result<SqlTypeCode> {
        if let Some(native) = meta.native_code {
            if let Some(code) = self.by_code.get(&native) {
                return Ok(*code);
            }
        }
        if let Some(code) = self.by_name.get(&meta.native_type.to_lowercase()) {
            return Ok(*code);
        }
        Err(FerryError::UnsupportedType {
            type_name: meta.native_type.clone(),
            type_code: meta.native_code.unwrap_or(0),
        })
    }

    /// Resolve a full column list into handles, failing on the first
    /// unsupported column.
    pub fn resolve_columns(&self, metas: &[ColumnMeta]) -> Result<Vec<ColumnHandle>> {
        metas
            .iter()
            .map(|m| Ok(ColumnHandle::new(m.name.clone(), self.resolve(m)?)))
            .collect()
    }
}

/// A single column value in its logical representation.
///
/// Values are produced by session drivers on dump and consumed by them on
/// load; the value format registry converts between `Value` and the
/// catalog's portable text form.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Guid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeTz(DateTime<FixedOffset>),
    /// Engine-opaque payload already wrapped in the binary envelope.
    Opaque(Vec<u8>),
}

impl Value {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_round_trip() {
        for code in ALL_TYPE_CODES {
            assert_eq!(SqlTypeCode::from_alias(code.alias()), Some(*code));
        }
    }

    #[test]
    fn test_registry_prefers_code_over_name() {
        let mut registry = TypeRegistry::new();
        registry.register_name("varchar", SqlTypeCode::Varchar);
        registry.register_code(15, SqlTypeCode::NVarchar);

        let by_name = ColumnMeta::new("a", "VARCHAR");
        assert_eq!(registry.resolve(&by_name).unwrap(), SqlTypeCode::Varchar);

        let by_code = ColumnMeta::new("b", "varchar").with_code(15);
        assert_eq!(registry.resolve(&by_code).unwrap(), SqlTypeCode::NVarchar);
    }

    #[test]
    fn test_registry_unknown_type_fails_fast() {
        let registry = TypeRegistry::new();
        let meta = ColumnMeta::new("geo", "geometry").with_code(255);
        match registry.resolve(&meta) {
            Err(FerryError::UnsupportedType {
                type_name,
                type_code,
            }) => {
                assert_eq!(type_name, "geometry");
                assert_eq!(type_code, 255);
            }
            other => panic!("expected UnsupportedType, got {:?}", other),
        }
    }

    #[test]
    fn test_is_text() {
        assert!(SqlTypeCode::Varchar.is_text());
        assert!(SqlTypeCode::NClob.is_text());
        assert!(!SqlTypeCode::Blob.is_text());
        assert!(!SqlTypeCode::Integer.is_text());
    }
}
