//! Relational schema metadata.
//!
//! A [`Database`] aggregate is produced once per job by schema
//! introspection (an external collaborator behind the [`Inspector`]
//! boundary) and treated as read-only thereafter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::error::Result;
use crate::resolve::DatabaseInfo;
use crate::types::SqlTypeCode;

/// Kind of a schema object, used for DDL dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Database,
    Schema,
    Table,
    View,
    SystemTable,
    Column,
    PrimaryKey,
    Index,
    ForeignKey,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Database => "database",
            ObjectKind::Schema => "schema",
            ObjectKind::Table => "table",
            ObjectKind::View => "view",
            ObjectKind::SystemTable => "system_table",
            ObjectKind::Column => "column",
            ObjectKind::PrimaryKey => "primary_key",
            ObjectKind::Index => "index",
            ObjectKind::ForeignKey => "foreign_key",
        }
    }
}

/// Column metadata within a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Resolved logical type.
    pub type_code: SqlTypeCode,

    /// Engine-reported type name (as introspected).
    pub native_type: String,

    /// Declared length for character/binary types.
    pub size: Option<u32>,

    /// Numeric precision.
    pub precision: Option<u32>,

    /// Numeric scale.
    pub scale: Option<u32>,

    /// Whether the column allows NULL.
    pub nullable: bool,

    /// Ordinal position (1-based).
    pub ordinal: u32,
}

impl Column {
    /// Create a column with just a name and logical type.
    pub fn new(name: impl Into<String>, type_code: SqlTypeCode) -> Self {
        let name = name.into();
        Self {
            native_type: type_code.alias().to_string(),
            name,
            type_code,
            size: None,
            precision: None,
            scale: None,
            nullable: true,
            ordinal: 0,
        }
    }

    /// Set the declared length.
    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    /// Set precision and scale.
    pub fn with_precision_scale(mut self, precision: u32, scale: u32) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    /// Mark the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Primary key constraint metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimaryKey {
    /// Constraint name, when the engine reports one.
    pub name: Option<String>,
    /// Key column names, in key order.
    pub columns: Vec<String>,
}

/// Index metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    /// Index name, when the engine reports one.
    pub name: Option<String>,
    /// Indexed column names, in index order.
    pub columns: Vec<String>,
    /// Whether the index is unique.
    pub unique: bool,
}

/// Foreign key constraint metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name, when the engine reports one.
    pub name: Option<String>,
    /// Referencing column names.
    pub columns: Vec<String>,
    /// Referenced table name.
    pub ref_table: String,
    /// Referenced schema, when qualified.
    pub ref_schema: Option<String>,
    /// Referenced column names.
    pub ref_columns: Vec<String>,
}

/// Table (or view) metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    /// Containing catalog, when the engine has catalogs.
    pub catalog: Option<String>,

    /// Containing schema.
    pub schema: Option<String>,

    /// Table name.
    pub name: String,

    /// Object kind (TABLE, VIEW, ...).
    pub kind: ObjectKind,

    /// Column definitions, in ordinal order.
    pub columns: Vec<Column>,

    /// Primary key, when present.
    pub primary_key: Option<PrimaryKey>,

    /// Secondary indexes.
    pub indexes: Vec<Index>,

    /// Foreign key constraints.
    pub foreign_keys: Vec<ForeignKey>,

    /// Approximate row count, when the engine reports one.
    pub row_count: Option<u64>,
}

impl Table {
    /// Create an empty TABLE-kind table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            catalog: None,
            schema: None,
            name: name.into(),
            kind: ObjectKind::Table,
            columns: Vec::new(),
            primary_key: None,
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            row_count: None,
        }
    }

    /// Set the containing schema.
    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Append a column, assigning its ordinal.
    pub fn with_column(mut self, mut column: Column) -> Self {
        column.ordinal = self.columns.len() as u32 + 1;
        self.columns.push(column);
        self
    }

    /// Set the approximate row count.
    pub fn with_row_count(mut self, rows: u64) -> Self {
        self.row_count = Some(rows);
        self
    }

    /// Column names in ordinal order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Find a column by name, case-insensitively.
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Render the table reference, quoted through the dialect.
    ///
    /// With `qualify` the reference includes catalog and schema parts
    /// (`"cat"."schema"."table"`); without it, just the quoted name.
    pub fn qualified_name(&self, dialect: &dyn Dialect, qualify: bool) -> String {
        if !qualify {
            return dialect.quote(&self.name);
        }
        let mut parts = Vec::with_capacity(3);
        if let Some(ref catalog) = self.catalog {
            parts.push(dialect.quote(catalog));
        }
        if let Some(ref schema) = self.schema {
            parts.push(dialect.quote(schema));
        }
        parts.push(dialect.quote(&self.name));
        parts.join(".")
    }
}

/// Database aggregate: engine identity plus introspected tables.
///
/// Built once at INSPECT time and read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    info: DatabaseInfo,
    tables: Vec<Table>,
}

impl Database {
    pub fn new(info: DatabaseInfo, tables: Vec<Table>) -> Self {
        Self { info, tables }
    }

    /// Identity of the live engine.
    pub fn info(&self) -> &DatabaseInfo {
        &self.info
    }

    /// All introspected tables, in introspection order.
    pub fn list_tables(&self) -> &[Table] {
        &self.tables
    }

    /// Find a table by name, case-insensitively.
    pub fn find_table(&self, name: &str) -> Option<&Table> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }
}

/// Schema introspection boundary.
///
/// Implemented by session drivers outside the core; called exactly once
/// per job during INSPECT.
#[async_trait]
pub trait Inspector: Send + Sync {
    /// Inspect the connected engine and build the database aggregate.
    async fn inspect(&self) -> Result<Database>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::MysqlDialect;

    fn sample_table() -> Table {
        Table::new("users")
            .in_schema("app")
            .with_column(Column::new("id", SqlTypeCode::Integer).not_null())
            .with_column(Column::new("name", SqlTypeCode::Varchar).with_size(100))
    }

    #[test]
    fn test_qualified_name() {
        let dialect = MysqlDialect::new();
        let table = sample_table();
        assert_eq!(table.qualified_name(&dialect, true), "`app`.`users`");
        assert_eq!(table.qualified_name(&dialect, false), "`users`");
    }

    #[test]
    fn test_ordinals_assigned() {
        let table = sample_table();
        assert_eq!(table.columns[0].ordinal, 1);
        assert_eq!(table.columns[1].ordinal, 2);
    }

    #[test]
    fn test_find_table_case_insensitive() {
        let db = Database::new(
            crate::resolve::DatabaseInfo::new("MySQL"),
            vec![sample_table()],
        );
        assert!(db.find_table("USERS").is_some());
        assert!(db.find_table("missing").is_none());
    }
}
