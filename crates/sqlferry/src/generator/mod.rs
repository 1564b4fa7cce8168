//! Dialect-dispatched DDL script generation.
//!
//! [`ScriptGeneratorContext`] dispatches create/drop script generation and
//! identifier naming to per-object-kind strategies. Dispatch is an
//! explicit tagged-variant lookup over [`ObjectKind`]: exact kind first,
//! then an ordered list of (predicate, strategy) fallbacks checked in
//! registration order, with resolutions cached back into the exact table
//! so repeat lookups are O(1).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::dialect::Dialect;
use crate::error::{FerryError, Result};
use crate::schema::{Database, ForeignKey, Index, ObjectKind, PrimaryKey, Table};

/// A schema object submitted for script generation.
#[derive(Debug, Clone, Copy)]
pub enum SchemaObject<'a> {
    Database(&'a Database),
    Table(&'a Table),
    PrimaryKey {
        table: &'a Table,
        primary_key: &'a PrimaryKey,
    },
    Index {
        table: &'a Table,
        index: &'a Index,
    },
    ForeignKey {
        table: &'a Table,
        foreign_key: &'a ForeignKey,
    },
}

impl SchemaObject<'_> {
    /// The object's kind tag, driving dispatch.
    pub fn kind(&self) -> ObjectKind {
        match self {
            SchemaObject::Database(_) => ObjectKind::Database,
            SchemaObject::Table(t) => t.kind,
            SchemaObject::PrimaryKey { .. } => ObjectKind::PrimaryKey,
            SchemaObject::Index { .. } => ObjectKind::Index,
            SchemaObject::ForeignKey { .. } => ObjectKind::ForeignKey,
        }
    }
}

/// Generates create/drop scripts for one object kind.
pub trait ScriptGenerator: Send + Sync {
    fn object_kind(&self) -> ObjectKind;

    fn create_scripts(
        &self,
        object: &SchemaObject<'_>,
        ctx: &ScriptGeneratorContext,
    ) -> Result<Vec<String>>;

    fn drop_scripts(
        &self,
        object: &SchemaObject<'_>,
        ctx: &ScriptGeneratorContext,
    ) -> Result<Vec<String>>;
}

/// Computes identifier and qualified names for one object kind.
///
/// Names are stable: the same object and context always produce the same
/// name.
pub trait NamingStrategy: Send + Sync {
    fn object_kind(&self) -> ObjectKind;

    fn name(&self, object: &SchemaObject<'_>, ctx: &ScriptGeneratorContext, quoted: bool)
        -> String;

    fn qualified_name(
        &self,
        object: &SchemaObject<'_>,
        ctx: &ScriptGeneratorContext,
        quoted: bool,
    ) -> String;
}

type KindPredicate = fn(ObjectKind) -> bool;

/// Exact-kind map plus ordered predicate fallbacks with a resolution
/// cache.
struct DispatchMap<T: ?Sized> {
    exact: HashMap<ObjectKind, Arc<T>>,
    fallbacks: Vec<(KindPredicate, Arc<T>)>,
}

impl<T: ?Sized> DispatchMap<T> {
    fn new() -> Self {
        Self {
            exact: HashMap::new(),
            fallbacks: Vec::new(),
        }
    }

    fn insert(&mut self, kind: ObjectKind, service: Arc<T>) {
        self.exact.insert(kind, service);
    }

    fn insert_fallback(&mut self, predicate: KindPredicate, service: Arc<T>) {
        self.fallbacks.push((predicate, service));
    }

    fn resolve(&mut self, kind: ObjectKind) -> Option<Arc<T>> {
        if let Some(service) = self.exact.get(&kind) {
            return Some(service.clone());
        }
        for (predicate, service) in &self.fallbacks {
            if predicate(kind) {
                // Cache the resolution under the concrete kind.
                self.exact.insert(kind, service.clone());
                return Some(service.clone());
            }
        }
        None
    }
}

/// Dispatching context for DDL generation.
pub struct ScriptGeneratorContext {
    dialect: Arc<dyn Dialect>,
    catalog: Option<String>,
    schema: Option<String>,
    generators: Mutex<DispatchMap<dyn ScriptGenerator>>,
    namings: Mutex<DispatchMap<dyn NamingStrategy>>,
}

impl ScriptGeneratorContext {
    /// Context with the standard generators and naming strategies
    /// registered.
    pub fn new(dialect: Arc<dyn Dialect>) -> Self {
        let ctx = Self {
            dialect,
            catalog: None,
            schema: None,
            generators: Mutex::new(DispatchMap::new()),
            namings: Mutex::new(DispatchMap::new()),
        };

        ctx.add_script_generator(Arc::new(DatabaseGenerator));
        ctx.add_script_generator(Arc::new(TableGenerator));
        ctx.add_script_generator(Arc::new(PrimaryKeyGenerator));
        ctx.add_script_generator(Arc::new(IndexGenerator));
        ctx.add_script_generator(Arc::new(ForeignKeyGenerator));

        ctx.add_naming_strategy(Arc::new(IndexNamingStrategy));
        ctx.add_naming_strategy(Arc::new(ForeignKeyNamingStrategy));
        // Identifier naming answers every remaining kind.
        ctx.add_fallback_naming_strategy(|_| true, Arc::new(IdentifierNamingStrategy));

        ctx
    }

    /// Override the target catalog for qualified names.
    pub fn with_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }

    /// Override the target schema for qualified names.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn add_script_generator(&self, generator: Arc<dyn ScriptGenerator>) {
        self.generators
            .lock()
            .expect("generator map lock")
            .insert(generator.object_kind(), generator);
    }

    pub fn add_fallback_script_generator(
        &self,
        predicate: KindPredicate,
        generator: Arc<dyn ScriptGenerator>,
    ) {
        self.generators
            .lock()
            .expect("generator map lock")
            .insert_fallback(predicate, generator);
    }

    pub fn add_naming_strategy(&self, strategy: Arc<dyn NamingStrategy>) {
        self.namings
            .lock()
            .expect("naming map lock")
            .insert(strategy.object_kind(), strategy);
    }

    pub fn add_fallback_naming_strategy(
        &self,
        predicate: KindPredicate,
        strategy: Arc<dyn NamingStrategy>,
    ) {
        self.namings
            .lock()
            .expect("naming map lock")
            .insert_fallback(predicate, strategy);
    }

    /// Resolve the generator for an object.
    pub fn script_generator(&self, object: &SchemaObject<'_>) -> Result<Arc<dyn ScriptGenerator>> {
        let kind = object.kind();
        self.generators
            .lock()
            .expect("generator map lock")
            .resolve(kind)
            .ok_or_else(|| FerryError::GeneratorNotFound(kind.as_str().to_string()))
    }

    /// Resolve the naming strategy for an object.
    pub fn naming_strategy(&self, object: &SchemaObject<'_>) -> Result<Arc<dyn NamingStrategy>> {
        let kind = object.kind();
        self.namings
            .lock()
            .expect("naming map lock")
            .resolve(kind)
            .ok_or_else(|| FerryError::GeneratorNotFound(kind.as_str().to_string()))
    }

    /// Create scripts for an object, through its resolved generator.
    pub fn create_scripts(&self, object: &SchemaObject<'_>) -> Result<Vec<String>> {
        self.script_generator(object)?.create_scripts(object, self)
    }

    /// Drop scripts for an object, through its resolved generator.
    pub fn drop_scripts(&self, object: &SchemaObject<'_>) -> Result<Vec<String>> {
        self.script_generator(object)?.drop_scripts(object, self)
    }

    /// An object's (optionally quoted) name.
    pub fn name(&self, object: &SchemaObject<'_>, quoted: bool) -> Result<String> {
        Ok(self.naming_strategy(object)?.name(object, self, quoted))
    }

    /// An object's (optionally quoted) qualified name.
    pub fn qualified_name(&self, object: &SchemaObject<'_>, quoted: bool) -> Result<String> {
        Ok(self
            .naming_strategy(object)?
            .qualified_name(object, self, quoted))
    }

    /// Qualified table reference honoring the context's catalog/schema
    /// overrides.
    fn table_reference(&self, table: &Table, quoted: bool) -> String {
        let quote = |s: &str| {
            if quoted {
                self.dialect.quote(s)
            } else {
                s.to_string()
            }
        };
        let mut parts = Vec::with_capacity(3);
        if let Some(catalog) = self.catalog.as_deref().or(table.catalog.as_deref()) {
            parts.push(quote(catalog));
        }
        if let Some(schema) = self.schema.as_deref().or(table.schema.as_deref()) {
            parts.push(quote(schema));
        }
        parts.push(quote(&table.name));
        parts.join(".")
    }
}

impl std::fmt::Debug for ScriptGeneratorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptGeneratorContext")
            .field("dialect", &self.dialect.name())
            .field("catalog", &self.catalog)
            .field("schema", &self.schema)
            .finish()
    }
}

// ===== Script generators =====

/// Whole-database generator: emits every table's scripts in dependency
/// order (tables, primary keys, indexes, then foreign keys).
struct DatabaseGenerator;

impl ScriptGenerator for DatabaseGenerator {
    fn object_kind(&self) -> ObjectKind {
        ObjectKind::Database
    }

    fn create_scripts(
        &self,
        object: &SchemaObject<'_>,
        ctx: &ScriptGeneratorContext,
    ) -> Result<Vec<String>> {
        let SchemaObject::Database(database) = *object else {
            return Err(FerryError::GeneratorNotFound(object.kind().as_str().into()));
        };
        let tables: Vec<&Table> = database
            .list_tables()
            .iter()
            .filter(|t| t.kind == ObjectKind::Table)
            .collect();

        let mut scripts = Vec::new();
        for table in &tables {
            scripts.extend(ctx.create_scripts(&SchemaObject::Table(table))?);
        }
        for table in &tables {
            if let Some(ref pk) = table.primary_key {
                scripts.extend(ctx.create_scripts(&SchemaObject::PrimaryKey {
                    table,
                    primary_key: pk,
                })?);
            }
            for index in &table.indexes {
                scripts.extend(ctx.create_scripts(&SchemaObject::Index { table, index })?);
            }
        }
        for table in &tables {
            for fk in &table.foreign_keys {
                scripts.extend(ctx.create_scripts(&SchemaObject::ForeignKey {
                    table,
                    foreign_key: fk,
                })?);
            }
        }
        Ok(scripts)
    }

    fn drop_scripts(
        &self,
        object: &SchemaObject<'_>,
        ctx: &ScriptGeneratorContext,
    ) -> Result<Vec<String>> {
        let SchemaObject::Database(database) = *object else {
            return Err(FerryError::GeneratorNotFound(object.kind().as_str().into()));
        };
        // Reverse order so referencing tables go first.
        let mut scripts = Vec::new();
        for table in database
            .list_tables()
            .iter()
            .filter(|t| t.kind == ObjectKind::Table)
            .rev()
        {
            scripts.extend(ctx.drop_scripts(&SchemaObject::Table(table))?);
        }
        Ok(scripts)
    }
}

struct TableGenerator;

impl ScriptGenerator for TableGenerator {
    fn object_kind(&self) -> ObjectKind {
        ObjectKind::Table
    }

    fn create_scripts(
        &self,
        object: &SchemaObject<'_>,
        ctx: &ScriptGeneratorContext,
    ) -> Result<Vec<String>> {
        let SchemaObject::Table(table) = *object else {
            return Err(FerryError::GeneratorNotFound(object.kind().as_str().into()));
        };
        let mut definitions = Vec::with_capacity(table.columns.len());
        for column in &table.columns {
            let mut definition = format!(
                "{} {}",
                ctx.dialect().quote(&column.name),
                ctx.dialect().type_ddl(column)
            );
            if !column.nullable {
                definition.push_str(" NOT NULL");
            }
            definitions.push(definition);
        }
        Ok(vec![format!(
            "CREATE TABLE {} ({})",
            ctx.qualified_name(object, true)?,
            definitions.join(", ")
        )])
    }

    fn drop_scripts(
        &self,
        object: &SchemaObject<'_>,
        ctx: &ScriptGeneratorContext,
    ) -> Result<Vec<String>> {
        Ok(vec![format!(
            "DROP TABLE IF EXISTS {}",
            ctx.qualified_name(object, true)?
        )])
    }
}

struct PrimaryKeyGenerator;

impl ScriptGenerator for PrimaryKeyGenerator {
    fn object_kind(&self) -> ObjectKind {
        ObjectKind::PrimaryKey
    }

    fn create_scripts(
        &self,
        object: &SchemaObject<'_>,
        ctx: &ScriptGeneratorContext,
    ) -> Result<Vec<String>> {
        let SchemaObject::PrimaryKey { table, primary_key } = *object else {
            return Err(FerryError::GeneratorNotFound(object.kind().as_str().into()));
        };
        let columns = primary_key
            .columns
            .iter()
            .map(|c| ctx.dialect().quote(c))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(vec![format!(
            "ALTER TABLE {} ADD PRIMARY KEY ({})",
            ctx.table_reference(table, true),
            columns
        )])
    }

    fn drop_scripts(
        &self,
        object: &SchemaObject<'_>,
        ctx: &ScriptGeneratorContext,
    ) -> Result<Vec<String>> {
        let SchemaObject::PrimaryKey { table, .. } = *object else {
            return Err(FerryError::GeneratorNotFound(object.kind().as_str().into()));
        };
        Ok(vec![format!(
            "ALTER TABLE {} DROP PRIMARY KEY",
            ctx.table_reference(table, true)
        )])
    }
}

struct IndexGenerator;

impl ScriptGenerator for IndexGenerator {
    fn object_kind(&self) -> ObjectKind {
        ObjectKind::Index
    }

    fn create_scripts(
        &self,
        object: &SchemaObject<'_>,
        ctx: &ScriptGeneratorContext,
    ) -> Result<Vec<String>> {
        let SchemaObject::Index { table, index } = *object else {
            return Err(FerryError::GeneratorNotFound(object.kind().as_str().into()));
        };
        let columns = index
            .columns
            .iter()
            .map(|c| ctx.dialect().quote(c))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(vec![format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            ctx.name(object, true)?,
            ctx.table_reference(table, true),
            columns
        )])
    }

    fn drop_scripts(
        &self,
        object: &SchemaObject<'_>,
        ctx: &ScriptGeneratorContext,
    ) -> Result<Vec<String>> {
        Ok(vec![format!("DROP INDEX {}", ctx.name(object, true)?)])
    }
}

struct ForeignKeyGenerator;

impl ScriptGenerator for ForeignKeyGenerator {
    fn object_kind(&self) -> ObjectKind {
        ObjectKind::ForeignKey
    }

    fn create_scripts(
        &self,
        object: &SchemaObject<'_>,
        ctx: &ScriptGeneratorContext,
    ) -> Result<Vec<String>> {
        let SchemaObject::ForeignKey { table, foreign_key } = *object else {
            return Err(FerryError::GeneratorNotFound(object.kind().as_str().into()));
        };
        let columns = foreign_key
            .columns
            .iter()
            .map(|c| ctx.dialect().quote(c))
            .collect::<Vec<_>>()
            .join(", ");
        let ref_columns = foreign_key
            .ref_columns
            .iter()
            .map(|c| ctx.dialect().quote(c))
            .collect::<Vec<_>>()
            .join(", ");
        let ref_table = match foreign_key.ref_schema.as_deref().or(ctx.schema.as_deref()) {
            Some(schema) => format!(
                "{}.{}",
                ctx.dialect().quote(schema),
                ctx.dialect().quote(&foreign_key.ref_table)
            ),
            None => ctx.dialect().quote(&foreign_key.ref_table),
        };
        Ok(vec![format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            ctx.table_reference(table, true),
            ctx.name(object, true)?,
            columns,
            ref_table,
            ref_columns
        )])
    }

    fn drop_scripts(
        &self,
        object: &SchemaObject<'_>,
        ctx: &ScriptGeneratorContext,
    ) -> Result<Vec<String>> {
        let SchemaObject::ForeignKey { table, .. } = *object else {
            return Err(FerryError::GeneratorNotFound(object.kind().as_str().into()));
        };
        Ok(vec![format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            ctx.table_reference(table, true),
            ctx.name(object, true)?
        )])
    }
}

// ===== Naming strategies =====

/// Catch-all strategy: an object is named by its own identifier.
struct IdentifierNamingStrategy;

impl IdentifierNamingStrategy {
    fn raw_name(object: &SchemaObject<'_>) -> String {
        match object {
            SchemaObject::Database(db) => db.info().product_name.clone(),
            SchemaObject::Table(t) => t.name.clone(),
            SchemaObject::PrimaryKey { table, primary_key } => primary_key
                .name
                .clone()
                .unwrap_or_else(|| format!("pk_{}", table.name.to_lowercase())),
            SchemaObject::Index { table, index } => index
                .name
                .clone()
                .unwrap_or_else(|| generated_name("idx", table, &index.columns)),
            SchemaObject::ForeignKey { table, foreign_key } => foreign_key
                .name
                .clone()
                .unwrap_or_else(|| generated_name("fk", table, &foreign_key.columns)),
        }
    }
}

impl NamingStrategy for IdentifierNamingStrategy {
    fn object_kind(&self) -> ObjectKind {
        ObjectKind::Table
    }

    fn name(
        &self,
        object: &SchemaObject<'_>,
        ctx: &ScriptGeneratorContext,
        quoted: bool,
    ) -> String {
        let name = Self::raw_name(object);
        if quoted {
            ctx.dialect().quote(&name)
        } else {
            name
        }
    }

    fn qualified_name(
        &self,
        object: &SchemaObject<'_>,
        ctx: &ScriptGeneratorContext,
        quoted: bool,
    ) -> String {
        match object {
            SchemaObject::Table(table) => ctx.table_reference(table, quoted),
            _ => self.name(object, ctx, quoted),
        }
    }
}

/// Index names: the reported name, or `idx_<table>_<columns>`.
struct IndexNamingStrategy;

impl NamingStrategy for IndexNamingStrategy {
    fn object_kind(&self) -> ObjectKind {
        ObjectKind::Index
    }

    fn name(
        &self,
        object: &SchemaObject<'_>,
        ctx: &ScriptGeneratorContext,
        quoted: bool,
    ) -> String {
        let name = match object {
            SchemaObject::Index { table, index } => index
                .name
                .clone()
                .unwrap_or_else(|| generated_name("idx", table, &index.columns)),
            other => IdentifierNamingStrategy::raw_name(other),
        };
        if quoted {
            ctx.dialect().quote(&name)
        } else {
            name
        }
    }

    fn qualified_name(
        &self,
        object: &SchemaObject<'_>,
        ctx: &ScriptGeneratorContext,
        quoted: bool,
    ) -> String {
        self.name(object, ctx, quoted)
    }
}

/// Foreign key names: the reported name, or `fk_<table>_<columns>`.
struct ForeignKeyNamingStrategy;

impl NamingStrategy for ForeignKeyNamingStrategy {
    fn object_kind(&self) -> ObjectKind {
        ObjectKind::ForeignKey
    }

    fn name(
        &self,
        object: &SchemaObject<'_>,
        ctx: &ScriptGeneratorContext,
        quoted: bool,
    ) -> String {
        let name = match object {
            SchemaObject::ForeignKey { table, foreign_key } => foreign_key
                .name
                .clone()
                .unwrap_or_else(|| generated_name("fk", table, &foreign_key.columns)),
            other => IdentifierNamingStrategy::raw_name(other),
        };
        if quoted {
            ctx.dialect().quote(&name)
        } else {
            name
        }
    }

    fn qualified_name(
        &self,
        object: &SchemaObject<'_>,
        ctx: &ScriptGeneratorContext,
        quoted: bool,
    ) -> String {
        self.name(object, ctx, quoted)
    }
}

fn generated_name(prefix: &str, table: &Table, columns: &[String]) -> String {
    let mut name = format!("{}_{}", prefix, table.name.to_lowercase());
    for column in columns {
        name.push('_');
        name.push_str(&column.to_lowercase());
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MysqlDialect, NuodbDialect};
    use crate::resolve::DatabaseInfo;
    use crate::schema::Column;
    use crate::types::SqlTypeCode;

    fn users_table() -> Table {
        let mut table = Table::new("users")
            .with_column(Column::new("id", SqlTypeCode::BigInt).not_null())
            .with_column(Column::new("name", SqlTypeCode::Varchar).with_size(64));
        table.primary_key = Some(PrimaryKey {
            name: None,
            columns: vec!["id".into()],
        });
        table.indexes.push(Index {
            name: None,
            columns: vec!["name".into()],
            unique: false,
        });
        table
    }

    fn context() -> ScriptGeneratorContext {
        ScriptGeneratorContext::new(Arc::new(NuodbDialect::new())).with_schema("app")
    }

    #[test]
    fn test_table_create_script() {
        let table = users_table();
        let scripts = context()
            .create_scripts(&SchemaObject::Table(&table))
            .unwrap();
        assert_eq!(
            scripts,
            vec![
                "CREATE TABLE \"app\".\"users\" (\"id\" BIGINT NOT NULL, \"name\" VARCHAR(64))"
                    .to_string()
            ]
        );
    }

    #[test]
    fn test_table_drop_script() {
        let table = users_table();
        let scripts = context().drop_scripts(&SchemaObject::Table(&table)).unwrap();
        assert_eq!(scripts, vec!["DROP TABLE IF EXISTS \"app\".\"users\"".to_string()]);
    }

    #[test]
    fn test_index_naming_deterministic() {
        let table = users_table();
        let ctx = context();
        let object = SchemaObject::Index {
            table: &table,
            index: &table.indexes[0],
        };
        assert_eq!(ctx.name(&object, false).unwrap(), "idx_users_name");
        assert_eq!(ctx.name(&object, false).unwrap(), "idx_users_name");
    }

    #[test]
    fn test_database_scripts_ordered() {
        let mut orders = Table::new("orders")
            .with_column(Column::new("id", SqlTypeCode::BigInt).not_null())
            .with_column(Column::new("user_id", SqlTypeCode::BigInt));
        orders.foreign_keys.push(ForeignKey {
            name: None,
            columns: vec!["user_id".into()],
            ref_table: "users".into(),
            ref_schema: None,
            ref_columns: vec!["id".into()],
        });
        let database = Database::new(
            DatabaseInfo::new("NuoDB"),
            vec![users_table(), orders],
        );

        let scripts = context()
            .create_scripts(&SchemaObject::Database(&database))
            .unwrap();
        // Tables first, constraints after, foreign keys last.
        assert!(scripts[0].starts_with("CREATE TABLE"));
        assert!(scripts[1].starts_with("CREATE TABLE"));
        assert!(scripts.last().unwrap().contains("FOREIGN KEY"));
    }

    #[test]
    fn test_fallback_resolution_cached() {
        let table = users_table();
        let ctx = ScriptGeneratorContext::new(Arc::new(MysqlDialect::new()));
        let pk = PrimaryKey {
            name: Some("pk_users".into()),
            columns: vec!["id".into()],
        };
        let object = SchemaObject::PrimaryKey {
            table: &table,
            primary_key: &pk,
        };
        // PrimaryKey has no exact naming strategy; the identifier
        // fallback answers and gets cached.
        assert_eq!(ctx.name(&object, false).unwrap(), "pk_users");
        assert_eq!(ctx.name(&object, false).unwrap(), "pk_users");
    }

    #[test]
    fn test_view_has_no_generator() {
        let view = Table {
            kind: ObjectKind::View,
            ..Table::new("user_view")
        };
        let err = context()
            .create_scripts(&SchemaObject::Table(&view))
            .unwrap_err();
        assert!(matches!(err, FerryError::GeneratorNotFound(_)));
    }
}
