//! Query model: SQL text construction without execution.
//!
//! [`SelectQuery`] renders dialect-qualified SQL from a table, an optional
//! column subset and optional filter fragments; [`NativeQuery`] wraps a raw
//! query string unchanged. Neither executes anything, so the whole model
//! unit-tests without a live engine. Rendering is deterministic: the same
//! inputs always produce the same SQL string.

use std::sync::Arc;

use crate::dialect::Dialect;
use crate::error::{FerryError, Result};
use crate::schema::Table;

/// A built SELECT over one table.
///
/// Immutable once built. Filters are inserted verbatim and ANDed together;
/// the caller is responsible for their SQL-safety.
pub struct SelectQuery {
    dialect: Arc<dyn Dialect>,
    table: Table,
    columns: Vec<String>,
    filters: Vec<String>,
    qualify: bool,
}

impl SelectQuery {
    /// The table this query selects from.
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Render the SQL text.
    pub fn to_query(&self) -> String {
        let column_list = if self.columns.is_empty() {
            let names = self.table.column_names();
            if names.is_empty() {
                "*".to_string()
            } else {
                names
                    .iter()
                    .map(|c| self.dialect.quote(c))
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        } else {
            self.columns
                .iter()
                .map(|c| self.dialect.quote(c))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut sql = format!(
            "SELECT {} FROM {}",
            column_list,
            self.table.qualified_name(self.dialect.as_ref(), self.qualify)
        );

        if !self.filters.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(
                &self
                    .filters
                    .iter()
                    .map(|f| format!("({})", f))
                    .collect::<Vec<_>>()
                    .join(" AND "),
            );
        }

        sql
    }
}

impl std::fmt::Debug for SelectQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectQuery")
            .field("sql", &self.to_query())
            .finish()
    }
}

/// A raw query string used for ad hoc exports, carried unchanged.
#[derive(Debug, Clone)]
pub struct NativeQuery {
    text: String,
}

impl NativeQuery {
    pub fn to_query(&self) -> String {
        self.text.clone()
    }
}

/// Either query flavor.
#[derive(Debug)]
pub enum Query {
    Select(SelectQuery),
    Native(NativeQuery),
}

impl Query {
    /// Render the SQL text.
    pub fn to_query(&self) -> String {
        match self {
            Query::Select(q) => q.to_query(),
            Query::Native(q) => q.to_query(),
        }
    }

    /// The table driving this query, for select queries.
    pub fn table(&self) -> Option<&Table> {
        match self {
            Query::Select(q) => Some(q.table()),
            Query::Native(_) => None,
        }
    }
}

/// Builder for [`SelectQuery`].
#[derive(Default)]
pub struct SelectQueryBuilder {
    dialect: Option<Arc<dyn Dialect>>,
    table: Option<Table>,
    columns: Vec<String>,
    filters: Vec<String>,
    qualify: bool,
}

impl SelectQueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the dialect used for identifier quoting.
    pub fn dialect(mut self, dialect: Arc<dyn Dialect>) -> Self {
        self.dialect = Some(dialect);
        self
    }

    /// Set the table to select from.
    pub fn table(mut self, table: Table) -> Self {
        self.table = Some(table);
        self
    }

    /// Restrict the select list to an explicit column subset.
    /// Defaults to all of the table's columns.
    pub fn columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    /// Append a filter fragment (ANDed, inserted verbatim).
    pub fn add_filter(mut self, filter: impl Into<String>) -> Self {
        self.filters.push(filter.into());
        self
    }

    /// Emit catalog/schema-qualified table references.
    pub fn qualify_names(mut self, qualify: bool) -> Self {
        self.qualify = qualify;
        self
    }

    pub fn build(self) -> Result<SelectQuery> {
        let dialect = self
            .dialect
            .ok_or_else(|| FerryError::Config("select query builder requires a dialect".into()))?;
        let table = self
            .table
            .ok_or_else(|| FerryError::Config("select query builder requires a table".into()))?;
        Ok(SelectQuery {
            dialect,
            table,
            columns: self.columns,
            filters: self.filters,
            qualify: self.qualify,
        })
    }
}

/// Builder for [`NativeQuery`].
#[derive(Debug, Default)]
pub struct NativeQueryBuilder {
    text: Option<String>,
}

impl NativeQueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the raw query text.
    pub fn query(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn build(self) -> Result<NativeQuery> {
        let text = self
            .text
            .ok_or_else(|| FerryError::Config("native query builder requires query text".into()))?;
        Ok(NativeQuery { text })
    }
}

/// One split of a query: the SQL to run and the split's index.
#[derive(Debug, Clone)]
pub struct QuerySplit {
    pub split_index: usize,
    pub sql: String,
}

/// Split a query into row windows for parallel workers.
///
/// Select queries over tables with a known approximate row count split
/// into up to `workers` windows via the dialect's limit clause; native
/// queries and tables of unknown size run as a single split. Windows are
/// computed from the count at INSPECT time; rows appended afterwards are
/// outside the dump's best-effort contract.
pub fn split_query(
    query: &Query,
    dialect: &dyn Dialect,
    workers: usize,
    row_count: Option<u64>,
) -> Vec<QuerySplit> {
    let sql = query.to_query();
    let splittable = matches!(query, Query::Select(_)) && workers > 1;
    let Some(rows) = row_count.filter(|r| *r > 0 && splittable) else {
        return vec![QuerySplit {
            split_index: 0,
            sql,
        }];
    };

    let splits = (workers as u64).min(rows);
    let window = rows.div_ceil(splits);
    (0..splits)
        .map_while(|i| {
            let offset = i * window;
            // A rounded-up window can cover the tail early; stop rather
            // than emit empty windows.
            if offset >= rows {
                return None;
            }
            Some(QuerySplit {
                split_index: i as usize,
                sql: format!("{} {}", sql, dialect.limit_clause(offset, window.min(rows - offset))),
            })
        })
        .collect()
}
