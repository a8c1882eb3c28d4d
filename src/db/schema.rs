//! Table introspection: column definitions and UNIQUE indexes

use super::{quote_literal, Database};
use crate::error::{IngotError, Result};
use rusqlite::types::ValueRef;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// One column as declared in the live schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub not_null: bool,
    pub primary_key: bool,
    pub default_value: Option<String>,
}

impl ColumnInfo {
    /// `INTEGER PRIMARY KEY` columns alias the rowid and are assigned by
    /// SQLite when left out of an INSERT
    pub fn is_rowid_alias(&self) -> bool {
        self.primary_key && self.data_type.eq_ignore_ascii_case("INTEGER")
    }

    /// NOT NULL without a declared default, so an INSERT must supply it
    pub fn requires_value(&self) -> bool {
        self.not_null && self.default_value.is_none() && !self.is_rowid_alias()
    }
}

/// Columns of a table plus the member columns of each UNIQUE index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub columns: Vec<ColumnInfo>,
    pub unique_constraints: Vec<Vec<String>>,
}

impl TableInfo {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Columns that take part in at least one UNIQUE index, deduplicated
    /// and in table order
    pub fn unique_columns(&self) -> Vec<&ColumnInfo> {
        let members: HashSet<&str> = self
            .unique_constraints
            .iter()
            .flatten()
            .map(String::as_str)
            .collect();
        self.columns
            .iter()
            .filter(|c| members.contains(c.name.as_str()))
            .collect()
    }

    /// NOT NULL columns inside a UNIQUE index; these are backfilled with
    /// synthetic values when nothing else resolves them
    pub fn backfill_columns(&self) -> Vec<&ColumnInfo> {
        self.unique_columns()
            .into_iter()
            .filter(|c| c.not_null)
            .collect()
    }
}

fn default_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    }
}

impl Database {
    /// Names of user tables, sorted
    pub fn tables(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn().prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Read the live definition of `table`
    pub fn table_info(&self, table: &str) -> Result<TableInfo> {
        let columns = self.columns(table)?;
        if columns.is_empty() {
            return Err(IngotError::TableNotFound(table.to_string()));
        }

        let unique_constraints = self.unique_constraints(table)?;
        debug!(
            table,
            columns = columns.len(),
            unique_indexes = unique_constraints.len(),
            "introspected table"
        );

        Ok(TableInfo {
            columns,
            unique_constraints,
        })
    }

    fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        // cid, name, type, notnull, dflt_value, pk
        let sql = format!(
            "SELECT * FROM pragma_table_info({}) ORDER BY cid",
            quote_literal(table)
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnInfo {
                    name: row.get(1)?,
                    data_type: row.get(2)?,
                    not_null: row.get::<_, i64>(3)? != 0,
                    default_value: default_text(row.get_ref(4)?),
                    primary_key: row.get::<_, i64>(5)? > 0,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    fn unique_constraints(&self, table: &str) -> Result<Vec<Vec<String>>> {
        // seq, name, unique, origin, partial
        let sql = format!(
            "SELECT name FROM pragma_index_list({}) WHERE \"unique\" = 1 ORDER BY seq",
            quote_literal(table)
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let indexes = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut constraints = Vec::new();
        for index in indexes {
            // seqno, cid, name; name is NULL for expression members
            let sql = format!(
                "SELECT name FROM pragma_index_info({}) ORDER BY seqno",
                quote_literal(&index)
            );
            let mut stmt = self.conn().prepare(&sql)?;
            let members: Vec<String> = stmt
                .query_map([], |row| row.get::<_, Option<String>>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?
                .into_iter()
                .flatten()
                .collect();

            if !members.is_empty() {
                constraints.push(members);
            }
        }

        Ok(constraints)
    }
}
