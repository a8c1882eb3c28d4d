//! SQLite access: introspection, inserts and keyed updates

pub mod insert;
pub mod schema;
pub mod update;

pub use insert::{ColumnPlan, TransactionalWriter};
pub use schema::{ColumnInfo, TableInfo};
pub use update::{KeyedUpdater, RowSkip, UpdatePlan};

use crate::error::{IngotError, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use std::path::Path;

/// How a write transaction ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Committed,
    Cancelled,
}

/// Connection wrapper for the target database
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open an existing database for writing. The file is never created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
    }

    /// Open an existing database without write access (analysis, dry runs)
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
    }

    /// Open in-memory database (for testing)
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    fn open_with(path: &Path, flags: OpenFlags) -> Result<Self> {
        if !path.exists() {
            return Err(IngotError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "database file does not exist"),
            ));
        }
        let conn = Connection::open_with_flags(path, flags)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

/// Quote an identifier (table or column name) for interpolation into SQL
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal for interpolation into SQL
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Convert a resolved JSON value into a SQLite cell.
///
/// Booleans become 0/1; objects and arrays are stored as their JSON text.
pub fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quoting() {
        assert_eq!(quote_ident("order"), "\"order\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_literal("it's"), "'it''s'");
    }

    #[test]
    fn test_sql_values() {
        assert_eq!(to_sql_value(&json!(null)), SqlValue::Null);
        assert_eq!(to_sql_value(&json!(true)), SqlValue::Integer(1));
        assert_eq!(to_sql_value(&json!(42)), SqlValue::Integer(42));
        assert_eq!(to_sql_value(&json!(1.5)), SqlValue::Real(1.5));
        assert_eq!(to_sql_value(&json!("x")), SqlValue::Text("x".to_string()));
        assert_eq!(
            to_sql_value(&json!({"a": [1, 2]})),
            SqlValue::Text("{\"a\":[1,2]}".to_string())
        );
    }

    #[test]
    fn test_open_never_creates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.db");

        assert!(matches!(Database::open(&path), Err(IngotError::Io { .. })));
        assert!(!path.exists());
    }
}
