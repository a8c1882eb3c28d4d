//! Transactional INSERT of resolved rows

use super::{quote_ident, to_sql_value, Database, TableInfo, WriteOutcome};
use crate::error::{IngotError, Result};
use crate::progress::{CancelFlag, RunTracker};
use crate::resolve::{Row, ValueResolver};
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Columns written by an import, in table order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPlan {
    table: String,
    columns: Vec<String>,
    dropped: Vec<String>,
}

impl ColumnPlan {
    /// Intersect the requested columns with the table and check that every
    /// column needing a value is covered.
    ///
    /// `requested` must already include the backfilled NOT NULL + UNIQUE
    /// columns (see [`ValueResolver::columns`]).
    pub fn new(table_name: &str, table: &TableInfo, requested: &[&str]) -> Result<Self> {
        let wanted: HashSet<&str> = requested.iter().copied().collect();

        let dropped: Vec<String> = requested
            .iter()
            .filter(|c| !table.has_column(c))
            .map(|c| c.to_string())
            .collect();
        for column in &dropped {
            warn!(table = table_name, column = %column, "column does not exist in table; dropping it");
        }

        let missing: Vec<String> = table
            .columns
            .iter()
            .filter(|c| c.requires_value() && !wanted.contains(c.name.as_str()))
            .map(|c| c.name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(IngotError::MissingRequiredColumns(missing));
        }

        let columns = table
            .columns
            .iter()
            .filter(|c| wanted.contains(c.name.as_str()))
            .map(|c| c.name.clone())
            .collect();

        Ok(ColumnPlan {
            table: table_name.to_string(),
            columns,
            dropped,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Requested columns the table does not have
    pub fn dropped(&self) -> &[String] {
        &self.dropped
    }

    pub fn insert_sql(&self) -> String {
        let table = quote_ident(&self.table);
        if self.columns.is_empty() {
            return format!("INSERT INTO {} DEFAULT VALUES", table);
        }

        let columns: Vec<String> = self.columns.iter().map(|c| quote_ident(c)).collect();
        let placeholders: Vec<String> = (1..=self.columns.len()).map(|i| format!("?{}", i)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders.join(", ")
        )
    }

    /// Parameters for one row in column order; absent columns bind NULL
    pub fn bind(&self, row: &Row) -> Vec<SqlValue> {
        self.columns
            .iter()
            .map(|c| row.get(c).map_or(SqlValue::Null, to_sql_value))
            .collect()
    }
}

/// Inserts every record of a run inside a single transaction
pub struct TransactionalWriter<'a> {
    db: &'a mut Database,
    plan: &'a ColumnPlan,
}

impl<'a> TransactionalWriter<'a> {
    pub fn new(db: &'a mut Database, plan: &'a ColumnPlan) -> Self {
        TransactionalWriter { db, plan }
    }

    /// Insert `records` in order. Rows the database rejects are counted as
    /// failed and skipped; the rest are committed together. Cancellation
    /// rolls everything back.
    pub(crate) fn write(
        self,
        records: &[Value],
        resolver: &ValueResolver,
        tracker: &mut RunTracker<'_>,
        cancel: &CancelFlag,
    ) -> Result<WriteOutcome> {
        let sql = self.plan.insert_sql();
        debug!(sql = %sql, "prepared insert");

        let tx = self.db.conn_mut().transaction()?;
        let mut cancelled = false;
        {
            let mut stmt = tx.prepare(&sql)?;
            for (index, record) in records.iter().enumerate() {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }

                let row = resolver.resolve(record, index);
                match stmt.execute(params_from_iter(self.plan.bind(&row))) {
                    Ok(_) => tracker.record(true),
                    Err(e) => {
                        warn!(table = self.plan.table(), index, error = %e, "row insert failed");
                        tracker.record(false);
                        if tx.is_autocommit() {
                            return Err(IngotError::TransactionAborted { index });
                        }
                    }
                }
            }
        }

        if cancelled {
            tx.rollback()?;
            return Ok(WriteOutcome::Cancelled);
        }
        tx.commit()?;
        Ok(WriteOutcome::Committed)
    }
}
