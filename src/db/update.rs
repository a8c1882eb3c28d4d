//! Keyed UPDATE of existing rows

use super::{quote_ident, to_sql_value, Database, TableInfo, WriteOutcome};
use crate::error::{IngotError, Result};
use crate::progress::{CancelFlag, RunTracker};
use crate::resolve::{Row, ValueResolver};
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a record produced no update
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowSkip {
    #[error("key column '{0}' has no value")]
    MissingKey(String),

    #[error("none of the update columns has a value")]
    NothingToSet,

    #[error("no row matches the key")]
    NoMatch,
}

/// Validated target of an update run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlan {
    table: String,
    key_column: String,
    update_columns: Vec<String>,
}

impl UpdatePlan {
    /// Check that the key and every update column exist in the table
    pub fn new(
        table_name: &str,
        table: &TableInfo,
        key_column: &str,
        update_columns: &[String],
    ) -> Result<Self> {
        for column in std::iter::once(key_column).chain(update_columns.iter().map(String::as_str)) {
            if !table.has_column(column) {
                return Err(IngotError::ColumnNotFound {
                    table: table_name.to_string(),
                    column: column.to_string(),
                });
            }
        }

        Ok(UpdatePlan {
            table: table_name.to_string(),
            key_column: key_column.to_string(),
            update_columns: update_columns.to_vec(),
        })
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn update_columns(&self) -> &[String] {
        &self.update_columns
    }

    /// Build the UPDATE for one row. Only update columns holding a non-null
    /// value are set; the key is bound last.
    pub fn statement(&self, row: &Row) -> std::result::Result<(String, Vec<SqlValue>), RowSkip> {
        let key = match row.get(&self.key_column) {
            Some(value) if !value.is_null() => value,
            _ => return Err(RowSkip::MissingKey(self.key_column.clone())),
        };

        let set: Vec<(&String, &Value)> = self
            .update_columns
            .iter()
            .filter_map(|c| row.get(c).filter(|v| !v.is_null()).map(|v| (c, v)))
            .collect();
        if set.is_empty() {
            return Err(RowSkip::NothingToSet);
        }

        let assignments: Vec<String> = set
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{} = ?{}", quote_ident(column), i + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            quote_ident(&self.table),
            assignments.join(", "),
            quote_ident(&self.key_column),
            set.len() + 1
        );

        let mut params: Vec<SqlValue> = set.iter().map(|(_, v)| to_sql_value(v)).collect();
        params.push(to_sql_value(key));
        Ok((sql, params))
    }
}

/// Applies keyed updates for every record of a run inside one transaction
pub struct KeyedUpdater<'a> {
    db: &'a mut Database,
    plan: &'a UpdatePlan,
}

impl<'a> KeyedUpdater<'a> {
    pub fn new(db: &'a mut Database, plan: &'a UpdatePlan) -> Self {
        KeyedUpdater { db, plan }
    }

    /// Update one existing row per record. Records with no key, nothing to
    /// set or no matching row are counted as failed.
    pub(crate) fn update(
        self,
        records: &[Value],
        resolver: &ValueResolver,
        tracker: &mut RunTracker<'_>,
        cancel: &CancelFlag,
    ) -> Result<WriteOutcome> {
        let tx = self.db.conn_mut().transaction()?;
        let mut cancelled = false;

        for (index, record) in records.iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let row = resolver.resolve(record, index);
            let (sql, params) = match self.plan.statement(&row) {
                Ok(statement) => statement,
                Err(skip) => {
                    warn!(table = %self.plan.table, index, reason = %skip, "row skipped");
                    tracker.record(false);
                    continue;
                }
            };

            debug!(sql = %sql, index, "executing update");
            let changed = tx
                .prepare_cached(&sql)
                .and_then(|mut stmt| stmt.execute(params_from_iter(params)));
            match changed {
                Ok(0) => {
                    warn!(table = %self.plan.table, index, reason = %RowSkip::NoMatch, "row skipped");
                    tracker.record(false);
                }
                Ok(_) => tracker.record(true),
                Err(e) => {
                    warn!(table = %self.plan.table, index, error = %e, "row update failed");
                    tracker.record(false);
                    if tx.is_autocommit() {
                        return Err(IngotError::TransactionAborted { index });
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
