use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort an analysis, extraction, import or update before any
/// row is written.
///
/// Per-row failures never surface here; they are counted in
/// [`RunProgress::failed`](crate::progress::RunProgress::failed).
#[derive(Error, Debug)]
pub enum IngotError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse JSON document {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid path expression '{0}'")]
    InvalidPath(String),

    #[error("property '{segment}' does not exist at '{at}'")]
    MissingProperty { segment: String, at: String },

    #[error("property '{segment}' at '{at}' is not an array")]
    NotAnArray { segment: String, at: String },

    #[error("the document root is neither an object nor an array")]
    InvalidRoot,

    #[error("table '{0}' not found")]
    TableNotFound(String),

    #[error("column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    #[error("NOT NULL columns without a default are not covered by the mapping or rules: {}", .0.join(", "))]
    MissingRequiredColumns(Vec<String>),

    #[error("key column '{0}' is not mapped from the JSON records")]
    KeyColumnNotMapped(String),

    #[error("an update run needs at least one column to update")]
    NoUpdateColumns,

    #[error("invalid template for column '{column}': {reason}")]
    InvalidTemplate { column: String, reason: String },

    #[error("the transaction was aborted by the database while processing row {index}")]
    TransactionAborted { index: usize },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl IngotError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IngotError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, IngotError>;
