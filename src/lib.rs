//! # Ingot - JSON to SQLite import engine
//!
//! Imports records from a JSON document into an existing SQLite table, or
//! updates rows of that table from the document.
//!
//! ## Modules
//!
//! - **analyze**: Discover every path of a document with its type and a sample
//! - **path**: Path expressions (`data.users[].name`) and record extraction
//! - **resolve**: Turn a record into column values (mapping, defaults,
//!   forced values, templates, synthetic backfill)
//! - **db**: Table introspection, transactional inserts, keyed updates
//! - **pipeline**: Whole runs with progress reporting and cancellation
//!
//! ## Quick Start
//!
//! ### Extracting records
//!
//! ```rust
//! use ingot::path::{extract_records, Window};
//! use serde_json::json;
//!
//! # fn main() -> ingot::Result<()> {
//! let doc = json!({
//!     "data": {
//!         "users": [
//!             {"name": "Alice", "tags": ["a"]},
//!             {"name": "Bob", "tags": ["b", "c"]}
//!         ]
//!     }
//! });
//!
//! let users = extract_records(&doc, "data.users[]", Window::default())?;
//! assert_eq!(users.len(), 2);
//!
//! // One record per tag across all users
//! let tags = extract_records(&doc, "data.users[].tags[]", Window::default())?;
//! assert_eq!(tags, vec![json!("a"), json!("b"), json!("c")]);
//! # Ok(())
//! # }
//! ```
//!
//! ### Analyzing structure
//!
//! ```rust
//! use ingot::analyze::StructureAnalyzer;
//! use serde_json::json;
//!
//! let doc = json!({"users": [{"name": "Alice", "age": 30}]});
//! let paths: Vec<String> = StructureAnalyzer::default()
//!     .analyze(&doc)
//!     .into_iter()
//!     .map(|p| p.path)
//!     .collect();
//!
//! assert_eq!(paths, vec!["users[]", "users[].name", "users[].age"]);
//! ```

pub mod analyze;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod lock;
pub mod logging;
pub mod path;
pub mod pipeline;
pub mod progress;
pub mod resolve;

// Re-export commonly used types for convenience
pub use analyze::{spawn_structure_analysis, AnalysisEvent, JsonPathInfo, JsonType, StructureAnalyzer};
pub use config::{ImportConfig, UpdateConfig};
pub use db::{ColumnInfo, Database, TableInfo};
pub use error::{IngotError, Result};
pub use path::{PathExpression, RecordExtractor, Window};
pub use pipeline::{run_import, run_update, spawn_import, spawn_update, RunHandle, RunSummary};
pub use progress::{progress_channel, CancelFlag, RunProgress, RunStatus};
pub use resolve::{Mapping, ValueResolver, ValueRules};

use crossbeam_channel::Sender;
use serde_json::Value;
use std::path::Path;

/// Every path of the document at `json_path`, depth-first in document order
pub fn analyze_structure(json_path: impl AsRef<Path>) -> Result<Vec<JsonPathInfo>> {
    let document = document::load_document(json_path)?;
    Ok(StructureAnalyzer::default().analyze(&document))
}

/// Like [`analyze_structure`] but streams each path to `events` as it is
/// found, followed by a single `Complete` event. A load failure is sent as
/// `Failed` and returned.
pub fn analyze_structure_progressive(
    json_path: impl AsRef<Path>,
    events: &Sender<AnalysisEvent>,
) -> Result<usize> {
    match document::load_document(json_path) {
        Ok(document) => Ok(StructureAnalyzer::default().analyze_progressive(&document, events)),
        Err(e) => {
            events
                .send(AnalysisEvent::Failed {
                    message: e.to_string(),
                })
                .ok();
            Err(e)
        }
    }
}

/// The first `limit` records under `json_root` (all of them when `None`)
pub fn get_sample(
    json_path: impl AsRef<Path>,
    json_root: &str,
    limit: Option<usize>,
) -> Result<Vec<Value>> {
    let document = document::load_document(json_path)?;
    let extractor = RecordExtractor::new(PathExpression::parse(json_root)?);
    let mut records = extractor.extract(&document)?;
    if let Some(limit) = limit {
        records.truncate(limit);
    }
    Ok(records.into_iter().cloned().collect())
}

/// User tables of the database at `db_path`, sorted by name
pub fn get_tables(db_path: impl AsRef<Path>) -> Result<Vec<String>> {
    Database::open_read_only(db_path)?.tables()
}

/// Columns and UNIQUE indexes of `table_name`
pub fn analyze_table(db_path: impl AsRef<Path>, table_name: &str) -> Result<TableInfo> {
    Database::open_read_only(db_path)?.table_info(table_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn write_json(dir: &tempfile::TempDir, value: &Value) -> PathBuf {
        let path = dir.path().join("doc.json");
        std::fs::write(&path, value.to_string()).unwrap();
        path
    }

    #[test]
    fn test_analyze_structure_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_json(&dir, &json!([{"id": 1, "tags": ["x"]}]));

        let paths: Vec<String> = analyze_structure(&path)
            .unwrap()
            .into_iter()
            .map(|p| p.path)
            .collect();
        assert_eq!(paths, vec!["id", "tags[]"]);
    }

    #[test]
    fn test_progressive_analysis_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();

        let result = analyze_structure_progressive(dir.path().join("nope.json"), &tx);
        drop(tx);

        assert!(matches!(result, Err(IngotError::Io { .. })));
        let events: Vec<AnalysisEvent> = rx.iter().collect();
        assert!(matches!(events.as_slice(), [AnalysisEvent::Failed { .. }]));
    }

    #[test]
    fn test_get_sample_limits() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_json(&dir, &json!({"items": [1, 2, 3, 4]}));

        assert_eq!(get_sample(&path, "items[]", Some(2)).unwrap(), vec![json!(1), json!(2)]);
        assert_eq!(get_sample(&path, "items[]", None).unwrap().len(), 4);
        assert!(get_sample(&path, "items[]", Some(0)).unwrap().is_empty());
        assert!(matches!(
            get_sample(&path, "things[]", None),
            Err(IngotError::MissingProperty { .. })
        ));
    }

    #[test]
    fn test_tables_and_table_info() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("t.db");
        rusqlite::Connection::open(&db)
            .unwrap()
            .execute_batch(
                "CREATE TABLE b (x TEXT NOT NULL UNIQUE);
                 CREATE TABLE a (id INTEGER PRIMARY KEY);",
            )
            .unwrap();

        assert_eq!(get_tables(&db).unwrap(), vec!["a", "b"]);

        let info = analyze_table(&db, "b").unwrap();
        assert_eq!(info.columns[0].name, "x");
        assert_eq!(info.unique_constraints, vec![vec!["x".to_string()]]);

        assert!(matches!(
            analyze_table(&db, "c"),
            Err(IngotError::TableNotFound(_))
        ));
        assert!(matches!(
            get_tables(dir.path().join("missing.db")),
            Err(IngotError::Io { .. })
        ));
    }
}
