//! End-to-end import and update runs
//!
//! A run loads the document, extracts and windows the records, claims the
//! database, reads the live table definition, validates the column set and
//! then writes every row inside one transaction. Anything that fails before
//! the first row is fatal and ends the run in `Aborted`; row failures are
//! only counted.

use crate::config::{ImportConfig, UpdateConfig};
use crate::db::{ColumnPlan, Database, KeyedUpdater, TransactionalWriter, UpdatePlan, WriteOutcome};
use crate::document::load_document;
use crate::error::Result;
use crate::lock::RunGuard;
use crate::path::{extract_records, Window};
use crate::progress::{CancelFlag, RunProgress, RunTracker};
use crate::resolve::ValueResolver;
use chrono::Utc;
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::thread::{self, JoinHandle};
use tracing::info;

/// Final state of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub progress: RunProgress,
    /// Columns written (import) or updatable (update), in table order
    pub columns: Vec<String>,
    /// Requested columns the table does not have
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped_columns: Vec<String>,
    pub dry_run: bool,
}

/// Handle to a run executing on a background thread
#[derive(Debug)]
pub struct RunHandle {
    join: JoinHandle<Result<RunSummary>>,
    cancel: CancelFlag,
}

impl RunHandle {
    /// Ask the run to stop before its next row; nothing it wrote is kept
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the run to end. A panic on the run thread is propagated.
    pub fn join(self) -> Result<RunSummary> {
        match self.join.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Import every record of `config.json_path` into `config.table_name`
///
/// Runs on the calling thread and sends progress snapshots to `events` as it
/// goes. With a bounded channel such as [`progress_channel`](crate::progress_channel)
/// the receiver must be drained on another thread while this runs, or the run
/// blocks once the channel is full while still holding the database. Callers
/// that want to read progress on their own thread should use [`spawn_import`].
pub fn run_import(config: &ImportConfig, events: &Sender<RunProgress>) -> Result<RunSummary> {
    run_import_with(config, events, &CancelFlag::new())
}

/// Update existing rows of `config.table_name` located by `config.key_column`
///
/// Progress is delivered the same way as for [`run_import`]: drain `events`
/// concurrently, or use [`spawn_update`].
pub fn run_update(config: &UpdateConfig, events: &Sender<RunProgress>) -> Result<RunSummary> {
    run_update_with(config, events, &CancelFlag::new())
}

pub fn spawn_import(config: ImportConfig, events: Sender<RunProgress>) -> RunHandle {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    let join = thread::spawn(move || run_import_with(&config, &events, &flag));
    RunHandle { join, cancel }
}

pub fn spawn_update(config: UpdateConfig, events: Sender<RunProgress>) -> RunHandle {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    let join = thread::spawn(move || run_update_with(&config, &events, &flag));
    RunHandle { join, cancel }
}

fn run_import_with(
    config: &ImportConfig,
    events: &Sender<RunProgress>,
    cancel: &CancelFlag,
) -> Result<RunSummary> {
    let mut tracker = RunTracker::new("import", events, config.progress_interval);
    tracker.validating();
    import(config, &mut tracker, cancel).map_err(|e| {
        tracker.abort(&e);
        e
    })
}

fn run_update_with(
    config: &UpdateConfig,
    events: &Sender<RunProgress>,
    cancel: &CancelFlag,
) -> Result<RunSummary> {
    let mut tracker = RunTracker::new("update", events, config.progress_interval);
    tracker.validating();
    update(config, &mut tracker, cancel).map_err(|e| {
        tracker.abort(&e);
        e
    })
}

fn import(config: &ImportConfig, tracker: &mut RunTracker<'_>, cancel: &CancelFlag) -> Result<RunSummary> {
    config.validate()?;
    let mapping = config.relative_mapping()?;
    let records = load_records(&config.json_path, &config.json_root, config.window())?;

    let _guard = RunGuard::acquire(&config.db_path);
    let mut db = open_target(&config.db_path, config.dry_run)?;
    let table = db.table_info(&config.table_name)?;
    let resolver = ValueResolver::new(&mapping, &config.rules, &table, Utc::now())?;
    let plan = ColumnPlan::new(&config.table_name, &table, &resolver.columns())?;
    info!(
        table = %config.table_name,
        columns = ?plan.columns(),
        records = records.len(),
        dry_run = config.dry_run,
        "import validated"
    );

    tracker.start(records.len());
    let outcome = if config.dry_run {
        rehearse(&records, tracker, cancel, |index, record| {
            resolver.resolve(record, index);
            true
        })
    } else {
        TransactionalWriter::new(&mut db, &plan).write(&records, &resolver, tracker, cancel)?
    };

    let progress = finish(tracker, outcome, config.dry_run, "inserted", &config.table_name);
    Ok(RunSummary {
        progress,
        columns: plan.columns().to_vec(),
        dropped_columns: plan.dropped().to_vec(),
        dry_run: config.dry_run,
    })
}

fn update(config: &UpdateConfig, tracker: &mut RunTracker<'_>, cancel: &CancelFlag) -> Result<RunSummary> {
    config.validate()?;
    let mapping = config.relative_mapping()?;
    let records = load_records(&config.json_path, &config.json_root, config.window())?;

    let _guard = RunGuard::acquire(&config.db_path);
    let mut db = open_target(&config.db_path, config.dry_run)?;
    let table = db.table_info(&config.table_name)?;
    let plan = UpdatePlan::new(
        &config.table_name,
        &table,
        &config.key_column,
        &config.update_columns,
    )?;
    let resolver = ValueResolver::mapping_only(&mapping)?;
    info!(
        table = %config.table_name,
        key = plan.key_column(),
        columns = ?plan.update_columns(),
        records = records.len(),
        dry_run = config.dry_run,
        "update validated"
    );

    tracker.start(records.len());
    let outcome = if config.dry_run {
        rehearse(&records, tracker, cancel, |index, record| {
            plan.statement(&resolver.resolve(record, index)).is_ok()
        })
    } else {
        KeyedUpdater::new(&mut db, &plan).update(&records, &resolver, tracker, cancel)?
    };

    let progress = finish(tracker, outcome, config.dry_run, "updated", &config.table_name);
    Ok(RunSummary {
        progress,
        columns: plan.update_columns().to_vec(),
        dropped_columns: Vec::new(),
        dry_run: config.dry_run,
    })
}

/// Records are copied out of the document so it can be released before any
/// database work
fn load_records(json_path: &Path, json_root: &str, window: Window) -> Result<Vec<Value>> {
    let document = load_document(json_path)?;
    extract_records(&document, json_root, window)
}

fn open_target(db_path: &Path, dry_run: bool) -> Result<Database> {
    if dry_run {
        Database::open_read_only(db_path)
    } else {
        Database::open(db_path)
    }
}

/// Resolve every row without touching the database
fn rehearse(
    records: &[Value],
    tracker: &mut RunTracker<'_>,
    cancel: &CancelFlag,
    mut check: impl FnMut(usize, &Value) -> bool,
) -> WriteOutcome {
    for (index, record) in records.iter().enumerate() {
        if cancel.is_cancelled() {
            return WriteOutcome::Cancelled;
        }
        tracker.record(check(index, record));
    }
    WriteOutcome::Committed
}

fn finish(
    tracker: &mut RunTracker<'_>,
    outcome: WriteOutcome,
    dry_run: bool,
    verb: &str,
    table: &str,
) -> RunProgress {
    match outcome {
        WriteOutcome::Cancelled => tracker.cancel(),
        WriteOutcome::Committed => {
            let progress = tracker.snapshot();
            let message = if dry_run {
                format!(
                    "dry run: {} of {} records would be {} in '{}'",
                    progress.succeeded, progress.total, verb, table
                )
            } else {
                format!(
                    "{} records {} in '{}', {} failed",
                    progress.succeeded, verb, table, progress.failed
                )
            };
            tracker.complete(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngotError;
    use crate::progress::RunStatus;
    use serde_json::json;
    use std::path::PathBuf;

    struct Fixture {
        _dir: tempfile::TempDir,
        json_path: PathBuf,
        db_path: PathBuf,
    }

    fn fixture(document: Value, schema: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("input.json");
        let db_path = dir.path().join("target.db");
        std::fs::write(&json_path, document.to_string()).unwrap();
        rusqlite::Connection::open(&db_path)
            .unwrap()
            .execute_batch(schema)
            .unwrap();
        Fixture {
            _dir: dir,
            json_path,
            db_path,
        }
    }

    fn import_config(fixture: &Fixture, value: Value) -> ImportConfig {
        let mut config: ImportConfig = serde_json::from_value(value).unwrap();
        config.json_path = fixture.json_path.clone();
        config.db_path = fixture.db_path.clone();
        config
    }

    fn users(n: usize) -> Value {
        let users: Vec<Value> = (1..=n)
            .map(|i| json!({"name": format!("user {}", i), "age": 20 + i}))
            .collect();
        json!({"data": {"users": users}})
    }

    fn names(db_path: &Path) -> Vec<Option<String>> {
        let conn = rusqlite::Connection::open(db_path).unwrap();
        let mut stmt = conn.prepare("SELECT name FROM users ORDER BY rowid").unwrap();
        let names = stmt
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        names
    }

    const USERS: &str = "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER);";

    #[test]
    fn test_import_with_defaults() {
        let fixture = fixture(
            json!({"data": {"users": [{"name": "A"}, {"name": null}]}}),
            USERS,
        );
        let config = import_config(
            &fixture,
            json!({
                "json_path": "", "db_path": "",
                "json_root": "data.users[]",
                "table_name": "users",
                "mapping": {"name": "name"},
                "defaults": {"name": "unknown"}
            }),
        );

        let (tx, rx) = crossbeam_channel::unbounded();
        let summary = run_import(&config, &tx).unwrap();
        drop(tx);

        assert_eq!(summary.progress.status, RunStatus::Completed);
        assert_eq!(summary.columns, vec!["name"]);
        assert_eq!(
            names(&fixture.db_path),
            vec![Some("A".to_string()), Some("unknown".to_string())]
        );

        let events: Vec<RunProgress> = rx.iter().collect();
        assert_eq!(events.first().unwrap().status, RunStatus::Validating);
        assert_eq!(events.last().unwrap(), &summary.progress);
        assert!(events.iter().any(|p| p.processed == p.total && p.status == RunStatus::Running));
    }

    #[test]
    fn test_window_selects_records() {
        let fixture = fixture(users(5), USERS);
        let config = import_config(
            &fixture,
            json!({
                "json_path": "", "db_path": "",
                "json_root": "data.users[]",
                "table_name": "users",
                "mapping": {"data.users[].name": "name", "age": "age"},
                "offset": 2,
                "limit": 2
            }),
        );

        let (tx, _rx) = crossbeam_channel::unbounded();
        let summary = run_import(&config, &tx).unwrap();

        assert_eq!(summary.progress.total, 2);
        assert_eq!(
            names(&fixture.db_path),
            vec![Some("user 3".to_string()), Some("user 4".to_string())]
        );
    }

    #[test]
    fn test_dry_run_leaves_database_untouched() {
        let fixture = fixture(users(10), USERS);
        let config = import_config(
            &fixture,
            json!({
                "json_path": "", "db_path": "",
                "json_root": "data.users[]",
                "table_name": "users",
                "mapping": {"name": "name", "nickname": "nickname"},
                "dry_run": true
            }),
        );

        let (tx, _rx) = crossbeam_channel::unbounded();
        let summary = run_import(&config, &tx).unwrap();

        assert!(summary.dry_run);
        assert_eq!(summary.progress.status, RunStatus::Completed);
        assert_eq!(
            (summary.progress.processed, summary.progress.succeeded, summary.progress.failed),
            (10, 10, 0)
        );
        assert_eq!(summary.columns, vec!["name"]);
        assert_eq!(summary.dropped_columns, vec!["nickname"]);
        assert!(names(&fixture.db_path).is_empty());
    }

    fn assert_aborted(rx: crossbeam_channel::Receiver<RunProgress>) {
        let last = rx.iter().last().unwrap();
        assert_eq!(last.status, RunStatus::Aborted);
        assert_eq!(last.processed, 0);
    }

    #[test]
    fn test_missing_root_segment_aborts() {
        let fixture = fixture(users(3), USERS);
        let config = import_config(
            &fixture,
            json!({
                "json_path": "", "db_path": "",
                "json_root": "data.people[]",
                "table_name": "users"
            }),
        );

        let (tx, rx) = crossbeam_channel::unbounded();
        let result = run_import(&config, &tx);
        drop(tx);

        assert!(matches!(
            result,
            Err(IngotError::MissingProperty { ref segment, .. }) if segment == "people"
        ));
        assert_aborted(rx);
    }

    #[test]
    fn test_missing_table_aborts() {
        let fixture = fixture(users(3), USERS);
        let config = import_config(
            &fixture,
            json!({
                "json_path": "", "db_path": "",
                "json_root": "data.users[]",
                "table_name": "accounts",
                "mapping": {"name": "name"}
            }),
        );

        let (tx, rx) = crossbeam_channel::unbounded();
        let result = run_import(&config, &tx);
        drop(tx);

        assert!(matches!(result, Err(IngotError::TableNotFound(ref t)) if t == "accounts"));
        assert_aborted(rx);
    }

    #[test]
    fn test_uncovered_not_null_column_is_fatal() {
        let fixture = fixture(users(2), "CREATE TABLE users (name TEXT, email TEXT NOT NULL);");
        let config = import_config(
            &fixture,
            json!({
                "json_path": "", "db_path": "",
                "json_root": "data.users[]",
                "table_name": "users",
                "mapping": {"name": "name"}
            }),
        );

        let (tx, _rx) = crossbeam_channel::unbounded();
        assert!(matches!(
            run_import(&config, &tx),
            Err(IngotError::MissingRequiredColumns(ref c)) if c == &vec!["email".to_string()]
        ));
    }

    #[test]
    fn test_cancelled_import_commits_nothing() {
        let fixture = fixture(users(4), USERS);
        let config = import_config(
            &fixture,
            json!({
                "json_path": "", "db_path": "",
                "json_root": "data.users[]",
                "table_name": "users",
                "mapping": {"name": "name"}
            }),
        );

        let cancel = CancelFlag::new();
        cancel.cancel();
        let (tx, _rx) = crossbeam_channel::unbounded();
        let summary = run_import_with(&config, &tx, &cancel).unwrap();

        assert_eq!(summary.progress.status, RunStatus::Cancelled);
        assert!(names(&fixture.db_path).is_empty());
    }

    #[test]
    fn test_spawned_runs_on_one_database_are_serialized() {
        let fixture = fixture(users(25), USERS);
        let config = import_config(
            &fixture,
            json!({
                "json_path": "", "db_path": "",
                "json_root": "data.users[]",
                "table_name": "users",
                "mapping": {"name": "name", "age": "age"}
            }),
        );

        let (tx, rx) = crossbeam_channel::unbounded();
        let first = spawn_import(config.clone(), tx.clone());
        let second = spawn_import(config, tx);

        assert_eq!(first.join().unwrap().progress.succeeded, 25);
        assert_eq!(second.join().unwrap().progress.succeeded, 25);
        assert_eq!(names(&fixture.db_path).len(), 50);

        let completed = rx.iter().filter(|p| p.status == RunStatus::Completed).count();
        assert_eq!(completed, 2);
    }

    #[test]
    fn test_run_with_bounded_channel_drained_concurrently() {
        let fixture = fixture(users(600), USERS);
        let config = import_config(
            &fixture,
            json!({
                "json_path": "", "db_path": "",
                "json_root": "data.users[]",
                "table_name": "users",
                "mapping": {"name": "name"},
                "progress_interval": 1
            }),
        );

        let (tx, rx) = crate::progress::progress_channel();
        let drain = std::thread::spawn(move || rx.iter().count());
        let summary = run_import(&config, &tx).unwrap();
        drop(tx);

        assert_eq!(summary.progress.succeeded, 600);
        assert!(drain.join().unwrap() > 600);
    }

    #[test]
    fn test_update_run() {
        let fixture = fixture(
            json!([
                {"sku": "A", "price": 2.5},
                {"sku": "B", "price": 3.5},
                {"sku": "Z", "price": 9.0},
                {"price": 1.0}
            ]),
            "CREATE TABLE products (sku TEXT PRIMARY KEY, price REAL);
             INSERT INTO products VALUES ('A', 1.0), ('B', 1.0);",
        );
        let mut config: UpdateConfig = serde_json::from_value(json!({
            "json_path": fixture.json_path,
            "db_path": fixture.db_path,
            "table_name": "products",
            "key_column": "sku",
            "update_columns": ["price"],
            "mapping": {"sku": "sku", "price": "price"},
            "dry_run": true
        }))
        .unwrap();

        let (tx, _rx) = crossbeam_channel::unbounded();
        let rehearsal = run_update(&config, &tx).unwrap();
        assert_eq!((rehearsal.progress.succeeded, rehearsal.progress.failed), (3, 1));

        config.dry_run = false;
        let summary = run_update(&config, &tx).unwrap();
        assert_eq!(summary.progress.status, RunStatus::Completed);
        assert_eq!((summary.progress.succeeded, summary.progress.failed), (2, 2));
        assert_eq!(summary.columns, vec!["price"]);

        let conn = rusqlite::Connection::open(&fixture.db_path).unwrap();
        let total: f64 = conn
            .query_row("SELECT SUM(price) FROM products", [], |r| r.get(0))
            .unwrap();
        assert_eq!(total, 6.0);
    }
}
