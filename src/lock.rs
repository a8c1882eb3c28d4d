//! Per-database run serialization
//!
//! At most one import or update runs against a given database file at a
//! time within the process. A second run for the same file blocks until the
//! first releases its guard.

use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, PoisonError};
use tracing::debug;

static ACTIVE_RUNS: Lazy<(Mutex<HashSet<PathBuf>>, Condvar)> =
    Lazy::new(|| (Mutex::new(HashSet::new()), Condvar::new()));

/// Held for the duration of a run; releases the database on drop
#[derive(Debug)]
pub struct RunGuard {
    path: PathBuf,
}

impl RunGuard {
    /// Block until no other run holds `db_path`, then claim it
    pub fn acquire(db_path: &Path) -> RunGuard {
        let path = std::fs::canonicalize(db_path).unwrap_or_else(|_| db_path.to_path_buf());
        let (lock, available) = &*ACTIVE_RUNS;

        let mut active = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while active.contains(&path) {
            debug!(db = %path.display(), "waiting for active run on database");
            active = available
                .wait(active)
                .unwrap_or_else(PoisonError::into_inner);
        }
        active.insert(path.clone());

        RunGuard { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let (lock, available) = &*ACTIVE_RUNS;
        let mut active = lock.lock().unwrap_or_else(PoisonError::into_inner);
        active.remove(&self.path);
        available.notify_all();
    }
}
