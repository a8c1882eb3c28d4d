//! Run progress reporting
//!
//! A run is the sole producer of [`RunProgress`] values on a
//! `crossbeam-channel` sender; the observer owns the receiver. Every value
//! is a full snapshot, so observers can drop duplicates by comparing
//! `processed`.

use crate::error::IngotError;
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Default number of rows between progress snapshots
pub const DEFAULT_PROGRESS_INTERVAL: usize = 10;

/// Capacity of the channel returned by [`progress_channel`]
pub const PROGRESS_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle of an import or update run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Idle,
    Validating,
    Running,
    Completed,
    Aborted,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Aborted | RunStatus::Cancelled
        )
    }
}

/// Snapshot of a run's counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunProgress {
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub status: RunStatus,
    /// Human-readable detail: the current stage, or the abort reason
    pub message: String,
}

impl RunProgress {
    fn idle() -> Self {
        RunProgress {
            total: 0,
            processed: 0,
            succeeded: 0,
            failed: 0,
            status: RunStatus::Idle,
            message: String::new(),
        }
    }
}

/// Bounded channel sized for progress reporting
pub fn progress_channel() -> (
    crossbeam_channel::Sender<RunProgress>,
    crossbeam_channel::Receiver<RunProgress>,
) {
    crossbeam_channel::bounded(PROGRESS_CHANNEL_CAPACITY)
}

/// Shared cancellation flag, checked between rows
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives the run state machine and publishes snapshots
pub(crate) struct RunTracker<'a> {
    progress: RunProgress,
    events: &'a Sender<RunProgress>,
    interval: usize,
    label: &'static str,
}

impl<'a> RunTracker<'a> {
    pub(crate) fn new(label: &'static str, events: &'a Sender<RunProgress>, interval: usize) -> Self {
        RunTracker {
            progress: RunProgress::idle(),
            events,
            interval: interval.max(1),
            label,
        }
    }

    pub(crate) fn validating(&mut self) {
        self.transition(RunStatus::Validating, "validating configuration and schema");
    }

    pub(crate) fn start(&mut self, total: usize) {
        self.progress.total = total;
        self.transition(RunStatus::Running, format!("processing {} records", total));
        info!(run = self.label, total, "run started");
    }

    /// Count one processed row, publishing every `interval` rows and on the
    /// last one
    pub(crate) fn record(&mut self, succeeded: bool) {
        self.progress.processed += 1;
        if succeeded {
            self.progress.succeeded += 1;
        } else {
            self.progress.failed += 1;
        }

        let (processed, total) = (self.progress.processed, self.progress.total);
        if processed % self.interval == 0 || processed == total {
            self.progress.message = format!("{}/{} records processed", processed, total);
            self.publish();
        }
    }

    pub(crate) fn complete(&mut self, message: impl Into<String>) -> RunProgress {
        self.transition(RunStatus::Completed, message);
        info!(
            run = self.label,
            total = self.progress.total,
            succeeded = self.progress.succeeded,
            failed = self.progress.failed,
            "run completed"
        );
        self.progress.clone()
    }

    pub(crate) fn cancel(&mut self) -> RunProgress {
        self.transition(RunStatus::Cancelled, "cancelled; no changes were committed");
        warn!(run = self.label, processed = self.progress.processed, "run cancelled");
        self.progress.clone()
    }

    pub(crate) fn abort(&mut self, error: &IngotError) {
        self.transition(RunStatus::Aborted, error.to_string());
        warn!(run = self.label, error = %error, "run aborted");
    }

    pub(crate) fn snapshot(&self) -> &RunProgress {
        &self.progress
    }

    fn transition(&mut self, status: RunStatus, message: impl Into<String>) {
        self.progress.status = status;
        self.progress.message = message.into();
        self.publish();
    }

    fn publish(&self) {
        // A dropped observer must not fail the run
        self.events.send(self.progress.clone()).ok();
    }
}
