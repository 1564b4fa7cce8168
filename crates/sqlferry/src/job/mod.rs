//! Job control surface and reports.
//!
//! Cancellation is a watch channel passed explicitly through the
//! streaming call chain: [`JobControl`] owns the sender, jobs and their
//! workers poll receivers. `cancel` is best-effort, not instantaneous:
//! workers notice within one row during streaming and within one chunk
//! at chunk boundaries.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

/// Handle for cancelling a running job and observing its running flag.
#[derive(Debug)]
pub struct JobControl {
    tx: watch::Sender<bool>,
}

impl JobControl {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(true);
        Self { tx }
    }

    /// A receiver to pass into a job's `execute`.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Whether the job is still allowed to run.
    pub fn is_running(&self) -> bool {
        *self.tx.borrow()
    }

    /// Request cancellation (sets running to false).
    pub fn cancel(&self) {
        let _ = self.tx.send(false);
    }
}

impl Default for JobControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Final status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Every entry succeeded.
    Completed,
    /// Some entries succeeded, some failed or were never reached.
    PartiallyFailed,
    /// No entry succeeded.
    Failed,
}

/// Outcome of one catalog entry.
#[derive(Debug, Clone, Serialize)]
pub struct EntryOutcome {
    pub name: String,
    pub format: String,
    pub row_count: u64,
    pub chunk_count: usize,
    /// Failure cause; `None` for a succeeded entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EntryOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Final report of a dump or load: per-entry outcomes, never a single
/// opaque failure when partial success occurred.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub status: JobStatus,
    pub cancelled: bool,
    pub entries: Vec<EntryOutcome>,
    pub rows_total: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

impl JobReport {
    /// Build a report from per-entry outcomes.
    pub fn from_outcomes(
        entries: Vec<EntryOutcome>,
        cancelled: bool,
        started_at: DateTime<Utc>,
    ) -> Self {
        let completed_at = Utc::now();
        let succeeded = entries.iter().filter(|e| e.succeeded()).count();
        let status = if !cancelled && succeeded == entries.len() {
            JobStatus::Completed
        } else if succeeded > 0 {
            JobStatus::PartiallyFailed
        } else {
            JobStatus::Failed
        };
        let rows_total = entries
            .iter()
            .filter(|e| e.succeeded())
            .map(|e| e.row_count)
            .sum();
        Self {
            status,
            cancelled,
            entries,
            rows_total,
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1_000.0,
        }
    }

    /// Names of failed entries with their causes.
    pub fn failed_entries(&self) -> Vec<(&str, &str)> {
        self.entries
            .iter()
            .filter_map(|e| e.error.as_deref().map(|err| (e.name.as_str(), err)))
            .collect()
    }
}
