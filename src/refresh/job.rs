//! Refresh jobs and their lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::{JobId, TargetId};

/// Why a refresh was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefreshReason {
    Manual,
    Scheduled,
    LibraryChanged,
}

/// `Queued -> Running -> {Succeeded, Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_active(self) -> bool {
        matches!(self, JobState::Queued | JobState::Running)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

/// Outcome of a successful refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    /// Items the rules selected, pinned items included
    pub matched: usize,
    /// Matches dropped by the ignore ledger
    pub ignored: usize,
    /// Items in the final list
    pub items: usize,
    /// Total runtime of the final list
    pub runtime_secs: u64,
    pub added: usize,
    pub removed: usize,
    pub unchanged: bool,
}

/// One evaluate-and-apply cycle for a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshJob {
    pub id: JobId,
    pub target: TargetId,
    pub reason: RefreshReason,
    pub state: JobState,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub summary: Option<JobSummary>,
    /// Human-readable failure message
    pub error: Option<String>,
    /// Changes applied before a materialization failed
    pub partially_applied: Option<usize>,
}

impl RefreshJob {
    pub fn new(target: TargetId, reason: RefreshReason, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            target,
            reason,
            state: JobState::Queued,
            enqueued_at: now,
            started_at: None,
            finished_at: None,
            summary: None,
            error: None,
            partially_applied: None,
        }
    }

    pub fn start(&mut self, now: DateTime<Utc>) {
        debug_assert_eq!(self.state, JobState::Queued);
        self.state = JobState::Running;
        self.started_at = Some(now);
    }

    pub fn succeed(&mut self, summary: JobSummary, now: DateTime<Utc>) {
        debug_assert_eq!(self.state, JobState::Running);
        self.state = JobState::Succeeded;
        self.summary = Some(summary);
        self.finished_at = Some(now);
    }

    pub fn fail(&mut self, error: &Error, now: DateTime<Utc>) {
        debug_assert_eq!(self.state, JobState::Running);
        self.state = JobState::Failed;
        self.error = Some(error.to_string());
        if let Error::Materialize(e) = error {
            self.partially_applied = Some(e.applied);
        }
        self.finished_at = Some(now);
    }

    /// Wall time spent running, once finished.
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }
}
