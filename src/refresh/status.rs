//! Live and recent refresh job state.
//!
//! Workers write here as jobs move through their states; status queries
//! read concurrently. Finished jobs move into a bounded history, newest
//! first.

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;

use super::job::RefreshJob;
use crate::model::TargetId;

/// Default number of finished jobs kept.
pub const DEFAULT_HISTORY_SIZE: usize = 50;

#[derive(Debug, Default)]
struct Inner {
    current: HashMap<TargetId, RefreshJob>,
    history: VecDeque<RefreshJob>,
}

/// Point-in-time copy of everything the tracker knows.
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    /// Queued and running jobs, oldest first
    pub active: Vec<RefreshJob>,
    /// Finished jobs, newest first
    pub history: Vec<RefreshJob>,
}

#[derive(Debug)]
pub struct StatusTracker {
    inner: RwLock<Inner>,
    capacity: usize,
}

impl StatusTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            capacity: capacity.max(1),
        }
    }

    /// Record a queued or running job.
    pub fn update(&self, job: &RefreshJob) {
        debug_assert!(job.state.is_active());
        self.inner.write().current.insert(job.target, job.clone());
    }

    /// Move a finished job into history.
    pub fn finish(&self, job: &RefreshJob) {
        debug_assert!(job.state.is_terminal());
        let mut inner = self.inner.write();
        if inner.current.get(&job.target).is_some_and(|j| j.id == job.id) {
            inner.current.remove(&job.target);
        }
        inner.history.push_front(job.clone());
        inner.history.truncate(self.capacity);
    }

    /// Current job of a target, or its most recent finished one.
    pub fn get(&self, target: TargetId) -> Option<RefreshJob> {
        let inner = self.inner.read();
        inner
            .current
            .get(&target)
            .or_else(|| inner.history.iter().find(|j| j.target == target))
            .cloned()
    }

    pub fn active(&self) -> Vec<RefreshJob> {
        let mut jobs: Vec<_> = self.inner.read().current.values().cloned().collect();
        jobs.sort_by_key(|j| (j.enqueued_at, j.id));
        jobs
    }

    /// Up to `limit` finished jobs, newest first.
    pub fn history(&self, limit: usize) -> Vec<RefreshJob> {
        self.inner.read().history.iter().take(limit).cloned().collect()
    }

    pub fn report(&self) -> StatusReport {
        StatusReport {
            active: self.active(),
            history: self.history(self.capacity),
        }
    }

    /// Drop everything recorded for a target.
    pub fn forget(&self, target: TargetId) {
        let mut inner = self.inner.write();
        inner.current.remove(&target);
        inner.history.retain(|j| j.target != target);
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}
