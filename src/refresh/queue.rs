//! Per-target deduplicating refresh queue and its worker pool.
//!
//! The target id is the idempotency key: at most one job per target is
//! queued or running at any time. Enqueueing a target whose job is still
//! queued merges into it. Enqueueing a target whose job is running sets a
//! rerun flag instead, and a fresh job goes to the front of the queue as
//! soon as the running one finishes.
//!
//! Workers pull targets in FIFO order. A running job can't be preempted;
//! it either finishes, fails, or hits the soft timeout, at which point its
//! task is aborted and the job is marked failed.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;

use super::job::{JobState, JobSummary, RefreshJob, RefreshReason};
use super::status::StatusTracker;
use crate::error::{Error, Result};
use crate::model::{JobId, TargetId};

/// Does the actual work of one refresh.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn run(&self, target: TargetId) -> Result<JobSummary>;
}

/// Worker pool settings.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Targets processed concurrently (default: 2)
    pub worker_count: usize,
    /// Soft limit per job (default: 10 minutes)
    pub job_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            job_timeout: Duration::from_secs(600),
        }
    }
}

/// What an enqueue call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new job was queued
    Queued(JobId),
    /// Merged into the target's job that is still waiting
    Coalesced(JobId),
    /// The target is running; it will run again right after
    RerunScheduled(JobId),
}

impl EnqueueOutcome {
    pub fn job_id(&self) -> JobId {
        match *self {
            EnqueueOutcome::Queued(id)
            | EnqueueOutcome::Coalesced(id)
            | EnqueueOutcome::RerunScheduled(id) => id,
        }
    }
}

struct Slot {
    job: RefreshJob,
    rerun: Option<RefreshReason>,
    /// Set when the target was forgotten mid-run; its outcome is not recorded
    forgotten: bool,
}

impl Slot {
    fn new(job: RefreshJob) -> Self {
        Self {
            job,
            rerun: None,
            forgotten: false,
        }
    }
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<TargetId>,
    slots: HashMap<TargetId, Slot>,
    closed: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    work: Notify,
    /// Number of targets with a queued or running job
    active: watch::Sender<usize>,
    shutdown: watch::Sender<bool>,
    status: Arc<StatusTracker>,
    config: QueueConfig,
}

/// Handle to the queue. Cheap to clone.
#[derive(Clone)]
pub struct RefreshQueue {
    shared: Arc<Shared>,
}

impl RefreshQueue {
    pub fn new(config: QueueConfig, status: Arc<StatusTracker>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                work: Notify::new(),
                active: watch::Sender::new(0),
                shutdown: watch::Sender::new(false),
                status,
                config,
            }),
        }
    }

    pub fn status(&self) -> &Arc<StatusTracker> {
        &self.shared.status
    }

    /// Request a refresh of `target`. Returns immediately.
    pub fn enqueue(&self, target: TargetId, reason: RefreshReason) -> Result<EnqueueOutcome> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(Error::QueueClosed);
        }

        if let Some(slot) = state.slots.get_mut(&target) {
            let id = slot.job.id;
            return Ok(match slot.job.state {
                JobState::Running => {
                    slot.rerun.get_or_insert(reason);
                    tracing::debug!(target: "queue", "{} running, rerun requested", target);
                    EnqueueOutcome::RerunScheduled(id)
                }
                _ => {
                    tracing::debug!(target: "queue", "{} already queued, coalesced", target);
                    EnqueueOutcome::Coalesced(id)
                }
            });
        }

        let job = RefreshJob::new(target, reason, Utc::now());
        let id = job.id;
        self.shared.status.update(&job);
        state.slots.insert(target, Slot::new(job));
        state.pending.push_back(target);
        self.shared.active.send_replace(state.slots.len());
        drop(state);

        tracing::debug!(target: "queue", "Queued {} ({:?})", target, reason);
        self.shared.work.notify_one();
        Ok(EnqueueOutcome::Queued(id))
    }

    /// Drop a target's waiting job, any rerun request and its status. A
    /// running job finishes, but its outcome is not recorded.
    pub fn forget(&self, target: TargetId) {
        let mut state = self.shared.state.lock();
        let queued = state
            .slots
            .get(&target)
            .is_some_and(|s| s.job.state == JobState::Queued);
        if queued {
            state.slots.remove(&target);
            state.pending.retain(|t| *t != target);
            self.shared.active.send_replace(state.slots.len());
        } else if let Some(slot) = state.slots.get_mut(&target) {
            slot.rerun = None;
            slot.forgotten = true;
        }
        self.shared.status.forget(target);
    }

    /// Whether `target` has a queued or running job.
    pub fn is_active(&self, target: TargetId) -> bool {
        self.shared.state.lock().slots.contains_key(&target)
    }

    pub fn pending_len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Wait until no job is queued or running.
    pub async fn wait_idle(&self) {
        let mut rx = self.shared.active.subscribe();
        // The sender lives in `shared`, which we hold, so this can't error
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Spawn the worker pool.
    pub fn start(&self, runner: Arc<dyn JobRunner>) -> Vec<JoinHandle<()>> {
        let count = self.shared.config.worker_count.max(1);
        tracing::info!(target: "queue", "Starting {} refresh workers", count);
        (0..count)
            .map(|n| {
                let queue = self.clone();
                let runner = runner.clone();
                tokio::spawn(async move { queue.worker(n, runner).await })
            })
            .collect()
    }

    /// Stop accepting work and let workers exit after their current job.
    pub fn shutdown(&self) {
        self.shared.state.lock().closed = true;
        self.shared.shutdown.send_replace(true);
        tracing::info!(target: "queue", "Refresh queue shutting down");
    }

    async fn worker(&self, n: usize, runner: Arc<dyn JobRunner>) {
        let mut shutdown = self.shared.shutdown.subscribe();
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.take_next() {
                Some(job) => self.execute(job, &runner).await,
                None => {
                    tokio::select! {
                        _ = self.shared.work.notified() => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }
        tracing::debug!(target: "queue", "Worker {} stopped", n);
    }

    /// Pop the next waiting target and mark its job running.
    fn take_next(&self) -> Option<RefreshJob> {
        let mut state = self.shared.state.lock();
        let target = state.pending.pop_front()?;
        let slot = state.slots.get_mut(&target)?;
        slot.job.start(Utc::now());
        self.shared.status.update(&slot.job);
        Some(slot.job.clone())
    }

    async fn execute(&self, mut job: RefreshJob, runner: &Arc<dyn JobRunner>) {
        let target = job.target;
        let timeout = self.shared.config.job_timeout;
        tracing::info!(target: "queue", "Refreshing {} ({:?})", target, job.reason);

        let task = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.run(target).await })
        };
        let abort = task.abort_handle();
        let result = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(Error::Task(join)),
            Err(_) => {
                abort.abort();
                Err(Error::Timeout(timeout))
            }
        };

        let now = Utc::now();
        match result {
            Ok(summary) => {
                tracing::info!(
                    target: "queue",
                    "Refreshed {}: {} items (+{} -{})",
                    target,
                    summary.items,
                    summary.added,
                    summary.removed
                );
                job.succeed(summary, now);
            }
            Err(e) => {
                tracing::warn!(target: "queue", "Refresh of {} failed: {}", target, e);
                job.fail(&e, now);
            }
        }
        self.complete(job);
    }

    /// Record a finished job and honor any rerun request.
    fn complete(&self, job: RefreshJob) {
        let target = job.target;
        let mut state = self.shared.state.lock();
        let owned = state.slots.get(&target).is_some_and(|s| s.job.id == job.id);
        let (rerun, forgotten) = if owned {
            state
                .slots
                .remove(&target)
                .map_or((None, false), |s| (s.rerun, s.forgotten))
        } else {
            (None, false)
        };
        if forgotten {
            tracing::debug!(target: "queue", "Dropping outcome of forgotten {}", target);
        } else {
            self.shared.status.finish(&job);
        }

        if let Some(reason) = rerun
            && !state.closed
        {
            let next = RefreshJob::new(target, reason, Utc::now());
            self.shared.status.update(&next);
            state.slots.insert(target, Slot::new(next));
            state.pending.push_front(target);
            self.shared.work.notify_one();
            tracing::debug!(target: "queue", "Re-queued {} after merged request", target);
        }
        self.shared.active.send_replace(state.slots.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    /// Runner that blocks each run until a permit is released.
    struct GatedRunner {
        calls: parking_lot::Mutex<Vec<TargetId>>,
        running: AtomicUsize,
        max_running: AtomicUsize,
        gate: Semaphore,
        fail: bool,
    }

    impl GatedRunner {
        fn new(fail: bool) -> Self {
            Self {
                calls: parking_lot::Mutex::new(Vec::new()),
                running: AtomicUsize::new(0),
                max_running: AtomicUsize::new(0),
                gate: Semaphore::new(0),
                fail,
            }
        }

        fn open(&self, n: usize) {
            self.gate.add_permits(n);
        }

        fn calls(&self) -> Vec<TargetId> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl JobRunner for GatedRunner {
        async fn run(&self, target: TargetId) -> Result<JobSummary> {
            self.calls.lock().push(target);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            let permit = self.gate.acquire().await.map_err(|_| Error::QueueClosed)?;
            permit.forget();
            self.running.fetch_sub(1, Ordering::SeqCst);
            if self.fail {
                return Err(crate::host::HostError::Unavailable("offline".into()).into());
            }
            Ok(JobSummary {
                items: 1,
                ..Default::default()
            })
        }
    }

    /// Runner that never finishes on its own.
    struct StuckRunner;

    #[async_trait]
    impl JobRunner for StuckRunner {
        async fn run(&self, _target: TargetId) -> Result<JobSummary> {
            std::future::pending().await
        }
    }

    fn queue(workers: usize) -> RefreshQueue {
        RefreshQueue::new(
            QueueConfig {
                worker_count: workers,
                job_timeout: Duration::from_secs(5),
            },
            Arc::new(StatusTracker::default()),
        )
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_duplicate_enqueue_yields_one_running_job() {
        let queue = queue(2);
        let runner = Arc::new(GatedRunner::new(false));
        let target = TargetId::new();

        let first = queue.enqueue(target, RefreshReason::Manual).unwrap();
        let second = queue.enqueue(target, RefreshReason::Scheduled).unwrap();
        assert!(matches!(first, EnqueueOutcome::Queued(_)));
        assert_eq!(second, EnqueueOutcome::Coalesced(first.job_id()));
        assert_eq!(queue.pending_len(), 1);

        queue.start(runner.clone());
        wait_until(|| runner.running.load(Ordering::SeqCst) == 1).await;

        let active = queue.status().active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].state, JobState::Running);
        assert_eq!(queue.pending_len(), 0);

        runner.open(1);
        queue.wait_idle().await;
        assert_eq!(runner.calls(), vec![target]);
        assert_eq!(queue.status().get(target).unwrap().state, JobState::Succeeded);
    }

    #[tokio::test]
    async fn test_enqueue_while_running_reruns_once() {
        let queue = queue(1);
        let runner = Arc::new(GatedRunner::new(false));
        let target = TargetId::new();
        queue.start(runner.clone());

        queue.enqueue(target, RefreshReason::Manual).unwrap();
        wait_until(|| runner.running.load(Ordering::SeqCst) == 1).await;

        let a = queue.enqueue(target, RefreshReason::LibraryChanged).unwrap();
        let b = queue.enqueue(target, RefreshReason::Manual).unwrap();
        assert!(matches!(a, EnqueueOutcome::RerunScheduled(_)));
        assert!(matches!(b, EnqueueOutcome::RerunScheduled(_)));
        assert_eq!(queue.pending_len(), 0);

        runner.open(2);
        queue.wait_idle().await;
        assert_eq!(runner.calls(), vec![target, target]);

        let history = queue.status().history(10);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].reason, RefreshReason::LibraryChanged);
    }

    #[tokio::test]
    async fn test_targets_run_concurrently_up_to_worker_count() {
        let queue = queue(2);
        let runner = Arc::new(GatedRunner::new(false));
        queue.start(runner.clone());

        let targets: Vec<_> = (0..4).map(|_| TargetId::new()).collect();
        for &t in &targets {
            queue.enqueue(t, RefreshReason::Manual).unwrap();
        }
        wait_until(|| runner.running.load(Ordering::SeqCst) == 2).await;
        assert_eq!(queue.pending_len(), 2);

        runner.open(4);
        queue.wait_idle().await;
        assert_eq!(runner.max_running.load(Ordering::SeqCst), 2);
        let mut calls = runner.calls();
        calls.sort();
        let mut expected = targets.clone();
        expected.sort();
        assert_eq!(calls, expected);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_queue_continues() {
        let queue = queue(1);
        let runner = Arc::new(GatedRunner::new(true));
        runner.open(2);
        queue.start(runner.clone());

        let target = TargetId::new();
        queue.enqueue(target, RefreshReason::Scheduled).unwrap();
        queue.wait_idle().await;

        let job = queue.status().get(target).unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert!(job.error.unwrap().contains("offline"));

        // Failures are not retried on their own; the next trigger runs again
        assert!(matches!(
            queue.enqueue(target, RefreshReason::Manual).unwrap(),
            EnqueueOutcome::Queued(_)
        ));
        queue.wait_idle().await;
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_timeout_marks_failed_and_frees_worker() {
        let queue = RefreshQueue::new(
            QueueConfig {
                worker_count: 1,
                job_timeout: Duration::from_millis(50),
            },
            Arc::new(StatusTracker::default()),
        );
        queue.start(Arc::new(StuckRunner));

        let (a, b) = (TargetId::new(), TargetId::new());
        queue.enqueue(a, RefreshReason::Manual).unwrap();
        queue.enqueue(b, RefreshReason::Manual).unwrap();
        queue.wait_idle().await;

        for target in [a, b] {
            let job = queue.status().get(target).unwrap();
            assert_eq!(job.state, JobState::Failed);
            assert!(job.error.unwrap().contains("timed out"));
        }
    }

    #[tokio::test]
    async fn test_forget_drops_waiting_job() {
        let queue = queue(1);
        let target = TargetId::new();
        queue.enqueue(target, RefreshReason::Manual).unwrap();
        assert!(queue.is_active(target));

        queue.forget(target);
        assert!(!queue.is_active(target));
        assert_eq!(queue.pending_len(), 0);
        queue.wait_idle().await;
    }

    #[tokio::test]
    async fn test_forget_while_running_leaves_no_history() {
        let queue = queue(1);
        let runner = Arc::new(GatedRunner::new(false));
        queue.start(runner.clone());

        let target = TargetId::new();
        queue.enqueue(target, RefreshReason::Manual).unwrap();
        wait_until(|| runner.running.load(Ordering::SeqCst) == 1).await;
        queue.enqueue(target, RefreshReason::Manual).unwrap();

        queue.forget(target);
        assert!(queue.status().get(target).is_none());

        runner.open(1);
        queue.wait_idle().await;
        assert_eq!(runner.calls(), vec![target]);
        assert!(queue.status().get(target).is_none());
        assert!(queue.status().history(10).is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_work() {
        let queue = queue(1);
        let handles = queue.start(Arc::new(GatedRunner::new(false)));
        queue.shutdown();
        assert!(matches!(
            queue.enqueue(TargetId::new(), RefreshReason::Manual),
            Err(Error::QueueClosed)
        ));
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
