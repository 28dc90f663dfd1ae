//! Background worker that turns schedules into refresh requests.
//!
//! # Usage
//!
//! ```ignore
//! let scheduler = Scheduler::new(table.clone(), queue.clone(), ledger.clone(), Some(store));
//! let commands = scheduler.command_sender();
//! let handle = scheduler.start();
//! commands.send(SchedulerCommand::LibraryChanged).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::interval;

use super::ScheduleSpec;
use crate::db::Store;
use crate::error::Error;
use crate::ignore::IgnoreLedger;
use crate::model::TargetId;
use crate::refresh::{RefreshQueue, RefreshReason};

#[derive(Debug, Clone, Copy)]
struct Entry {
    spec: ScheduleSpec,
    next: Option<DateTime<Utc>>,
}

/// Schedule and next fire time of every scheduled target.
#[derive(Debug, Default)]
pub struct ScheduleTable {
    entries: HashMap<TargetId, Entry>,
}

impl ScheduleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace a target's schedule. `ScheduleSpec::None` removes it.
    pub fn set(&mut self, target: TargetId, spec: ScheduleSpec, now: DateTime<Utc>) {
        if spec == ScheduleSpec::None {
            self.entries.remove(&target);
            return;
        }
        let next = spec.next_fire(now);
        self.entries.insert(target, Entry { spec, next });
    }

    pub fn remove(&mut self, target: TargetId) {
        self.entries.remove(&target);
    }

    /// Targets whose fire time has passed, earliest first. Each one's next
    /// fire time moves past `now`, so a missed run fires once, not once per
    /// missed slot.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<TargetId> {
        let mut due: Vec<(DateTime<Utc>, TargetId)> = Vec::new();
        for (&target, entry) in self.entries.iter_mut() {
            if let Some(at) = entry.next
                && at <= now
            {
                due.push((at, target));
                entry.next = entry.spec.next_fire(now);
            }
        }
        due.sort();
        due.into_iter().map(|(_, target)| target).collect()
    }

    /// Targets that refresh on library change.
    pub fn library_changed(&self) -> Vec<TargetId> {
        let mut targets: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, e)| e.spec.on_library_change())
            .map(|(&t, _)| t)
            .collect();
        targets.sort();
        targets
    }

    pub fn next_fire(&self, target: TargetId) -> Option<DateTime<Utc>> {
        self.entries.get(&target)?.next
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often to check for due targets (default: 60 seconds)
    pub tick_interval: Duration,
    /// Purge expired ignore entries on each tick (default: true)
    pub sweep_expired: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            sweep_expired: true,
        }
    }
}

/// Commands that can be sent to the scheduler.
#[derive(Debug)]
pub enum SchedulerCommand {
    /// The host library changed
    LibraryChanged,
    /// Stop firing schedules
    Pause,
    Resume,
    Stop,
}

pub struct Scheduler {
    table: Arc<Mutex<ScheduleTable>>,
    queue: RefreshQueue,
    ledger: Arc<IgnoreLedger>,
    store: Option<Arc<dyn Store>>,
    config: SchedulerConfig,
    command_tx: mpsc::Sender<SchedulerCommand>,
    command_rx: mpsc::Receiver<SchedulerCommand>,
}

impl Scheduler {
    pub fn new(
        table: Arc<Mutex<ScheduleTable>>,
        queue: RefreshQueue,
        ledger: Arc<IgnoreLedger>,
        store: Option<Arc<dyn Store>>,
    ) -> Self {
        Self::with_config(table, queue, ledger, store, SchedulerConfig::default())
    }

    pub fn with_config(
        table: Arc<Mutex<ScheduleTable>>,
        queue: RefreshQueue,
        ledger: Arc<IgnoreLedger>,
        store: Option<Arc<dyn Store>>,
        config: SchedulerConfig,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(32);
        Self {
            table,
            queue,
            ledger,
            store,
            config,
            command_tx,
            command_rx,
        }
    }

    pub fn command_sender(&self) -> mpsc::Sender<SchedulerCommand> {
        self.command_tx.clone()
    }

    /// Start the scheduler background task.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let mut ticker = interval(self.config.tick_interval);
        let mut paused = false;

        tracing::info!(target: "scheduler", "Scheduler started");

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(SchedulerCommand::LibraryChanged) => {
                            if paused {
                                tracing::debug!(target: "scheduler", "Paused, ignoring library change");
                            } else {
                                self.library_changed();
                            }
                        }
                        Some(SchedulerCommand::Pause) => {
                            paused = true;
                            tracing::debug!(target: "scheduler", "Paused");
                        }
                        Some(SchedulerCommand::Resume) => {
                            paused = false;
                            tracing::debug!(target: "scheduler", "Resumed");
                        }
                        Some(SchedulerCommand::Stop) | None => {
                            tracing::info!(target: "scheduler", "Stopped");
                            break;
                        }
                    }
                }

                _ = ticker.tick() => {
                    if !paused {
                        self.tick(Utc::now()).await;
                    }
                }
            }
        }
    }

    /// Enqueue due targets and sweep the ignore ledger.
    pub(crate) async fn tick(&self, now: DateTime<Utc>) {
        let due = self.table.lock().due(now);
        if !due.is_empty() {
            tracing::debug!(target: "scheduler", "{} targets due", due.len());
        }
        self.enqueue_all(&due, RefreshReason::Scheduled);

        if self.config.sweep_expired {
            self.sweep(now).await;
        }
    }

    fn library_changed(&self) {
        let targets = self.table.lock().library_changed();
        tracing::info!(
            target: "scheduler",
            "Library changed, refreshing {} targets",
            targets.len()
        );
        self.enqueue_all(&targets, RefreshReason::LibraryChanged);
    }

    fn enqueue_all(&self, targets: &[TargetId], reason: RefreshReason) {
        for &target in targets {
            match self.queue.enqueue(target, reason) {
                Ok(_) => {}
                Err(Error::QueueClosed) => {
                    tracing::debug!(target: "scheduler", "Queue closed, dropping triggers");
                    return;
                }
                Err(e) => {
                    tracing::warn!(target: "scheduler", "Failed to enqueue {}: {}", target, e);
                }
            }
        }
    }

    async fn sweep(&self, now: DateTime<Utc>) {
        let purged = self.ledger.purge_expired(now);
        if purged.is_empty() {
            return;
        }
        tracing::debug!(target: "scheduler", "Purged {} expired ignore entries", purged.len());
        if let Some(store) = &self.store
            && let Err(e) = store.delete_ignored(&purged).await
        {
            tracing::warn!(target: "scheduler", "Failed to delete expired ignores: {}", e);
        }
    }
}
