//! Caller-facing entry point of the engine.
//!
//! [`SmartListService`] owns the definition registry, the ignore ledger,
//! the refresh queue with its status tracker, and the schedule table, and
//! writes every change through to the [`Store`]. Refresh calls only
//! enqueue; callers poll [`SmartListService::get_status`] for outcomes.
//!
//! # Usage
//!
//! ```ignore
//! let service = SmartListService::new(store, library, materializer, ServiceConfig::default());
//! service.load().await?;
//! service.start();
//! let id = service.create_definition(definition).await?;
//! service.refresh(id)?;
//! ```

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::db::Store;
use crate::definition::{Definition, DefinitionRegistry};
use crate::error::{Error, Result};
use crate::host::{LibrarySource, Materializer};
use crate::ignore::{IgnoreLedger, IgnoredEntry};
use crate::model::{EntryId, ItemId, TargetId, UserId};
use crate::refresh::{
    DEFAULT_BATCH_SIZE, DEFAULT_HISTORY_SIZE, EnqueueOutcome, JobRunner, QueueConfig,
    RefreshJob, RefreshPipeline, RefreshQueue, RefreshReason, StatusReport, StatusTracker,
};
use crate::schedule::{ScheduleSpec, ScheduleTable, Scheduler, SchedulerCommand, SchedulerConfig};

/// Engine settings.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub queue: QueueConfig,
    pub scheduler: SchedulerConfig,
    /// Items per host call and evaluation chunk (default: 500)
    pub batch_size: usize,
    /// Finished jobs kept for status queries (default: 50)
    pub history_size: usize,
    /// Ignore duration when neither the caller nor the definition gives one
    pub default_ignore_days: Option<i32>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            scheduler: SchedulerConfig::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            history_size: DEFAULT_HISTORY_SIZE,
            default_ignore_days: None,
        }
    }
}

pub struct SmartListService {
    registry: Arc<DefinitionRegistry>,
    ledger: Arc<IgnoreLedger>,
    queue: RefreshQueue,
    schedules: Arc<Mutex<ScheduleTable>>,
    store: Arc<dyn Store>,
    runner: Arc<dyn JobRunner>,
    config: ServiceConfig,
    scheduler: Mutex<Option<mpsc::Sender<SchedulerCommand>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SmartListService {
    pub fn new(
        store: Arc<dyn Store>,
        library: Arc<dyn LibrarySource>,
        materializer: Arc<dyn Materializer>,
        config: ServiceConfig,
    ) -> Self {
        let registry = Arc::new(DefinitionRegistry::new());
        let ledger = Arc::new(IgnoreLedger::new());
        let status = Arc::new(StatusTracker::new(config.history_size));
        let queue = RefreshQueue::new(config.queue.clone(), status);
        let runner = RefreshPipeline::new(registry.clone(), library, materializer, ledger.clone())
            .with_batch_size(config.batch_size);

        Self {
            registry,
            ledger,
            queue,
            schedules: Arc::new(Mutex::new(ScheduleTable::new())),
            store,
            runner: Arc::new(runner),
            config,
            scheduler: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Load stored definitions and ignore entries.
    ///
    /// Definitions that no longer compile are skipped with a warning so one
    /// bad record can't keep the rest from loading.
    pub async fn load(&self) -> Result<()> {
        let definitions = self.store.load_definitions().await?;
        let mut loaded = 0;
        for definition in definitions {
            match definition.compile() {
                Ok(compiled) => {
                    self.schedule(&definition);
                    self.registry.insert(compiled);
                    loaded += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        "Skipping definition {} ({}): {}",
                        definition.id,
                        definition.name,
                        e
                    );
                }
            }
        }
        self.ledger.load(self.store.load_ignored().await?);
        tracing::info!(
            "Loaded {} definitions and {} ignore entries",
            loaded,
            self.ledger.len()
        );
        Ok(())
    }

    /// Spawn the refresh workers and the scheduler.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        tasks.extend(self.queue.start(self.runner.clone()));

        let scheduler = Scheduler::with_config(
            self.schedules.clone(),
            self.queue.clone(),
            self.ledger.clone(),
            Some(self.store.clone()),
            self.config.scheduler.clone(),
        );
        *self.scheduler.lock() = Some(scheduler.command_sender());
        tasks.push(scheduler.start());
    }

    /// Stop the scheduler, let workers finish their current job, and wait
    /// for every background task.
    pub async fn shutdown(&self) {
        let sender = self.scheduler.lock().take();
        if let Some(tx) = sender {
            let _ = tx.send(SchedulerCommand::Stop).await;
        }
        self.queue.shutdown();

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                tracing::warn!("Background task ended abnormally: {}", e);
            }
        }
    }

    /// Wait until no refresh is queued or running.
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await;
    }

    // ---- Definitions ----

    /// Validate, store and register a new definition.
    pub async fn create_definition(&self, definition: Definition) -> Result<TargetId> {
        if self.registry.contains(definition.id) {
            return Err(Error::DuplicateTarget(definition.id));
        }
        self.save(definition).await
    }

    /// Replace an existing definition. Its ignore entries are kept.
    pub async fn update_definition(&self, definition: Definition) -> Result<TargetId> {
        self.require(definition.id)?;
        self.save(definition).await
    }

    async fn save(&self, definition: Definition) -> Result<TargetId> {
        let compiled = definition.compile()?;
        self.store.save_definition(&definition).await?;
        self.schedule(&definition);
        self.registry.insert(compiled);
        tracing::info!("Saved definition {} ({})", definition.id, definition.name);
        Ok(definition.id)
    }

    /// Delete a definition with its ignore entries, pending refreshes and
    /// status. A refresh already running finishes.
    pub async fn delete_definition(&self, id: TargetId) -> Result<()> {
        self.require(id)?;
        self.store.delete_definition(id).await?;
        self.registry.remove(id);
        self.schedules.lock().remove(id);
        self.queue.forget(id);
        self.ledger.clear_all(id);
        tracing::info!("Deleted definition {}", id);
        Ok(())
    }

    pub fn get_definition(&self, id: TargetId) -> Result<Definition> {
        Ok(self.require(id)?.definition().clone())
    }

    /// Every definition, ordered by name.
    pub fn list_definitions(&self) -> Vec<Definition> {
        self.registry
            .list()
            .iter()
            .map(|d| d.definition().clone())
            .collect()
    }

    // ---- Refresh ----

    /// Queue a manual refresh. Returns as soon as it is queued.
    pub fn refresh(&self, id: TargetId) -> Result<EnqueueOutcome> {
        self.require(id)?;
        self.queue.enqueue(id, RefreshReason::Manual)
    }

    /// Queue a manual refresh of every enabled definition.
    pub fn refresh_all(&self) -> Result<Vec<(TargetId, EnqueueOutcome)>> {
        self.registry
            .list()
            .iter()
            .filter(|d| d.definition().enabled)
            .map(|d| Ok((d.id(), self.queue.enqueue(d.id(), RefreshReason::Manual)?)))
            .collect()
    }

    /// Tell the engine the host library changed.
    pub async fn library_changed(&self) -> Result<()> {
        let sender = self.scheduler.lock().clone();
        if let Some(tx) = sender {
            return tx
                .send(SchedulerCommand::LibraryChanged)
                .await
                .map_err(|_| Error::QueueClosed);
        }
        let targets = self.schedules.lock().library_changed();
        for target in targets {
            self.queue.enqueue(target, RefreshReason::LibraryChanged)?;
        }
        Ok(())
    }

    /// Current job of a target, or its most recent finished one.
    pub fn get_status(&self, id: TargetId) -> Result<Option<RefreshJob>> {
        self.require(id)?;
        Ok(self.queue.status().get(id))
    }

    /// All active jobs and recent history.
    pub fn status_report(&self) -> StatusReport {
        self.queue.status().report()
    }

    /// When a target fires next on its own.
    pub fn next_scheduled(&self, id: TargetId) -> Option<chrono::DateTime<Utc>> {
        self.schedules.lock().next_fire(id)
    }

    // ---- Ignore list ----

    /// Ignore an item in a target for a user.
    ///
    /// `duration_days` of `None` falls back to the definition's default,
    /// then the engine's. `Some(0)` or less is permanent.
    pub async fn ignore_add(
        &self,
        target: TargetId,
        item: ItemId,
        user: UserId,
        duration_days: Option<i32>,
    ) -> Result<IgnoredEntry> {
        let mut added = self
            .ignore_bulk_add(target, &[item], user, duration_days)
            .await?;
        added.pop().ok_or(Error::TargetNotFound(target))
    }

    pub async fn ignore_bulk_add(
        &self,
        target: TargetId,
        items: &[ItemId],
        user: UserId,
        duration_days: Option<i32>,
    ) -> Result<Vec<IgnoredEntry>> {
        let definition = self.require(target)?;
        let duration = duration_days
            .or(definition.definition().default_ignore_days)
            .or(self.config.default_ignore_days);
        let added = self.ledger.bulk_add(target, items, user, duration, Utc::now());
        self.store.save_ignored(&added).await?;
        Ok(added)
    }

    /// Remove one ignore entry. Unknown ids are reported as not found.
    pub async fn ignore_remove(&self, id: EntryId) -> Result<IgnoredEntry> {
        let entry = self.ledger.remove(id).ok_or(Error::EntryNotFound(id))?;
        self.store.delete_ignored(&[id]).await?;
        Ok(entry)
    }

    /// Remove several entries; unknown ids are skipped.
    pub async fn ignore_bulk_remove(&self, ids: &[EntryId]) -> Result<usize> {
        let removed = self.ledger.bulk_remove(ids);
        let removed_ids: Vec<EntryId> = removed.iter().map(|e| e.id).collect();
        self.store.delete_ignored(&removed_ids).await?;
        Ok(removed.len())
    }

    /// Remove every entry of a target.
    pub async fn ignore_clear_all(&self, target: TargetId) -> Result<usize> {
        self.require(target)?;
        let cleared = self.ledger.clear_all(target);
        self.store.clear_ignored(target).await?;
        Ok(cleared)
    }

    /// Entries of a target that are still in effect, oldest first.
    pub fn ignore_list_active(&self, target: TargetId) -> Result<Vec<IgnoredEntry>> {
        self.require(target)?;
        Ok(self.ledger.list_active(target, Utc::now()))
    }

    fn require(&self, id: TargetId) -> Result<Arc<crate::definition::CompiledDefinition>> {
        self.registry.get(id).ok_or(Error::TargetNotFound(id))
    }

    /// Disabled definitions are never scheduled.
    fn schedule(&self, definition: &Definition) {
        let spec = if definition.enabled {
            definition.schedule
        } else {
            ScheduleSpec::None
        };
        self.schedules.lock().set(definition.id, spec, Utc::now());
    }
}
