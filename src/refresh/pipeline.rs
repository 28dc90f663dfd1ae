//! The work a refresh job does for one target.
//!
//! 1. Query candidate items of the definition's media types
//! 2. Fetch parent series when rules inherit from them
//! 3. Fetch per-user data, `batch_size` items per host call
//! 4. Evaluate and sort on the blocking pool
//! 5. Drop items the owners ignore
//! 6. Materialize the ordered list
//!
//! Any failure leaves the target's stored list as it was, except for what a
//! partially failed materialization already applied.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use super::job::JobSummary;
use super::queue::JobRunner;
use crate::definition::DefinitionRegistry;
use crate::error::{Error, Result};
use crate::host::{ItemQuery, LibrarySource, Materializer};
use crate::ignore::IgnoreLedger;
use crate::model::{ItemId, TargetId, UserId};
use crate::ordering;
use crate::rules::{Evaluator, LibraryView};

/// Default number of items per host call and evaluation chunk.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// [`JobRunner`] that evaluates against a host library.
pub struct RefreshPipeline {
    registry: Arc<DefinitionRegistry>,
    library: Arc<dyn LibrarySource>,
    materializer: Arc<dyn Materializer>,
    ledger: Arc<IgnoreLedger>,
    batch_size: usize,
}

struct Selection {
    items: Vec<ItemId>,
    matched: usize,
    ignored: usize,
    runtime_secs: u64,
}

impl RefreshPipeline {
    pub fn new(
        registry: Arc<DefinitionRegistry>,
        library: Arc<dyn LibrarySource>,
        materializer: Arc<dyn Materializer>,
        ledger: Arc<IgnoreLedger>,
    ) -> Self {
        Self {
            registry,
            library,
            materializer,
            ledger,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    async fn load_view(
        &self,
        query: &ItemQuery,
        needs_series: bool,
        users: &[UserId],
    ) -> Result<LibraryView> {
        let items = self.library.query_items(query).await?;

        let mut related = Vec::new();
        if needs_series {
            let have: HashSet<ItemId> = items.iter().map(|i| i.id).collect();
            let missing: Vec<ItemId> = items
                .iter()
                .filter_map(|i| i.series_id)
                .filter(|id| !have.contains(id))
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            if !missing.is_empty() {
                related = self.library.query_items(&ItemQuery::by_ids(missing)).await?;
            }
        }

        let ids: Vec<ItemId> = items.iter().map(|i| i.id).collect();
        let mut view = LibraryView::new(items).with_related(related);
        for &user in users {
            for chunk in ids.chunks(self.batch_size) {
                let data = self.library.user_data(chunk, user).await?;
                view.add_user_data(user, data);
            }
        }
        Ok(view)
    }
}

#[async_trait]
impl JobRunner for RefreshPipeline {
    async fn run(&self, target: TargetId) -> Result<JobSummary> {
        let definition = self
            .registry
            .get(target)
            .ok_or(Error::TargetNotFound(target))?;

        let query = ItemQuery::of_kinds(&definition.definition().media_types);
        let view = self
            .load_view(&query, definition.needs_series(), &definition.users())
            .await?;

        let now = Utc::now();
        let ledger = self.ledger.clone();
        let batch_size = self.batch_size;
        let def = definition.clone();
        let selection = tokio::task::spawn_blocking(move || {
            let evaluator = Evaluator::new(&def, &view, now);
            let matched = evaluator.evaluate(batch_size);
            let total = matched.len();

            let ignored = ledger.ignored_items(def.id(), def.owners(), now);
            let kept: Vec<_> = matched
                .into_iter()
                .filter(|m| !ignored.contains(&m.item.id))
                .collect();
            let dropped = total - kept.len();

            let finished = ordering::finalize(&def, kept);
            Selection {
                items: finished.iter().map(|m| m.item.id).collect(),
                runtime_secs: finished
                    .iter()
                    .map(|m| m.item.runtime_secs.unwrap_or(0))
                    .sum(),
                matched: total,
                ignored: dropped,
            }
        })
        .await?;

        let report = self
            .materializer
            .materialize(target, &selection.items)
            .await?;

        Ok(JobSummary {
            matched: selection.matched,
            ignored: selection.ignored,
            items: selection.items.len(),
            runtime_secs: selection.runtime_secs,
            added: report.added,
            removed: report.removed,
            unchanged: report.unchanged,
        })
    }
}
