//! Persistence port for the engine and its SQLite implementation.

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::*;
use crate::error::{Result, ResultExt};
use crate::host::{MaterializeError, MaterializeReport, Materializer};

/// Durable storage for definitions and ignore entries.
///
/// Every write is atomic per call.
#[async_trait]
pub trait Store: Send + Sync {
    async fn load_definitions(&self) -> Result<Vec<Definition>>;
    async fn save_definition(&self, definition: &Definition) -> Result<()>;
    /// Also drops the target's ignore entries. Returns whether it existed.
    async fn delete_definition(&self, id: TargetId) -> Result<bool>;

    async fn load_ignored(&self) -> Result<Vec<IgnoredEntry>>;
    async fn save_ignored(&self, entries: &[IgnoredEntry]) -> Result<()>;
    async fn delete_ignored(&self, ids: &[EntryId]) -> Result<u64>;
    async fn clear_ignored(&self, target: TargetId) -> Result<u64>;
}

/// [`Store`] backed by the SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn load_definitions(&self) -> Result<Vec<Definition>> {
        get_definitions(&self.pool)
            .await
            .with_context("Failed to load definitions")
    }

    async fn save_definition(&self, definition: &Definition) -> Result<()> {
        upsert_definition(&self.pool, definition)
            .await
            .with_context(format!("Failed to save definition {}", definition.id))?;
        tracing::debug!(target: "store", "Saved definition {}", definition.id);
        Ok(())
    }

    async fn delete_definition(&self, id: TargetId) -> Result<bool> {
        let existed = delete_definition(&self.pool, id)
            .await
            .with_context(format!("Failed to delete definition {}", id))?;
        tracing::debug!(target: "store", "Deleted definition {}", id);
        Ok(existed)
    }

    async fn load_ignored(&self) -> Result<Vec<IgnoredEntry>> {
        get_ignored(&self.pool)
            .await
            .with_context("Failed to load ignore entries")
    }

    async fn save_ignored(&self, entries: &[IgnoredEntry]) -> Result<()> {
        upsert_ignored(&self.pool, entries)
            .await
            .with_context(format!("Failed to save {} ignore entries", entries.len()))
    }

    async fn delete_ignored(&self, ids: &[EntryId]) -> Result<u64> {
        delete_ignored(&self.pool, ids)
            .await
            .with_context(format!("Failed to delete {} ignore entries", ids.len()))
    }

    async fn clear_ignored(&self, target: TargetId) -> Result<u64> {
        delete_ignored_for_target(&self.pool, target)
            .await
            .with_context(format!("Failed to clear ignore entries of {}", target))
    }
}

/// Keeps materialized lists in the `materialized_items` table.
///
/// The whole list is replaced in one transaction, so a failure never
/// leaves a half-written list behind.
#[derive(Debug, Clone)]
pub struct SqliteMaterializer {
    pool: SqlitePool,
}

impl SqliteMaterializer {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The stored list of a target.
    pub async fn list(&self, target: TargetId) -> Result<Vec<ItemId>> {
        get_materialized(&self.pool, target)
            .await
            .with_context(format!("Failed to read list of {}", target))
    }
}

#[async_trait]
impl Materializer for SqliteMaterializer {
    async fn materialize(
        &self,
        target: TargetId,
        items: &[ItemId],
    ) -> std::result::Result<MaterializeReport, MaterializeError> {
        let previous = get_materialized(&self.pool, target)
            .await
            .map_err(|e| MaterializeError::new(0, e.to_string()))?;

        let report = MaterializeReport::diff(&previous, items);
        if report.unchanged {
            tracing::debug!(target: "store", "List of {} unchanged", target);
            return Ok(report);
        }

        replace_materialized(&self.pool, target, items)
            .await
            .map_err(|e| MaterializeError::new(0, e.to_string()))?;
        tracing::debug!(
            target: "store",
            "Materialized {}: +{} -{}",
            target,
            report.added,
            report.removed
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MediaKind, UserId};
    use crate::test_utils::temp_db;
    use chrono::Utc;

    #[tokio::test]
    async fn test_store_round_trip() {
        let (pool, _dir) = temp_db().await;
        let store = SqliteStore::new(pool);

        let def = Definition::new("Kids", UserId::new(), vec![MediaKind::Movie]);
        store.save_definition(&def).await.unwrap();
        let entry = IgnoredEntry::new(def.id, ItemId::new(), UserId::new(), Some(3), Utc::now());
        store.save_ignored(std::slice::from_ref(&entry)).await.unwrap();

        assert_eq!(store.load_definitions().await.unwrap(), vec![def.clone()]);
        assert_eq!(store.load_ignored().await.unwrap()[0].id, entry.id);

        assert_eq!(store.clear_ignored(def.id).await.unwrap(), 1);
        assert!(store.delete_definition(def.id).await.unwrap());
        assert!(store.load_definitions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_materializer_diffs_and_skips_unchanged() {
        let (pool, _dir) = temp_db().await;
        let materializer = SqliteMaterializer::new(pool);
        let target = TargetId::new();
        let (a, b, c) = (ItemId::new(), ItemId::new(), ItemId::new());

        let first = materializer.materialize(target, &[a, b]).await.unwrap();
        assert_eq!((first.added, first.removed, first.unchanged), (2, 0, false));

        let same = materializer.materialize(target, &[a, b]).await.unwrap();
        assert!(same.unchanged);

        let next = materializer.materialize(target, &[c, a]).await.unwrap();
        assert_eq!((next.added, next.removed), (1, 1));
        assert_eq!(materializer.list(target).await.unwrap(), vec![c, a]);

        // Reordering alone is still a change
        let reordered = materializer.materialize(target, &[a, c]).await.unwrap();
        assert!(!reordered.unchanged);
        assert_eq!((reordered.added, reordered.removed), (0, 0));
    }
}
