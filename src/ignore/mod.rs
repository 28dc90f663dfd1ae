//! Time-bounded exclusions of items from a target.
//!
//! An [`IgnoredEntry`] hides one item from one target for one user, either
//! for a number of days or permanently. Expiry is lazy: an entry whose
//! expiry has passed simply stops being active, and [`IgnoreLedger::purge_expired`]
//! can drop it later for tidiness.
//!
//! The ledger is consulted after evaluation and before materialization.
//! It never changes what the rules match.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::model::{EntryId, ItemId, TargetId, UserId};

/// One exclusion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoredEntry {
    pub id: EntryId,
    pub target: TargetId,
    pub item: ItemId,
    pub user: UserId,
    pub ignored_at: DateTime<Utc>,
    /// `None` or anything up to `0` means permanent
    pub duration_days: Option<i32>,
}

impl IgnoredEntry {
    pub fn new(
        target: TargetId,
        item: ItemId,
        user: UserId,
        duration_days: Option<i32>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntryId::new(),
            target,
            item,
            user,
            ignored_at: now,
            duration_days,
        }
    }

    /// When the entry lapses. Permanent entries never do.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.duration_days
            .filter(|&d| d > 0)
            .and_then(|d| self.ignored_at.checked_add_signed(Duration::days(i64::from(d))))
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_none_or(|expires| now < expires)
    }

    fn key(&self) -> (TargetId, ItemId, UserId) {
        (self.target, self.item, self.user)
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<EntryId, IgnoredEntry>,
    by_key: HashMap<(TargetId, ItemId, UserId), EntryId>,
}

impl Inner {
    fn insert(&mut self, entry: IgnoredEntry) {
        self.by_key.insert(entry.key(), entry.id);
        self.entries.insert(entry.id, entry);
    }

    fn remove(&mut self, id: EntryId) -> Option<IgnoredEntry> {
        let entry = self.entries.remove(&id)?;
        self.by_key.remove(&entry.key());
        Some(entry)
    }
}

/// In-memory ignore entries, safe to share between workers.
///
/// Persistence is the caller's job; the ledger returns whatever changed so
/// it can be written through.
#[derive(Debug, Default)]
pub struct IgnoreLedger {
    inner: RwLock<Inner>,
}

impl IgnoreLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the ledger's contents with previously stored entries.
    pub fn load(&self, entries: impl IntoIterator<Item = IgnoredEntry>) {
        let mut inner = self.inner.write();
        *inner = Inner::default();
        for entry in entries {
            inner.insert(entry);
        }
        tracing::debug!(target: "ignore", "Loaded {} ignore entries", inner.entries.len());
    }

    /// Ignore `item` in `target` for `user`.
    ///
    /// An existing entry for the same triple is renewed in place and keeps
    /// its id.
    pub fn add(
        &self,
        target: TargetId,
        item: ItemId,
        user: UserId,
        duration_days: Option<i32>,
        now: DateTime<Utc>,
    ) -> IgnoredEntry {
        let mut inner = self.inner.write();
        let mut entry = IgnoredEntry::new(target, item, user, duration_days, now);
        if let Some(&existing) = inner.by_key.get(&entry.key()) {
            entry.id = existing;
        }
        inner.insert(entry.clone());
        entry
    }

    pub fn bulk_add(
        &self,
        target: TargetId,
        items: &[ItemId],
        user: UserId,
        duration_days: Option<i32>,
        now: DateTime<Utc>,
    ) -> Vec<IgnoredEntry> {
        let added: Vec<_> = items
            .iter()
            .map(|&item| self.add(target, item, user, duration_days, now))
            .collect();
        tracing::debug!(target: "ignore", "Ignored {} items in {}", added.len(), target);
        added
    }

    pub fn get(&self, id: EntryId) -> Option<IgnoredEntry> {
        self.inner.read().entries.get(&id).cloned()
    }

    /// Remove one entry. Removing an unknown id does nothing.
    pub fn remove(&self, id: EntryId) -> Option<IgnoredEntry> {
        self.inner.write().remove(id)
    }

    /// Remove several entries, returning the ones that existed.
    pub fn bulk_remove(&self, ids: &[EntryId]) -> Vec<IgnoredEntry> {
        let mut inner = self.inner.write();
        ids.iter().filter_map(|&id| inner.remove(id)).collect()
    }

    /// Remove every entry of a target, active or not.
    pub fn clear_all(&self, target: TargetId) -> usize {
        let mut inner = self.inner.write();
        let ids: Vec<EntryId> = inner
            .entries
            .values()
            .filter(|e| e.target == target)
            .map(|e| e.id)
            .collect();
        for &id in &ids {
            inner.remove(id);
        }
        ids.len()
    }

    pub fn is_ignored(
        &self,
        target: TargetId,
        item: ItemId,
        user: UserId,
        now: DateTime<Utc>,
    ) -> bool {
        let inner = self.inner.read();
        inner
            .by_key
            .get(&(target, item, user))
            .and_then(|id| inner.entries.get(id))
            .is_some_and(|e| e.is_active(now))
    }

    /// Items any of `users` currently ignores in `target`.
    pub fn ignored_items(
        &self,
        target: TargetId,
        users: &[UserId],
        now: DateTime<Utc>,
    ) -> HashSet<ItemId> {
        self.inner
            .read()
            .entries
            .values()
            .filter(|e| e.target == target && users.contains(&e.user) && e.is_active(now))
            .map(|e| e.item)
            .collect()
    }

    /// Active entries of a target, oldest first.
    pub fn list_active(&self, target: TargetId, now: DateTime<Utc>) -> Vec<IgnoredEntry> {
        let mut entries: Vec<_> = self
            .inner
            .read()
            .entries
            .values()
            .filter(|e| e.target == target && e.is_active(now))
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.ignored_at, e.id));
        entries
    }

    /// Drop lapsed entries and return their ids.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Vec<EntryId> {
        let mut inner = self.inner.write();
        let expired: Vec<EntryId> = inner
            .entries
            .values()
            .filter(|e| !e.is_active(now))
            .map(|e| e.id)
            .collect();
        for &id in &expired {
            inner.remove(id);
        }
        if !expired.is_empty() {
            tracing::debug!(target: "ignore", "Purged {} expired entries", expired.len());
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_seven_day_entry() {
        let entry = IgnoredEntry::new(TargetId::new(), ItemId::new(), UserId::new(), Some(7), now());
        assert_eq!(entry.expires_at(), Some(now() + Duration::days(7)));
        assert!(entry.is_active(now()));
        assert!(entry.is_active(now() + Duration::days(7) - Duration::seconds(1)));
        assert!(!entry.is_active(now() + Duration::days(7)));
    }

    #[test]
    fn test_permanent_entries() {
        for duration in [None, Some(0), Some(-3)] {
            let entry =
                IgnoredEntry::new(TargetId::new(), ItemId::new(), UserId::new(), duration, now());
            assert_eq!(entry.expires_at(), None);
            assert!(entry.is_active(now() + Duration::days(36_500)));
        }
    }

    #[test]
    fn test_negative_duration_deserializes_as_permanent() {
        let entry = IgnoredEntry::new(TargetId::new(), ItemId::new(), UserId::new(), None, now());
        let mut json = serde_json::to_value(&entry).unwrap();
        json["duration_days"] = serde_json::json!(-1);

        let parsed: IgnoredEntry = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.duration_days, Some(-1));
        assert_eq!(parsed.expires_at(), None);
        assert!(parsed.is_active(now() + Duration::days(365)));
    }

    #[test]
    fn test_add_renews_same_triple() {
        let ledger = IgnoreLedger::new();
        let (t, i, u) = (TargetId::new(), ItemId::new(), UserId::new());
        let first = ledger.add(t, i, u, Some(1), now());
        let later = now() + Duration::days(5);
        let second = ledger.add(t, i, u, Some(1), later);

        assert_eq!(first.id, second.id);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.is_ignored(t, i, u, later + Duration::hours(12)));
    }

    #[test]
    fn test_is_ignored_is_per_user_and_target() {
        let ledger = IgnoreLedger::new();
        let (t, i, u) = (TargetId::new(), ItemId::new(), UserId::new());
        ledger.add(t, i, u, None, now());

        assert!(ledger.is_ignored(t, i, u, now()));
        assert!(!ledger.is_ignored(t, i, UserId::new(), now()));
        assert!(!ledger.is_ignored(TargetId::new(), i, u, now()));
    }

    #[test]
    fn test_removal_is_idempotent() {
        let ledger = IgnoreLedger::new();
        let t = TargetId::new();
        let u = UserId::new();
        let a = ledger.add(t, ItemId::new(), u, None, now());
        let b = ledger.add(t, ItemId::new(), u, None, now());

        assert!(ledger.remove(a.id).is_some());
        assert!(ledger.remove(a.id).is_none());

        let removed = ledger.bulk_remove(&[a.id, b.id, EntryId::new()]);
        assert_eq!(removed.len(), 1);
        assert_eq!(ledger.clear_all(t), 0);
    }

    #[test]
    fn test_clear_all_only_touches_target() {
        let ledger = IgnoreLedger::new();
        let (keep, drop) = (TargetId::new(), TargetId::new());
        let u = UserId::new();
        ledger.bulk_add(drop, &[ItemId::new(), ItemId::new()], u, None, now());
        ledger.add(keep, ItemId::new(), u, None, now());

        assert_eq!(ledger.clear_all(drop), 2);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.list_active(keep, now()).len(), 1);
    }

    #[test]
    fn test_expired_entries_hidden_then_purged() {
        let ledger = IgnoreLedger::new();
        let t = TargetId::new();
        let u = UserId::new();
        let short = ledger.add(t, ItemId::new(), u, Some(1), now());
        ledger.add(t, ItemId::new(), u, None, now());

        let later = now() + Duration::days(2);
        assert_eq!(ledger.list_active(t, later).len(), 1);
        assert_eq!(ledger.ignored_items(t, &[u], later).len(), 1);
        assert_eq!(ledger.len(), 2);

        assert_eq!(ledger.purge_expired(later), vec![short.id]);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_ignored_items_any_owner() {
        let ledger = IgnoreLedger::new();
        let t = TargetId::new();
        let (alice, bob, carol) = (UserId::new(), UserId::new(), UserId::new());
        let item = ItemId::new();
        ledger.add(t, item, bob, None, now());

        assert!(ledger.ignored_items(t, &[alice, bob], now()).contains(&item));
        assert!(ledger.ignored_items(t, &[alice, carol], now()).is_empty());
    }

    #[test]
    fn test_load_replaces_contents() {
        let ledger = IgnoreLedger::new();
        ledger.add(TargetId::new(), ItemId::new(), UserId::new(), None, now());
        let stored = IgnoredEntry::new(TargetId::new(), ItemId::new(), UserId::new(), None, now());
        ledger.load(vec![stored.clone()]);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get(stored.id), Some(stored));
    }
}
