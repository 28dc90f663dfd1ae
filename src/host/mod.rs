//! Ports to the host media library.
//!
//! The engine never owns library data. It reads items and per-user data
//! through [`LibrarySource`] and writes resulting lists through
//! [`Materializer`]. Both are traits so the refresh pipeline can run against
//! a real server, a JSON snapshot ([`SnapshotLibrary`]) or the mocks below.

mod snapshot;

pub use snapshot::{Snapshot, SnapshotLibrary};

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::model::{ItemId, MediaItem, MediaKind, TargetId, UserData, UserId};

/// Failure talking to the host library.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HostError {
    #[error("host library unavailable: {0}")]
    Unavailable(String),

    #[error("invalid library snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("host query failed: {0}")]
    Query(String),
}

/// A materialization that failed, possibly after applying some changes.
///
/// Nothing is rolled back; `applied` says how far it got.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("materialization failed after {applied} changes: {message}")]
pub struct MaterializeError {
    pub applied: usize,
    pub message: String,
}

impl MaterializeError {
    pub fn new(applied: usize, message: impl Into<String>) -> Self {
        Self {
            applied,
            message: message.into(),
        }
    }
}

/// What a materialization changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    pub added: usize,
    pub removed: usize,
    /// The stored list already matched, so nothing was written
    pub unchanged: bool,
}

impl MaterializeReport {
    /// Compare a stored list with the one about to replace it.
    pub fn diff(previous: &[ItemId], next: &[ItemId]) -> Self {
        let old: HashSet<_> = previous.iter().collect();
        let new: HashSet<_> = next.iter().collect();
        Self {
            added: new.difference(&old).count(),
            removed: old.difference(&new).count(),
            unchanged: previous == next,
        }
    }
}

/// Which items to fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemQuery {
    /// Empty means every kind
    pub media_types: Vec<MediaKind>,
    /// Restrict to these ids
    pub ids: Option<Vec<ItemId>>,
}

impl ItemQuery {
    pub fn of_kinds(media_types: &[MediaKind]) -> Self {
        Self {
            media_types: media_types.to_vec(),
            ids: None,
        }
    }

    pub fn by_ids(ids: Vec<ItemId>) -> Self {
        Self {
            media_types: Vec::new(),
            ids: Some(ids),
        }
    }

    pub fn matches(&self, item: &MediaItem) -> bool {
        let kind_ok = self.media_types.is_empty()
            || item.kind.is_some_and(|k| self.media_types.contains(&k));
        let id_ok = self.ids.as_ref().is_none_or(|ids| ids.contains(&item.id));
        kind_ok && id_ok
    }
}

/// Read access to the host library.
#[async_trait]
pub trait LibrarySource: Send + Sync {
    /// Items matching `query`, with all attributes the rules can read.
    async fn query_items(&self, query: &ItemQuery) -> Result<Vec<MediaItem>, HostError>;

    /// Per-user data for a batch of items. Items the user never touched
    /// may be left out.
    async fn user_data(
        &self,
        items: &[ItemId],
        user: UserId,
    ) -> Result<HashMap<ItemId, UserData>, HostError>;
}

/// Write access to the host's stored lists.
#[async_trait]
pub trait Materializer: Send + Sync {
    /// Make the target's list exactly `items`, in order. Calling it with the
    /// list already stored must be a no-op.
    async fn materialize(
        &self,
        target: TargetId,
        items: &[ItemId],
    ) -> Result<MaterializeReport, MaterializeError>;
}
