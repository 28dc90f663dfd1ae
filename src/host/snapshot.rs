//! A host library read from a JSON snapshot file.
//!
//! The file holds every item plus per-user data keyed by user id then item
//! id:
//!
//! ```json
//! {
//!   "items": [{ "id": "…", "kind": "Audio", "name": "Song", "genres": ["Rock"] }],
//!   "user_data": { "<user id>": { "<item id>": { "favorite": true } } }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{HostError, ItemQuery, LibrarySource};
use crate::model::{ItemId, MediaItem, UserData, UserId};

/// On-disk snapshot layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub items: Vec<MediaItem>,
    pub user_data: HashMap<UserId, HashMap<ItemId, UserData>>,
}

/// [`LibrarySource`] backed by a [`Snapshot`].
#[derive(Debug, Clone, Default)]
pub struct SnapshotLibrary {
    snapshot: Snapshot,
}

impl SnapshotLibrary {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    /// Read and parse a snapshot file.
    pub fn load(path: &Path) -> Result<Self, HostError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            HostError::Unavailable(format!("cannot read {}: {}", path.display(), e))
        })?;
        let snapshot: Snapshot = serde_json::from_str(&contents)
            .map_err(|e| HostError::InvalidSnapshot(format!("{}: {}", path.display(), e)))?;
        tracing::info!(
            "Loaded library snapshot {:?} ({} items, {} users)",
            path,
            snapshot.items.len(),
            snapshot.user_data.len()
        );
        Ok(Self::new(snapshot))
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.snapshot.items
    }
}

#[async_trait]
impl LibrarySource for SnapshotLibrary {
    async fn query_items(&self, query: &ItemQuery) -> Result<Vec<MediaItem>, HostError> {
        Ok(self
            .snapshot
            .items
            .iter()
            .filter(|item| query.matches(item))
            .cloned()
            .collect())
    }

    async fn user_data(
        &self,
        items: &[ItemId],
        user: UserId,
    ) -> Result<HashMap<ItemId, UserData>, HostError> {
        let Some(data) = self.snapshot.user_data.get(&user) else {
            return Ok(HashMap::new());
        };
        Ok(items
            .iter()
            .filter_map(|id| data.get(id).map(|d| (*id, *d)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MediaKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_and_query() {
        let user = UserId::new();
        let song = MediaItem::new(MediaKind::Audio, "Song");
        let film = MediaItem::new(MediaKind::Movie, "Film");
        let snapshot = Snapshot {
            items: vec![song.clone(), film],
            user_data: HashMap::from([(
                user,
                HashMap::from([(song.id, UserData { favorite: true, ..Default::default() })]),
            )]),
        };

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("library.json");
        std::fs::write(&path, serde_json::to_string(&snapshot).unwrap()).unwrap();

        let library = SnapshotLibrary::load(&path).unwrap();
        let audio = library
            .query_items(&ItemQuery::of_kinds(&[MediaKind::Audio]))
            .await
            .unwrap();
        assert_eq!(audio.len(), 1);
        assert_eq!(audio[0].name, "Song");

        let data = library.user_data(&[song.id], user).await.unwrap();
        assert!(data[&song.id].favorite);
        assert!(library.user_data(&[song.id], UserId::new()).await.unwrap().is_empty());
    }

    #[test]
    fn test_load_errors() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            SnapshotLibrary::load(&missing),
            Err(HostError::Unavailable(_))
        ));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        assert!(matches!(
            SnapshotLibrary::load(&bad),
            Err(HostError::InvalidSnapshot(_))
        ));
    }
}
