//! Test utilities and fixtures for smartlists tests.
//!
//! This module provides common test helpers, fixture factories, and
//! database utilities to reduce boilerplate in tests.
//!
//! # Example
//!
//! ```ignore
//! use smartlists::test_utils::{temp_db, favorites_definition};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (pool, _dir) = temp_db().await;
//!     let def = favorites_definition(UserId::new());
//!     // ... test logic
//! }
//! ```

use std::collections::HashMap;

use sqlx::sqlite::SqlitePool;
use tempfile::TempDir;

use crate::definition::Definition;
use crate::model::{ItemId, MediaItem, MediaKind, UserData, UserId};
use crate::rules::{Expression, ExpressionSet, Field, Operator};

/// Creates a temporary database for testing.
///
/// The database is created in a temporary directory that is automatically
/// cleaned up when the returned `TempDir` is dropped. Migrations are run
/// automatically.
///
/// Keep the TempDir alive for the duration of your test.
pub async fn temp_db() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = dir.path().join("test.db");
    let db_url = crate::db::db_url(Some(&db_path));

    let pool = crate::db::init_db(&db_url)
        .await
        .expect("Failed to initialize test database");

    (pool, dir)
}

/// An audio definition owned by `owner` selecting their favorites.
pub fn favorites_definition(owner: UserId) -> Definition {
    let mut def = Definition::new("Favorites", owner, vec![MediaKind::Audio]);
    def.expression_sets = vec![ExpressionSet::new(vec![Expression::new(
        Field::IsFavorite,
        Operator::Equal,
        "true",
    )])];
    def
}

/// Audio items with the given names, in order.
pub fn mock_songs(names: &[&str]) -> Vec<MediaItem> {
    names
        .iter()
        .map(|name| MediaItem::new(MediaKind::Audio, *name))
        .collect()
}

/// Per-user data marking every given item as a favorite.
pub fn favorite_data<'a>(
    items: impl IntoIterator<Item = &'a MediaItem>,
) -> HashMap<ItemId, UserData> {
    items
        .into_iter()
        .map(|item| {
            let data = UserData {
                favorite: true,
                ..Default::default()
            };
            (item.id, data)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_db_creates_working_database() {
        let (pool, _dir) = temp_db().await;

        let definitions = crate::db::get_definitions(&pool).await.unwrap();
        assert!(definitions.is_empty());
    }

    #[test]
    fn test_favorites_definition_compiles() {
        let owner = UserId::new();
        let compiled = favorites_definition(owner).compile().unwrap();
        assert_eq!(compiled.primary_owner(), owner);
        assert_eq!(compiled.expressions().count(), 1);
    }

    #[test]
    fn test_favorite_data() {
        let songs = mock_songs(&["a", "b", "c"]);
        let data = favorite_data(&songs[..2]);
        assert_eq!(data.len(), 2);
        assert!(data[&songs[0].id].favorite);
        assert!(!data.contains_key(&songs[2].id));
    }
}
