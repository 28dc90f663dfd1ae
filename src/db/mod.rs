//! Database module for definition, ignore-list and materialized list persistence.
//!
//! Uses SQLx with SQLite for lightweight, embedded database storage.
//! Provides async operations for:
//! - Definition upsert/delete (stored as JSON bodies)
//! - Ignore entry upsert/delete
//! - Ordered materialized lists per target
//!
//! # Example
//!
//! ```ignore
//! use smartlists::db::{init_db, get_definitions};
//!
//! let pool = init_db("sqlite:smartlists.db").await?;
//! let definitions = get_definitions(&pool).await?;
//! ```

mod store;

pub use store::{SqliteMaterializer, SqliteStore, Store};

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::definition::Definition;
use crate::ignore::IgnoredEntry;
use crate::model::{EntryId, ItemId, TargetId};

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "smartlists.db";

/// Build a SQLite database URL from an optional path.
///
/// If no path is provided, uses [`DEFAULT_DB_NAME`] in the current directory.
pub fn db_url(path: Option<&std::path::Path>) -> String {
    match path {
        Some(p) => format!("sqlite:{}", p.display()),
        None => format!("sqlite:{}", DEFAULT_DB_NAME),
    }
}

/// Initialize the database connection pool and run migrations.
///
/// Creates the database file if it doesn't exist, establishes a connection
/// pool with up to 5 connections, and runs all pending migrations.
pub async fn init_db(db_url: &str) -> Result<SqlitePool, sqlx::Error> {
    if !sqlx::Sqlite::database_exists(db_url).await.unwrap_or(false) {
        sqlx::Sqlite::create_database(db_url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

fn decode_err<E>(e: E) -> sqlx::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    sqlx::Error::Decode(Box::new(e))
}

fn parse_id<T>(s: &str) -> sqlx::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    s.parse().map_err(decode_err)
}

/// Insert or replace a definition. `created_at` survives updates.
pub async fn upsert_definition(pool: &SqlitePool, definition: &Definition) -> sqlx::Result<()> {
    let body = serde_json::to_string(definition).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO definitions (id, name, body, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            body = excluded.body,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(definition.id.to_string())
    .bind(&definition.name)
    .bind(body)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// All stored definitions, by name.
pub async fn get_definitions(pool: &SqlitePool) -> sqlx::Result<Vec<Definition>> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT body FROM definitions ORDER BY name, id")
        .fetch_all(pool)
        .await?;
    rows.iter()
        .map(|(body,)| serde_json::from_str(body).map_err(decode_err))
        .collect()
}

pub async fn get_definition(pool: &SqlitePool, id: TargetId) -> sqlx::Result<Option<Definition>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT body FROM definitions WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    row.map(|(body,)| serde_json::from_str(&body).map_err(decode_err))
        .transpose()
}

/// Delete a definition together with its ignore entries and stored list.
///
/// Returns whether the definition existed.
pub async fn delete_definition(pool: &SqlitePool, id: TargetId) -> sqlx::Result<bool> {
    let id = id.to_string();
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM ignored_entries WHERE target_id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM materialized_items WHERE target_id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM definitions WHERE id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

/// Insert or replace ignore entries in a single transaction.
pub async fn upsert_ignored(pool: &SqlitePool, entries: &[IgnoredEntry]) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;
    for entry in entries {
        sqlx::query(
            r#"
            INSERT INTO ignored_entries (id, target_id, item_id, user_id, ignored_at, duration_days)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(target_id, item_id, user_id) DO UPDATE SET
                id = excluded.id,
                ignored_at = excluded.ignored_at,
                duration_days = excluded.duration_days
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.target.to_string())
        .bind(entry.item.to_string())
        .bind(entry.user.to_string())
        .bind(entry.ignored_at)
        .bind(entry.duration_days.map(i64::from))
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

type IgnoredRow = (String, String, String, String, DateTime<Utc>, Option<i64>);

/// Every stored ignore entry, expired ones included.
pub async fn get_ignored(pool: &SqlitePool) -> sqlx::Result<Vec<IgnoredEntry>> {
    let rows: Vec<IgnoredRow> = sqlx::query_as(
        "SELECT id, target_id, item_id, user_id, ignored_at, duration_days FROM ignored_entries",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(id, target, item, user, ignored_at, duration_days)| {
            Ok(IgnoredEntry {
                id: parse_id(&id)?,
                target: parse_id(&target)?,
                item: parse_id(&item)?,
                user: parse_id(&user)?,
                ignored_at,
                duration_days: duration_days.and_then(|d| i32::try_from(d).ok()),
            })
        })
        .collect()
}

/// Delete ignore entries by id. Unknown ids are skipped.
pub async fn delete_ignored(pool: &SqlitePool, ids: &[EntryId]) -> sqlx::Result<u64> {
    let mut tx = pool.begin().await?;
    let mut deleted = 0;
    for id in ids {
        deleted += sqlx::query("DELETE FROM ignored_entries WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?
            .rows_affected();
    }
    tx.commit().await?;
    Ok(deleted)
}

pub async fn delete_ignored_for_target(pool: &SqlitePool, target: TargetId) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM ignored_entries WHERE target_id = ?")
        .bind(target.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// The stored list of a target, in order.
pub async fn get_materialized(pool: &SqlitePool, target: TargetId) -> sqlx::Result<Vec<ItemId>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT item_id FROM materialized_items WHERE target_id = ? ORDER BY position",
    )
    .bind(target.to_string())
    .fetch_all(pool)
    .await?;
    rows.iter().map(|(id,)| parse_id(id)).collect()
}

/// Replace the stored list of a target in a single transaction.
pub async fn replace_materialized(
    pool: &SqlitePool,
    target: TargetId,
    items: &[ItemId],
) -> sqlx::Result<()> {
    let target = target.to_string();
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM materialized_items WHERE target_id = ?")
        .bind(&target)
        .execute(&mut *tx)
        .await?;
    for (position, item) in items.iter().enumerate() {
        sqlx::query("INSERT INTO materialized_items (target_id, position, item_id) VALUES (?, ?, ?)")
            .bind(&target)
            .bind(position as i64)
            .bind(item.to_string())
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}
