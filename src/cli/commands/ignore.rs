//! Ignore list commands.

use tokio::runtime::Runtime;

use super::{Env, open_pool, open_service};
use crate::host::SnapshotLibrary;
use crate::model::{EntryId, ItemId, TargetId, UserId};

/// Ignore items in a definition
pub fn cmd_ignore_add(
    rt: &Runtime,
    env: &Env,
    target: TargetId,
    user: UserId,
    items: &[ItemId],
    days: Option<i32>,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_pool(env).await?;
        let service = open_service(env, pool, SnapshotLibrary::default()).await?;
        let added = service.ignore_bulk_add(target, items, user, days).await?;
        for entry in &added {
            match entry.expires_at() {
                Some(at) => println!("{}  {} until {}", entry.id, entry.item, at),
                None => println!("{}  {} permanently", entry.id, entry.item),
            }
        }
        anyhow::Ok(())
    })
}

/// List active ignore entries
pub fn cmd_ignore_list(rt: &Runtime, env: &Env, target: TargetId) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_pool(env).await?;
        let service = open_service(env, pool, SnapshotLibrary::default()).await?;
        let entries = service.ignore_list_active(target)?;
        if entries.is_empty() {
            println!("No active ignore entries.");
        }
        for entry in entries {
            let expires = entry
                .expires_at()
                .map(|at| at.to_string())
                .unwrap_or_else(|| "never".to_string());
            println!(
                "{}  item {}  user {}  expires {}",
                entry.id, entry.item, entry.user, expires
            );
        }
        anyhow::Ok(())
    })
}

/// Remove ignore entries
pub fn cmd_ignore_remove(rt: &Runtime, env: &Env, ids: &[EntryId]) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_pool(env).await?;
        let service = open_service(env, pool, SnapshotLibrary::default()).await?;
        if let [id] = ids {
            let entry = service.ignore_remove(*id).await?;
            println!("Removed {} (item {})", entry.id, entry.item);
        } else {
            let removed = service.ignore_bulk_remove(ids).await?;
            println!("Removed {} of {} entries", removed, ids.len());
        }
        anyhow::Ok(())
    })
}

/// Remove every ignore entry of a definition
pub fn cmd_ignore_clear(rt: &Runtime, env: &Env, target: TargetId) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_pool(env).await?;
        let service = open_service(env, pool, SnapshotLibrary::default()).await?;
        let cleared = service.ignore_clear_all(target).await?;
        println!("Cleared {} entries", cleared);
        anyhow::Ok(())
    })
}
