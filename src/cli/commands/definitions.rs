//! Field listing and definition management commands.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use tokio::runtime::Runtime;

use super::{Env, open_library, open_pool, open_service};
use crate::db::{self, SqliteMaterializer, SqliteStore, Store};
use crate::definition::Definition;
use crate::error::Error;
use crate::host::SnapshotLibrary;
use crate::model::{ItemId, TargetId};
use crate::rules::FieldSchema;

/// Print the field catalogue
pub fn cmd_fields(json: bool) -> anyhow::Result<()> {
    let schema = FieldSchema::new();
    if json {
        println!("{}", serde_json::to_string_pretty(schema.fields())?);
        return Ok(());
    }

    for d in schema.fields() {
        let ops: Vec<String> = d.operators.iter().map(|op| format!("{:?}", op)).collect();
        println!(
            "{:<18} {:<12} {}{}",
            format!("{:?}", d.field),
            format!("{:?}", d.field_type),
            ops.join(", "),
            if d.user_scoped { "  [per user]" } else { "" }
        );
    }
    Ok(())
}

fn read_definition(file: &Path) -> anyhow::Result<Definition> {
    let contents =
        std::fs::read_to_string(file).with_context(|| format!("Failed to read {:?}", file))?;
    let definition = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse definition {:?}", file))?;
    Ok(definition)
}

/// Check a definition file
pub fn cmd_validate(file: &Path) -> anyhow::Result<()> {
    let definition = read_definition(file)?;
    let compiled = definition.compile()?;
    println!("OK: {} ({})", definition.name, definition.id);
    println!("  Rule groups: {}", compiled.sets().len());
    println!("  Rules:       {}", compiled.expressions().count());
    println!("  Media types: {:?}", definition.media_types);
    println!("  Schedule:    {:?}", definition.schedule);
    Ok(())
}

/// Save a definition file
pub fn cmd_add(rt: &Runtime, env: &Env, file: &Path, replace: bool) -> anyhow::Result<()> {
    let definition = read_definition(file)?;
    rt.block_on(async {
        let pool = open_pool(env).await?;
        let service = open_service(env, pool, SnapshotLibrary::default()).await?;
        let id = if replace {
            service.update_definition(definition).await?
        } else {
            service.create_definition(definition).await?
        };
        println!("Saved definition {}", id);
        anyhow::Ok(())
    })
}

/// List stored definitions
pub fn cmd_list(rt: &Runtime, env: &Env) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_pool(env).await?;
        let definitions = SqliteStore::new(pool).load_definitions().await?;
        if definitions.is_empty() {
            println!("No definitions.");
        }
        for def in definitions {
            println!(
                "{}  {}{}  ({} rule groups)",
                def.id,
                def.name,
                if def.enabled { "" } else { " [disabled]" },
                def.expression_sets.len()
            );
        }
        anyhow::Ok(())
    })
}

/// Delete a definition
pub fn cmd_remove(rt: &Runtime, env: &Env, id: TargetId) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_pool(env).await?;
        let service = open_service(env, pool, SnapshotLibrary::default()).await?;
        service.delete_definition(id).await?;
        println!("Deleted definition {}", id);
        anyhow::Ok(())
    })
}

/// Print a definition's materialized list
pub fn cmd_show(
    rt: &Runtime,
    env: &Env,
    id: TargetId,
    library: Option<&Path>,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_pool(env).await?;
        let definition = db::get_definition(&pool, id)
            .await?
            .ok_or(Error::TargetNotFound(id))?;
        let items = SqliteMaterializer::new(pool).list(id).await?;

        let names: HashMap<ItemId, String> = match env.library_path(library) {
            Some(path) => open_library(Some(path))?
                .items()
                .iter()
                .map(|i| (i.id, i.name.clone()))
                .collect(),
            None => HashMap::new(),
        };

        println!("{} ({} items)", definition.name, items.len());
        for (n, item) in items.iter().enumerate() {
            match names.get(item) {
                Some(name) => println!("{:>4}. {}  {}", n + 1, item, name),
                None => println!("{:>4}. {}", n + 1, item),
            }
        }
        anyhow::Ok(())
    })
}
