//! CLI command definitions and dispatch.
//!
//! Each group of subcommands lives in its own submodule:
//! - `definitions`: field listing, validation and definition CRUD
//! - `refresh`: one-shot refreshes, the long-running server, status
//! - `ignore`: ignore list management

mod definitions;
mod ignore;
mod refresh;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use tokio::runtime::Runtime;

use crate::config::{self, Config};
use crate::db::{self, SqliteMaterializer, SqliteStore};
use crate::host::{Snapshot, SnapshotLibrary};
use crate::model::{EntryId, ItemId, TargetId, UserId};
use crate::service::SmartListService;

pub use definitions::{cmd_add, cmd_fields, cmd_list, cmd_remove, cmd_show, cmd_validate};
pub use ignore::{cmd_ignore_add, cmd_ignore_clear, cmd_ignore_list, cmd_ignore_remove};
pub use refresh::{cmd_refresh, cmd_serve, cmd_status};

/// Smart playlist and collection engine
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: OS config dir)
    #[arg(long, global = true, env = "SMARTLISTS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database path (overrides the config file)
    #[arg(long, global = true, env = "SMARTLISTS_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// List every rule field with its type and operators
    Fields {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check a definition file without saving it
    Validate {
        /// Path to a JSON definition
        file: PathBuf,
    },
    /// Save a definition from a JSON file
    Add {
        /// Path to a JSON definition
        file: PathBuf,
        /// Replace an existing definition with the same id
        #[arg(long)]
        replace: bool,
    },
    /// List stored definitions
    List,
    /// Delete a definition with its ignore list
    Remove {
        id: TargetId,
    },
    /// Show the materialized list of a definition
    Show {
        id: TargetId,
        /// Library snapshot used to print item names
        #[arg(short, long)]
        library: Option<PathBuf>,
    },
    /// Refresh one definition, or all of them
    Refresh {
        id: Option<TargetId>,
        /// Refresh every enabled definition
        #[arg(long, conflicts_with = "id")]
        all: bool,
        /// Library snapshot to evaluate against
        #[arg(short, long)]
        library: Option<PathBuf>,
    },
    /// Run workers and the scheduler until Ctrl+C
    Serve {
        /// Library snapshot to evaluate against
        #[arg(short, long)]
        library: Option<PathBuf>,
    },
    /// Show definitions with their schedule and stored list size
    Status {
        id: Option<TargetId>,
    },
    /// Manage ignore lists
    Ignore {
        #[command(subcommand)]
        action: IgnoreAction,
    },
}

#[derive(Subcommand)]
pub enum IgnoreAction {
    /// Ignore items in a definition for a user
    Add {
        target: TargetId,
        #[arg(short, long)]
        user: UserId,
        #[arg(required = true)]
        items: Vec<ItemId>,
        /// Days until the entry lapses (0 or less = permanent)
        #[arg(short, long, allow_negative_numbers = true)]
        days: Option<i32>,
    },
    /// List entries still in effect
    List {
        target: TargetId,
    },
    /// Remove entries by id
    Remove {
        #[arg(required = true)]
        ids: Vec<EntryId>,
    },
    /// Remove every entry of a definition
    Clear {
        target: TargetId,
    },
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;
    let config = match &cli.config {
        Some(path) => config::load_from(path),
        None => config::load(),
    };
    let env = Env {
        db_path: cli.db.clone().unwrap_or_else(|| config.database.path.clone()),
        config,
    };

    match &cli.command {
        Commands::Fields { json } => cmd_fields(*json),
        Commands::Validate { file } => cmd_validate(file),
        Commands::Add { file, replace } => cmd_add(&rt, &env, file, *replace),
        Commands::List => cmd_list(&rt, &env),
        Commands::Remove { id } => cmd_remove(&rt, &env, *id),
        Commands::Show { id, library } => cmd_show(&rt, &env, *id, library.as_deref()),
        Commands::Refresh { id, all, library } => {
            cmd_refresh(&rt, &env, *id, *all, library.as_deref())
        }
        Commands::Serve { library } => cmd_serve(&rt, &env, library.as_deref()),
        Commands::Status { id } => cmd_status(&rt, &env, *id),
        Commands::Ignore { action } => match action {
            IgnoreAction::Add {
                target,
                user,
                items,
                days,
            } => cmd_ignore_add(&rt, &env, *target, *user, items, *days),
            IgnoreAction::List { target } => cmd_ignore_list(&rt, &env, *target),
            IgnoreAction::Remove { ids } => cmd_ignore_remove(&rt, &env, ids),
            IgnoreAction::Clear { target } => cmd_ignore_clear(&rt, &env, *target),
        },
    }
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// Settings resolved from flags and the config file.
pub struct Env {
    pub config: Config,
    pub db_path: PathBuf,
}

impl Env {
    /// Snapshot path from the flag, else the config file.
    fn library_path<'a>(&'a self, flag: Option<&'a Path>) -> Option<&'a Path> {
        flag.or(self.config.library.snapshot_path.as_deref())
    }
}

pub(crate) async fn open_pool(env: &Env) -> anyhow::Result<SqlitePool> {
    let pool = db::init_db(&db::db_url(Some(&env.db_path))).await?;
    Ok(pool)
}

/// Open the library snapshot, or an empty library when none is configured.
pub(crate) fn open_library(path: Option<&Path>) -> anyhow::Result<SnapshotLibrary> {
    match path {
        Some(p) => Ok(SnapshotLibrary::load(p)?),
        None => {
            tracing::warn!("No library snapshot given, evaluating against an empty library");
            Ok(SnapshotLibrary::new(Snapshot::default()))
        }
    }
}

/// Build a service over the database with stored state loaded.
pub(crate) async fn open_service(
    env: &Env,
    pool: SqlitePool,
    library: SnapshotLibrary,
) -> anyhow::Result<SmartListService> {
    let service = SmartListService::new(
        Arc::new(SqliteStore::new(pool.clone())),
        Arc::new(library),
        Arc::new(SqliteMaterializer::new(pool)),
        env.config.service_config(),
    );
    service.load().await?;
    Ok(service)
}
