//! Refresh, serve and status commands.

use std::path::Path;

use chrono::Utc;
use tokio::runtime::Runtime;

use super::{Env, open_library, open_pool, open_service};
use crate::db::SqliteMaterializer;
use crate::host::SnapshotLibrary;
use crate::model::TargetId;
use crate::refresh::{JobState, RefreshJob};

fn print_job(name: &str, job: &RefreshJob) {
    match job.state {
        JobState::Succeeded => {
            let summary = job.summary.unwrap_or_default();
            println!(
                "OK     {}: {} items ({} matched, {} ignored, +{} -{}{})",
                name,
                summary.items,
                summary.matched,
                summary.ignored,
                summary.added,
                summary.removed,
                if summary.unchanged { ", unchanged" } else { "" }
            );
        }
        JobState::Failed => {
            println!(
                "FAILED {}: {}",
                name,
                job.error.as_deref().unwrap_or("unknown error")
            );
            if let Some(applied) = job.partially_applied {
                println!("       {} changes were applied before the failure", applied);
            }
        }
        state => println!("{:?} {}", state, name),
    }
}

/// Refresh one definition or all of them, and wait for the outcome
pub fn cmd_refresh(
    rt: &Runtime,
    env: &Env,
    id: Option<TargetId>,
    all: bool,
    library: Option<&Path>,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_pool(env).await?;
        let library = open_library(env.library_path(library))?;
        let service = open_service(env, pool, library).await?;

        let targets: Vec<TargetId> = match (id, all) {
            (Some(id), _) => {
                service.refresh(id)?;
                vec![id]
            }
            (None, true) => service.refresh_all()?.into_iter().map(|(t, _)| t).collect(),
            (None, false) => anyhow::bail!("Give a definition id or --all"),
        };

        service.start();
        service.wait_idle().await;

        let mut failed = 0;
        for target in &targets {
            let name = service.get_definition(*target)?.name;
            if let Some(job) = service.get_status(*target)? {
                if job.state == JobState::Failed {
                    failed += 1;
                }
                print_job(&name, &job);
            }
        }
        service.shutdown().await;

        if failed > 0 {
            anyhow::bail!("{} of {} refreshes failed", failed, targets.len());
        }
        anyhow::Ok(())
    })
}

/// Run the workers and the scheduler until Ctrl+C
pub fn cmd_serve(rt: &Runtime, env: &Env, library: Option<&Path>) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_pool(env).await?;
        let library = open_library(env.library_path(library))?;
        let service = open_service(env, pool, library).await?;

        service.start();
        println!(
            "Serving {} definitions. Press Ctrl+C to stop.",
            service.list_definitions().len()
        );

        tokio::signal::ctrl_c().await?;
        println!("\nShutting down...");
        service.shutdown().await;

        let report = service.status_report();
        for job in report.history.iter().rev() {
            let name = service
                .get_definition(job.target)
                .map(|d| d.name)
                .unwrap_or_else(|_| job.target.to_string());
            print_job(&name, job);
        }
        anyhow::Ok(())
    })
}

/// Show definitions with their next run and stored list size
pub fn cmd_status(rt: &Runtime, env: &Env, id: Option<TargetId>) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_pool(env).await?;
        let service = open_service(env, pool.clone(), SnapshotLibrary::default()).await?;
        let materializer = SqliteMaterializer::new(pool);

        let definitions = match id {
            Some(id) => vec![service.get_definition(id)?],
            None => service.list_definitions(),
        };

        let now = Utc::now();
        for def in definitions {
            let stored = materializer.list(def.id).await?.len();
            let next = match service.next_scheduled(def.id) {
                Some(at) => format!("next run {} (in {}m)", at, (at - now).num_minutes()),
                None if !def.enabled => "disabled".to_string(),
                None => format!("{:?}", def.schedule),
            };
            let ignored = service.ignore_list_active(def.id)?.len();
            println!(
                "{}  {}: {} items, {} ignored, {}",
                def.id, def.name, stored, ignored, next
            );
        }
        anyhow::Ok(())
    })
}
