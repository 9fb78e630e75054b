// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One function per subcommand. Every command other than `daemon` opens
//! the store directly rather than talking to a running daemon process —
//! the store is a single SQLite file, so there is nothing a running
//! daemon can tell an administrative command that the file itself
//! can't.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use conductor_adapters::notify::NoOpNotifyAdapter;
use conductor_adapters::session::TmuxAdapter;
use conductor_adapters::traced::TracedSession;
use conductor_core::clock::{Clock, SystemClock};
use conductor_core::config::Config;
use conductor_core::project::ProjectStatus;
use conductor_core::{ProjectId, ProjectSpec};
use conductor_engine::Runtime;
use conductor_storage::{ProjectPatch, Store};

use crate::exit_error::ExitError;

pub const EXIT_NOT_FOUND: i32 = 4;
pub const EXIT_STATE_CONFLICT: i32 = 5;

pub fn enqueue(config: &Config, spec: PathBuf, project: PathBuf) -> Result<()> {
    let store = Store::open(&config.db_path()).context("opening store")?;
    let now = SystemClock.unix_time();
    let spec_path = spec.to_string_lossy();
    let dependencies: Vec<ProjectId> = ProjectSpec::read(&spec_path).dependencies.into_iter().map(ProjectId::new).collect();
    let id = store
        .enqueue(&spec_path, &project.to_string_lossy(), &dependencies, now)
        .context("enqueueing project")?;
    println!("{id}");
    Ok(())
}

pub fn list(config: &Config) -> Result<()> {
    let store = Store::open(&config.db_path()).context("opening store")?;
    let projects = store.list_projects().context("listing projects")?;

    println!("{:<24} {:<12} {:<20} {:<12} {:<12}", "ID", "STATUS", "SESSION", "ENQUEUED", "STARTED");
    for p in projects {
        println!(
            "{:<24} {:<12} {:<20} {:<12} {:<12}",
            p.id,
            p.status.as_str(),
            p.session_name.as_deref().unwrap_or("-"),
            p.enqueued_at,
            p.started_at.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string()),
        );
    }
    Ok(())
}

pub fn reset(config: &Config, id: ProjectId) -> Result<()> {
    let store = Store::open(&config.db_path()).context("opening store")?;
    let project = store
        .get_project(&id)
        .context("looking up project")?
        .ok_or_else(|| ExitError::new(EXIT_NOT_FOUND, format!("no such project: {id}")))?;

    if project.status != ProjectStatus::Failed {
        return Err(ExitError::new(
            EXIT_STATE_CONFLICT,
            format!("project {id} is {}, not failed", project.status.as_str()),
        ));
    }
    if project.retry_count >= config.max_task_retries {
        return Err(ExitError::new(
            EXIT_STATE_CONFLICT,
            format!("project {id} has exhausted its {} retries", config.max_task_retries),
        ));
    }

    store
        .transition(&id, ProjectStatus::Failed, ProjectStatus::Queued, ProjectPatch::default())
        .context("requeuing project")?;
    Ok(())
}

pub fn pause(config: &Config, id: ProjectId) -> Result<()> {
    let store = Store::open(&config.db_path()).context("opening store")?;
    let project = store
        .get_project(&id)
        .context("looking up project")?
        .ok_or_else(|| ExitError::new(EXIT_NOT_FOUND, format!("no such project: {id}")))?;

    match project.status {
        ProjectStatus::Queued | ProjectStatus::Processing => {
            store
                .transition(&id, project.status, ProjectStatus::Paused, ProjectPatch::default())
                .context("pausing project")?;
            Ok(())
        }
        other => Err(ExitError::new(EXIT_STATE_CONFLICT, format!("project {id} is {}, cannot pause", other.as_str()))),
    }
}

pub fn resume(config: &Config, id: ProjectId) -> Result<()> {
    let store = Store::open(&config.db_path()).context("opening store")?;
    let project = store
        .get_project(&id)
        .context("looking up project")?
        .ok_or_else(|| ExitError::new(EXIT_NOT_FOUND, format!("no such project: {id}")))?;

    if project.status != ProjectStatus::Paused {
        return Err(ExitError::new(EXIT_STATE_CONFLICT, format!("project {id} is {}, not paused", project.status.as_str())));
    }

    store
        .transition(&id, ProjectStatus::Paused, ProjectStatus::Queued, ProjectPatch::default())
        .context("resuming project")?;
    Ok(())
}

pub async fn recover(config: Config) -> Result<()> {
    let runtime = build_runtime(config)?;
    let summary = runtime.recovery_manager().run().await.context("running recovery")?;
    println!(
        "repaired={} failed={} resumed={} claims_cleared={}",
        summary.repaired, summary.failed, summary.resumed, summary.claims_cleared
    );
    Ok(())
}

pub async fn kill_orphans(config: Config) -> Result<()> {
    let runtime = build_runtime(config)?;
    let summary = runtime.session_monitor().run_once().await.context("reconciling sessions")?;
    println!(
        "completed={} phantoms_failed={} orphans_killed={} null_sessions_repaired={} null_sessions_failed={}",
        summary.completed, summary.phantoms_failed, summary.orphans_killed, summary.null_sessions_repaired, summary.null_sessions_failed
    );
    Ok(())
}

fn build_runtime(config: Config) -> Result<Runtime> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let session: Arc<dyn conductor_adapters::session::SessionAdapter> = Arc::new(TracedSession::new(TmuxAdapter::new()));
    let notifier: Arc<dyn conductor_adapters::NotifyAdapter> = Arc::new(NoOpNotifyAdapter);
    Runtime::new(config, clock, session, notifier).context("opening runtime")
}
