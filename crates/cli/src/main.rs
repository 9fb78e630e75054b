// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! conductor - administrative CLI for the scheduler.

mod commands;
mod exit_error;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use conductor_adapters::notify::{NoOpNotifyAdapter, WebhookNotifyAdapter};
use conductor_adapters::NotifyAdapter;
use conductor_core::config::Config;
use conductor_core::ProjectId;
use conductor_daemon::lifecycle::{self, LifecycleError};

use exit_error::ExitError;

/// Stderr-only subscriber for every subcommand except `daemon`, which
/// installs its own file-backed subscriber via
/// [`conductor_daemon::logging::setup_file_logging`] instead.
fn setup_stderr_logging(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry().with(filter).with(fmt::layer().with_writer(std::io::stderr)).try_init();
}

#[derive(Parser)]
#[command(name = "conductor", version, about = "Administer the multi-agent scheduler")]
struct Cli {
    /// Path to the YAML config file (defaults to $CONDUCTOR_CONFIG or ./orchestrator_config.yaml)
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a new project
    Enqueue {
        #[arg(long)]
        spec: PathBuf,
        #[arg(long)]
        project: PathBuf,
    },
    /// List all known projects
    List,
    /// Requeue a failed project, if it has retries remaining
    Reset { id: String },
    /// Pause a queued or processing project
    Pause { id: String },
    /// Resume a paused project (re-enters the queue)
    Resume { id: String },
    /// Run the recovery pass once and exit
    Recover,
    /// Run the scheduler in the foreground
    Daemon,
    /// Kill tmux sessions with no matching project row, once
    KillOrphans,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        let code = err.downcast_ref::<ExitError>().map_or(1, |e| e.code);
        eprintln!("error: {err}");
        std::process::exit(code);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    if !matches!(cli.command, Commands::Daemon) {
        setup_stderr_logging(&config.log_level);
    }

    match cli.command {
        Commands::Enqueue { spec, project } => commands::enqueue(&config, spec, project),
        Commands::List => commands::list(&config),
        Commands::Reset { id } => commands::reset(&config, ProjectId::from(id.as_str())),
        Commands::Pause { id } => commands::pause(&config, ProjectId::from(id.as_str())),
        Commands::Resume { id } => commands::resume(&config, ProjectId::from(id.as_str())),
        Commands::Recover => commands::recover(config).await,
        Commands::Daemon => run_daemon(config).await,
        Commands::KillOrphans => commands::kill_orphans(config).await,
    }
}

async fn run_daemon(config: Config) -> anyhow::Result<()> {
    let _log_guard = conductor_daemon::logging::setup_file_logging(&config)?;
    tracing::info!("starting conductor daemon");

    let notifier = match config.notification_channel.as_deref() {
        Some(endpoint) if !endpoint.is_empty() => {
            Arc::new(WebhookNotifyAdapter::spawn(endpoint.to_string(), 64)) as Arc<dyn NotifyAdapter>
        }
        _ => Arc::new(NoOpNotifyAdapter) as Arc<dyn NotifyAdapter>,
    };

    let bootstrap = match lifecycle::startup(config, notifier).await {
        Ok(b) => b,
        Err(LifecycleError::LockHeld(err)) => {
            return Err(ExitError::new(3, format!("another instance is already running: {err}")));
        }
        Err(err) => return Err(err.into()),
    };

    println!("READY");
    conductor_daemon::run::run(bootstrap).await?;
    Ok(())
}
