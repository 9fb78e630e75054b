// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! conductord: the scheduler daemon.
//!
//! Acquires the single-writer lock, runs startup recovery, then drives
//! the queue-dispatch, task-dispatch, session-monitor and watchdog
//! loops (see [`conductor_daemon::run`]) until SIGTERM or SIGINT.
//! Exits immediately with a non-zero status if the lock is already
//! held.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};

use conductor_adapters::notify::{NoOpNotifyAdapter, WebhookNotifyAdapter};
use conductor_adapters::NotifyAdapter;
use conductor_core::config::Config;

use conductor_daemon::lifecycle::{self, LifecycleError};
use conductor_daemon::logging::setup_file_logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("conductord {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                eprintln!("error: unexpected argument '{other}'");
                eprintln!("usage: conductord [--help | --version]");
                std::process::exit(2);
            }
        }
    }

    let config_path = config_path_from_env();
    let config = Config::load(config_path.as_deref())?;

    let _log_guard = setup_file_logging(&config)?;
    info!("starting conductord");

    let notifier = match config.notification_channel.as_deref() {
        Some(endpoint) if !endpoint.is_empty() => {
            Arc::new(WebhookNotifyAdapter::spawn(endpoint.to_string(), 64)) as Arc<dyn NotifyAdapter>
        }
        _ => Arc::new(NoOpNotifyAdapter) as Arc<dyn NotifyAdapter>,
    };

    let bootstrap = match lifecycle::startup(config.clone(), notifier).await {
        Ok(b) => b,
        Err(LifecycleError::LockHeld(err)) => {
            eprintln!("conductord: another instance is already running: {err}");
            std::process::exit(3);
        }
        Err(err) => {
            error!("failed to start conductord: {err}");
            return Err(err.into());
        }
    };

    println!("READY");
    conductor_daemon::run::run(bootstrap).await?;
    info!("conductord stopped");
    Ok(())
}

fn config_path_from_env() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CONDUCTOR_CONFIG") {
        return Some(PathBuf::from(path));
    }
    let default = PathBuf::from("./orchestrator_config.yaml");
    default.exists().then_some(default)
}

fn print_help() {
    println!("conductord {}", env!("CARGO_PKG_VERSION"));
    println!("Scheduler daemon for multi-agent orchestration sessions.");
    println!();
    println!("USAGE:");
    println!("    conductord");
    println!();
    println!("conductord is typically started via `conductor daemon` and reads");
    println!("its configuration from $CONDUCTOR_CONFIG or ./orchestrator_config.yaml.");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Print help information");
    println!("    -V, --version    Print version information");
}
