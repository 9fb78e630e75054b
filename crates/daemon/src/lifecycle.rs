// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon bootstrap: acquire the single-writer lock, build the shared
//! [`Runtime`], run recovery once, and hand back everything `main` needs
//! to spawn the background loops.

use std::sync::Arc;

use thiserror::Error;

use conductor_adapters::session::{SessionAdapter, TmuxAdapter};
use conductor_adapters::{NotifyAdapter, TracedSession};
use conductor_core::clock::{Clock, SystemClock};
use conductor_core::config::Config;
use conductor_engine::{LockError, LockManager, Messenger, ProjectSetup, RecoverySummary, Runtime};

use crate::setup::TmuxProjectSetup;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("lock is held: {0}")]
    LockHeld(#[from] LockError),
    #[error("store error: {0}")]
    Store(#[from] conductor_storage::StoreError),
    #[error("invalid shell prompt pattern: {0}")]
    Messenger(#[from] regex::Error),
}

/// Everything the daemon's main loop needs after a successful startup.
pub struct Bootstrap {
    pub config: Config,
    pub lock: LockManager,
    pub runtime: Runtime,
    pub messenger: Arc<Messenger>,
    pub setup: Arc<dyn ProjectSetup>,
}

pub async fn startup(config: Config, notifier: Arc<dyn NotifyAdapter>) -> Result<Bootstrap, LifecycleError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let mut lock = LockManager::acquire(&config.lock_path(), clock.clone(), config.stale_lock_threshold_sec)?;
    lock.spawn_heartbeat(clock.clone(), (config.stale_lock_threshold_sec / 3).max(1));

    let session: Arc<dyn SessionAdapter> = Arc::new(TracedSession::new(TmuxAdapter::new()));
    let runtime = Runtime::new(config.clone(), clock, session.clone(), notifier)?;

    let messenger = runtime.messenger()?;
    let setup: Arc<dyn ProjectSetup> = Arc::new(TmuxProjectSetup::new(session));

    tracing::info!("running startup recovery");
    let summary = runtime.recovery_manager().run().await?;
    log_recovery_summary(&summary);

    Ok(Bootstrap { config, lock, runtime, messenger, setup })
}

fn log_recovery_summary(summary: &RecoverySummary) {
    tracing::info!(
        repaired = summary.repaired,
        failed = summary.failed,
        resumed = summary.resumed,
        claims_cleared = summary.claims_cleared,
        "startup recovery complete"
    );
}
