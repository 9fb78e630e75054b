// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-writer lock over the daemon, with heartbeat refresh and
//! stale-lock takeover. An OS advisory file lock alone (what a prior
//! version of this scheduler used) only tells a successor "someone else
//! has this" -- it can't prove the prior holder is dead, so a clean
//! takeover after a `kill -9` requires the sidecar heartbeat record
//! this module maintains alongside the lock.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use thiserror::Error;
use tokio::task::JoinHandle;

use conductor_core::clock::Clock;
use conductor_storage::LockRecord;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("lock is held by another live process (pid {pid} on {hostname})")]
    Held { pid: u32, hostname: String },
}

pub struct LockManager {
    file: File,
    sidecar_path: PathBuf,
    heartbeat_task: Option<JoinHandle<()>>,
}

impl LockManager {
    /// Attempts to acquire the lock at `lock_path`, with a JSON sidecar
    /// at `lock_path` + `.json`. On contention, takes over only if the
    /// recorded heartbeat is stale AND the recorded pid is not alive on
    /// this host.
    pub fn acquire(
        lock_path: &Path,
        clock: Arc<dyn Clock>,
        stale_threshold_secs: u64,
    ) -> Result<Self, LockError> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).write(true).open(lock_path)?;
        let sidecar_path = sidecar_path_for(lock_path);

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(_) => {
                if let Some(record) = LockRecord::read(&sidecar_path)? {
                    let now = clock.unix_time();
                    if record.is_stale(now, stale_threshold_secs) && !pid_is_alive(record.pid) {
                        tracing::warn!(pid = record.pid, hostname = %record.hostname, "stale lock takeover");
                        file.unlock()?;
                        file.try_lock_exclusive().map_err(|_| LockError::Held {
                            pid: record.pid,
                            hostname: record.hostname.clone(),
                        })?;
                    } else {
                        return Err(LockError::Held { pid: record.pid, hostname: record.hostname });
                    }
                } else {
                    return Err(LockError::Held { pid: 0, hostname: "unknown".into() });
                }
            }
        }

        let record = LockRecord::new(std::process::id(), hostname(), clock.unix_time());
        record.write(&sidecar_path)?;

        Ok(Self {
            file,
            sidecar_path,
            heartbeat_task: None,
        })
    }

    /// Spawns the periodic heartbeat refresh. `interval_secs` should be
    /// `stale_threshold_secs / 3` so a successor never mistakes a live
    /// daemon for a dead one.
    pub fn spawn_heartbeat(&mut self, clock: Arc<dyn Clock>, interval_secs: u64) {
        let sidecar_path = self.sidecar_path.clone();
        let pid = std::process::id();
        let host = hostname();
        let acquired_at = clock.unix_time();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
            loop {
                ticker.tick().await;
                let mut record = LockRecord::read(&sidecar_path)
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| LockRecord::new(pid, host.clone(), acquired_at));
                record.heartbeat_at = clock.unix_time();
                if let Err(err) = record.write(&sidecar_path) {
                    tracing::error!(error = %err, "failed to refresh lock heartbeat");
                }
            }
        });
        self.heartbeat_task = Some(handle);
    }

    pub fn release(&mut self) {
        if let Some(task) = self.heartbeat_task.take() {
            task.abort();
        }
        let _ = std::fs::remove_file(&self.sidecar_path);
        let _ = FileExt::unlock(&self.file);
    }
}

impl Drop for LockManager {
    fn drop(&mut self) {
        self.release();
    }
}

fn sidecar_path_for(lock_path: &Path) -> PathBuf {
    let mut path = lock_path.as_os_str().to_os_string();
    path.push(".json");
    PathBuf::from(path)
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("HOST"))
        .unwrap_or_else(|_| "unknown-host".to_string())
}

/// Zero-signal liveness probe: `kill(pid, 0)` succeeds iff the process
/// exists and we have permission to signal it.
fn pid_is_alive(pid: u32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
}
