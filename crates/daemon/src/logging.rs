// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-based logging setup for anything that runs the scheduler loop
//! in the foreground, shared between the `conductord` binary and the
//! CLI's `daemon` subcommand so both produce the same on-disk log.

use std::path::Path;

use conductor_core::config::Config;

const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep (conductord.log.1, .2, .3).
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotates the daemon log if it exceeds [`MAX_LOG_SIZE`]. Shifts
/// `conductord.log` -> `.1` -> `.2` -> `.3`, dropping the oldest.
/// Best-effort: a failed rotation must not block startup.
pub fn rotate_log_if_needed(log_path: &Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

/// Installs a global subscriber writing to `<state_dir>/conductord.log`,
/// rotating first if the existing file is oversized. Must run once, at
/// process start, before the lock is acquired, so a `LockHeld` failure
/// is still visible in the log.
pub fn setup_file_logging(config: &Config) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let state_dir = config.state_dir.clone();
    std::fs::create_dir_all(&state_dir)?;

    rotate_log_if_needed(&state_dir.join("conductord.log"));

    let file_appender = tracing_appender::rolling::never(&state_dir, "conductord.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(guard)
}
