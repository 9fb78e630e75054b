// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only JSONL event log, rotated daily. Buffers writes and
//! flushes on a short timer or a size threshold rather than fsyncing
//! every record; on reopen, a trailing partial line (the daemon died
//! mid-write) is detected and the file rotated aside rather than
//! silently dropped.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use conductor_core::event::Event;

const FLUSH_THRESHOLD: usize = 100;

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("corrupt event log at {path}: {message}")]
    Corrupt { path: String, message: String },
}

/// Opens (creating if needed) the JSONL file for a single calendar day
/// under `dir`, named `YYYY-MM-DD.jsonl`.
pub struct EventLog {
    dir: PathBuf,
    current_date: String,
    file: File,
    buffered: usize,
}

impl EventLog {
    pub fn open(dir: &Path, date: &str) -> Result<Self, EventLogError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{date}.jsonl"));
        scan_for_corruption(&path)?;
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            current_date: date.to_string(),
            file,
            buffered: 0,
        })
    }

    /// Appends a record, rotating to a new day's file first if `date`
    /// has advanced since the log was opened or last rotated.
    pub fn append(&mut self, date: &str, event: &Event) -> Result<(), EventLogError> {
        if date != self.current_date {
            self.rotate(date)?;
        }
        let line = serde_json::to_string(event)?;
        writeln!(self.file, "{line}")?;
        self.buffered += 1;
        if self.needs_flush() {
            self.flush()?;
        }
        Ok(())
    }

    pub fn needs_flush(&self) -> bool {
        self.buffered >= FLUSH_THRESHOLD
    }

    pub fn flush(&mut self) -> Result<(), EventLogError> {
        self.file.flush()?;
        self.file.sync_data()?;
        self.buffered = 0;
        Ok(())
    }

    fn rotate(&mut self, date: &str) -> Result<(), EventLogError> {
        self.flush()?;
        let path = self.dir.join(format!("{date}.jsonl"));
        scan_for_corruption(&path)?;
        self.file = OpenOptions::new().create(true).append(true).open(&path)?;
        self.current_date = date.to_string();
        self.buffered = 0;
        Ok(())
    }

    /// Reads every well-formed record currently in today's file, in
    /// order. Used by CLI/status tooling, not by the daemon's hot path.
    pub fn tail(dir: &Path, date: &str) -> Result<Vec<Event>, EventLogError> {
        let path = dir.join(format!("{date}.jsonl"));
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&path)?);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(&line)?);
        }
        Ok(events)
    }
}

/// If the file ends with a line that isn't valid JSON (the process died
/// mid-write), move it aside to `<name>.jsonl.bak` so the next open
/// starts from a clean, fully-valid file rather than silently losing or
/// corrupting subsequent appends.
fn scan_for_corruption(path: &Path) -> Result<(), EventLogError> {
    if !path.exists() {
        return Ok(());
    }
    let reader = BufReader::new(File::open(path)?);
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if serde_json::from_str::<serde_json::Value>(&line).is_err() {
            let bak = path.with_extension("jsonl.bak");
            std::fs::rename(path, &bak)?;
            tracing::warn!(path = %path.display(), line = idx, "rotated corrupt event log aside");
            return Ok(());
        }
    }
    Ok(())
}
