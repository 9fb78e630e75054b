// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The lock sidecar record: `{pid, hostname, acquired_at, heartbeat_at}`,
//! written atomically (write-to-tmp, then rename) so a reader never
//! observes a half-written file. The heartbeat/staleness/takeover
//! *logic* lives in `conductor-engine::lock_manager`; this module only
//! owns the record's shape and durable write.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
    pub pid: u32,
    pub hostname: String,
    pub acquired_at: i64,
    pub heartbeat_at: i64,
}

impl LockRecord {
    pub fn new(pid: u32, hostname: impl Into<String>, now: i64) -> Self {
        Self {
            pid,
            hostname: hostname.into(),
            acquired_at: now,
            heartbeat_at: now,
        }
    }

    pub fn is_stale(&self, now: i64, threshold_secs: u64) -> bool {
        now.saturating_sub(self.heartbeat_at) > threshold_secs as i64
    }

    pub fn read(path: &Path) -> std::io::Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path)?;
        let record = serde_json::from_str(&text).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        Ok(Some(record))
    }

    /// Writes the record to `path` via a temp file + atomic rename so a
    /// concurrent reader never observes a partially written file.
    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        let tmp = path.with_extension("tmp");
        let json = serde_json::to_string(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("conductor.lock.json");
        let record = LockRecord::new(123, "host-a", 1000);
        record.write(&path).expect("write");

        let read = LockRecord::read(&path).expect("read").expect("present");
        assert_eq!(read.pid, 123);
        assert_eq!(read.hostname, "host-a");
    }

    #[test]
    fn stale_when_heartbeat_older_than_threshold() {
        let record = LockRecord::new(1, "h", 0);
        assert!(!record.is_stale(50, 90));
        assert!(record.is_stale(200, 90));
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nope.json");
        assert!(LockRecord::read(&path).expect("read").is_none());
    }
}
