// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The project/task store: a single SQLite file opened in WAL journal
//! mode with a busy timeout, giving the daemon a durable, crash-safe
//! queue without hand-rolled write-ahead logging of its own.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use conductor_core::id::{ProjectId, TaskId};
use conductor_core::project::{is_legal_transition, Project, ProjectStatus};
use conductor_core::task::Task;

use crate::migration;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("migration error: {0}")]
    Migration(#[from] migration::MigrationError),
    #[error("project {0} not found")]
    ProjectNotFound(String),
    #[error("task {0} not found")]
    TaskNotFound(String),
    #[error("cannot transition project {id} from {from} to {to}")]
    IllegalTransition {
        id: String,
        from: ProjectStatus,
        to: ProjectStatus,
    },
    #[error("project {id} expected status {expected} but found {actual}")]
    StateConflict {
        id: String,
        expected: ProjectStatus,
        actual: ProjectStatus,
    },
}

impl StoreError {
    /// Severe enough that a loop should stop retrying and ask the
    /// daemon to shut down rather than keep hammering a broken file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: rusqlite::ErrorCode::DatabaseCorrupt | rusqlite::ErrorCode::NotADatabase,
                    ..
                },
                _,
            ))
        )
    }
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(rusqlite::Error::from)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", 5_000)?;
        migration::run_migrations(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "busy_timeout", 5_000)?;
        migration::run_migrations(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Inserts a new QUEUED project, along with any dependencies it
    /// declares, in one locked section. `dependencies` must be recorded
    /// before the row is ever visible to a caller of `claim_next`, since
    /// that is the only place dependency gating is enforced -- doing it
    /// here, under the same lock as the insert, closes the window a
    /// later, separate `add_dependency` call would leave open.
    pub fn enqueue(&self, spec_path: &str, project_path: &str, dependencies: &[ProjectId], now: i64) -> Result<ProjectId, StoreError> {
        let id = ProjectId::generate();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO projects (id, status, spec_path, project_path, session_name, \
             enqueued_at, started_at, completed_at, error_message, retry_count, \
             heartbeat_at, timeout_deadline, heartbeat_extensions) \
             VALUES (?1, 'queued', ?2, ?3, NULL, ?4, NULL, NULL, NULL, 0, NULL, NULL, 0)",
            params![id.as_str(), spec_path, project_path, now],
        )?;
        for dep in dependencies {
            insert_dependency(&conn, &id, dep)?;
        }
        Ok(id)
    }

    pub fn add_dependency(&self, project: &ProjectId, depends_on: &ProjectId) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        insert_dependency(&conn, project, depends_on)
    }

    /// Atomically claims the oldest QUEUED project whose dependencies
    /// (if any) are all COMPLETED, transitioning it to an internal
    /// `claiming` intent so a concurrent caller cannot also claim it.
    /// Callers must promote the intent via `transition` or abandon it
    /// via `abandon_claim`, which is also swept automatically at
    /// startup by the recovery manager.
    pub fn claim_next(&self) -> Result<Option<Project>, StoreError> {
        let conn = self.conn.lock();
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = (|| {
            let id: Option<String> = conn
                .query_row(
                    "SELECT p.id FROM projects p
                     WHERE p.status = 'queued'
                       AND NOT EXISTS (
                           SELECT 1 FROM project_dependencies d
                           JOIN projects dep ON dep.id = d.depends_on_id
                           WHERE d.project_id = p.id AND dep.status != 'completed'
                       )
                     ORDER BY p.enqueued_at ASC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(id) = id else {
                return Ok(None);
            };

            conn.execute(
                "UPDATE projects SET status = 'claiming' WHERE id = ?1",
                params![id],
            )?;
            let project = fetch_project(&conn, &id)?;
            Ok(project)
        })();

        match &result {
            Ok(_) => conn.execute_batch("COMMIT")?,
            Err(_) => conn.execute_batch("ROLLBACK")?,
        }
        result
    }

    /// Returns a row stuck in the internal `claiming` intent back to
    /// QUEUED. Used by the recovery manager to repair crashes between
    /// `claim_next` and the caller's promoting transition.
    pub fn sweep_abandoned_claims(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let n = conn.execute("UPDATE projects SET status = 'queued' WHERE status = 'claiming'", [])?;
        Ok(n as u64)
    }

    /// Releases a claimed row back to QUEUED with an incremented retry
    /// count, for setup failures that are still within the retry cap.
    /// Distinct from `transition` because QUEUED -> QUEUED is not a
    /// state-machine edge: this only ever runs against a row this
    /// caller itself just claimed.
    pub fn requeue_after_setup_failure(&self, id: &ProjectId, retry_count: u32, error_message: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE projects SET status = 'queued', retry_count = ?1, error_message = ?2 \
             WHERE id = ?3 AND status = 'claiming'",
            params![retry_count, error_message, id.as_str()],
        )?;
        if n == 0 {
            return Err(StoreError::ProjectNotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn transition(
        &self,
        id: &ProjectId,
        from: ProjectStatus,
        to: ProjectStatus,
        patch: ProjectPatch,
    ) -> Result<(), StoreError> {
        if !is_legal_transition(from, to) {
            return Err(StoreError::IllegalTransition {
                id: id.to_string(),
                from,
                to,
            });
        }
        let conn = self.conn.lock();
        let current = status_str(&conn, id.as_str())?;
        // A row claimed via `claim_next` is stored as `claiming` but is
        // still logically QUEUED to every caller outside this module.
        let matches_from = match from {
            ProjectStatus::Queued => current == "queued" || current == "claiming",
            other => current == other.as_str(),
        };
        if !matches_from {
            return Err(StoreError::StateConflict {
                id: id.to_string(),
                expected: from,
                actual: parse_status(&current),
            });
        }
        conn.execute(
            "UPDATE projects SET status = ?1, session_name = COALESCE(?2, session_name), \
             started_at = COALESCE(?3, started_at), completed_at = COALESCE(?4, completed_at), \
             error_message = COALESCE(?5, error_message), retry_count = COALESCE(?6, retry_count), \
             timeout_deadline = COALESCE(?7, timeout_deadline) \
             WHERE id = ?8",
            params![
                to.as_str(),
                patch.session_name,
                patch.started_at,
                patch.completed_at,
                patch.error_message,
                patch.retry_count,
                patch.timeout_deadline,
                id.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Sets `session_name` on a PROCESSING row directly, outside the
    /// state machine, for the session monitor's null-session repair
    /// (discovering a name is not itself a status transition).
    pub fn set_session_name(&self, id: &ProjectId, name: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE projects SET session_name = ?1 WHERE id = ?2 AND status = 'processing'",
            params![name, id.as_str()],
        )?;
        if n == 0 {
            return Err(StoreError::ProjectNotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn get_project(&self, id: &ProjectId) -> Result<Option<Project>, StoreError> {
        let conn = self.conn.lock();
        fetch_project(&conn, id.as_str())
    }

    pub fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id FROM projects ORDER BY enqueued_at ASC")?;
        let ids: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        drop(stmt);
        ids.into_iter()
            .map(|id| fetch_project(&conn, &id)?.ok_or_else(|| StoreError::ProjectNotFound(id.clone())))
            .collect()
    }

    pub fn list_non_terminal_projects(&self) -> Result<Vec<Project>, StoreError> {
        Ok(self
            .list_projects()?
            .into_iter()
            .filter(|p| !p.status.is_terminal())
            .collect())
    }

    pub fn heartbeat(&self, id: &ProjectId, now: i64, extension_secs: i64, max_extensions: u32) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let Some(mut project) = fetch_project(&conn, id.as_str())? else {
            return Err(StoreError::ProjectNotFound(id.to_string()));
        };
        project.heartbeat_at = Some(now);
        let mut extended = false;
        if project.heartbeat_extensions < max_extensions {
            project.timeout_deadline = Some(project.timeout_deadline.unwrap_or(now) + extension_secs);
            project.heartbeat_extensions += 1;
            extended = true;
        }
        conn.execute(
            "UPDATE projects SET heartbeat_at = ?1, timeout_deadline = ?2, heartbeat_extensions = ?3 WHERE id = ?4",
            params![
                project.heartbeat_at,
                project.timeout_deadline,
                project.heartbeat_extensions,
                id.as_str()
            ],
        )?;
        Ok(extended)
    }

    pub fn enqueue_task(&self, task: &Task) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO tasks (id, session_name, window_target, payload, scheduled_at, \
             retry_count, max_retries, interval_minutes, disabled, last_error) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                task.id.as_str(),
                task.session_name,
                task.window_target,
                task.payload,
                task.scheduled_at,
                task.retry_count,
                task.max_retries,
                task.interval_minutes,
                task.disabled,
                task.last_error,
            ],
        )?;
        Ok(())
    }

    pub fn tasks_due(&self, now: i64) -> Result<Vec<Task>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, session_name, window_target, payload, scheduled_at, retry_count, \
             max_retries, interval_minutes, disabled, last_error FROM tasks \
             WHERE scheduled_at <= ?1 AND disabled = 0 AND retry_count <= max_retries \
             ORDER BY scheduled_at ASC",
        )?;
        let tasks = stmt
            .query_map(params![now], row_to_task)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    /// Records one delivery attempt's outcome. Returns `true` if this
    /// call disabled the task by exceeding `max_retries`.
    pub fn record_task_result(
        &self,
        id: &TaskId,
        success: bool,
        err: Option<&str>,
        now: i64,
        backoff_secs: i64,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let Some(task) = fetch_task(&conn, id.as_str())? else {
            return Err(StoreError::TaskNotFound(id.to_string()));
        };

        if success {
            if task.is_one_shot() {
                conn.execute("DELETE FROM tasks WHERE id = ?1", params![id.as_str()])?;
            } else {
                let next = now + (task.interval_minutes as i64) * 60;
                conn.execute(
                    "UPDATE tasks SET scheduled_at = ?1, retry_count = 0, last_error = NULL WHERE id = ?2",
                    params![next, id.as_str()],
                )?;
            }
            Ok(false)
        } else {
            let retry_count = task.retry_count + 1;
            let disabled = retry_count > task.max_retries;
            if disabled {
                conn.execute(
                    "UPDATE tasks SET disabled = 1, retry_count = ?1, last_error = ?2 WHERE id = ?3",
                    params![retry_count, err, id.as_str()],
                )?;
            } else {
                conn.execute(
                    "UPDATE tasks SET retry_count = ?1, scheduled_at = ?2, last_error = ?3 WHERE id = ?4",
                    params![retry_count, now + backoff_secs, err, id.as_str()],
                )?;
            }
            Ok(disabled)
        }
    }

    pub fn disable_task(&self, id: &TaskId, reason: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE tasks SET disabled = 1, last_error = ?1 WHERE id = ?2",
            params![reason, id.as_str()],
        )?;
        Ok(())
    }

    pub fn vacuum_tasks_older_than(&self, cutoff: i64) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "DELETE FROM tasks WHERE disabled = 1 AND scheduled_at < ?1",
            params![cutoff],
        )?;
        Ok(n as u64)
    }
}

/// Partial update applied by `Store::transition`; `None` fields are left
/// unchanged.
#[derive(Debug, Default)]
pub struct ProjectPatch {
    pub session_name: Option<String>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub error_message: Option<String>,
    pub retry_count: Option<u32>,
    pub timeout_deadline: Option<i64>,
}

fn insert_dependency(conn: &Connection, project: &ProjectId, depends_on: &ProjectId) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR IGNORE INTO project_dependencies (project_id, depends_on_id) VALUES (?1, ?2)",
        params![project.as_str(), depends_on.as_str()],
    )?;
    Ok(())
}

fn status_str(conn: &Connection, id: &str) -> Result<String, StoreError> {
    conn.query_row("SELECT status FROM projects WHERE id = ?1", params![id], |row| row.get(0))
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::ProjectNotFound(id.to_string()),
            other => StoreError::Sqlite(other),
        })
}

fn parse_status(s: &str) -> ProjectStatus {
    match s {
        "queued" | "claiming" => ProjectStatus::Queued,
        "processing" => ProjectStatus::Processing,
        "paused" => ProjectStatus::Paused,
        "completed" => ProjectStatus::Completed,
        _ => ProjectStatus::Failed,
    }
}

fn fetch_project(conn: &Connection, id: &str) -> Result<Option<Project>, StoreError> {
    conn.query_row(
        "SELECT id, status, spec_path, project_path, session_name, enqueued_at, started_at, \
         completed_at, error_message, retry_count, heartbeat_at, timeout_deadline, heartbeat_extensions \
         FROM projects WHERE id = ?1",
        params![id],
        row_to_project,
    )
    .optional()
    .map_err(StoreError::from)
}

fn row_to_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    let status_raw: String = row.get(1)?;
    Ok(Project {
        id: ProjectId::new(row.get::<_, String>(0)?),
        status: parse_status(&status_raw),
        spec_path: row.get(2)?,
        project_path: row.get(3)?,
        session_name: row.get(4)?,
        enqueued_at: row.get(5)?,
        started_at: row.get(6)?,
        completed_at: row.get(7)?,
        error_message: row.get(8)?,
        retry_count: row.get(9)?,
        heartbeat_at: row.get(10)?,
        timeout_deadline: row.get(11)?,
        heartbeat_extensions: row.get(12)?,
    })
}

fn fetch_task(conn: &Connection, id: &str) -> Result<Option<Task>, StoreError> {
    conn.query_row(
        "SELECT id, session_name, window_target, payload, scheduled_at, retry_count, \
         max_retries, interval_minutes, disabled, last_error FROM tasks WHERE id = ?1",
        params![id],
        row_to_task,
    )
    .optional()
    .map_err(StoreError::from)
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: TaskId::new(row.get::<_, String>(0)?),
        session_name: row.get(1)?,
        window_target: row.get(2)?,
        payload: row.get(3)?,
        scheduled_at: row.get(4)?,
        retry_count: row.get(5)?,
        max_retries: row.get(6)?,
        interval_minutes: row.get(7)?,
        disabled: row.get(8)?,
        last_error: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_then_list_returns_queued_project() {
        let store = Store::open_in_memory().expect("open");
        let id = store.enqueue("/s/a.yml", "/p/a", &[], 100).expect("enqueue");
        let projects = store.list_projects().expect("list");
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].id, id);
        assert_eq!(projects[0].status, ProjectStatus::Queued);
    }

    #[test]
    fn claim_next_is_exclusive_and_returns_oldest_first() {
        let store = Store::open_in_memory().expect("open");
        let first = store.enqueue("/s/a.yml", "/p/a", &[], 100).expect("enqueue");
        let _second = store.enqueue("/s/b.yml", "/p/b", &[], 200).expect("enqueue");

        let claimed = store.claim_next().expect("claim").expect("some project");
        assert_eq!(claimed.id, first);

        // Claimed row is no longer visible to a second claim attempt.
        let none = store.claim_next().expect("claim");
        assert!(none.is_none());
    }

    #[test]
    fn abandoned_claim_is_swept_back_to_queued() {
        let store = Store::open_in_memory().expect("open");
        let id = store.enqueue("/s/a.yml", "/p/a", &[], 100).expect("enqueue");
        store.claim_next().expect("claim");
        let n = store.sweep_abandoned_claims().expect("sweep");
        assert_eq!(n, 1);
        let project = store.get_project(&id).expect("get").expect("exists");
        assert_eq!(project.status, ProjectStatus::Queued);
        assert_eq!(project.retry_count, 0);
    }

    #[test]
    fn transition_enforces_compare_and_set() {
        let store = Store::open_in_memory().expect("open");
        let id = store.enqueue("/s/a.yml", "/p/a", &[], 100).expect("enqueue");
        store.claim_next().expect("claim");

        let patch = ProjectPatch {
            session_name: Some("sess-1".into()),
            started_at: Some(100),
            ..Default::default()
        };
        store
            .transition(&id, ProjectStatus::Queued, ProjectStatus::Processing, patch)
            .expect("transition");

        let project = store.get_project(&id).expect("get").expect("exists");
        assert_eq!(project.status, ProjectStatus::Processing);
        assert_eq!(project.session_name.as_deref(), Some("sess-1"));

        // Stale compare-and-set fails.
        let result = store.transition(&id, ProjectStatus::Queued, ProjectStatus::Processing, ProjectPatch::default());
        assert!(matches!(result, Err(StoreError::StateConflict { .. })));
    }

    #[test]
    fn dependency_gating_skips_projects_with_unmet_dependencies() {
        let store = Store::open_in_memory().expect("open");
        let a = store.enqueue("/s/a.yml", "/p/a", &[], 100).expect("enqueue");
        let b = store.enqueue("/s/b.yml", "/p/b", &[a.clone()], 200).expect("enqueue");

        let claimed = store.claim_next().expect("claim").expect("some project");
        assert_eq!(claimed.id, a, "only A is eligible while B depends on it");

        store
            .transition(
                &a,
                ProjectStatus::Queued,
                ProjectStatus::Processing,
                ProjectPatch {
                    session_name: Some("sess-a".into()),
                    started_at: Some(100),
                    ..Default::default()
                },
            )
            .expect("transition a to processing");
        store
            .transition(
                &a,
                ProjectStatus::Processing,
                ProjectStatus::Completed,
                ProjectPatch {
                    completed_at: Some(150),
                    ..Default::default()
                },
            )
            .expect("transition a to completed");

        let claimed = store.claim_next().expect("claim").expect("b now eligible");
        assert_eq!(claimed.id, b);
    }

    #[test]
    fn add_dependency_gates_a_project_enqueued_without_one() {
        let store = Store::open_in_memory().expect("open");
        let a = store.enqueue("/s/a.yml", "/p/a", &[], 100).expect("enqueue");
        let b = store.enqueue("/s/b.yml", "/p/b", &[], 200).expect("enqueue");
        store.add_dependency(&b, &a).expect("dep");

        let claimed = store.claim_next().expect("claim").expect("some project");
        assert_eq!(claimed.id, a);
    }

    #[test]
    fn task_one_shot_is_deleted_on_success() {
        let store = Store::open_in_memory().expect("open");
        let task = conductor_core::test_support::TaskBuilder::new("t-1").build();
        store.enqueue_task(&task).expect("enqueue");
        store.record_task_result(&task.id, true, None, 1000, 30).expect("record");
        assert!(store.tasks_due(10_000).expect("due").is_empty());
    }

    #[test]
    fn task_recurring_reschedules_on_success() {
        let store = Store::open_in_memory().expect("open");
        let task = conductor_core::test_support::TaskBuilder::new("t-1")
            .interval_minutes(5)
            .scheduled_at(0)
            .build();
        store.enqueue_task(&task).expect("enqueue");
        store.record_task_result(&task.id, true, None, 1000, 30).expect("record");
        let due = store.tasks_due(1000).expect("due");
        assert!(due.is_empty(), "not due yet at exactly now");
        let due_later = store.tasks_due(1000 + 300).expect("due");
        assert_eq!(due_later.len(), 1);
    }

    #[test]
    fn task_exhausts_after_max_retries() {
        let store = Store::open_in_memory().expect("open");
        let task = conductor_core::test_support::TaskBuilder::new("t-1")
            .max_retries(2)
            .build();
        store.enqueue_task(&task).expect("enqueue");
        for _ in 0..2 {
            store
                .record_task_result(&task.id, false, Some("boom"), 0, 10)
                .expect("record");
        }
        let fetched = fetch_task(&store.conn.lock(), "t-1").expect("fetch").expect("exists");
        assert!(!fetched.disabled, "not yet exhausted after 2 of 2");
        store
            .record_task_result(&task.id, false, Some("boom"), 0, 10)
            .expect("record");
        let fetched = fetch_task(&store.conn.lock(), "t-1").expect("fetch").expect("exists");
        assert!(fetched.disabled, "exhausted after exceeding max_retries");
    }
}
