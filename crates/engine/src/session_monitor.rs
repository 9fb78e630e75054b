// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic reconciliation between the store's view of running
//! projects and the terminal multiplexer's live sessions: detects
//! phantom rows (the DB thinks a session exists but it's gone), kills
//! orphan sessions (live but unknown to the DB), and repairs PROCESSING
//! rows that somehow never recorded a session name.

use std::sync::Arc;

use conductor_adapters::session::SessionAdapter;
use conductor_core::clock::Clock;
use conductor_core::event::Severity;
use conductor_core::project::ProjectStatus;
use conductor_storage::{ProjectPatch, Store, StoreError};

use crate::event_bus::EventBus;

const NULL_SESSION_REPAIR_ATTEMPTS: u32 = 3;
const NULL_SESSION_REPAIR_GAP: std::time::Duration = std::time::Duration::from_secs(1);

pub struct SessionMonitorConfig {
    pub phantom_grace_sec: i64,
    pub orphan_grace_sec: i64,
    pub events_date: String,
}

pub struct SessionMonitor {
    store: Arc<Store>,
    session: Arc<dyn SessionAdapter>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    config: SessionMonitorConfig,
}

/// Name of the marker file a project's working directory must contain
/// for this reconcile pass to consider it finished.
const COMPLETION_MARKER: &str = "COMPLETED";

#[derive(Debug, Default)]
pub struct ReconcileSummary {
    pub completed: u32,
    pub phantoms_failed: u32,
    pub orphans_killed: u32,
    pub null_sessions_repaired: u32,
    pub null_sessions_failed: u32,
}

impl SessionMonitor {
    pub fn new(
        store: Arc<Store>,
        session: Arc<dyn SessionAdapter>,
        event_bus: EventBus,
        clock: Arc<dyn Clock>,
        config: SessionMonitorConfig,
    ) -> Self {
        Self { store, session, event_bus, clock, config }
    }

    pub async fn run_once(&self) -> Result<ReconcileSummary, StoreError> {
        let now = self.clock.unix_time();
        let live: std::collections::HashSet<String> = self.session.list_sessions().await.unwrap_or_default().into_iter().collect();
        let known = self.store.list_non_terminal_projects()?;

        let mut summary = ReconcileSummary::default();

        for project in &known {
            if !matches!(project.status, ProjectStatus::Processing | ProjectStatus::Paused) {
                continue;
            }
            if project.status == ProjectStatus::Processing && completion_marker_exists(&project.project_path) {
                self.store.transition(
                    &project.id,
                    ProjectStatus::Processing,
                    ProjectStatus::Completed,
                    ProjectPatch { completed_at: Some(now), ..Default::default() },
                )?;
                self.event_bus
                    .publish(&self.config.events_date, "project.completed", Severity::Info, serde_json::json!({"project_id": project.id.as_str()}), now)
                    .await;
                tracing::info!(project_id = %project.id, "completion marker found, project completed");
                summary.completed += 1;
                continue;
            }
            let Some(name) = &project.session_name else {
                if project.status == ProjectStatus::Processing {
                    if self.repair_null_session(project).await? {
                        summary.null_sessions_repaired += 1;
                    } else {
                        summary.null_sessions_failed += 1;
                    }
                }
                continue;
            };
            if !live.contains(name) {
                let age = now - project.heartbeat_at.unwrap_or(project.started_at.unwrap_or(project.enqueued_at));
                if age > self.config.phantom_grace_sec && project.status == ProjectStatus::Processing {
                    self.store.transition(
                        &project.id,
                        ProjectStatus::Processing,
                        ProjectStatus::Failed,
                        ProjectPatch {
                            error_message: Some("session missing after grace period".into()),
                            completed_at: Some(now),
                            ..Default::default()
                        },
                    )?;
                    tracing::warn!(project_id = %project.id, session_name = %name, age_sec = age, "phantom session, project failed");
                    summary.phantoms_failed += 1;
                }
            }
        }

        let known_names: std::collections::HashSet<&str> =
            known.iter().filter_map(|p| p.session_name.as_deref()).collect();
        for name in &live {
            if known_names.contains(name.as_str()) {
                continue;
            }
            let age = self.session.session_age_secs(name, now).await.ok().flatten().unwrap_or(0);
            if age > self.config.orphan_grace_sec {
                if self.session.kill_session(name).await.is_ok() {
                    tracing::warn!(session_name = %name, age_sec = age, "killed orphan session");
                    summary.orphans_killed += 1;
                    self.event_bus
                        .publish(&self.config.events_date, "session.orphan_killed", Severity::Warn, serde_json::json!({"name": name}), now)
                        .await;
                }
            }
        }

        Ok(summary)
    }

    /// Retries discovering a PROCESSING project's session by canonical
    /// prefix match, spaced by `NULL_SESSION_REPAIR_GAP`. Returns
    /// whether the repair succeeded.
    async fn repair_null_session(&self, project: &conductor_core::project::Project) -> Result<bool, StoreError> {
        let prefix = project.project_path.rsplit('/').next().unwrap_or(&project.project_path).to_string();
        for attempt in 0..NULL_SESSION_REPAIR_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(NULL_SESSION_REPAIR_GAP).await;
            }
            if let Ok(sessions) = self.session.list_sessions().await {
                if let Some(name) = sessions.into_iter().find(|n| n.starts_with(&prefix)) {
                    self.store.set_session_name(&project.id, &name)?;
                    tracing::info!(project_id = %project.id, session_name = %name, attempt, "repaired null session name");
                    return Ok(true);
                }
            }
        }
        self.store.transition(
            &project.id,
            ProjectStatus::Processing,
            ProjectStatus::Failed,
            ProjectPatch {
                error_message: Some("unrecoverable null session name".into()),
                completed_at: Some(self.clock.unix_time()),
                ..Default::default()
            },
        )?;
        tracing::error!(project_id = %project.id, "unrecoverable null session name, project failed");
        Ok(false)
    }
}

fn completion_marker_exists(project_path: &str) -> bool {
    std::path::Path::new(project_path).join(COMPLETION_MARKER).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_adapters::session::FakeSessionAdapter;
    use conductor_core::clock::FakeClock;
    use conductor_storage::EventLog;

    fn monitor(store: Arc<Store>, adapter: FakeSessionAdapter, now: i64, config: SessionMonitorConfig) -> SessionMonitor {
        let dir = tempfile::tempdir().expect("tempdir").into_path();
        let log = EventLog::open(&dir, "2026-01-01").expect("open log");
        SessionMonitor::new(store, Arc::new(adapter), EventBus::new(log, 100), Arc::new(FakeClock::new(now)), config)
    }

    #[tokio::test]
    async fn phantom_project_past_grace_is_failed() {
        let store = Arc::new(Store::open_in_memory().expect("open"));
        let id = store.enqueue("/s/a.yml", "/p/a", &[], 0).expect("enqueue");
        store.claim_next().expect("claim");
        store
            .transition(
                &id,
                ProjectStatus::Queued,
                ProjectStatus::Processing,
                ProjectPatch { session_name: Some("conductor-a".into()), started_at: Some(0), ..Default::default() },
            )
            .expect("transition");

        let adapter = FakeSessionAdapter::new(); // session never actually exists
        let mon = monitor(store.clone(), adapter, 10_000, SessionMonitorConfig { phantom_grace_sec: 3600, orphan_grace_sec: 3600, events_date: "2026-01-01".into() });
        mon.run_once().await.expect("run");

        let project = store.get_project(&id).expect("get").expect("exists");
        assert_eq!(project.status, ProjectStatus::Failed);
    }

    #[tokio::test]
    async fn completion_marker_file_completes_the_project() {
        let project_dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(project_dir.path().join("COMPLETED"), b"").expect("write marker");
        let project_path = project_dir.path().to_str().expect("utf8 path");

        let store = Arc::new(Store::open_in_memory().expect("open"));
        let id = store.enqueue("/s/a.yml", project_path, &[], 0).expect("enqueue");
        store.claim_next().expect("claim");
        store
            .transition(
                &id,
                ProjectStatus::Queued,
                ProjectStatus::Processing,
                ProjectPatch { session_name: Some("conductor-a".into()), started_at: Some(0), ..Default::default() },
            )
            .expect("transition");

        let adapter = FakeSessionAdapter::new();
        adapter.add_session("conductor-a", conductor_adapters::session::FakeSession::default());
        let mon = monitor(store.clone(), adapter, 100, SessionMonitorConfig { phantom_grace_sec: 3600, orphan_grace_sec: 3600, events_date: "2026-01-01".into() });
        let summary = mon.run_once().await.expect("run");

        assert_eq!(summary.completed, 1);
        let project = store.get_project(&id).expect("get").expect("exists");
        assert_eq!(project.status, ProjectStatus::Completed);
        assert_eq!(project.completed_at, Some(100));
    }

    #[tokio::test]
    async fn orphan_session_past_grace_is_killed() {
        let store = Arc::new(Store::open_in_memory().expect("open"));
        let adapter = FakeSessionAdapter::new();
        adapter.add_session("conductor-stray", conductor_adapters::session::FakeSession { created_at: 0, ..Default::default() });

        let mon = monitor(store, adapter.clone(), 10_000, SessionMonitorConfig { phantom_grace_sec: 3600, orphan_grace_sec: 3600, events_date: "2026-01-01".into() });
        let summary = mon.run_once().await.expect("run");
        assert_eq!(summary.orphans_killed, 1);
        assert!(!adapter.list_sessions().await.expect("list").contains(&"conductor-stray".to_string()));
    }
}
