// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Soft/hard deadline enforcement for PROCESSING projects, plus the
//! bounded heartbeat-extension mechanism external code uses to push a
//! hard deadline out while an agent is still making progress.

use std::sync::Arc;

use conductor_core::clock::Clock;
use conductor_core::event::Severity;
use conductor_core::id::ProjectId;
use conductor_core::project::ProjectStatus;
use conductor_storage::{ProjectPatch, Store, StoreError};

use crate::event_bus::EventBus;

pub struct WatchdogConfig {
    pub watchdog_factor: f64,
    pub heartbeat_extension_sec: i64,
    pub heartbeat_max_extensions: u32,
    pub events_date: String,
}

pub struct Watchdog {
    store: Arc<Store>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    config: WatchdogConfig,
}

#[derive(Debug, Default)]
pub struct WatchdogSummary {
    pub soft_timeouts: u32,
    pub hard_timeouts: u32,
}

impl Watchdog {
    pub fn new(store: Arc<Store>, event_bus: EventBus, clock: Arc<dyn Clock>, config: WatchdogConfig) -> Self {
        Self { store, event_bus, clock, config }
    }

    pub async fn run_once(&self) -> Result<WatchdogSummary, StoreError> {
        let now = self.clock.unix_time();
        let mut summary = WatchdogSummary::default();

        for project in self.store.list_non_terminal_projects()? {
            if project.status != ProjectStatus::Processing {
                continue;
            }
            let Some(started_at) = project.started_at else { continue };
            let Some(deadline) = project.timeout_deadline else { continue };

            let soft_deadline = started_at + ((deadline - started_at) as f64 / self.config.watchdog_factor) as i64;
            if now >= soft_deadline && now < deadline {
                self.event_bus
                    .publish(
                        &self.config.events_date,
                        "project.soft_timeout",
                        Severity::Warn,
                        serde_json::json!({"project_id": project.id.as_str()}),
                        now,
                    )
                    .await;
                tracing::warn!(project_id = %project.id, soft_deadline, "soft timeout");
                summary.soft_timeouts += 1;
            }

            if now >= deadline {
                self.store.transition(
                    &project.id,
                    ProjectStatus::Processing,
                    ProjectStatus::Failed,
                    ProjectPatch {
                        error_message: Some("hard timeout".into()),
                        completed_at: Some(now),
                        ..Default::default()
                    },
                )?;
                self.event_bus
                    .publish(
                        &self.config.events_date,
                        "project.hard_timeout",
                        Severity::Error,
                        serde_json::json!({"project_id": project.id.as_str()}),
                        now,
                    )
                    .await;
                tracing::error!(project_id = %project.id, deadline, "hard timeout, project failed");
                summary.hard_timeouts += 1;
            }
        }

        Ok(summary)
    }

    /// Records a heartbeat for `project_id`, extending the hard deadline
    /// by one bounded increment if extensions remain.
    pub fn heartbeat(&self, project_id: &ProjectId) -> Result<bool, StoreError> {
        let now = self.clock.unix_time();
        self.store.heartbeat(project_id, now, self.config.heartbeat_extension_sec, self.config.heartbeat_max_extensions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::clock::FakeClock;
    use conductor_storage::EventLog;

    fn watchdog(store: Arc<Store>, now: i64, factor: f64) -> Watchdog {
        let dir = tempfile::tempdir().expect("tempdir").into_path();
        let log = EventLog::open(&dir, "2026-01-01").expect("open log");
        Watchdog::new(
            store,
            EventBus::new(log, 100),
            Arc::new(FakeClock::new(now)),
            WatchdogConfig { watchdog_factor: factor, heartbeat_extension_sec: 60, heartbeat_max_extensions: 3, events_date: "2026-01-01".into() },
        )
    }

    fn processing_project(store: &Store) -> ProjectId {
        let id = store.enqueue("/s/a.yml", "/p/a", &[], 0).expect("enqueue");
        store.claim_next().expect("claim");
        store
            .transition(&id, ProjectStatus::Queued, ProjectStatus::Processing, ProjectPatch {
                session_name: Some("conductor-a".into()),
                started_at: Some(0),
                timeout_deadline: Some(90),
                ..Default::default()
            })
            .expect("transition");
        id
    }

    #[tokio::test]
    async fn fires_soft_timeout_without_changing_state() {
        let store = Arc::new(Store::open_in_memory().expect("open"));
        let id = processing_project(&store);
        let wd = watchdog(store.clone(), 40, 3.0); // soft deadline at 30 (90/3)
        let summary = wd.run_once().await.expect("run");
        assert_eq!(summary.soft_timeouts, 1);
        assert_eq!(summary.hard_timeouts, 0);
        assert_eq!(store.get_project(&id).expect("get").expect("exists").status, ProjectStatus::Processing);
    }

    #[tokio::test]
    async fn fires_hard_timeout_and_fails_the_project() {
        let store = Arc::new(Store::open_in_memory().expect("open"));
        let id = processing_project(&store);
        let wd = watchdog(store.clone(), 200, 3.0);
        let summary = wd.run_once().await.expect("run");
        assert_eq!(summary.hard_timeouts, 1);
        assert_eq!(store.get_project(&id).expect("get").expect("exists").status, ProjectStatus::Failed);
    }

    #[tokio::test]
    async fn heartbeat_extends_deadline_up_to_the_cap() {
        let store = Arc::new(Store::open_in_memory().expect("open"));
        let id = processing_project(&store);
        let wd = watchdog(store.clone(), 10, 3.0);
        for _ in 0..3 {
            assert!(wd.heartbeat(&id).expect("heartbeat"));
        }
        assert!(!wd.heartbeat(&id).expect("heartbeat"), "fourth call exceeds the cap and does not extend");
    }
}
