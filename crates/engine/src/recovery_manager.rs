// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup reconciliation, run once before any background loop starts.
//! Brings the store's view of non-terminal projects back in line with
//! whatever actually happened while the daemon was last down: resumes
//! rows with a still-live session, repairs or fails rows whose session
//! vanished, and clears any claim left half-finished by a crash between
//! `claim_next` and the caller's promoting transition.

use std::sync::Arc;

use conductor_adapters::session::SessionAdapter;
use conductor_core::clock::Clock;
use conductor_core::event::Severity;
use conductor_core::project::ProjectStatus;
use conductor_storage::{ProjectPatch, Store, StoreError};

use crate::event_bus::EventBus;
use crate::session_monitor::{SessionMonitor, SessionMonitorConfig};

pub struct RecoveryManagerConfig {
    pub phantom_grace_sec: i64,
    pub orphan_grace_sec: i64,
    pub events_date: String,
}

pub struct RecoveryManager {
    store: Arc<Store>,
    session: Arc<dyn SessionAdapter>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    config: RecoveryManagerConfig,
}

#[derive(Debug, Default, serde::Serialize)]
pub struct RecoverySummary {
    pub repaired: u32,
    pub failed: u32,
    pub resumed: u32,
    pub claims_cleared: u64,
}

impl RecoveryManager {
    pub fn new(
        store: Arc<Store>,
        session: Arc<dyn SessionAdapter>,
        event_bus: EventBus,
        clock: Arc<dyn Clock>,
        config: RecoveryManagerConfig,
    ) -> Self {
        Self { store, session, event_bus, clock, config }
    }

    pub async fn run(&self) -> Result<RecoverySummary, StoreError> {
        let now = self.clock.unix_time();
        let claims_cleared = self.store.sweep_abandoned_claims()?;
        if claims_cleared > 0 {
            tracing::warn!(claims_cleared, "cleared abandoned claims left by a crash between claim and promotion");
        }

        let mut summary = RecoverySummary { claims_cleared, ..Default::default() };

        for project in self.store.list_non_terminal_projects()? {
            if project.status != ProjectStatus::Processing {
                continue;
            }
            let Some(name) = &project.session_name else {
                let monitor = SessionMonitor::new(
                    self.store.clone(),
                    self.session.clone(),
                    self.event_bus.clone(),
                    self.clock.clone(),
                    SessionMonitorConfig {
                        phantom_grace_sec: self.config.phantom_grace_sec,
                        orphan_grace_sec: self.config.orphan_grace_sec,
                        events_date: self.config.events_date.clone(),
                    },
                );
                let reconciled = monitor.run_once().await?;
                if reconciled.null_sessions_repaired > 0 {
                    summary.repaired += 1;
                } else {
                    summary.failed += 1;
                }
                continue;
            };

            if self.session.has_session(name).await.unwrap_or(false) {
                self.store.heartbeat(&project.id, now, 0, u32::MAX)?;
                tracing::info!(project_id = %project.id, session_name = %name, "resumed at startup");
                summary.resumed += 1;
            } else {
                self.store.transition(
                    &project.id,
                    ProjectStatus::Processing,
                    ProjectStatus::Failed,
                    ProjectPatch {
                        error_message: Some("session missing at startup".into()),
                        completed_at: Some(now),
                        ..Default::default()
                    },
                )?;
                tracing::error!(project_id = %project.id, session_name = %name, "session missing at startup, project failed");
                summary.failed += 1;
            }
        }

        self.event_bus
            .publish(
                &self.config.events_date,
                "recovery.completed",
                Severity::Info,
                serde_json::json!({
                    "repaired": summary.repaired,
                    "failed": summary.failed,
                    "resumed": summary.resumed,
                    "claims_cleared": summary.claims_cleared,
                }),
                now,
            )
            .await;

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_adapters::session::{FakeSession, FakeSessionAdapter};
    use conductor_core::clock::FakeClock;
    use conductor_storage::EventLog;

    fn manager(store: Arc<Store>, adapter: FakeSessionAdapter, now: i64) -> RecoveryManager {
        let dir = tempfile::tempdir().expect("tempdir").into_path();
        let log = EventLog::open(&dir, "2026-01-01").expect("open log");
        RecoveryManager::new(
            store,
            Arc::new(adapter),
            EventBus::new(log, 100),
            Arc::new(FakeClock::new(now)),
            RecoveryManagerConfig { phantom_grace_sec: 3600, orphan_grace_sec: 3600, events_date: "2026-01-01".into() },
        )
    }

    #[tokio::test]
    async fn resumes_processing_row_with_live_session() {
        let store = Arc::new(Store::open_in_memory().expect("open"));
        let id = store.enqueue("/s/a.yml", "/p/a", &[], 0).expect("enqueue");
        store.claim_next().expect("claim");
        store
            .transition(&id, ProjectStatus::Queued, ProjectStatus::Processing, ProjectPatch {
                session_name: Some("conductor-a".into()),
                started_at: Some(0),
                ..Default::default()
            })
            .expect("transition");

        let adapter = FakeSessionAdapter::new();
        adapter.add_session("conductor-a", FakeSession::default());

        let summary = manager(store.clone(), adapter, 100).await.run().await.expect("run");
        assert_eq!(summary.resumed, 1);
        assert_eq!(store.get_project(&id).expect("get").expect("exists").status, ProjectStatus::Processing);
    }

    #[tokio::test]
    async fn fails_processing_row_with_missing_session() {
        let store = Arc::new(Store::open_in_memory().expect("open"));
        let id = store.enqueue("/s/a.yml", "/p/a", &[], 0).expect("enqueue");
        store.claim_next().expect("claim");
        store
            .transition(&id, ProjectStatus::Queued, ProjectStatus::Processing, ProjectPatch {
                session_name: Some("conductor-a".into()),
                started_at: Some(0),
                ..Default::default()
            })
            .expect("transition");

        let summary = manager(store.clone(), FakeSessionAdapter::new(), 100).await.run().await.expect("run");
        assert_eq!(summary.failed, 1);
        assert_eq!(store.get_project(&id).expect("get").expect("exists").status, ProjectStatus::Failed);
    }

    #[tokio::test]
    async fn clears_a_stale_claim() {
        let store = Arc::new(Store::open_in_memory().expect("open"));
        let id = store.enqueue("/s/a.yml", "/p/a", &[], 0).expect("enqueue");
        store.claim_next().expect("claim"); // leaves the row in 'claiming'

        let summary = manager(store.clone(), FakeSessionAdapter::new(), 100).await.run().await.expect("run");
        assert_eq!(summary.claims_cleared, 1);
        assert_eq!(store.get_project(&id).expect("get").expect("exists").status, ProjectStatus::Queued);
    }

    #[tokio::test]
    async fn running_recovery_twice_in_a_row_is_idempotent() {
        let store = Arc::new(Store::open_in_memory().expect("open"));
        store.enqueue("/s/a.yml", "/p/a", &[], 0).expect("enqueue");

        let mgr = manager(store.clone(), FakeSessionAdapter::new(), 100);
        mgr.run().await.expect("first run");
        let second = mgr.run().await.expect("second run");
        assert_eq!(second.repaired, 0);
        assert_eq!(second.failed, 0);
        assert_eq!(second.resumed, 0);
        assert_eq!(second.claims_cleared, 0);
    }
}
