// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Claims queued projects within the concurrency cap and moves them into
//! PROCESSING, either by resuming a live session that already matches
//! the project's canonical name prefix, or by invoking the external
//! setup collaborator to provision a new one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use conductor_adapters::session::SessionAdapter;
use conductor_core::clock::Clock;
use conductor_core::event::Severity;
use conductor_core::project::{Project, ProjectStatus};
use conductor_storage::{ProjectPatch, Store, StoreError};

use crate::event_bus::EventBus;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("setup collaborator timed out")]
    Timeout,
    #[error("setup collaborator failed: {0}")]
    Failed(String),
}

pub struct SetupOutcome {
    pub session_name: String,
    pub est_duration_sec: i64,
    /// Informational only -- by the time `setup` runs the project has
    /// already been claimed, too late for these to gate anything.
    /// Dependency gating reads `project_dependencies` rows recorded at
    /// enqueue time instead (see `Store::enqueue`).
    pub dependencies: Vec<String>,
}

/// The external project-setup collaborator: given a spec and a working
/// directory, provisions (and names) a terminal session for the work.
#[async_trait]
pub trait ProjectSetup: Send + Sync + 'static {
    async fn setup(&self, spec_path: &str, project_path: &str, timeout: Duration) -> Result<SetupOutcome, SetupError>;
}

pub struct QueueDispatcherConfig {
    pub max_concurrent: u32,
    pub watchdog_factor: f64,
    pub max_setup_retries: u32,
    pub setup_timeout: Duration,
    pub events_date: String,
}

pub struct QueueDispatcher {
    store: Arc<Store>,
    session: Arc<dyn SessionAdapter>,
    setup: Arc<dyn ProjectSetup>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    config: QueueDispatcherConfig,
}

pub enum DispatchOutcome {
    /// No capacity, or no eligible project to claim.
    Idle,
    Resumed(Project),
    Started(Project),
    Requeued(Project),
    Failed(Project),
}

impl QueueDispatcher {
    pub fn new(
        store: Arc<Store>,
        session: Arc<dyn SessionAdapter>,
        setup: Arc<dyn ProjectSetup>,
        event_bus: EventBus,
        clock: Arc<dyn Clock>,
        config: QueueDispatcherConfig,
    ) -> Self {
        Self { store, session, setup, event_bus, clock, config }
    }

    pub async fn run_once(&self) -> Result<DispatchOutcome, StoreError> {
        let processing_count = self
            .store
            .list_non_terminal_projects()?
            .into_iter()
            .filter(|p| p.status == ProjectStatus::Processing)
            .count();
        if processing_count >= self.config.max_concurrent as usize {
            return Ok(DispatchOutcome::Idle);
        }

        let Some(project) = self.store.claim_next()? else {
            return Ok(DispatchOutcome::Idle);
        };

        let now = self.clock.unix_time();
        let prefix = canonical_prefix(&project.project_path);
        if let Some(name) = self.find_resumable_session(&prefix).await {
            self.store.transition(
                &project.id,
                ProjectStatus::Queued,
                ProjectStatus::Processing,
                ProjectPatch {
                    session_name: Some(name.clone()),
                    started_at: Some(now),
                    ..Default::default()
                },
            )?;
            self.publish("project.resumed", Severity::Info, &project, &name, now).await;
            tracing::info!(project_id = %project.id, session_name = %name, "resumed session");
            let mut resumed = project;
            resumed.status = ProjectStatus::Processing;
            resumed.session_name = Some(name);
            return Ok(DispatchOutcome::Resumed(resumed));
        }

        match self.setup.setup(&project.spec_path, &project.project_path, self.config.setup_timeout).await {
            Ok(outcome) => {
                let deadline = now + (outcome.est_duration_sec as f64 * self.config.watchdog_factor) as i64;
                self.store.transition(
                    &project.id,
                    ProjectStatus::Queued,
                    ProjectStatus::Processing,
                    ProjectPatch {
                        session_name: Some(outcome.session_name.clone()),
                        started_at: Some(now),
                        timeout_deadline: Some(deadline),
                        ..Default::default()
                    },
                )?;
                self.publish("project.started", Severity::Info, &project, &outcome.session_name, now).await;
                tracing::info!(project_id = %project.id, session_name = %outcome.session_name, deadline, "started project");
                let mut started = project;
                started.status = ProjectStatus::Processing;
                started.session_name = Some(outcome.session_name);
                started.started_at = Some(now);
                started.timeout_deadline = Some(deadline);
                Ok(DispatchOutcome::Started(started))
            }
            Err(err) => {
                let retry_count = project.retry_count + 1;
                if retry_count < self.config.max_setup_retries {
                    self.store.requeue_after_setup_failure(&project.id, retry_count, &err.to_string())?;
                    self.publish("project.setup_retry", Severity::Warn, &project, "", now).await;
                    tracing::warn!(project_id = %project.id, retry_count, error = %err, "setup failed, requeued");
                    let mut requeued = project;
                    requeued.retry_count = retry_count;
                    Ok(DispatchOutcome::Requeued(requeued))
                } else {
                    self.store.transition(
                        &project.id,
                        ProjectStatus::Queued,
                        ProjectStatus::Failed,
                        ProjectPatch {
                            error_message: Some(err.to_string()),
                            retry_count: Some(retry_count),
                            ..Default::default()
                        },
                    )?;
                    self.publish("project.setup_failed", Severity::Error, &project, "", now).await;
                    tracing::error!(project_id = %project.id, retry_count, error = %err, "setup retries exhausted, project failed");
                    let mut failed = project;
                    failed.status = ProjectStatus::Failed;
                    failed.retry_count = retry_count;
                    failed.error_message = Some(err.to_string());
                    Ok(DispatchOutcome::Failed(failed))
                }
            }
        }
    }

    async fn find_resumable_session(&self, prefix: &str) -> Option<String> {
        let sessions = self.session.list_sessions().await.ok()?;
        sessions.into_iter().find(|name| name.starts_with(prefix))
    }

    async fn publish(&self, topic: &str, severity: Severity, project: &Project, session_name: &str, now: i64) {
        self.event_bus
            .publish(
                &self.config.events_date,
                topic,
                severity,
                serde_json::json!({"project_id": project.id.as_str(), "session_name": session_name}),
                now,
            )
            .await;
    }
}

/// The bare logical session name a resumable session for this project
/// would start with. Namespacing onto a real terminal multiplexer (the
/// tmux "conductor-" prefix, say) is the adapter's concern, not this
/// one's -- `SessionAdapter` names are logical identifiers.
fn canonical_prefix(project_path: &str) -> String {
    project_path.rsplit('/').next().unwrap_or(project_path).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::clock::FakeClock;
    use conductor_storage::EventLog;

    struct FixedSetup(Result<SetupOutcome, ()>);

    #[async_trait]
    impl ProjectSetup for FixedSetup {
        async fn setup(&self, _spec: &str, _project: &str, _timeout: Duration) -> Result<SetupOutcome, SetupError> {
            match &self.0 {
                Ok(outcome) => Ok(SetupOutcome {
                    session_name: outcome.session_name.clone(),
                    est_duration_sec: outcome.est_duration_sec,
                    dependencies: outcome.dependencies.clone(),
                }),
                Err(()) => Err(SetupError::Failed("boom".into())),
            }
        }
    }

    fn config() -> QueueDispatcherConfig {
        QueueDispatcherConfig {
            max_concurrent: 4,
            watchdog_factor: 3.0,
            max_setup_retries: 2,
            setup_timeout: Duration::from_secs(30),
            events_date: "2026-01-01".into(),
        }
    }

    fn bus() -> EventBus {
        let dir = tempfile::tempdir().expect("tempdir").into_path();
        let log = EventLog::open(&dir, "2026-01-01").expect("open log");
        EventBus::new(log, 100)
    }

    #[tokio::test]
    async fn starts_a_new_project_via_setup_collaborator() {
        let store = Arc::new(Store::open_in_memory().expect("open"));
        let id = store.enqueue("/s/a.yml", "/p/a", &[], 0).expect("enqueue");
        let setup = Arc::new(FixedSetup(Ok(SetupOutcome {
            session_name: "conductor-a".into(),
            est_duration_sec: 60,
            dependencies: vec![],
        })));
        let dispatcher = QueueDispatcher::new(
            store.clone(),
            Arc::new(conductor_adapters::session::FakeSessionAdapter::new()),
            setup,
            bus(),
            Arc::new(FakeClock::new(1000)),
            config(),
        );

        match dispatcher.run_once().await.expect("run") {
            DispatchOutcome::Started(p) => {
                assert_eq!(p.id, id);
                assert_eq!(p.session_name.as_deref(), Some("conductor-a"));
                assert_eq!(p.timeout_deadline, Some(1000 + 180));
            }
            _ => panic!("expected Started"),
        }
    }

    #[tokio::test]
    async fn resumes_a_live_session_matching_the_canonical_prefix() {
        let store = Arc::new(Store::open_in_memory().expect("open"));
        let id = store.enqueue("/s/a.yml", "/p/a", &[], 0).expect("enqueue");
        let adapter = conductor_adapters::session::FakeSessionAdapter::new();
        adapter.add_session("a", conductor_adapters::session::FakeSession::default());
        let setup = Arc::new(FixedSetup(Err(())));
        let dispatcher = QueueDispatcher::new(
            store.clone(),
            Arc::new(adapter),
            setup,
            bus(),
            Arc::new(FakeClock::new(1000)),
            config(),
        );

        match dispatcher.run_once().await.expect("run") {
            DispatchOutcome::Resumed(p) => {
                assert_eq!(p.id, id);
                assert_eq!(p.session_name.as_deref(), Some("a"));
            }
            _ => panic!("expected Resumed, setup collaborator should not have been consulted"),
        }
    }

    #[tokio::test]
    async fn idle_when_at_capacity() {
        let store = Arc::new(Store::open_in_memory().expect("open"));
        store.enqueue("/s/a.yml", "/p/a", &[], 0).expect("enqueue");
        let mut cfg = config();
        cfg.max_concurrent = 0;
        let dispatcher = QueueDispatcher::new(
            store,
            Arc::new(conductor_adapters::session::FakeSessionAdapter::new()),
            Arc::new(FixedSetup(Err(()))),
            bus(),
            Arc::new(FakeClock::new(1000)),
            cfg,
        );
        assert!(matches!(dispatcher.run_once().await.expect("run"), DispatchOutcome::Idle));
    }

    #[tokio::test]
    async fn a_project_with_unmet_dependencies_is_not_claimed_ahead_of_them() {
        let store = Arc::new(Store::open_in_memory().expect("open"));
        let a = store.enqueue("/s/a.yml", "/p/a", &[], 0).expect("enqueue a");
        let b = store.enqueue("/s/b.yml", "/p/b", &[a.clone()], 0).expect("enqueue b depending on a");
        let setup = Arc::new(FixedSetup(Ok(SetupOutcome {
            session_name: "conductor-a".into(),
            est_duration_sec: 60,
            dependencies: vec![],
        })));
        let dispatcher = QueueDispatcher::new(
            store.clone(),
            Arc::new(conductor_adapters::session::FakeSessionAdapter::new()),
            setup,
            bus(),
            Arc::new(FakeClock::new(1000)),
            config(),
        );

        // A is the only eligible row; B is skipped while its dependency is unmet.
        match dispatcher.run_once().await.expect("run") {
            DispatchOutcome::Started(p) => assert_eq!(p.id, a),
            _ => panic!("expected A to start"),
        }

        store
            .transition(&a, ProjectStatus::Processing, ProjectStatus::Completed, ProjectPatch { completed_at: Some(1100), ..Default::default() })
            .expect("complete a");

        match dispatcher.run_once().await.expect("run") {
            DispatchOutcome::Started(p) => assert_eq!(p.id, b, "b becomes eligible once a completes"),
            _ => panic!("expected B to start now that A is complete"),
        }
    }
}
