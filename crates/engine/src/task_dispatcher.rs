// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Polls for due scheduled-message tasks, delivers each through the
//! [`Messenger`], and records the outcome. Also retires poison tasks
//! whose target session has been gone for too long, independent of
//! their retry count.

use std::sync::Arc;

use conductor_adapters::session::SessionAdapter;
use conductor_core::event::Severity;
use conductor_core::task::backoff_delay_secs;
use conductor_storage::Store;

use crate::event_bus::EventBus;
use crate::messenger::Messenger;

pub struct TaskDispatcherConfig {
    pub backoff_base_sec: u32,
    pub backoff_multiplier: u32,
    pub orphan_grace_sec: i64,
    pub events_date: String,
}

pub struct TaskDispatcher {
    store: Arc<Store>,
    messenger: Arc<Messenger>,
    session: Arc<dyn SessionAdapter>,
    event_bus: EventBus,
    config: TaskDispatcherConfig,
}

impl TaskDispatcher {
    pub fn new(
        store: Arc<Store>,
        messenger: Arc<Messenger>,
        session: Arc<dyn SessionAdapter>,
        event_bus: EventBus,
        config: TaskDispatcherConfig,
    ) -> Self {
        Self { store, messenger, session, event_bus, config }
    }

    /// Runs one poll iteration: dispatch every due task, then retire any
    /// poison task whose target session has been gone past the grace
    /// period.
    pub async fn run_once(&self, now: i64) -> Result<usize, conductor_storage::StoreError> {
        let due = self.store.tasks_due(now)?;
        let dispatched = due.len();

        for task in due {
            if self.is_poisoned(&task.session_name, now).await {
                tracing::warn!(task_id = %task.id, session_name = %task.session_name, "disabling poison task, session gone");
                self.store.disable_task(&task.id, "session_gone")?;
                self.publish_disabled(&task.id, "session_gone", now).await;
                continue;
            }

            let payload = format!("{}\n", task.payload.trim_end_matches('\n'));
            let result = self.messenger.deliver(&task.session_name, task.window_target, &payload).await;
            let backoff = backoff_delay_secs(self.config.backoff_base_sec, self.config.backoff_multiplier, task.retry_count);

            match result {
                Ok(()) => {
                    self.store.record_task_result(&task.id, true, None, now, backoff)?;
                }
                Err(err) => {
                    tracing::warn!(task_id = %task.id, session_name = %task.session_name, error = %err, "task delivery failed");
                    let disabled = self.store.record_task_result(&task.id, false, Some(&err.to_string()), now, backoff)?;
                    if disabled {
                        tracing::error!(task_id = %task.id, "task exhausted retries, disabled");
                        self.publish_disabled(&task.id, &err.to_string(), now).await;
                    }
                }
            }
        }

        Ok(dispatched)
    }

    async fn publish_disabled(&self, task_id: &conductor_core::id::TaskId, reason: &str, now: i64) {
        self.event_bus
            .publish(
                &self.config.events_date,
                "task.disabled",
                Severity::Warn,
                serde_json::json!({"task_id": task_id.as_str(), "disabled": true, "reason": reason}),
                now,
            )
            .await;
    }

    async fn is_poisoned(&self, session_name: &str, now: i64) -> bool {
        match self.session.session_age_secs(session_name, now).await {
            Ok(Some(_)) => false,
            Ok(None) => {
                // `None` means the session was never observed; treat as
                // gone only once confirmed absent via `has_session`.
                matches!(self.session.has_session(session_name).await, Ok(false))
                    && self.config.orphan_grace_sec <= 0
            }
            Err(_) => false,
        }
    }
}
