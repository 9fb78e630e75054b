// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The composition root: one `Runtime` value, built once at daemon
//! startup, holding every shared collaborator the background loops
//! need. Nothing here is a global or a lazily-initialized singleton --
//! every dependency is constructed explicitly and passed down.

use std::sync::Arc;

use conductor_adapters::notify::NotifyAdapter;
use conductor_adapters::session::SessionAdapter;
use conductor_core::clock::Clock;
use conductor_core::config::Config;
use conductor_storage::{EventLog, Store};

use crate::event_bus::EventBus;
use crate::messenger::Messenger;
use crate::queue_dispatcher::{ProjectSetup, QueueDispatcher, QueueDispatcherConfig};
use crate::recovery_manager::{RecoveryManager, RecoveryManagerConfig};
use crate::session_monitor::{SessionMonitor, SessionMonitorConfig};
use crate::task_dispatcher::{TaskDispatcher, TaskDispatcherConfig};
use crate::watchdog::{Watchdog, WatchdogConfig};

/// Everything a background loop needs, wired up once at startup from
/// `Config` and the chosen adapter implementations.
pub struct Runtime {
    pub config: Config,
    pub store: Arc<Store>,
    pub clock: Arc<dyn Clock>,
    pub session: Arc<dyn SessionAdapter>,
    pub notifier: Arc<dyn NotifyAdapter>,
    pub event_bus: EventBus,
}

impl Runtime {
    pub fn new(
        config: Config,
        clock: Arc<dyn Clock>,
        session: Arc<dyn SessionAdapter>,
        notifier: Arc<dyn NotifyAdapter>,
    ) -> Result<Self, conductor_storage::StoreError> {
        let store = Arc::new(Store::open(&config.db_path())?);
        let today = today_string(clock.unix_time());
        let log = EventLog::open(&config.events_dir(), &today)?;
        let event_bus = EventBus::new(log, config.rate_limit_per_min);

        Ok(Self { config, store, clock, session, notifier, event_bus })
    }

    pub fn events_date(&self) -> String {
        today_string(self.clock.unix_time())
    }

    pub fn messenger(&self) -> Result<Arc<Messenger>, regex::Error> {
        Ok(Arc::new(Messenger::new(
            self.session.clone(),
            self.event_bus.clone(),
            self.clock.clone(),
            &self.config.shell_prompt_pattern,
            self.events_date(),
        )?))
    }

    pub fn task_dispatcher(&self, messenger: Arc<Messenger>) -> TaskDispatcher {
        TaskDispatcher::new(
            self.store.clone(),
            messenger,
            self.session.clone(),
            self.event_bus.clone(),
            TaskDispatcherConfig {
                backoff_base_sec: self.config.backoff_base_sec,
                backoff_multiplier: self.config.backoff_multiplier,
                orphan_grace_sec: self.config.orphan_grace_sec as i64,
                events_date: self.events_date(),
            },
        )
    }

    pub fn queue_dispatcher(&self, setup: Arc<dyn ProjectSetup>) -> QueueDispatcher {
        QueueDispatcher::new(
            self.store.clone(),
            self.session.clone(),
            setup,
            self.event_bus.clone(),
            self.clock.clone(),
            QueueDispatcherConfig {
                max_concurrent: self.config.max_concurrent,
                watchdog_factor: self.config.watchdog_factor,
                max_setup_retries: self.config.max_task_retries,
                setup_timeout: std::time::Duration::from_secs(self.config.poll_interval_sec * 6),
                events_date: self.events_date(),
            },
        )
    }

    pub fn session_monitor(&self) -> SessionMonitor {
        SessionMonitor::new(
            self.store.clone(),
            self.session.clone(),
            self.event_bus.clone(),
            self.clock.clone(),
            SessionMonitorConfig {
                phantom_grace_sec: self.config.phantom_grace_sec as i64,
                orphan_grace_sec: self.config.orphan_grace_sec as i64,
                events_date: self.events_date(),
            },
        )
    }

    pub fn recovery_manager(&self) -> RecoveryManager {
        RecoveryManager::new(
            self.store.clone(),
            self.session.clone(),
            self.event_bus.clone(),
            self.clock.clone(),
            RecoveryManagerConfig {
                phantom_grace_sec: self.config.phantom_grace_sec as i64,
                orphan_grace_sec: self.config.orphan_grace_sec as i64,
                events_date: self.events_date(),
            },
        )
    }

    pub fn watchdog(&self) -> Watchdog {
        Watchdog::new(
            self.store.clone(),
            self.event_bus.clone(),
            self.clock.clone(),
            WatchdogConfig {
                watchdog_factor: self.config.watchdog_factor,
                heartbeat_extension_sec: (self.config.watchdog_factor * self.config.poll_interval_sec as f64) as i64,
                heartbeat_max_extensions: self.config.heartbeat_max_extensions,
                events_date: self.events_date(),
            },
        )
    }
}

/// `YYYY-MM-DD` for epoch seconds `ts`, in UTC.
fn today_string(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .unwrap_or_default()
        .format("%Y-%m-%d")
        .to_string()
}
