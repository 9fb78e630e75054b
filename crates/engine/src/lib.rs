// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! The scheduler's behavioral components: the lock manager, event bus,
//! messenger, the three dispatch/monitor/recovery loops, the watchdog,
//! and the `Runtime` composition root that wires them to a
//! `SessionAdapter` and `NotifyAdapter`.

pub mod event_bus;
pub mod lock_manager;
pub mod messenger;
pub mod queue_dispatcher;
pub mod recovery_manager;
pub mod runtime;
pub mod session_monitor;
pub mod task_dispatcher;
pub mod watchdog;

pub use event_bus::EventBus;
pub use lock_manager::{LockError, LockManager};
pub use messenger::{Messenger, MessengerError};
pub use queue_dispatcher::{DispatchOutcome, ProjectSetup, QueueDispatcher, QueueDispatcherConfig, SetupError, SetupOutcome};
pub use recovery_manager::{RecoveryManager, RecoverySummary};
pub use runtime::Runtime;
pub use session_monitor::{ReconcileSummary, SessionMonitor};
pub use task_dispatcher::{TaskDispatcher, TaskDispatcherConfig};
pub use watchdog::{Watchdog, WatchdogSummary};
