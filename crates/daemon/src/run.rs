// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Drives the background loops from a completed [`Bootstrap`] until
//! SIGTERM/SIGINT, then releases the lock. Shared between the
//! `conductord` binary and the CLI's `daemon` subcommand.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info};

use conductor_adapters::notify::NotifyAdapter;
use conductor_core::clock::Clock;
use conductor_core::event::Severity;
use conductor_engine::EventBus;

use crate::lifecycle::Bootstrap;

const FLUSH_INTERVAL: Duration = Duration::from_millis(10);

/// Runs the queue-dispatch, task-dispatch, session-monitor, and
/// watchdog loops at their configured cadence, plus the event-bus
/// flush task, until a shutdown signal arrives or a loop hits a fatal
/// error. Blocks until then.
pub async fn run(bootstrap: Bootstrap) -> std::io::Result<()> {
    let Bootstrap { config, mut lock, runtime, messenger, setup } = bootstrap;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poll = Duration::from_secs(config.poll_interval_sec.max(1));
    let sync = Duration::from_secs(config.state_sync_interval_sec.max(1));

    let clock = runtime.clock.clone();
    let events_date = runtime.events_date();
    let notifier = runtime.notifier.clone();
    let task_dispatcher = Arc::new(runtime.task_dispatcher(messenger));
    let queue_dispatcher = Arc::new(runtime.queue_dispatcher(setup));
    let session_monitor = Arc::new(runtime.session_monitor());
    let watchdog = Arc::new(runtime.watchdog());
    let event_bus = runtime.event_bus.clone();

    let mut handles = Vec::new();
    {
        let queue_dispatcher = queue_dispatcher.clone();
        handles.push(tokio::spawn(loop_task(
            "queue-dispatch", poll, shutdown_tx.clone(), shutdown_rx.clone(), clock.clone(), event_bus.clone(), notifier.clone(), events_date.clone(),
            move |_now| { let queue_dispatcher = queue_dispatcher.clone(); async move { queue_dispatcher.run_once().await.map(|_| ()) } },
        )));
    }
    {
        let task_dispatcher = task_dispatcher.clone();
        handles.push(tokio::spawn(loop_task(
            "task-dispatch", poll, shutdown_tx.clone(), shutdown_rx.clone(), clock.clone(), event_bus.clone(), notifier.clone(), events_date.clone(),
            move |now| { let task_dispatcher = task_dispatcher.clone(); async move { task_dispatcher.run_once(now).await.map(|_| ()) } },
        )));
    }
    {
        let session_monitor = session_monitor.clone();
        handles.push(tokio::spawn(loop_task(
            "session-monitor", sync, shutdown_tx.clone(), shutdown_rx.clone(), clock.clone(), event_bus.clone(), notifier.clone(), events_date.clone(),
            move |_now| { let session_monitor = session_monitor.clone(); async move { session_monitor.run_once().await.map(|_| ()) } },
        )));
    }
    {
        let watchdog = watchdog.clone();
        handles.push(tokio::spawn(loop_task(
            "watchdog", sync, shutdown_tx.clone(), shutdown_rx.clone(), clock.clone(), event_bus.clone(), notifier.clone(), events_date.clone(),
            move |_now| { let watchdog = watchdog.clone(); async move { watchdog.run_once().await.map(|_| ()) } },
        )));
    }
    handles.push(tokio::spawn(spawn_flush_task(event_bus, shutdown_rx.clone())));

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut shutdown_requested = shutdown_rx.clone();

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
        _ = shutdown_requested.changed() => info!("a loop requested shutdown after a fatal error"),
    }

    let _ = shutdown_tx.send(true);
    let grace = Duration::from_secs(config.shutdown_grace_sec.max(1));
    if tokio::time::timeout(grace, join_all(handles)).await.is_err() {
        tracing::warn!(grace_sec = config.shutdown_grace_sec, "shutdown grace period elapsed, forcing exit");
    }

    lock.release();
    Ok(())
}

async fn join_all(handles: Vec<tokio::task::JoinHandle<()>>) {
    for handle in handles {
        let _ = handle.await;
    }
}

/// Runs `body` every `interval` until `shutdown` fires. `now` is the
/// loop's own view of wall-clock time, refreshed each tick. A fatal
/// `StoreError` publishes a critical event, emails the operator via
/// `notifier`, and requests daemon-wide shutdown via `shutdown_tx`
/// rather than being retried forever; any other error is logged and
/// the loop continues.
#[allow(clippy::too_many_arguments)]
async fn loop_task<F, Fut>(
    name: &'static str,
    interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    mut shutdown: watch::Receiver<bool>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    notifier: Arc<dyn NotifyAdapter>,
    events_date: String,
    mut body: F,
) where
    F: FnMut(i64) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<(), conductor_storage::StoreError>>,
{
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = clock.unix_time();
                if let Err(err) = body(now).await {
                    if err.is_fatal() {
                        error!(loop_name = name, %err, "fatal error, requesting daemon shutdown");
                        event_bus
                            .publish(&events_date, "daemon.fatal", Severity::Critical, serde_json::json!({"loop": name, "error": err.to_string()}), now)
                            .await;
                        let subject = format!("conductor daemon: fatal error in {name}");
                        let message = format!("loop {name} hit a fatal store error and the daemon is shutting down: {err}");
                        if let Err(notify_err) = notifier.notify(Severity::Critical, &subject, &message).await {
                            error!(loop_name = name, %notify_err, "failed to send fatal-error notification");
                        }
                        let _ = shutdown_tx.send(true);
                        break;
                    }
                    error!(loop_name = name, %err, "loop iteration failed");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

async fn spawn_flush_task(event_bus: EventBus, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if event_bus.needs_flush() {
                    event_bus.flush();
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    event_bus.flush();
                    break;
                }
            }
        }
    }
}
