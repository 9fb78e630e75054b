// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process publish/subscribe over [`Event`]s. Every publish is first
//! appended to the durable JSONL log, then fanned out to each topic's
//! subscribers in the order it was accepted (per-topic FIFO). Critical
//! events always bypass the per-topic rate limit; a lagging subscriber
//! with a full channel only drops a non-critical publish, never a
//! critical one.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use conductor_core::event::{Event, Severity};
use conductor_storage::EventLog;

const SUBSCRIBER_CHANNEL_CAPACITY: usize = 256;
const RATE_LIMIT_WINDOW_SECS: i64 = 60;

struct RateWindow {
    timestamps: Vec<i64>,
}

impl RateWindow {
    fn new() -> Self {
        Self { timestamps: Vec::new() }
    }

    /// Prunes timestamps outside the rolling window, then returns
    /// whether accepting one more publish at `now` would still be
    /// within `limit_per_min`.
    fn try_accept(&mut self, now: i64, limit_per_min: u32) -> bool {
        self.timestamps.retain(|&ts| now - ts < RATE_LIMIT_WINDOW_SECS);
        if self.timestamps.len() >= limit_per_min as usize {
            false
        } else {
            self.timestamps.push(now);
            true
        }
    }
}

struct Inner {
    log: Mutex<EventLog>,
    subscribers: Mutex<HashMap<String, Vec<mpsc::Sender<Event>>>>,
    rate_windows: Mutex<HashMap<String, RateWindow>>,
    rate_limit_per_min: u32,
    dropped: std::sync::atomic::AtomicU64,
    rate_limited: std::sync::atomic::AtomicU64,
}

#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    pub fn new(log: EventLog, rate_limit_per_min: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                log: Mutex::new(log),
                subscribers: Mutex::new(HashMap::new()),
                rate_windows: Mutex::new(HashMap::new()),
                rate_limit_per_min,
                dropped: std::sync::atomic::AtomicU64::new(0),
                rate_limited: std::sync::atomic::AtomicU64::new(0),
            }),
        }
    }

    /// Registers a new subscriber for `topic`, returning the receiving
    /// half of its bounded channel.
    pub fn subscribe(&self, topic: &str) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        self.inner
            .subscribers
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(tx);
        rx
    }

    pub async fn publish(&self, date: &str, topic: &str, severity: Severity, payload: serde_json::Value, now: i64) {
        let event = Event::new(now, topic, severity, payload);

        {
            let mut log = self.inner.log.lock();
            if let Err(err) = log.append(date, &event) {
                tracing::error!(error = %err, topic = %topic, "failed to append event to durable log");
            }
        }

        if !severity.bypasses_rate_limit() {
            let mut windows = self.inner.rate_windows.lock();
            let window = windows.entry(topic.to_string()).or_insert_with(RateWindow::new);
            if !window.try_accept(now, self.inner.rate_limit_per_min) {
                self.inner.rate_limited.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                tracing::warn!(topic = %topic, "event rate limited, not fanned out");
                return;
            }
        }

        let subs = self.inner.subscribers.lock().get(topic).cloned().unwrap_or_default();
        for tx in subs {
            if severity.bypasses_rate_limit() {
                if tx.send(event.clone()).await.is_err() {
                    tracing::warn!(topic = %topic, "critical event subscriber channel closed");
                }
            } else if tx.try_send(event.clone()).is_err() {
                self.inner.dropped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                tracing::warn!(topic = %topic, "subscriber lagging, dropped non-critical event");
            }
        }
    }

    pub fn needs_flush(&self) -> bool {
        self.inner.log.lock().needs_flush()
    }

    pub fn flush(&self) {
        if let Err(err) = self.inner.log.lock().flush() {
            tracing::error!(error = %err, "failed to flush event log");
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn rate_limited_count(&self) -> u64 {
        self.inner.rate_limited.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus(rate_limit: u32) -> EventBus {
        let dir = tempfile::tempdir().expect("tempdir");
        // Leak the tempdir so the log outlives the test body; fine in a
        // short-lived test process.
        let path = dir.into_path();
        let log = EventLog::open(&path, "2026-01-01").expect("open log");
        EventBus::new(log, rate_limit)
    }

    #[tokio::test]
    async fn subscriber_observes_publishes_in_order() {
        let bus = bus(100);
        let mut rx = bus.subscribe("topic.a");
        bus.publish("2026-01-01", "topic.a", Severity::Info, serde_json::json!({"n": 1}), 1).await;
        bus.publish("2026-01-01", "topic.a", Severity::Info, serde_json::json!({"n": 2}), 2).await;

        let first = rx.recv().await.expect("first");
        let second = rx.recv().await.expect("second");
        assert_eq!(first.payload["n"], 1);
        assert_eq!(second.payload["n"], 2);
    }

    #[tokio::test]
    async fn non_critical_publishes_beyond_the_limit_are_not_fanned_out() {
        let bus = bus(2);
        let mut rx = bus.subscribe("topic.a");
        for i in 0..5 {
            bus.publish("2026-01-01", "topic.a", Severity::Info, serde_json::json!({"n": i}), 1).await;
        }
        drop(bus);
        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 2, "only the first 2 within the window should fan out");
    }

    #[tokio::test]
    async fn critical_events_bypass_the_rate_limit() {
        let bus = bus(1);
        let mut rx = bus.subscribe("topic.a");
        bus.publish("2026-01-01", "topic.a", Severity::Info, serde_json::json!({"n": 1}), 1).await;
        bus.publish("2026-01-01", "topic.a", Severity::Info, serde_json::json!({"n": 2}), 1).await; // rate limited
        bus.publish("2026-01-01", "topic.a", Severity::Critical, serde_json::json!({"n": 3}), 1).await;

        let first = rx.recv().await.expect("first");
        let second = rx.recv().await.expect("second critical bypasses limit");
        assert_eq!(first.payload["n"], 1);
        assert_eq!(second.payload["n"], 3);
    }
}
