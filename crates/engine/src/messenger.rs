// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delivers a text payload into a pane: confirms the pane is ready to
//! receive input, resets any stray input state, sends the payload, and
//! records the outcome on the event bus.

use std::sync::Arc;

use regex::Regex;
use thiserror::Error;

use conductor_adapters::session::{SessionAdapter, SessionError};
use conductor_core::clock::Clock;
use conductor_core::event::Severity;

use crate::event_bus::EventBus;

#[derive(Debug, Error)]
pub enum MessengerError {
    #[error("target pane is not ready to receive input")]
    SessionUnavailable,
    #[error("message payload must end with a newline")]
    MissingNewline,
    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

const RESET_GAP: std::time::Duration = std::time::Duration::from_millis(100);

pub struct Messenger {
    session: Arc<dyn SessionAdapter>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    shell_prompt: Regex,
    events_date: String,
}

impl Messenger {
    pub fn new(
        session: Arc<dyn SessionAdapter>,
        event_bus: EventBus,
        clock: Arc<dyn Clock>,
        shell_prompt_pattern: &str,
        events_date: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            session,
            event_bus,
            clock,
            shell_prompt: Regex::new(shell_prompt_pattern)?,
            events_date: events_date.into(),
        })
    }

    /// A pane is "shell-like" -- and therefore not ready for another
    /// message -- if its last non-empty captured line matches the
    /// configured shell prompt pattern.
    fn pane_is_shell(&self, captured: &str) -> bool {
        match captured.lines().rev().find(|l| !l.trim().is_empty()) {
            Some(last) => self.shell_prompt.is_match(last),
            None => true,
        }
    }

    pub async fn deliver(&self, target: &str, window_index: u32, payload: &str) -> Result<(), MessengerError> {
        if !payload.ends_with('\n') {
            return Err(MessengerError::MissingNewline);
        }

        let has_session = self.session.has_session(target).await?;
        let captured = if has_session {
            self.session.capture_pane(target, window_index, 20).await.unwrap_or_default()
        } else {
            String::new()
        };
        let ready = has_session && !self.pane_is_shell(&captured);
        if !ready {
            return Err(MessengerError::SessionUnavailable);
        }

        let result = self.send(target, window_index, payload).await;

        let now = self.clock.unix_time();
        match &result {
            Ok(()) => {
                self.event_bus
                    .publish(
                        &self.events_date,
                        "message.sent",
                        Severity::Info,
                        serde_json::json!({"target": target, "size": payload.len(), "ts": now}),
                        now,
                    )
                    .await;
            }
            Err(err) => {
                self.event_bus
                    .publish(
                        &self.events_date,
                        "message.failed",
                        Severity::Warn,
                        serde_json::json!({"target": target, "error": err.to_string(), "ts": now}),
                        now,
                    )
                    .await;
            }
        }
        result
    }

    async fn send(&self, target: &str, window_index: u32, payload: &str) -> Result<(), MessengerError> {
        // Reset any stray input state before sending: cancel, escape,
        // clear-line, each separated by a short gap so the pane's shell
        // has time to process each keystroke.
        self.session.send_keys(target, window_index, "\x03").await?;
        tokio::time::sleep(RESET_GAP).await;
        self.session.send_keys(target, window_index, "\x1b").await?;
        tokio::time::sleep(RESET_GAP).await;
        self.session.send_keys(target, window_index, "\x15").await?;
        tokio::time::sleep(RESET_GAP).await;

        let text = payload.strip_suffix('\n').unwrap_or(payload);
        self.session.send_keys(target, window_index, text).await?;
        self.session.send_enter(target, window_index).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_adapters::session::{FakeSession, FakeSessionAdapter};
    use conductor_core::clock::FakeClock;
    use conductor_storage::EventLog;

    fn messenger(session: FakeSessionAdapter) -> Messenger {
        let dir = tempfile::tempdir().expect("tempdir").into_path();
        let log = EventLog::open(&dir, "2026-01-01").expect("open log");
        let bus = EventBus::new(log, 100);
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(1000));
        Messenger::new(Arc::new(session), bus, clock, r"[$#]\s*$", "2026-01-01").expect("build messenger")
    }

    #[tokio::test]
    async fn rejects_payload_without_trailing_newline() {
        let adapter = FakeSessionAdapter::new();
        let messenger = messenger(adapter);
        let err = messenger.deliver("sess", 0, "no newline").await.unwrap_err();
        assert!(matches!(err, MessengerError::MissingNewline));
    }

    #[tokio::test]
    async fn fails_session_unavailable_when_pane_looks_like_a_shell() {
        let adapter = FakeSessionAdapter::new();
        adapter.add_session("sess", FakeSession { output: "$ ".into(), ..Default::default() });
        let messenger = messenger(adapter);
        let err = messenger.deliver("sess", 0, "hello\n").await.unwrap_err();
        assert!(matches!(err, MessengerError::SessionUnavailable));
    }

    #[tokio::test]
    async fn delivers_when_pane_is_not_shell_like() {
        let adapter = FakeSessionAdapter::new();
        adapter.add_session("sess", FakeSession { output: "agent is thinking...".into(), ..Default::default() });
        let messenger = messenger(adapter.clone());
        messenger.deliver("sess", 0, "hello\n").await.expect("deliver");

        let calls = adapter.calls();
        assert!(calls.iter().any(|c| matches!(c, conductor_adapters::session::SessionCall::SendEnter { .. })));
    }
}
