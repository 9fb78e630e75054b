// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! An in-memory `SessionAdapter` that records every call it receives, so
//! tests can assert on the driver's behavior without a real terminal
//! multiplexer.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{SessionAdapter, SessionError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    ListSessions,
    HasSession(String),
    CreateSession { name: String, cwd: String },
    KillSession(String),
    SendKeys { name: String, window: u32, text: String },
    SendEnter { name: String, window: u32 },
    CapturePane { name: String, window: u32 },
    IsProcessRunning { name: String, pattern: String },
}

#[derive(Debug, Clone)]
pub struct FakeSession {
    pub cwd: String,
    pub output: String,
    pub alive: bool,
    pub process_running: bool,
    pub created_at: i64,
}

impl Default for FakeSession {
    fn default() -> Self {
        Self {
            cwd: String::new(),
            output: String::new(),
            alive: true,
            process_running: true,
            created_at: 0,
        }
    }
}

#[derive(Default)]
struct FakeSessionState {
    sessions: HashMap<String, FakeSession>,
    calls: Vec<SessionCall>,
}

#[derive(Clone, Default)]
pub struct FakeSessionAdapter {
    inner: Arc<Mutex<FakeSessionState>>,
}

impl FakeSessionAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.inner.lock().calls.clone()
    }

    pub fn add_session(&self, name: &str, session: FakeSession) {
        self.inner.lock().sessions.insert(name.to_string(), session);
    }

    pub fn set_output(&self, name: &str, output: impl Into<String>) {
        if let Some(s) = self.inner.lock().sessions.get_mut(name) {
            s.output = output.into();
        }
    }

    pub fn kill(&self, name: &str) {
        if let Some(s) = self.inner.lock().sessions.get_mut(name) {
            s.alive = false;
        }
    }

    pub fn set_process_running(&self, name: &str, running: bool) {
        if let Some(s) = self.inner.lock().sessions.get_mut(name) {
            s.process_running = running;
        }
    }
}

#[async_trait]
impl SessionAdapter for FakeSessionAdapter {
    async fn list_sessions(&self) -> Result<Vec<String>, SessionError> {
        let mut state = self.inner.lock();
        state.calls.push(SessionCall::ListSessions);
        Ok(state
            .sessions
            .iter()
            .filter(|(_, s)| s.alive)
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn has_session(&self, name: &str) -> Result<bool, SessionError> {
        let mut state = self.inner.lock();
        state.calls.push(SessionCall::HasSession(name.to_string()));
        Ok(state.sessions.get(name).map(|s| s.alive).unwrap_or(false))
    }

    async fn create_session(
        &self,
        name: &str,
        cwd: &str,
        _initial_command: Option<&str>,
        _env: &[(String, String)],
    ) -> Result<(), SessionError> {
        let mut state = self.inner.lock();
        state.calls.push(SessionCall::CreateSession {
            name: name.to_string(),
            cwd: cwd.to_string(),
        });
        state.sessions.insert(
            name.to_string(),
            FakeSession {
                cwd: cwd.to_string(),
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn kill_session(&self, name: &str) -> Result<(), SessionError> {
        let mut state = self.inner.lock();
        state.calls.push(SessionCall::KillSession(name.to_string()));
        if let Some(s) = state.sessions.get_mut(name) {
            s.alive = false;
        }
        Ok(())
    }

    async fn send_keys(&self, name: &str, window_index: u32, text: &str) -> Result<(), SessionError> {
        let mut state = self.inner.lock();
        state.calls.push(SessionCall::SendKeys {
            name: name.to_string(),
            window: window_index,
            text: text.to_string(),
        });
        if !state.sessions.get(name).map(|s| s.alive).unwrap_or(false) {
            return Err(SessionError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn send_enter(&self, name: &str, window_index: u32) -> Result<(), SessionError> {
        let mut state = self.inner.lock();
        state.calls.push(SessionCall::SendEnter {
            name: name.to_string(),
            window: window_index,
        });
        if !state.sessions.get(name).map(|s| s.alive).unwrap_or(false) {
            return Err(SessionError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn capture_pane(&self, name: &str, window_index: u32, _max_lines: u32) -> Result<String, SessionError> {
        let mut state = self.inner.lock();
        state.calls.push(SessionCall::CapturePane {
            name: name.to_string(),
            window: window_index,
        });
        state
            .sessions
            .get(name)
            .filter(|s| s.alive)
            .map(|s| s.output.clone())
            .ok_or_else(|| SessionError::NotFound(name.to_string()))
    }

    async fn is_process_running(&self, name: &str, pattern: &str) -> Result<bool, SessionError> {
        let mut state = self.inner.lock();
        state.calls.push(SessionCall::IsProcessRunning {
            name: name.to_string(),
            pattern: pattern.to_string(),
        });
        state
            .sessions
            .get(name)
            .filter(|s| s.alive)
            .map(|s| s.process_running)
            .ok_or_else(|| SessionError::NotFound(name.to_string()))
    }

    async fn session_age_secs(&self, name: &str, now: i64) -> Result<Option<i64>, SessionError> {
        Ok(self
            .inner
            .lock()
            .sessions
            .get(name)
            .map(|s| (now - s.created_at).max(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_has_session_reflects_liveness() {
        let adapter = FakeSessionAdapter::new();
        adapter.create_session("a", "/p/a", None, &[]).await.expect("create");
        assert!(adapter.has_session("a").await.expect("has"));

        adapter.kill_session("a").await.expect("kill");
        assert!(!adapter.has_session("a").await.expect("has"));
    }

    #[tokio::test]
    async fn calls_are_recorded_in_order() {
        let adapter = FakeSessionAdapter::new();
        adapter.create_session("a", "/p/a", None, &[]).await.expect("create");
        adapter.has_session("a").await.expect("has");
        let calls = adapter.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], SessionCall::CreateSession { .. }));
        assert!(matches!(calls[1], SessionCall::HasSession(_)));
    }

    #[tokio::test]
    async fn capture_pane_on_unknown_session_is_not_found() {
        let adapter = FakeSessionAdapter::new();
        let err = adapter.capture_pane("ghost", 0, 10).await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }
}
