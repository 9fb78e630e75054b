// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A `SessionAdapter` decorator that wraps any implementation with
//! span-scoped tracing, without changing behavior.

use async_trait::async_trait;
use tracing::Instrument;

use crate::session::{SessionAdapter, SessionError};

pub struct TracedSession<S> {
    inner: S,
}

impl<S> TracedSession<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: SessionAdapter> SessionAdapter for TracedSession<S> {
    async fn list_sessions(&self) -> Result<Vec<String>, SessionError> {
        let span = tracing::info_span!("session.list_sessions");
        async {
            let result = self.inner.list_sessions().await;
            if let Err(err) = &result {
                tracing::warn!(error = %err, "list_sessions failed");
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn has_session(&self, name: &str) -> Result<bool, SessionError> {
        let span = tracing::debug_span!("session.has_session", session = %name);
        self.inner.has_session(name).instrument(span).await
    }

    async fn create_session(
        &self,
        name: &str,
        cwd: &str,
        initial_command: Option<&str>,
        env: &[(String, String)],
    ) -> Result<(), SessionError> {
        let span = tracing::info_span!("session.create_session", session = %name, cwd = %cwd);
        async {
            let start = std::time::Instant::now();
            let result = self.inner.create_session(name, cwd, initial_command, env).await;
            let elapsed_ms = start.elapsed().as_millis();
            match &result {
                Ok(()) => tracing::info!(elapsed_ms, "session created"),
                Err(err) => tracing::error!(error = %err, elapsed_ms, "session spawn failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn kill_session(&self, name: &str) -> Result<(), SessionError> {
        let span = tracing::info_span!("session.kill_session", session = %name);
        async {
            let result = self.inner.kill_session(name).await;
            if let Err(err) = &result {
                tracing::warn!(error = %err, "kill_session failed");
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn send_keys(&self, name: &str, window_index: u32, text: &str) -> Result<(), SessionError> {
        let span = tracing::debug_span!("session.send_keys", session = %name, window = window_index, len = text.len());
        self.inner.send_keys(name, window_index, text).instrument(span).await
    }

    async fn send_enter(&self, name: &str, window_index: u32) -> Result<(), SessionError> {
        let span = tracing::trace_span!("session.send_enter", session = %name, window = window_index);
        self.inner.send_enter(name, window_index).instrument(span).await
    }

    async fn capture_pane(&self, name: &str, window_index: u32, max_lines: u32) -> Result<String, SessionError> {
        let span = tracing::trace_span!("session.capture_pane", session = %name, window = window_index);
        self.inner.capture_pane(name, window_index, max_lines).instrument(span).await
    }

    async fn is_process_running(&self, name: &str, pattern: &str) -> Result<bool, SessionError> {
        let span = tracing::debug_span!("session.is_process_running", session = %name, pattern = %pattern);
        self.inner.is_process_running(name, pattern).instrument(span).await
    }

    async fn session_age_secs(&self, name: &str, now: i64) -> Result<Option<i64>, SessionError> {
        let span = tracing::trace_span!("session.session_age_secs", session = %name);
        self.inner.session_age_secs(name, now).instrument(span).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FakeSessionAdapter;

    #[tokio::test]
    async fn traced_session_delegates_to_inner_adapter() {
        let fake = FakeSessionAdapter::new();
        let traced = TracedSession::new(fake.clone());

        traced.create_session("a", "/p/a", None, &[]).await.expect("create");
        assert!(traced.has_session("a").await.expect("has"));
        assert_eq!(fake.calls().len(), 2);
    }
}
