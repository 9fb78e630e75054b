// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `SessionAdapter` capability the scheduler drives the terminal
//! multiplexer through. Implementations are interchangeable: a real one
//! backed by tmux, a fake one for tests, and a no-op one for
//! environments without a multiplexer at all.

mod noop;
mod tmux;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use noop::NoOpSessionAdapter;
pub use tmux::TmuxAdapter;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSession, FakeSessionAdapter, SessionCall};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("failed to spawn session {name}: {reason}")]
    SpawnFailed { name: String, reason: String },
    #[error("command failed: {0}")]
    CommandFailed(String),
}

/// A capability over the terminal multiplexer: list/create/kill
/// sessions, send keystrokes to a pane, capture pane text. All calls
/// are fallible and distinguish `NotFound` (the session is gone) from
/// transient command failures.
#[async_trait]
pub trait SessionAdapter: Send + Sync + 'static {
    async fn list_sessions(&self) -> Result<Vec<String>, SessionError>;

    async fn has_session(&self, name: &str) -> Result<bool, SessionError>;

    async fn create_session(
        &self,
        name: &str,
        cwd: &str,
        initial_command: Option<&str>,
        env: &[(String, String)],
    ) -> Result<(), SessionError>;

    async fn kill_session(&self, name: &str) -> Result<(), SessionError>;

    /// Sends literal text to a pane, without a trailing newline.
    async fn send_keys(&self, name: &str, window_index: u32, text: &str) -> Result<(), SessionError>;

    async fn send_enter(&self, name: &str, window_index: u32) -> Result<(), SessionError>;

    async fn capture_pane(&self, name: &str, window_index: u32, max_lines: u32) -> Result<String, SessionError>;

    async fn is_process_running(&self, name: &str, pattern: &str) -> Result<bool, SessionError>;

    /// When the session has a start time available (used by the session
    /// monitor's orphan-grace check). Returns `None` when unknown.
    async fn session_age_secs(&self, name: &str, now: i64) -> Result<Option<i64>, SessionError>;
}
