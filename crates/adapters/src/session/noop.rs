// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A session adapter for environments with no real terminal multiplexer
//! available. Every mutating call succeeds trivially; queries report
//! nothing alive. Useful for smoke-testing the daemon's other loops in
//! isolation.

use async_trait::async_trait;

use super::{SessionAdapter, SessionError};

#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpSessionAdapter;

#[async_trait]
impl SessionAdapter for NoOpSessionAdapter {
    async fn list_sessions(&self) -> Result<Vec<String>, SessionError> {
        Ok(Vec::new())
    }

    async fn has_session(&self, _name: &str) -> Result<bool, SessionError> {
        Ok(false)
    }

    async fn create_session(
        &self,
        _name: &str,
        _cwd: &str,
        _initial_command: Option<&str>,
        _env: &[(String, String)],
    ) -> Result<(), SessionError> {
        Ok(())
    }

    async fn kill_session(&self, _name: &str) -> Result<(), SessionError> {
        Ok(())
    }

    async fn send_keys(&self, _name: &str, _window_index: u32, _text: &str) -> Result<(), SessionError> {
        Ok(())
    }

    async fn send_enter(&self, _name: &str, _window_index: u32) -> Result<(), SessionError> {
        Ok(())
    }

    async fn capture_pane(&self, _name: &str, _window_index: u32, _max_lines: u32) -> Result<String, SessionError> {
        Ok(String::new())
    }

    async fn is_process_running(&self, _name: &str, _pattern: &str) -> Result<bool, SessionError> {
        Ok(false)
    }

    async fn session_age_secs(&self, _name: &str, _now: i64) -> Result<Option<i64>, SessionError> {
        Ok(None)
    }
}
