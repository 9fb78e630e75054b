// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `SessionAdapter` backed by the `tmux` terminal multiplexer, driven as
//! a subprocess. Every call shells out; tmux itself owns the actual pane
//! lifecycle.

use tokio::process::Command;

use super::{SessionAdapter, SessionError};

const SESSION_PREFIX: &str = "conductor-";

fn session_id(name: &str) -> String {
    format!("{SESSION_PREFIX}{name}")
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TmuxAdapter;

impl TmuxAdapter {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output, SessionError> {
        Command::new("tmux")
            .args(args)
            .output()
            .await
            .map_err(|e| SessionError::CommandFailed(e.to_string()))
    }
}

#[async_trait::async_trait]
impl SessionAdapter for TmuxAdapter {
    async fn list_sessions(&self) -> Result<Vec<String>, SessionError> {
        let output = self.run(&["list-sessions", "-F", "#{session_name}"]).await?;
        if !output.status.success() {
            // tmux exits non-zero with "no server running" when no
            // sessions exist at all; treat that as an empty list.
            return Ok(Vec::new());
        }
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(text
            .lines()
            .filter_map(|line| line.strip_prefix(SESSION_PREFIX))
            .map(|s| s.to_string())
            .collect())
    }

    async fn has_session(&self, name: &str) -> Result<bool, SessionError> {
        let output = self.run(&["has-session", "-t", &session_id(name)]).await?;
        Ok(output.status.success())
    }

    async fn create_session(
        &self,
        name: &str,
        cwd: &str,
        initial_command: Option<&str>,
        env: &[(String, String)],
    ) -> Result<(), SessionError> {
        if !std::path::Path::new(cwd).exists() {
            return Err(SessionError::SpawnFailed {
                name: name.to_string(),
                reason: format!("working directory does not exist: {cwd}"),
            });
        }

        let id = session_id(name);
        // Kill any pre-existing session with the same name so a stale
        // session never silently absorbs a fresh spawn.
        let _ = self.run(&["kill-session", "-t", &id]).await;

        let mut args: Vec<String> = vec!["new-session".into(), "-d".into(), "-s".into(), id.clone(), "-c".into(), cwd.into()];
        for (k, v) in env {
            args.push("-e".into());
            args.push(format!("{k}={v}"));
        }
        if let Some(cmd) = initial_command {
            args.push(cmd.into());
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run(&arg_refs).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(SessionError::SpawnFailed { name: name.to_string(), reason: stderr });
        }
        if !output.stderr.is_empty() {
            tracing::warn!(session = %name, stderr = %String::from_utf8_lossy(&output.stderr), "tmux emitted stderr on successful spawn");
        }
        Ok(())
    }

    async fn kill_session(&self, name: &str) -> Result<(), SessionError> {
        let output = self.run(&["kill-session", "-t", &session_id(name)]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("session not found") || stderr.contains("can't find session") {
                return Ok(()); // already dead; tolerate
            }
            return Err(SessionError::CommandFailed(stderr.to_string()));
        }
        Ok(())
    }

    async fn send_keys(&self, name: &str, window_index: u32, text: &str) -> Result<(), SessionError> {
        let target = format!("{}:{}", session_id(name), window_index);
        let output = self.run(&["send-keys", "-t", &target, "-l", "--", text]).await?;
        if !output.status.success() {
            return Err(SessionError::CommandFailed(String::from_utf8_lossy(&output.stderr).to_string()));
        }
        Ok(())
    }

    async fn send_enter(&self, name: &str, window_index: u32) -> Result<(), SessionError> {
        let target = format!("{}:{}", session_id(name), window_index);
        let output = self.run(&["send-keys", "-t", &target, "Enter"]).await?;
        if !output.status.success() {
            return Err(SessionError::CommandFailed(String::from_utf8_lossy(&output.stderr).to_string()));
        }
        Ok(())
    }

    async fn capture_pane(&self, name: &str, window_index: u32, max_lines: u32) -> Result<String, SessionError> {
        let target = format!("{}:{}", session_id(name), window_index);
        let lines = format!("-{max_lines}");
        let output = self.run(&["capture-pane", "-t", &target, "-p", "-S", &lines]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("can't find") {
                return Err(SessionError::NotFound(name.to_string()));
            }
            return Err(SessionError::CommandFailed(stderr.to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn is_process_running(&self, name: &str, pattern: &str) -> Result<bool, SessionError> {
        let target = format!("{}:0", session_id(name));
        let output = self.run(&["list-panes", "-t", &target, "-F", "#{pane_pid}"]).await?;
        if !output.status.success() {
            return Err(SessionError::NotFound(name.to_string()));
        }
        let pid = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if pid.is_empty() {
            return Ok(false);
        }

        let (command_check, pattern_check) = tokio::try_join!(
            Command::new("ps").args(["-p", &pid, "-o", "command="]).output(),
            Command::new("pgrep").args(["-P", &pid, "-f", pattern]).output(),
        )
        .map_err(|e| SessionError::CommandFailed(e.to_string()))?;

        let command_matches = String::from_utf8_lossy(&command_check.stdout).contains(pattern);
        let child_matches = pattern_check.status.success();
        Ok(command_matches || child_matches)
    }

    async fn session_age_secs(&self, name: &str, now: i64) -> Result<Option<i64>, SessionError> {
        let output = self
            .run(&["display-message", "-t", &session_id(name), "-p", "#{session_created}"])
            .await?;
        if !output.status.success() {
            return Ok(None);
        }
        let created: Option<i64> = String::from_utf8_lossy(&output.stdout).trim().parse().ok();
        Ok(created.map(|c| (now - c).max(0)))
    }
}
