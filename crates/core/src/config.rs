// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Layered configuration: built-in defaults, overridden by a YAML file,
//! overridden by environment variables. Parsed once at boot into an
//! immutable struct; never mutated at runtime.

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::CoreError;

fn default_state_dir() -> PathBuf {
    env::var("CONDUCTOR_STATE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let xdg = env::var("XDG_STATE_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    dirs_home().join(".local").join("state")
                });
            xdg.join("conductor")
        })
}

fn dirs_home() -> PathBuf {
    env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub poll_interval_sec: u64,
    pub state_sync_interval_sec: u64,
    pub max_task_retries: u32,
    pub backoff_base_sec: u32,
    pub backoff_multiplier: u32,
    pub rate_limit_per_min: u32,
    pub stale_lock_threshold_sec: u64,
    pub phantom_grace_sec: u64,
    pub orphan_grace_sec: u64,
    pub watchdog_factor: f64,
    pub heartbeat_max_extensions: u32,
    pub notification_channel: Option<String>,
    pub max_concurrent: u32,
    pub shutdown_grace_sec: u64,
    pub shell_prompt_pattern: String,
    pub db_path: Option<PathBuf>,
    pub state_dir: PathBuf,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_sec: 5,
            state_sync_interval_sec: 300,
            max_task_retries: 5,
            backoff_base_sec: 30,
            backoff_multiplier: 2,
            rate_limit_per_min: 10,
            stale_lock_threshold_sec: 90,
            phantom_grace_sec: 3600,
            orphan_grace_sec: 3600,
            watchdog_factor: 3.0,
            heartbeat_max_extensions: 3,
            notification_channel: None,
            max_concurrent: 4,
            shutdown_grace_sec: 30,
            shell_prompt_pattern: r"[$#]\s*$".to_string(),
            db_path: None,
            state_dir: default_state_dir(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Loads defaults, merges an optional YAML file, then merges
    /// environment variable overrides (env wins over file, file wins
    /// over defaults).
    pub fn load(yaml_path: Option<&Path>) -> Result<Self, CoreError> {
        let mut config = Config::default();

        if let Some(path) = yaml_path {
            if path.exists() {
                let text = std::fs::read_to_string(path)?;
                let from_file: PartialConfig = serde_yaml::from_str(&text)?;
                from_file.apply_to(&mut config);
            }
        }

        apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(|| self.state_dir.join("conductor.db"))
    }

    pub fn events_dir(&self) -> PathBuf {
        self.state_dir.join("logs").join("events")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join("conductor.lock")
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.poll_interval_sec == 0 {
            return Err(CoreError::configuration("poll_interval_sec must be > 0"));
        }
        if self.watchdog_factor <= 0.0 {
            return Err(CoreError::configuration("watchdog_factor must be > 0"));
        }
        if self.max_concurrent == 0 {
            return Err(CoreError::configuration("max_concurrent must be > 0"));
        }
        Ok(())
    }
}

/// Mirror of `Config` with every field optional, used only to parse the
/// YAML layer without requiring every key to be present.
#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    poll_interval_sec: Option<u64>,
    state_sync_interval_sec: Option<u64>,
    max_task_retries: Option<u32>,
    backoff_base_sec: Option<u32>,
    backoff_multiplier: Option<u32>,
    rate_limit_per_min: Option<u32>,
    stale_lock_threshold_sec: Option<u64>,
    phantom_grace_sec: Option<u64>,
    orphan_grace_sec: Option<u64>,
    watchdog_factor: Option<f64>,
    heartbeat_max_extensions: Option<u32>,
    notification_channel: Option<String>,
    max_concurrent: Option<u32>,
    shutdown_grace_sec: Option<u64>,
    shell_prompt_pattern: Option<String>,
    db_path: Option<PathBuf>,
    state_dir: Option<PathBuf>,
    log_level: Option<String>,
}

impl PartialConfig {
    fn apply_to(self, config: &mut Config) {
        macro_rules! merge {
            ($field:ident) => {
                if let Some(v) = self.$field {
                    config.$field = v;
                }
            };
        }
        merge!(poll_interval_sec);
        merge!(state_sync_interval_sec);
        merge!(max_task_retries);
        merge!(backoff_base_sec);
        merge!(backoff_multiplier);
        merge!(rate_limit_per_min);
        merge!(stale_lock_threshold_sec);
        merge!(phantom_grace_sec);
        merge!(orphan_grace_sec);
        merge!(watchdog_factor);
        merge!(heartbeat_max_extensions);
        merge!(max_concurrent);
        merge!(shutdown_grace_sec);
        merge!(shell_prompt_pattern);
        merge!(db_path);
        merge!(state_dir);
        merge!(log_level);
        if self.notification_channel.is_some() {
            config.notification_channel = self.notification_channel;
        }
    }
}

fn apply_env_overrides(config: &mut Config) -> Result<(), CoreError> {
    fn env_u64(key: &str) -> Result<Option<u64>, CoreError> {
        parse_env(key)
    }
    fn env_u32(key: &str) -> Result<Option<u32>, CoreError> {
        parse_env(key)
    }
    fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, CoreError> {
        match env::var(key) {
            Ok(raw) => raw
                .parse::<T>()
                .map(Some)
                .map_err(|_| CoreError::configuration(format!("invalid value for {key}: {raw}"))),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(env::VarError::NotUnicode(_)) => {
                Err(CoreError::configuration(format!("{key} is not valid unicode")))
            }
        }
    }

    if let Some(v) = env_u64("POLL_INTERVAL_SEC")? {
        config.poll_interval_sec = v;
    }
    if let Some(v) = env_u64("STATE_SYNC_INTERVAL_SEC")? {
        config.state_sync_interval_sec = v;
    }
    if let Some(v) = env_u32("MAX_TASK_RETRIES")? {
        config.max_task_retries = v;
    }
    if let Some(v) = env_u32("BACKOFF_BASE_SEC")? {
        config.backoff_base_sec = v;
    }
    if let Some(v) = env_u32("BACKOFF_MULTIPLIER")? {
        config.backoff_multiplier = v;
    }
    if let Some(v) = env_u32("RATE_LIMIT_PER_MIN")? {
        config.rate_limit_per_min = v;
    }
    if let Some(v) = env_u64("STALE_LOCK_THRESHOLD_SEC")? {
        config.stale_lock_threshold_sec = v;
    }
    if let Some(v) = env_u64("PHANTOM_GRACE_SEC")? {
        config.phantom_grace_sec = v;
    }
    if let Some(v) = env_u64("ORPHAN_GRACE_SEC")? {
        config.orphan_grace_sec = v;
    }
    if let Some(v) = parse_env::<f64>("WATCHDOG_FACTOR")? {
        config.watchdog_factor = v;
    }
    if let Some(v) = env_u32("HEARTBEAT_MAX_EXTENSIONS")? {
        config.heartbeat_max_extensions = v;
    }
    if let Ok(v) = env::var("NOTIFICATION_CHANNEL") {
        config.notification_channel = Some(v);
    }
    if let Some(v) = env_u32("MAX_CONCURRENT")? {
        config.max_concurrent = v;
    }
    if let Some(v) = env_u64("SHUTDOWN_GRACE_SEC")? {
        config.shutdown_grace_sec = v;
    }
    if let Ok(v) = env::var("SHELL_PROMPT_PATTERN") {
        config.shell_prompt_pattern = v;
    }
    if let Ok(v) = env::var("DB_PATH") {
        config.db_path = Some(PathBuf::from(v));
    }
    if let Ok(v) = env::var("CONDUCTOR_STATE_DIR") {
        config.state_dir = PathBuf::from(v);
    }
    if let Ok(v) = env::var("LOG_LEVEL") {
        config.log_level = v;
    }
    Ok(())
}

/// Parses a short duration string like `"30s"`, `"5m"`, `"1h"`, `"1d"`
/// into seconds. Used by config fields and CLI flags that accept a
/// human duration rather than a raw integer.
pub fn parse_duration_secs(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    let (digits, unit) = s.split_at(s.len() - 1);
    let (number_part, multiplier) = if unit.chars().all(|c| c.is_ascii_digit()) {
        (s, 1u64)
    } else {
        let multiplier = match unit {
            "s" => 1,
            "m" => 60,
            "h" => 3600,
            "d" => 86400,
            other => return Err(format!("unknown duration unit: {other}")),
        };
        (digits, multiplier)
    };
    let value: u64 = number_part
        .parse()
        .map_err(|_| format!("invalid duration: {s}"))?;
    Ok(value * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_seconds_minutes_hours_days() {
        assert_eq!(parse_duration_secs("30s").unwrap(), 30);
        assert_eq!(parse_duration_secs("5m").unwrap(), 300);
        assert_eq!(parse_duration_secs("1h").unwrap(), 3600);
        assert_eq!(parse_duration_secs("1d").unwrap(), 86400);
        assert_eq!(parse_duration_secs("42").unwrap(), 42);
    }

    #[test]
    fn rejects_unknown_unit() {
        assert!(parse_duration_secs("1x").is_err());
    }

    #[test]
    fn yaml_file_overrides_defaults_but_env_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "poll_interval_sec: 15\nmax_task_retries: 9\n").expect("write");

        std::env::set_var("MAX_TASK_RETRIES", "20");
        let config = Config::load(Some(&path)).expect("load");
        std::env::remove_var("MAX_TASK_RETRIES");

        assert_eq!(config.poll_interval_sec, 15); // from file
        assert_eq!(config.max_task_retries, 20); // env wins over file
    }
}
