// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The append-only event record published on the event bus and mirrored
//! to the daily-rotated JSONL log.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warn,
    Error,
    Critical,
}

impl Severity {
    /// Critical events bypass per-topic rate limiting.
    pub fn bypasses_rate_limit(self) -> bool {
        matches!(self, Severity::Critical)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub ts: i64,
    pub topic: String,
    pub severity: Severity,
    pub payload: Value,
}

impl Event {
    pub fn new(ts: i64, topic: impl Into<String>, severity: Severity, payload: Value) -> Self {
        Self {
            ts,
            topic: topic.into(),
            severity,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_severity_bypasses_rate_limit() {
        assert!(Severity::Critical.bypasses_rate_limit());
        assert!(!Severity::Info.bypasses_rate_limit());
        assert!(!Severity::Warn.bypasses_rate_limit());
        assert!(!Severity::Error.bypasses_rate_limit());
    }

    #[test]
    fn event_serializes_with_expected_shape() {
        let event = Event::new(100, "session.orphan_killed", Severity::Warn, serde_json::json!({"name": "x-legacy"}));
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["ts"], 100);
        assert_eq!(json["topic"], "session.orphan_killed");
        assert_eq!(json["severity"], "warn");
        assert_eq!(json["payload"]["name"], "x-legacy");
    }
}
