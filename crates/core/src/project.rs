// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The project state machine (I1-I5 in the data model).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::ProjectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Queued,
    Processing,
    Paused,
    Completed,
    Failed,
}

impl ProjectStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProjectStatus::Completed | ProjectStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::Queued => "queued",
            ProjectStatus::Processing => "processing",
            ProjectStatus::Paused => "paused",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returns whether `from -> to` is one of the legal edges of the project
/// state machine. Used by the store's compare-and-set transition call so
/// an illegal edge is rejected before it ever reaches SQL.
pub fn is_legal_transition(from: ProjectStatus, to: ProjectStatus) -> bool {
    use ProjectStatus::*;
    matches!(
        (from, to),
        (Queued, Processing)
            | (Queued, Paused)
            | (Paused, Queued)
            | (Processing, Paused)
            | (Processing, Completed)
            | (Processing, Failed)
            | (Queued, Failed)
            | (Failed, Queued)
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub spec_path: String,
    pub project_path: String,
    pub status: ProjectStatus,
    pub session_name: Option<String>,
    pub enqueued_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub heartbeat_at: Option<i64>,
    pub timeout_deadline: Option<i64>,
    pub heartbeat_extensions: u32,
}

impl Project {
    pub fn new(id: ProjectId, spec_path: impl Into<String>, project_path: impl Into<String>, now: i64) -> Self {
        Self {
            id,
            spec_path: spec_path.into(),
            project_path: project_path.into(),
            status: ProjectStatus::Queued,
            session_name: None,
            enqueued_at: now,
            started_at: None,
            completed_at: None,
            error_message: None,
            retry_count: 0,
            heartbeat_at: None,
            timeout_deadline: None,
            heartbeat_extensions: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProjectStatus::*;

    #[test]
    fn legal_edges_match_the_documented_state_machine() {
        assert!(is_legal_transition(Queued, Processing));
        assert!(is_legal_transition(Processing, Completed));
        assert!(is_legal_transition(Processing, Failed));
        assert!(is_legal_transition(Failed, Queued));
        assert!(is_legal_transition(Queued, Paused));
        assert!(is_legal_transition(Paused, Queued));
        assert!(is_legal_transition(Processing, Paused));
    }

    #[test]
    fn illegal_edges_are_rejected() {
        assert!(!is_legal_transition(Completed, Queued));
        assert!(!is_legal_transition(Queued, Completed));
        assert!(!is_legal_transition(Paused, Completed));
        assert!(!is_legal_transition(Failed, Failed));
    }

    #[test]
    fn terminal_states_are_completed_and_failed_only() {
        assert!(Completed.is_terminal());
        assert!(Failed.is_terminal());
        assert!(!Queued.is_terminal());
        assert!(!Processing.is_terminal());
        assert!(!Paused.is_terminal());
    }
}

#[cfg(test)]
mod transition_properties {
    use super::*;
    use proptest::prelude::*;

    fn any_status() -> impl Strategy<Value = ProjectStatus> {
        prop_oneof![
            Just(ProjectStatus::Queued),
            Just(ProjectStatus::Processing),
            Just(ProjectStatus::Paused),
            Just(ProjectStatus::Completed),
            Just(ProjectStatus::Failed),
        ]
    }

    proptest! {
        /// P1: a terminal row has no legal outgoing edge, for any `to`.
        #[test]
        fn prop_terminal_states_have_no_outgoing_edges(from in any_status(), to in any_status()) {
            if from.is_terminal() {
                prop_assert!(!is_legal_transition(from, to));
            }
        }

        /// No status legally transitions to itself.
        #[test]
        fn prop_no_self_loops(status in any_status()) {
            prop_assert!(!is_legal_transition(status, status));
        }
    }
}
