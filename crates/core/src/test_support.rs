// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builders shared by other crates' test suites. Gated behind
//! `test-support` so production builds never link them.

use crate::id::{ProjectId, TaskId};
use crate::project::{Project, ProjectStatus};
use crate::task::Task;

pub struct ProjectBuilder {
    project: Project,
}

impl ProjectBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            project: Project::new(ProjectId::new(id.into()), "/spec.yml", "/work", 0),
        }
    }

    pub fn status(mut self, status: ProjectStatus) -> Self {
        self.project.status = status;
        self
    }

    pub fn session_name(mut self, name: impl Into<String>) -> Self {
        self.project.session_name = Some(name.into());
        self
    }

    pub fn retry_count(mut self, n: u32) -> Self {
        self.project.retry_count = n;
        self
    }

    pub fn timeout_deadline(mut self, deadline: i64) -> Self {
        self.project.timeout_deadline = Some(deadline);
        self
    }

    pub fn build(self) -> Project {
        self.project
    }
}

pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            task: Task {
                id: TaskId::new(id.into()),
                session_name: "session".into(),
                window_target: 0,
                payload: "ping".into(),
                scheduled_at: 0,
                retry_count: 0,
                max_retries: 3,
                interval_minutes: 0,
                disabled: false,
                last_error: None,
            },
        }
    }

    pub fn session_name(mut self, name: impl Into<String>) -> Self {
        self.task.session_name = name.into();
        self
    }

    pub fn scheduled_at(mut self, ts: i64) -> Self {
        self.task.scheduled_at = ts;
        self
    }

    pub fn interval_minutes(mut self, minutes: u32) -> Self {
        self.task.interval_minutes = minutes;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.task.max_retries = n;
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}
