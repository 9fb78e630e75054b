// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The default project-setup collaborator: provisions a terminal session
//! for a newly-claimed project over whatever [`SessionAdapter`] the
//! daemon was built with. Reads an optional `{est_duration_sec,
//! dependencies}` stanza out of the project's spec file; anything else
//! in the spec is opaque to the scheduler and left to the agent briefing
//! it addresses.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use conductor_adapters::session::SessionAdapter;
use conductor_core::ProjectSpec;
use conductor_engine::{ProjectSetup, SetupError, SetupOutcome};

pub struct TmuxProjectSetup {
    session: Arc<dyn SessionAdapter>,
}

impl TmuxProjectSetup {
    pub fn new(session: Arc<dyn SessionAdapter>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl ProjectSetup for TmuxProjectSetup {
    async fn setup(&self, spec_path: &str, project_path: &str, _timeout: Duration) -> Result<SetupOutcome, SetupError> {
        let spec = ProjectSpec::read(spec_path);
        let name = project_path.rsplit('/').next().unwrap_or(project_path).to_string();

        self.session
            .create_session(&name, project_path, None, &[])
            .await
            .map_err(|err| SetupError::Failed(err.to_string()))?;

        Ok(SetupOutcome {
            session_name: name,
            est_duration_sec: spec.est_duration_sec(),
            dependencies: spec.dependencies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_adapters::session::FakeSessionAdapter;

    #[tokio::test]
    async fn creates_a_session_named_after_the_project_basename() {
        let adapter = Arc::new(FakeSessionAdapter::new());
        let setup = TmuxProjectSetup::new(adapter.clone());
        let outcome = setup.setup("/nonexistent.yml", "/work/widget", Duration::from_secs(5)).await.expect("setup");
        assert_eq!(outcome.session_name, "widget");
        assert_eq!(outcome.est_duration_sec, 1800);
        assert!(adapter.list_sessions().await.expect("list").contains(&"widget".to_string()));
    }

    #[tokio::test]
    async fn reads_est_duration_and_dependencies_from_spec_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spec_path = dir.path().join("spec.yml");
        std::fs::write(&spec_path, "est_duration_sec: 600\ndependencies:\n  - dep-1\n").expect("write spec");

        let adapter = Arc::new(FakeSessionAdapter::new());
        let setup = TmuxProjectSetup::new(adapter);
        let outcome = setup
            .setup(spec_path.to_str().unwrap(), "/work/widget", Duration::from_secs(5))
            .await
            .expect("setup");
        assert_eq!(outcome.est_duration_sec, 600);
        assert_eq!(outcome.dependencies, vec!["dep-1".to_string()]);
    }
}
