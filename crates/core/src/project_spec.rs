// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parses the optional `{est_duration_sec, dependencies}` stanza out of
//! a project's spec file. Anything else in the file is opaque to the
//! scheduler and left to the agent the spec briefs. Shared by the
//! enqueue path (which must know a project's dependencies before it is
//! ever claimable) and the session-setup collaborator (which reports
//! `est_duration_sec` once it provisions the session).

use serde::Deserialize;

const DEFAULT_EST_DURATION_SEC: i64 = 1800;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectSpec {
    est_duration_sec: Option<i64>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl ProjectSpec {
    /// Reads and parses `spec_path`, falling back to an empty spec (no
    /// dependencies, the default duration) if the file is missing or
    /// isn't valid YAML.
    pub fn read(spec_path: &str) -> Self {
        std::fs::read_to_string(spec_path)
            .ok()
            .and_then(|text| serde_yaml::from_str(&text).ok())
            .unwrap_or_default()
    }

    pub fn est_duration_sec(&self) -> i64 {
        self.est_duration_sec.unwrap_or(DEFAULT_EST_DURATION_SEC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let spec = ProjectSpec::read("/nonexistent.yml");
        assert_eq!(spec.est_duration_sec(), DEFAULT_EST_DURATION_SEC);
        assert!(spec.dependencies.is_empty());
    }

    #[test]
    fn parses_est_duration_and_dependencies() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("spec.yml");
        std::fs::write(&path, "est_duration_sec: 600\ndependencies:\n  - dep-1\n").expect("write spec");
        let spec = ProjectSpec::read(path.to_str().expect("utf8 path"));
        assert_eq!(spec.est_duration_sec(), 600);
        assert_eq!(spec.dependencies, vec!["dep-1".to_string()]);
    }
}
