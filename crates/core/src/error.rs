// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The shared error taxonomy used at every fallible call site in the
//! scheduler. Internal library errors (SQL driver, I/O, JSON) are wrapped
//! into one of these kinds via `From` rather than propagated raw past a
//! crate boundary.

use thiserror::Error;

/// Classifies an error by how the caller should react to it, independent
/// of which component produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Retry-eligible; the caller should back off and try again.
    Transient,
    /// Fatal at boot; the daemon must not start.
    Configuration,
    /// Fatal at boot; another daemon instance holds the lock.
    LockHeld,
    /// Caller-visible; never retried internally (e.g. a failed CAS).
    StateConflict,
    /// Caller-visible; the referenced row does not exist.
    NotFound,
    /// A specialization of `Transient` for the messenger: the target
    /// pane is not ready to receive input.
    SessionUnavailable,
    /// Retry cap reached; terminal for the affected item.
    Exhausted,
    /// Unrecoverable; the daemon should log, notify, and shut down.
    Fatal,
}

#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn lock_held(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LockHeld, message)
    }

    pub fn state_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StateConflict, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn session_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SessionUnavailable, message)
    }

    pub fn exhausted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Exhausted, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }

    /// Whether the failing operation is worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Transient | ErrorKind::SessionUnavailable)
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::with_source(ErrorKind::Transient, "io error", err)
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::with_source(ErrorKind::Configuration, "json error", err)
    }
}

impl From<serde_yaml::Error> for CoreError {
    fn from(err: serde_yaml::Error) -> Self {
        CoreError::with_source(ErrorKind::Configuration, "yaml error", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_session_unavailable_are_retryable() {
        assert!(CoreError::transient("x").is_retryable());
        assert!(CoreError::session_unavailable("x").is_retryable());
    }

    #[test]
    fn configuration_and_state_conflict_are_not_retryable() {
        assert!(!CoreError::configuration("x").is_retryable());
        assert!(!CoreError::state_conflict("x").is_retryable());
        assert!(!CoreError::not_found("x").is_retryable());
        assert!(!CoreError::exhausted("x").is_retryable());
        assert!(!CoreError::fatal("x").is_retryable());
        assert!(!CoreError::lock_held("x").is_retryable());
    }
}
