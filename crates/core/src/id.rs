// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Newtype identifiers for projects and tasks.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Defines a newtype identifier wrapping a `String`, with the usual
/// conversions to and from string-ish types.
macro_rules! define_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(ProjectId);
define_id!(TaskId);

/// Generates identifiers. Production code uses [`UuidIdGen`]; tests that
/// need deterministic, sequential identifiers use [`SequentialIdGen`].
pub trait IdGen<T>: Send + Sync {
    fn next(&self) -> T;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdGen;

impl IdGen<ProjectId> for UuidIdGen {
    fn next(&self) -> ProjectId {
        ProjectId::generate()
    }
}

impl IdGen<TaskId> for UuidIdGen {
    fn next(&self) -> TaskId {
        TaskId::generate()
    }
}

/// Deterministic id generator for tests: `prefix-1`, `prefix-2`, ...
#[derive(Debug)]
pub struct SequentialIdGen {
    prefix: &'static str,
    counter: std::sync::atomic::AtomicU64,
}

impl SequentialIdGen {
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            counter: std::sync::atomic::AtomicU64::new(0),
        }
    }
}

impl IdGen<ProjectId> for SequentialIdGen {
    fn next(&self) -> ProjectId {
        let n = self.counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        ProjectId::new(format!("{}-{n}", self.prefix))
    }
}

impl IdGen<TaskId> for SequentialIdGen {
    fn next(&self) -> TaskId {
        let n = self.counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        TaskId::new(format!("{}-{n}", self.prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_id_round_trips_through_string() {
        let id = ProjectId::new("abc");
        assert_eq!(id.as_str(), "abc");
        assert_eq!(id.to_string(), "abc");
    }

    #[test]
    fn sequential_gen_is_deterministic_and_increasing() {
        let gen = SequentialIdGen::new("p");
        let a: ProjectId = gen.next();
        let b: ProjectId = gen.next();
        assert_eq!(a.as_str(), "p-1");
        assert_eq!(b.as_str(), "p-2");
    }

    #[test]
    fn uuid_gen_produces_distinct_ids() {
        let gen = UuidIdGen;
        let a: ProjectId = gen.next();
        let b: ProjectId = gen.next();
        assert_ne!(a, b);
    }
}
