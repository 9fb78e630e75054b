// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduled message delivery tasks (T1-T3 in the data model).

use serde::{Deserialize, Serialize};

use crate::id::TaskId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub session_name: String,
    pub window_target: u32,
    pub payload: String,
    pub scheduled_at: i64,
    pub retry_count: u32,
    pub max_retries: u32,
    pub interval_minutes: u32,
    pub disabled: bool,
    pub last_error: Option<String>,
}

impl Task {
    pub fn is_one_shot(&self) -> bool {
        self.interval_minutes == 0
    }

    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// Exponential backoff in whole seconds: `base * multiplier^retry_count`.
/// Integer-only arithmetic, saturating so a runaway retry count can't
/// overflow into an unreasonably distant `scheduled_at`.
pub fn backoff_delay_secs(base_secs: u32, multiplier: u32, retry_count: u32) -> i64 {
    let mut delay: i64 = base_secs as i64;
    for _ in 0..retry_count {
        delay = delay.saturating_mul(multiplier.max(1) as i64);
    }
    delay
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially() {
        assert_eq!(backoff_delay_secs(30, 2, 0), 30);
        assert_eq!(backoff_delay_secs(30, 2, 1), 60);
        assert_eq!(backoff_delay_secs(30, 2, 2), 120);
        assert_eq!(backoff_delay_secs(30, 2, 3), 240);
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let delay = backoff_delay_secs(30, 2, 1000);
        assert_eq!(delay, i64::MAX);
    }

    #[test]
    fn one_shot_task_has_zero_interval() {
        let task = Task {
            id: TaskId::new("t-1"),
            session_name: "s".into(),
            window_target: 0,
            payload: "ping".into(),
            scheduled_at: 0,
            retry_count: 0,
            max_retries: 3,
            interval_minutes: 0,
            disabled: false,
            last_error: None,
        };
        assert!(task.is_one_shot());
        assert!(!task.is_exhausted());
    }
}

#[cfg(test)]
mod backoff_properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// P5: successive backoff deltas never shrink as retry_count grows.
        #[test]
        fn prop_backoff_is_monotonically_non_decreasing(
            base in 1u32..10_000,
            multiplier in 1u32..10,
            retry_count in 0u32..64,
        ) {
            let here = backoff_delay_secs(base, multiplier, retry_count);
            let next = backoff_delay_secs(base, multiplier, retry_count + 1);
            prop_assert!(next >= here);
        }

        /// Never panics or goes negative, no matter how large retry_count gets.
        #[test]
        fn prop_backoff_never_overflows_or_goes_negative(
            base in 0u32..10_000,
            multiplier in 0u32..10,
            retry_count in 0u32..10_000,
        ) {
            let delay = backoff_delay_secs(base, multiplier, retry_count);
            prop_assert!(delay >= 0);
        }

        /// P3: a task's retry_count crossing max_retries is exactly the
        /// exhaustion boundary, regardless of the specific counts chosen.
        #[test]
        fn prop_exhaustion_matches_retry_cap(retry_count in 0u32..1000, max_retries in 0u32..1000) {
            let task = Task {
                id: TaskId::new("t-1"),
                session_name: "s".into(),
                window_target: 0,
                payload: "ping".into(),
                scheduled_at: 0,
                retry_count,
                max_retries,
                interval_minutes: 0,
                disabled: false,
                last_error: None,
            };
            prop_assert_eq!(task.is_exhausted(), retry_count >= max_retries);
        }
    }
}
