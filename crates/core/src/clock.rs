// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Injectable time source. Interval and deadline math uses [`Clock::now`]
//! (monotonic); user-facing timestamps use [`Clock::unix_time`] (wall
//! clock). Keeping the two separate means a backward wall-clock jump can
//! never retrigger a watchdog or resurrect an already-fired task.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// A source of monotonic and wall-clock time.
pub trait Clock: Send + Sync {
    /// Monotonic instant, used for all interval/deadline arithmetic.
    fn now(&self) -> Instant;

    /// Unix epoch seconds, used only for display/bookkeeping timestamps.
    fn unix_time(&self) -> i64;
}

/// Real clock backed by the OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_time(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// Settable clock for deterministic tests. `now()` always returns the
/// instant the `FakeClock` was constructed at, offset by `advance()`
/// calls; `unix_time()` is independently settable.
pub struct FakeClock {
    base: Instant,
    offset_secs: AtomicI64,
    unix_secs: AtomicI64,
}

impl FakeClock {
    pub fn new(unix_time: i64) -> Self {
        Self {
            base: Instant::now(),
            offset_secs: AtomicI64::new(0),
            unix_secs: AtomicI64::new(unix_time),
        }
    }

    /// Advance both the monotonic and wall clock by `secs`.
    pub fn advance(&self, secs: i64) {
        self.offset_secs.fetch_add(secs, Ordering::SeqCst);
        self.unix_secs.fetch_add(secs, Ordering::SeqCst);
    }

    /// Set the wall clock directly, independent of the monotonic clock,
    /// to test clock-skew handling.
    pub fn set_unix_time(&self, unix_time: i64) {
        self.unix_secs.store(unix_time, Ordering::SeqCst);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        let offset = self.offset_secs.load(Ordering::SeqCst);
        if offset >= 0 {
            self.base + std::time::Duration::from_secs(offset as u64)
        } else {
            self.base - std::time::Duration::from_secs((-offset) as u64)
        }
    }

    fn unix_time(&self) -> i64 {
        self.unix_secs.load(Ordering::SeqCst)
    }
}
