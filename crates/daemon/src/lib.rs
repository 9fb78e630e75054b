// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bootstrap and the background-loop runner for the scheduler daemon,
//! split out of the `conductord` binary so both it and `conductor
//! daemon` can drive the same scheduler.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod lifecycle;
pub mod logging;
pub mod run;
pub mod setup;
