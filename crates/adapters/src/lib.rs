// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Adapters over the two external collaborators the scheduler drives:
//! the terminal-multiplexer session manager and the outbound notifier.

pub mod notify;
pub mod session;
pub mod traced;

pub use notify::{NotifyAdapter, NotifyError};
pub use session::{SessionAdapter, SessionError};
pub use traced::TracedSession;
