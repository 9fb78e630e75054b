// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `NotifyAdapter` capability for outbound summary/alert emission.
//! Implementations never block the caller: the real adapter enqueues to
//! a bounded channel drained by a dedicated worker task.

mod noop;
mod webhook;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use noop::NoOpNotifyAdapter;
pub use webhook::WebhookNotifyAdapter;

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeNotifyAdapter;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification channel is full, dropping")]
    ChannelFull,
    #[error("send failed: {0}")]
    SendFailed(String),
}

#[async_trait]
pub trait NotifyAdapter: Send + Sync + 'static {
    async fn notify(&self, severity: conductor_core::event::Severity, subject: &str, body: &str) -> Result<(), NotifyError>;
}
