// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use conductor_core::event::Severity;
use parking_lot::Mutex;

use super::{NotifyAdapter, NotifyError};

#[derive(Debug, Clone)]
pub struct Notification {
    pub severity: Severity,
    pub subject: String,
    pub body: String,
}

#[derive(Clone, Default)]
pub struct FakeNotifyAdapter {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl FakeNotifyAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }
}

#[async_trait::async_trait]
impl NotifyAdapter for FakeNotifyAdapter {
    async fn notify(&self, severity: Severity, subject: &str, body: &str) -> Result<(), NotifyError> {
        self.sent.lock().push(Notification {
            severity,
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_notifications_in_order() {
        let adapter = FakeNotifyAdapter::new();
        adapter.notify(Severity::Info, "a", "1").await.expect("notify");
        adapter.notify(Severity::Critical, "b", "2").await.expect("notify");
        let sent = adapter.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].subject, "a");
        assert_eq!(sent[1].severity, Severity::Critical);
    }
}
