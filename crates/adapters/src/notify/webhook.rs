// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Webhook-backed `NotifyAdapter`. `notify()` never blocks the caller:
//! it enqueues onto a bounded channel and a dedicated worker task POSTs
//! to the configured endpoint, logging and dropping when the channel is
//! full rather than applying backpressure to the scheduler loops.

use conductor_core::event::Severity;
use serde_json::json;
use tokio::sync::mpsc;

use super::{NotifyAdapter, NotifyError};

struct Outgoing {
    severity: Severity,
    subject: String,
    body: String,
}

pub struct WebhookNotifyAdapter {
    tx: mpsc::Sender<Outgoing>,
}

impl WebhookNotifyAdapter {
    /// Spawns the worker task and returns the adapter handle. `capacity`
    /// bounds how many pending notifications may queue before new ones
    /// are dropped.
    pub fn spawn(endpoint: String, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Outgoing>(capacity);
        tokio::spawn(async move {
            let client = reqwest::Client::new();
            while let Some(msg) = rx.recv().await {
                let payload = json!({
                    "severity": severity_label(msg.severity),
                    "subject": msg.subject,
                    "body": msg.body,
                });
                if let Err(err) = client.post(&endpoint).json(&payload).send().await {
                    tracing::warn!(error = %err, endpoint = %endpoint, "webhook notification failed");
                }
            }
        });
        Self { tx }
    }
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "info",
        Severity::Warn => "warn",
        Severity::Error => "error",
        Severity::Critical => "critical",
    }
}

#[async_trait::async_trait]
impl NotifyAdapter for WebhookNotifyAdapter {
    async fn notify(&self, severity: Severity, subject: &str, body: &str) -> Result<(), NotifyError> {
        let result = self.tx.try_send(Outgoing {
            severity,
            subject: subject.to_string(),
            body: body.to_string(),
        });
        result.map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => {
                tracing::warn!(subject = %subject, "notification channel full, dropping");
                NotifyError::ChannelFull
            }
            mpsc::error::TrySendError::Closed(_) => NotifyError::SendFailed("worker task exited".into()),
        })
    }
}
