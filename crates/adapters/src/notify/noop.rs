// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use conductor_core::event::Severity;

use super::{NotifyAdapter, NotifyError};

#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpNotifyAdapter;

#[async_trait::async_trait]
impl NotifyAdapter for NoOpNotifyAdapter {
    async fn notify(&self, _severity: Severity, _subject: &str, _body: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}
