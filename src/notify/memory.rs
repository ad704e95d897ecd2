//! In-memory notification doubles for tests

use super::{MailTransport, Notifier, OutgoingMail};
use crate::error::{NotifyFailure, Result, WatchError};
use crate::types::{Channel, Offense};
use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::Mutex;

/// Records delivered mail; can be switched into a failing mode
#[derive(Default)]
pub struct MemoryMailTransport {
    sent: Mutex<Vec<OutgoingMail>>,
    failure: Mutex<Option<NotifyFailure>>,
}

impl MemoryMailTransport {
    /// Fail every send with `failure`, or deliver again with `None`
    pub async fn fail_with(&self, failure: Option<NotifyFailure>) {
        *self.failure.lock().await = failure;
    }

    pub async fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl MailTransport for MemoryMailTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        if let Some(kind) = *self.failure.lock().await {
            return Err(WatchError::notify(kind, "memory transport set to fail"));
        }
        self.sent.lock().await.push(mail.clone());
        Ok(())
    }
}

/// Notifier that succeeds except for chosen offense ids
#[derive(Default)]
pub struct MemoryNotifier {
    failing: Mutex<HashSet<u64>>,
    attempts: Mutex<Vec<(u64, Channel, bool)>>,
}

impl MemoryNotifier {
    /// Make notifications for `id` fail until cleared
    pub async fn fail_for(&self, id: u64) {
        self.failing.lock().await.insert(id);
    }

    pub async fn clear_failures(&self) {
        self.failing.lock().await.clear();
    }

    /// Every attempt as `(offense id, channel, succeeded)`
    pub async fn attempts(&self) -> Vec<(u64, Channel, bool)> {
        self.attempts.lock().await.clone()
    }

    /// Ids delivered successfully on `channel`, in order
    pub async fn delivered(&self, channel: Channel) -> Vec<u64> {
        self.attempts
            .lock()
            .await
            .iter()
            .filter(|(_, c, ok)| *c == channel && *ok)
            .map(|(id, _, _)| *id)
            .collect()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, offense: &Offense, channel: Channel) -> bool {
        let ok = !self.failing.lock().await.contains(&offense.id);
        self.attempts.lock().await.push((offense.id, channel, ok));
        ok
    }
}
