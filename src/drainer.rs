//! Retry drainer: works the failure queue
//!
//! Every cycle re-fetches each queued offense. Offenses that disappeared or
//! are no longer OPEN are pruned; open ones are notified again and removed on
//! success. Entries are independent: one failing lookup never blocks the
//! rest. There is no attempt cap unless one is configured.

use crate::error::{Result, WatchError};
use crate::failure_queue::FailureQueueStore;
use crate::logging::channel_event;
use crate::notify::Notifier;
use crate::source::OffenseSource;
use crate::types::{Channel, DrainReport};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

#[derive(Debug, Clone)]
pub struct DrainerSettings {
    /// Sleep between cycles
    pub interval: Duration,
    /// Upper bound for one fetch or notify call
    pub call_timeout: Duration,
    /// Consecutive failed re-notifications before an entry is dropped
    pub max_attempts: Option<u32>,
}

impl Default for DrainerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(crate::config::DEFAULT_RETRY_INTERVAL_SECS),
            call_timeout: Duration::from_secs(crate::config::DEFAULT_TIMEOUT_SECS),
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryOutcome {
    Notified,
    Pruned,
    Abandoned,
    Retained,
}

pub struct RetryDrainer {
    source: Arc<dyn OffenseSource>,
    notifier: Arc<dyn Notifier>,
    queue: Arc<dyn FailureQueueStore>,
    settings: DrainerSettings,
    /// Consecutive failures per id, process-local
    attempts: Mutex<HashMap<u64, u32>>,
}

impl RetryDrainer {
    pub fn new(
        source: Arc<dyn OffenseSource>,
        notifier: Arc<dyn Notifier>,
        queue: Arc<dyn FailureQueueStore>,
        settings: DrainerSettings,
    ) -> Self {
        Self {
            source,
            notifier,
            queue,
            settings,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Record one more failure for `id`, returning the new count
    fn bump_attempts(&self, id: u64) -> u32 {
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        let count = attempts.entry(id).or_insert(0);
        *count += 1;
        *count
    }

    fn forget_attempts(&self, id: u64) {
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        attempts.remove(&id);
    }

    async fn drain_one(&self, id: u64) -> Result<EntryOutcome> {
        let fetched = tokio::time::timeout(self.settings.call_timeout, self.source.fetch_by_id(id))
            .await
            .map_err(|_| {
                WatchError::Timeout(format!(
                    "fetch_by_id({}) exceeded {}s",
                    id,
                    self.settings.call_timeout.as_secs()
                ))
            })??;

        let offense = match fetched {
            None => {
                channel_event!(Channel::Retry, warn, offense_id = id, "Offense no longer exists; dropping");
                self.queue.remove(id).await?;
                self.forget_attempts(id);
                return Ok(EntryOutcome::Pruned);
            }
            Some(offense) if !offense.status.is_open() => {
                channel_event!(
                    Channel::Retry,
                    info,
                    offense_id = id,
                    status = %offense.status,
                    "Offense resolved; dropping"
                );
                self.queue.remove(id).await?;
                self.forget_attempts(id);
                return Ok(EntryOutcome::Pruned);
            }
            Some(offense) => offense,
        };

        channel_event!(Channel::Retry, info, offense_id = id, "Offense still open; re-notifying");
        let delivered = tokio::time::timeout(
            self.settings.call_timeout,
            self.notifier.notify(&offense, Channel::Retry),
        )
        .await
        .unwrap_or(false);

        if delivered {
            self.queue.remove(id).await?;
            self.forget_attempts(id);
            return Ok(EntryOutcome::Notified);
        }

        let failures = self.bump_attempts(id);
        match self.settings.max_attempts {
            Some(max) if failures >= max => {
                channel_event!(
                    Channel::Retry,
                    error,
                    offense_id = id,
                    failures,
                    "Giving up on offense after repeated notification failures"
                );
                self.queue.remove(id).await?;
                self.forget_attempts(id);
                Ok(EntryOutcome::Abandoned)
            }
            _ => {
                channel_event!(
                    Channel::Retry,
                    error,
                    offense_id = id,
                    failures,
                    "Re-notification failed; will retry next cycle"
                );
                Ok(EntryOutcome::Retained)
            }
        }
    }

    /// Run one pass over the failure queue
    pub async fn run_cycle(&self) -> Result<DrainReport> {
        let ids = self.queue.load_all().await?;
        let mut report = DrainReport {
            loaded: ids.len(),
            ..Default::default()
        };

        if ids.is_empty() {
            tracing::info!("No failed offense notifications to retry");
            return Ok(report);
        }

        tracing::info!(queued = ids.len(), "Retrying failed offense notifications");
        for id in ids {
            match self.drain_one(id).await {
                Ok(EntryOutcome::Notified) => report.notified.push(id),
                Ok(EntryOutcome::Pruned) => report.pruned.push(id),
                Ok(EntryOutcome::Abandoned) => report.abandoned.push(id),
                Ok(EntryOutcome::Retained) => report.retained.push(id),
                Err(e) => {
                    channel_event!(
                        Channel::Retry,
                        error,
                        offense_id = id,
                        error = %e,
                        "Retry failed; advancing to next offense"
                    );
                    report.retained.push(id);
                }
            }
        }

        Ok(report)
    }

    /// Poll until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.settings.interval.as_secs(),
            max_attempts = ?self.settings.max_attempts,
            "Retry drainer started"
        );

        loop {
            let span = tracing::info_span!("retry_cycle", cycle_id = %uuid::Uuid::new_v4());
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.run_cycle().instrument(span) => match result {
                    Ok(report) => tracing::debug!(?report, "Retry cycle finished"),
                    Err(e) => tracing::error!(error = %e, "Retry cycle produced no progress"),
                },
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }

        tracing::info!("Retry drainer stopped");
    }
}
