//! Forward scanner: notifies newly eligible offenses and advances the cursor
//!
//! Each cycle loads the cursor, fetches open offenses above it that are older
//! than the grace period, keeps those on the watch-list and notifies them in
//! ascending id order. The cursor advances to the last id that was notified
//! successfully; failed ids go to the failure queue for the retry drainer.

use crate::cursor::CursorStore;
use crate::error::{Result, WatchError};
use crate::failure_queue::FailureQueueStore;
use crate::logging::channel_event;
use crate::notify::Notifier;
use crate::source::OffenseSource;
use crate::types::{Channel, Offense, ScanReport};
use chrono::Utc;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Timing knobs for the forward scanner
#[derive(Debug, Clone)]
pub struct ScannerSettings {
    /// Sleep between cycles
    pub interval: Duration,
    /// Minimum offense age before notification
    pub grace_period: Duration,
    /// Upper bound for one fetch or notify call
    pub call_timeout: Duration,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(crate::config::DEFAULT_FORWARD_INTERVAL_SECS),
            grace_period: Duration::from_secs(crate::config::DEFAULT_GRACE_PERIOD_SECS),
            call_timeout: Duration::from_secs(crate::config::DEFAULT_TIMEOUT_SECS),
        }
    }
}

pub struct ForwardScanner {
    source: Arc<dyn OffenseSource>,
    notifier: Arc<dyn Notifier>,
    cursor: Arc<dyn CursorStore>,
    queue: Arc<dyn FailureQueueStore>,
    watch_list: HashSet<String>,
    settings: ScannerSettings,
}

impl ForwardScanner {
    pub fn new(
        source: Arc<dyn OffenseSource>,
        notifier: Arc<dyn Notifier>,
        cursor: Arc<dyn CursorStore>,
        queue: Arc<dyn FailureQueueStore>,
        watch_list: impl IntoIterator<Item = String>,
        settings: ScannerSettings,
    ) -> Self {
        Self {
            source,
            notifier,
            cursor,
            queue,
            watch_list: watch_list.into_iter().collect(),
            settings,
        }
    }

    fn is_watched(&self, offense: &Offense) -> bool {
        self.watch_list.contains(&offense.description)
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.settings.call_timeout, call)
            .await
            .map_err(|_| {
                WatchError::Timeout(format!(
                    "{} exceeded {}s",
                    operation,
                    self.settings.call_timeout.as_secs()
                ))
            })?
    }

    /// Run one fetch → filter → notify pass
    ///
    /// Fails with `WatchError::Config` without touching the source if the
    /// cursor has never been seeded.
    pub async fn run_cycle(&self) -> Result<ScanReport> {
        let Some(mut cursor) = self.cursor.load().await? else {
            return Err(WatchError::Config(
                "seed cursor required: write a starting offense id to the cursor file".to_string(),
            ));
        };

        let mut report = ScanReport {
            cursor: Some(cursor),
            ..Default::default()
        };

        let grace = chrono::Duration::from_std(self.settings.grace_period)
            .map_err(|e| WatchError::Config(format!("grace period out of range: {}", e)))?;
        let cutoff = Utc::now() - grace;

        tracing::info!(cursor, source = self.source.name(), "Polling for unescalated offenses");
        let offenses = self
            .bounded("fetch_since", self.source.fetch_since(cursor, cutoff))
            .await?;
        report.fetched = offenses.len();

        let mut matched: Vec<Offense> = offenses
            .into_iter()
            .filter(|o| self.is_watched(o))
            .collect();
        matched.sort_by_key(|o| o.id);
        report.matched = matched.len();

        if matched.is_empty() {
            tracing::info!(fetched = report.fetched, "No watched offenses to notify");
            return Ok(report);
        }

        for offense in &matched {
            if offense.id <= cursor {
                tracing::warn!(
                    offense_id = offense.id,
                    cursor,
                    "Offense at or below cursor already processed; skipping"
                );
                report.skipped.push(offense.id);
                continue;
            }

            channel_event!(
                Channel::Forward,
                info,
                offense_id = offense.id,
                description = %offense.description,
                "Notifying unescalated offense"
            );

            let delivered = tokio::time::timeout(
                self.settings.call_timeout,
                self.notifier.notify(offense, Channel::Forward),
            )
            .await
            .unwrap_or(false);

            if delivered {
                self.cursor.save(offense.id).await?;
                cursor = offense.id;
                report.notified.push(offense.id);
            } else {
                channel_event!(
                    Channel::Forward,
                    error,
                    offense_id = offense.id,
                    "Notification failed; queueing for retry"
                );
                self.queue.add(offense.id).await?;
                report.enqueued.push(offense.id);
            }
        }

        report.cursor = Some(cursor);
        Ok(report)
    }

    /// Poll until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.settings.interval.as_secs(),
            watched = self.watch_list.len(),
            "Forward scanner started"
        );

        loop {
            let span = tracing::info_span!("forward_cycle", cycle_id = %uuid::Uuid::new_v4());
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.run_cycle().instrument(span) => match result {
                    Ok(report) => tracing::debug!(?report, "Forward cycle finished"),
                    Err(WatchError::Config(reason)) => {
                        tracing::error!(%reason, "Forward cycle aborted by configuration error")
                    }
                    Err(e) => tracing::error!(error = %e, "Forward cycle produced no progress"),
                },
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }

        tracing::info!("Forward scanner stopped");
    }
}
