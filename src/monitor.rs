//! Monitor bootstrap: wires both loops to shared state and runs them
//!
//! The forward scanner and retry drainer are built with the same failure
//! queue handle; that shared handle is what serializes their writes.

use crate::config::WatchConfig;
use crate::cursor::{CursorStore, FileCursorStore};
use crate::drainer::{DrainerSettings, RetryDrainer};
use crate::error::Result;
use crate::failure_queue::{FailureQueueStore, FileFailureQueue};
use crate::notify::Notifier;
use crate::scanner::{ForwardScanner, ScannerSettings};
use crate::source::OffenseSource;
use crate::types::{DrainReport, ScanReport};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct Monitor {
    scanner: Arc<ForwardScanner>,
    drainer: Arc<RetryDrainer>,
}

impl Monitor {
    pub fn new(scanner: ForwardScanner, drainer: RetryDrainer) -> Self {
        Self {
            scanner: Arc::new(scanner),
            drainer: Arc::new(drainer),
        }
    }

    /// Build both loops from configuration with file-backed state
    pub fn from_config(
        config: &WatchConfig,
        source: Arc<dyn OffenseSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let cursor: Arc<dyn CursorStore> =
            Arc::new(FileCursorStore::new(&config.state.cursor_file));
        let queue: Arc<dyn FailureQueueStore> =
            Arc::new(FileFailureQueue::new(&config.state.failure_queue_file));

        Self::with_stores(config, source, notifier, cursor, queue)
    }

    /// Build both loops from configuration over the given stores
    pub fn with_stores(
        config: &WatchConfig,
        source: Arc<dyn OffenseSource>,
        notifier: Arc<dyn Notifier>,
        cursor: Arc<dyn CursorStore>,
        queue: Arc<dyn FailureQueueStore>,
    ) -> Self {
        let call_timeout = Duration::from_secs(
            config
                .source
                .request_timeout_secs
                .max(config.mail.send_timeout_secs),
        );

        let scanner = ForwardScanner::new(
            source.clone(),
            notifier.clone(),
            cursor,
            queue.clone(),
            config.watch.descriptions.iter().cloned(),
            ScannerSettings {
                interval: config.polling.forward_interval(),
                grace_period: config.polling.grace_period(),
                call_timeout,
            },
        );

        let drainer = RetryDrainer::new(
            source,
            notifier,
            queue,
            DrainerSettings {
                interval: config.polling.retry_interval(),
                call_timeout,
                max_attempts: config.polling.max_retry_attempts,
            },
        );

        Self::new(scanner, drainer)
    }

    /// Run one forward cycle followed by one retry cycle
    pub async fn run_once(&self) -> (Result<ScanReport>, Result<DrainReport>) {
        let scan = self.scanner.run_cycle().await;
        let drain = self.drainer.run_cycle().await;
        (scan, drain)
    }

    /// Run both loops until `cancel` fires, then wait for them to stop
    pub async fn run(&self, cancel: CancellationToken) {
        let scanner = {
            let scanner = self.scanner.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { scanner.run(cancel).await })
        };
        let drainer = {
            let drainer = self.drainer.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { drainer.run(cancel).await })
        };

        let (scanner, drainer) = tokio::join!(scanner, drainer);
        if let Err(e) = scanner {
            tracing::error!(error = %e, "Forward scanner task ended abnormally");
        }
        if let Err(e) = drainer {
            tracing::error!(error = %e, "Retry drainer task ended abnormally");
        }
        tracing::info!("Monitor stopped");
    }
}

/// Log the effective configuration, without secrets
pub fn log_banner(config: &WatchConfig) {
    tracing::info!("Offense escalation failure monitoring");
    tracing::info!(
        url = %config.source.url,
        api_version = %config.source.api_version,
        page_size = config.source.page_size,
        "Event source"
    );
    tracing::info!(
        cursor_file = %config.state.cursor_file.display(),
        failure_queue_file = %config.state.failure_queue_file.display(),
        "State files"
    );
    tracing::info!(
        forward_interval_secs = config.polling.forward_interval_secs,
        retry_interval_secs = config.polling.retry_interval_secs,
        grace_period_secs = config.polling.grace_period_secs,
        max_retry_attempts = ?config.polling.max_retry_attempts,
        "Polling"
    );
    tracing::info!(
        smtp_host = %config.mail.smtp_host,
        smtp_port = config.mail.smtp_port,
        sender = %config.mail.sender(),
        recipients = ?config.mail.recipients,
        "Mail"
    );
    tracing::info!(descriptions = ?config.watch.descriptions, "Monitored offense descriptions");
}

/// Resolve when the process receives Ctrl-C or, on Unix, SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::MemoryCursorStore;
    use crate::failure_queue::MemoryFailureQueue;
    use crate::notify::memory::MemoryNotifier;
    use crate::source::memory::MemorySource;
    use crate::types::Offense;

    fn config() -> WatchConfig {
        let (config, _) = WatchConfig::from_toml_str(
            r#"
            [source]
            url = "https://qradar.local/api/siem/offenses"
            api_token = "t"

            [mail]
            username = "a@example.com"
            password = "p"
            recipients = ["b@example.com"]

            [state]
            cursor_file = "unused"
            failure_queue_file = "unused"

            [polling]
            forward_interval_secs = 5
            retry_interval_secs = 7

            [watch]
            descriptions = ["Malware Detected"]
            "#,
        )
        .unwrap();
        config
    }

    #[tokio::test]
    async fn test_run_once_hands_failures_to_drainer() {
        let source = Arc::new(MemorySource::default());
        let old = chrono::Utc::now().timestamp_millis() - 3_600_000;
        source.upsert(Offense::new(101, "Malware Detected", old)).await;
        let notifier = Arc::new(MemoryNotifier::default());
        notifier.fail_for(101).await;
        let queue = Arc::new(MemoryFailureQueue::default());

        let monitor = Monitor::with_stores(
            &config(),
            source,
            notifier.clone(),
            Arc::new(MemoryCursorStore::seeded(100)),
            queue.clone(),
        );

        let (scan, drain) = monitor.run_once().await;
        assert_eq!(scan.unwrap().enqueued, vec![101]);
        // Drainer saw the entry in the same pass and failed again
        assert_eq!(drain.unwrap().retained, vec![101]);

        notifier.clear_failures().await;
        let (_, drain) = monitor.run_once().await;
        assert_eq!(drain.unwrap().notified, vec![101]);
        assert!(queue.load_all().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_returns_after_cancel() {
        let monitor = Monitor::with_stores(
            &config(),
            Arc::new(MemorySource::default()),
            Arc::new(MemoryNotifier::default()),
            Arc::new(MemoryCursorStore::seeded(1)),
            Arc::new(MemoryFailureQueue::default()),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            trigger.cancel();
        });

        monitor.run(cancel).await;
    }
}
