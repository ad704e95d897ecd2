//! # offense-watch
//!
//! Watches a QRadar SIEM for offenses that should have been escalated and
//! closed by automation but are still OPEN, and emails an operator about them.
//!
//! ## Overview
//!
//! Two independently scheduled loops share two pieces of durable state:
//!
//! - **ForwardScanner**: fetches open offenses above the cursor that are
//!   older than the grace period, notifies those on the watch-list, advances
//!   the cursor, and queues failures.
//! - **RetryDrainer**: re-checks every queued offense; prunes resolved or
//!   vanished ones and re-notifies the rest.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use offense_watch::{EmailNotifier, Monitor, QRadarSource, SmtpMailTransport, WatchConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> offense_watch::Result<()> {
//! let (config, _warnings) = WatchConfig::load("config.toml".as_ref())?;
//!
//! let source = Arc::new(QRadarSource::new(&config.source)?);
//! let transport = Arc::new(SmtpMailTransport::new(&config.mail)?);
//! let notifier = Arc::new(EmailNotifier::new(
//!     transport,
//!     config.mail.sender(),
//!     config.mail.recipients.clone(),
//!     config.polling.grace_period(),
//!     Duration::from_secs(config.mail.send_timeout_secs),
//! ));
//!
//! let monitor = Monitor::from_config(&config, source, notifier);
//! monitor.run(tokio_util::sync::CancellationToken::new()).await;
//! # Ok(())
//! # }
//! ```
//!
//! ## State
//!
//! - **cursor file**: one decimal integer, the last notified offense id
//! - **failure-queue file**: comma-separated offense ids awaiting retry

pub mod config;
pub mod cursor;
pub mod drainer;
pub mod error;
pub mod failure_queue;
pub mod logging;
pub mod monitor;
pub mod notify;
pub mod scanner;
pub mod source;
pub mod types;

mod atomic;

pub use config::WatchConfig;
pub use cursor::{CursorStore, FileCursorStore, MemoryCursorStore};
pub use drainer::{DrainerSettings, RetryDrainer};
pub use error::{NotifyFailure, Result, WatchError};
pub use failure_queue::{FailureQueueStore, FileFailureQueue, MemoryFailureQueue};
pub use monitor::Monitor;
pub use notify::memory::{MemoryMailTransport, MemoryNotifier};
pub use notify::smtp::SmtpMailTransport;
pub use notify::{EmailNotifier, MailTransport, Notifier, OutgoingMail};
pub use scanner::{ForwardScanner, ScannerSettings};
pub use source::memory::MemorySource;
pub use source::qradar::QRadarSource;
pub use source::OffenseSource;
pub use types::{Channel, DrainReport, Offense, OffenseStatus, ScanReport};
