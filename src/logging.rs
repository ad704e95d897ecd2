//! Tracing setup
//!
//! Forward and retry notification activity is emitted on dedicated targets so
//! it can be split into its own log files. `init` wires console output and,
//! when a directory is configured, daily-rolling files that keep at most
//! `logging.max_files` rotations each.

use crate::config::LoggingConfig;
use crate::error::{Result, WatchError};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log target for forward-scanner notification activity
pub const FORWARD_TARGET: &str = "offense_watch::forward";

/// Log target for retry-drainer notification activity
pub const RETRY_TARGET: &str = "offense_watch::retry";

/// Emit an event on the log target of a [`Channel`](crate::types::Channel)
macro_rules! channel_event {
    ($channel:expr, $level:ident, $($arg:tt)+) => {
        match $channel {
            $crate::types::Channel::Forward => tracing::$level!(
                target: "offense_watch::forward",
                channel = "forward",
                $($arg)+
            ),
            $crate::types::Channel::Retry => tracing::$level!(
                target: "offense_watch::retry",
                channel = "retry",
                $($arg)+
            ),
        }
    };
}

pub(crate) use channel_event;

/// Daily-rotated `<prefix>.<date>.log` in `dir`, pruned to `max_files`
fn rolling_file(dir: &Path, prefix: &str, max_files: usize) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .max_log_files(max_files)
        .build(dir)
        .map_err(|e| {
            WatchError::Config(format!(
                "Failed to open log file {} in {}: {}",
                prefix,
                dir.display(),
                e
            ))
        })
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the configured level. The returned guards flush the
/// file writers on drop and must live as long as the process.
pub fn init(config: &LoggingConfig) -> Result<Vec<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let mut guards = Vec::new();
    let mut layers = Vec::new();

    if config.console {
        layers.push(fmt::layer().with_writer(std::io::stderr).boxed());
    }

    if let Some(dir) = &config.directory {
        std::fs::create_dir_all(dir).map_err(|e| {
            WatchError::Config(format!(
                "Failed to create log directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        let (all, guard) =
            tracing_appender::non_blocking(rolling_file(dir, "bootstrap", config.max_files)?);
        guards.push(guard);
        layers.push(fmt::layer().with_writer(all).with_ansi(false).boxed());

        let (forward, guard) = tracing_appender::non_blocking(rolling_file(
            dir,
            "offenses_notified",
            config.max_files,
        )?);
        guards.push(guard);
        layers.push(
            fmt::layer()
                .with_writer(forward)
                .with_ansi(false)
                .with_filter(Targets::new().with_target(FORWARD_TARGET, tracing::Level::TRACE))
                .boxed(),
        );

        let (retry, guard) = tracing_appender::non_blocking(rolling_file(
            dir,
            "failed_offenses_retry",
            config.max_files,
        )?);
        guards.push(guard);
        layers.push(
            fmt::layer()
                .with_writer(retry)
                .with_ansi(false)
                .with_filter(Targets::new().with_target(RETRY_TARGET, tracing::Level::TRACE))
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init()
        .map_err(|e| WatchError::Config(format!("Failed to initialize logging: {}", e)))?;

    Ok(guards)
}
