//! Monitor configuration loaded from a TOML file
//!
//! Every section maps to one collaborator: `[source]` for the QRadar API,
//! `[mail]` for SMTP, `[state]` for the two state files, `[polling]` for the
//! loop timings, `[watch]` for the description watch-list and `[logging]`.

use crate::error::{Result, WatchError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_FORWARD_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 120;
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 15 * 60;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_MAX_LOG_FILES: usize = 4;

/// A credential that never shows up in `Debug` output
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    pub source: SourceConfig,
    pub mail: MailConfig,
    pub state: StateConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    pub watch: WatchListConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// QRadar offenses API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Offenses endpoint, e.g. `https://qradar/api/siem/offenses`
    pub url: String,

    /// Authorized service token sent in the `SEC` header
    pub api_token: Secret,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Maximum offenses requested per forward cycle
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Skip TLS certificate verification (self-signed consoles)
    #[serde(default)]
    pub accept_invalid_certs: bool,

    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// SMTP delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// Use STARTTLS instead of implicit TLS
    #[serde(default)]
    pub starttls: bool,

    pub username: String,
    pub password: Secret,

    /// Sender address, defaults to `username`
    #[serde(default)]
    pub from: Option<String>,

    pub recipients: Vec<String>,

    #[serde(default = "default_timeout_secs")]
    pub send_timeout_secs: u64,
}

impl MailConfig {
    pub fn sender(&self) -> &str {
        self.from.as_deref().unwrap_or(&self.username)
    }
}

/// Locations of the durable state files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    pub cursor_file: PathBuf,
    pub failure_queue_file: PathBuf,
}

/// Loop timings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_forward_interval")]
    pub forward_interval_secs: u64,

    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,

    /// Minimum offense age before it is eligible for notification
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,

    /// Drop a failure-queue entry after this many consecutive failed
    /// re-notifications. Unset means retry forever.
    #[serde(default)]
    pub max_retry_attempts: Option<u32>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            forward_interval_secs: default_forward_interval(),
            retry_interval_secs: default_retry_interval(),
            grace_period_secs: default_grace_period(),
            max_retry_attempts: None,
        }
    }
}

impl PollingConfig {
    pub fn forward_interval(&self) -> Duration {
        Duration::from_secs(self.forward_interval_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

/// Offense descriptions that should have been auto-escalated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchListConfig {
    pub descriptions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also log to stderr
    #[serde(default = "default_true")]
    pub console: bool,

    /// Directory for daily-rolling log files; unset disables file logging
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Rotated files kept per log before the oldest is deleted
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            console: true,
            directory: None,
            max_files: DEFAULT_MAX_LOG_FILES,
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn default_api_version() -> String {
    "20.0".to_string()
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    465
}

fn default_forward_interval() -> u64 {
    DEFAULT_FORWARD_INTERVAL_SECS
}

fn default_retry_interval() -> u64 {
    DEFAULT_RETRY_INTERVAL_SECS
}

fn default_grace_period() -> u64 {
    DEFAULT_GRACE_PERIOD_SECS
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    DEFAULT_MAX_LOG_FILES
}

fn default_true() -> bool {
    true
}

impl WatchConfig {
    /// Load and validate a configuration file.
    ///
    /// Returns the config together with warnings about values that were
    /// replaced by fallbacks; the caller logs them once logging is up.
    pub fn load(path: &Path) -> Result<(Self, Vec<String>)> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WatchError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<(Self, Vec<String>)> {
        let mut config: WatchConfig = toml::from_str(content)?;
        let warnings = config.validate()?;
        Ok((config, warnings))
    }

    /// Reject unusable settings and normalize recoverable ones
    pub fn validate(&mut self) -> Result<Vec<String>> {
        let mut warnings = Vec::new();

        if self.source.url.trim().is_empty() {
            return Err(WatchError::Config("source.url must be set".to_string()));
        }
        if self.source.api_token.is_empty() {
            return Err(WatchError::Config("source.api_token must be set".to_string()));
        }
        if self.source.page_size == 0 {
            return Err(WatchError::Config(
                "source.page_size must be at least 1".to_string(),
            ));
        }
        if self.mail.username.trim().is_empty() || self.mail.password.is_empty() {
            return Err(WatchError::Config(
                "mail.username and mail.password must be set".to_string(),
            ));
        }
        if self.mail.recipients.iter().all(|r| r.trim().is_empty()) {
            return Err(WatchError::Config(
                "mail.recipients must list at least one address".to_string(),
            ));
        }
        if self.watch.descriptions.is_empty() {
            return Err(WatchError::Config(
                "watch.descriptions must list at least one offense description to monitor"
                    .to_string(),
            ));
        }

        if self.polling.forward_interval_secs == 0 {
            self.polling.forward_interval_secs = DEFAULT_FORWARD_INTERVAL_SECS;
            warnings.push(format!(
                "polling.forward_interval_secs must be at least 1; using {}s",
                DEFAULT_FORWARD_INTERVAL_SECS
            ));
        }
        if self.polling.retry_interval_secs == 0 {
            self.polling.retry_interval_secs = DEFAULT_RETRY_INTERVAL_SECS;
            warnings.push(format!(
                "polling.retry_interval_secs must be at least 1; using {}s",
                DEFAULT_RETRY_INTERVAL_SECS
            ));
        }
        if self.source.request_timeout_secs == 0 {
            self.source.request_timeout_secs = DEFAULT_TIMEOUT_SECS;
            warnings.push(format!(
                "source.request_timeout_secs must be at least 1; using {}s",
                DEFAULT_TIMEOUT_SECS
            ));
        }
        if self.mail.send_timeout_secs == 0 {
            self.mail.send_timeout_secs = DEFAULT_TIMEOUT_SECS;
            warnings.push(format!(
                "mail.send_timeout_secs must be at least 1; using {}s",
                DEFAULT_TIMEOUT_SECS
            ));
        }
        if self.polling.max_retry_attempts == Some(0) {
            self.polling.max_retry_attempts = None;
            warnings.push("polling.max_retry_attempts = 0 disables the cap".to_string());
        }

        let level = self.logging.level.trim().to_ascii_lowercase();
        if LOG_LEVELS.contains(&level.as_str()) {
            self.logging.level = level;
        } else {
            warnings.push(format!(
                "logging.level {:?} is not one of {:?}; using info",
                self.logging.level, LOG_LEVELS
            ));
            self.logging.level = default_log_level();
        }
        if self.logging.max_files == 0 {
            self.logging.max_files = DEFAULT_MAX_LOG_FILES;
            warnings.push(format!(
                "logging.max_files must be at least 1; keeping {} files per log",
                DEFAULT_MAX_LOG_FILES
            ));
        }

        Ok(warnings)
    }
}
