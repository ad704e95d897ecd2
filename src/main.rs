use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use offense_watch::monitor::{self, Monitor};
use offense_watch::{logging, EmailNotifier, QRadarSource, SmtpMailTransport, WatchConfig};

/// Notify operators about SIEM offenses that missed automated escalation
#[derive(Debug, Parser)]
#[command(name = "offense-watch", version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, env = "OFFENSE_WATCH_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Run one forward cycle and one retry cycle, then exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config, warnings) = WatchConfig::load(&cli.config)?;
    let _guards = logging::init(&config.logging)?;
    for warning in &warnings {
        tracing::warn!("{}", warning);
    }
    monitor::log_banner(&config);

    let source = Arc::new(QRadarSource::new(&config.source)?);
    let transport = Arc::new(SmtpMailTransport::new(&config.mail)?);
    let notifier = Arc::new(EmailNotifier::new(
        transport,
        config.mail.sender(),
        config.mail.recipients.clone(),
        config.polling.grace_period(),
        Duration::from_secs(config.mail.send_timeout_secs),
    ));
    let monitor = Monitor::from_config(&config, source, notifier);

    if cli.once {
        let (scan, drain) = monitor.run_once().await;
        match scan {
            Ok(report) => tracing::info!(?report, "Forward cycle finished"),
            Err(e) => tracing::error!(error = %e, "Forward cycle failed"),
        }
        match drain {
            Ok(report) => tracing::info!(?report, "Retry cycle finished"),
            Err(e) => tracing::error!(error = %e, "Retry cycle failed"),
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            monitor::shutdown_signal().await;
            cancel.cancel();
        });
    }

    monitor.run(cancel).await;
    Ok(())
}
