//! SMTP delivery via lettre

use super::{MailTransport, OutgoingMail};
use crate::config::MailConfig;
use crate::error::{NotifyFailure, Result, WatchError};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

pub struct SmtpMailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailTransport {
    /// Build the transport; implicit TLS unless `starttls` is set
    pub fn new(config: &MailConfig) -> Result<Self> {
        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        }
        .map_err(|e| {
            WatchError::Config(format!(
                "Invalid SMTP relay {}: {}",
                config.smtp_host, e
            ))
        })?;

        let transport = builder
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.expose().to_string(),
            ))
            .timeout(Some(Duration::from_secs(config.send_timeout_secs)))
            .build();

        Ok(Self { transport })
    }
}

fn mailbox(address: &str) -> Result<Mailbox> {
    address.trim().parse::<Mailbox>().map_err(|e| {
        WatchError::notify(NotifyFailure::Build, format!("invalid address {:?}: {}", address, e))
    })
}

/// Build a lettre message from a rendered mail
pub fn build_message(mail: &OutgoingMail) -> Result<Message> {
    let mut builder = Message::builder()
        .from(mailbox(&mail.from)?)
        .subject(mail.subject.clone())
        .header(ContentType::TEXT_PLAIN);

    for to in mail.to.iter().filter(|t| !t.trim().is_empty()) {
        builder = builder.to(mailbox(to)?);
    }

    builder
        .body(mail.body.clone())
        .map_err(|e| WatchError::notify(NotifyFailure::Build, e))
}

/// Map an SMTP reply code (if any) to a failure category
///
/// 530/534/535 are authentication replies; any other server reply means the
/// message was rejected; no reply at all means we never got a conversation.
pub fn classify_reply(code: Option<&str>) -> NotifyFailure {
    match code {
        Some(c) if matches!(c, "530" | "534" | "535") => NotifyFailure::Auth,
        Some(_) => NotifyFailure::Rejected,
        None => NotifyFailure::Connectivity,
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        let message = build_message(mail)?;
        self.transport.send(message).await.map_err(|e| {
            let code = e.status().map(|c| c.to_string());
            WatchError::notify(classify_reply(code.as_deref()), e)
        })?;
        Ok(())
    }
}
