//! Operator notification
//!
//! `Notifier` is what the loops call: one attempt per offense, success or
//! failure, never an error. `EmailNotifier` renders the message and hands it
//! to a `MailTransport`, which is the seam for SMTP and test doubles.

use crate::error::{Result, WatchError};
use crate::logging::channel_event;
use crate::types::{Channel, Offense};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub mod memory;
pub mod smtp;
pub mod template;

/// A rendered message ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Delivery backend for rendered messages
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Deliver `mail`, returning a `Notify` error describing any failure
    async fn send(&self, mail: &OutgoingMail) -> Result<()>;
}

/// Sends the notification for one offense
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Attempt delivery; `true` only if the transport accepted the message
    async fn notify(&self, offense: &Offense, channel: Channel) -> bool;
}

/// Email notifier built on a `MailTransport`
pub struct EmailNotifier {
    transport: Arc<dyn MailTransport>,
    from: String,
    recipients: Vec<String>,
    grace_period: Duration,
    timeout: Duration,
}

impl EmailNotifier {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        from: impl Into<String>,
        recipients: Vec<String>,
        grace_period: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            from: from.into(),
            recipients,
            grace_period,
            timeout,
        }
    }

    /// Render the message for `offense`
    pub fn render(&self, offense: &Offense) -> OutgoingMail {
        OutgoingMail {
            from: self.from.clone(),
            to: self.recipients.clone(),
            subject: template::render_subject(offense),
            body: template::render_body(offense, self.grace_period),
        }
    }

    async fn deliver(&self, mail: &OutgoingMail) -> Result<()> {
        tokio::time::timeout(self.timeout, self.transport.send(mail))
            .await
            .map_err(|_| {
                WatchError::Timeout(format!(
                    "mail delivery did not finish within {}s",
                    self.timeout.as_secs()
                ))
            })?
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, offense: &Offense, channel: Channel) -> bool {
        let mail = self.render(offense);
        match self.deliver(&mail).await {
            Ok(()) => {
                channel_event!(
                    channel,
                    info,
                    offense_id = offense.id,
                    recipients = mail.to.len(),
                    "Notification sent"
                );
                true
            }
            Err(e) => {
                channel_event!(
                    channel,
                    error,
                    offense_id = offense.id,
                    error = %e,
                    "Notification failed"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryMailTransport;
    use super::*;
    use crate::error::NotifyFailure;

    fn notifier(transport: Arc<MemoryMailTransport>) -> EmailNotifier {
        EmailNotifier::new(
            transport,
            "alerts@example.com",
            vec!["soc@example.com".to_string(), "oncall@example.com".to_string()],
            Duration::from_secs(900),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_notify_success_delivers_rendered_mail() {
        let transport = Arc::new(MemoryMailTransport::default());
        let n = notifier(transport.clone());

        assert!(n.notify(&Offense::new(101, "Malware Detected", 0), Channel::Forward).await);

        let sent = transport.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].from, "alerts@example.com");
        assert_eq!(sent[0].to.len(), 2);
        assert!(sent[0].subject.contains("[ 101 ]"));
    }

    #[tokio::test]
    async fn test_notify_failure_returns_false() {
        let transport = Arc::new(MemoryMailTransport::default());
        transport.fail_with(Some(NotifyFailure::Auth)).await;
        let n = notifier(transport.clone());

        assert!(!n.notify(&Offense::new(102, "Malware Detected", 0), Channel::Retry).await);
        assert!(transport.sent().await.is_empty());
    }

    struct HangingTransport;

    #[async_trait]
    impl MailTransport for HangingTransport {
        async fn send(&self, _mail: &OutgoingMail) -> Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_notify_timeout_is_failure() {
        let n = EmailNotifier::new(
            Arc::new(HangingTransport),
            "a@example.com",
            vec!["b@example.com".to_string()],
            Duration::from_secs(900),
            Duration::from_secs(30),
        );
        assert!(!n.notify(&Offense::new(1, "x", 0), Channel::Forward).await);
    }
}
