//! SMTP notification sender using Lettre.

use crate::template::render;
use async_trait::async_trait;
use enrollment_core::SendError;
use enrollment_core::notification::NotificationSender;
use enrollment_core::types::NotificationMessage;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

/// SMTP relay settings
#[derive(Clone, Debug)]
pub struct SmtpConfig {
    /// Relay host
    pub host: String,
    /// Relay port (587 for STARTTLS)
    pub port: u16,
    /// Authentication username
    pub username: String,
    /// Authentication password
    pub password: String,
    /// Sender address
    pub from_email: String,
    /// Sender display name
    pub from_name: String,
}

/// Sends rendered notifications through an SMTP relay.
#[derive(Clone)]
pub struct SmtpNotificationSender {
    config: SmtpConfig,
    from: Mailbox,
    credentials: Credentials,
}

impl SmtpNotificationSender {
    /// Create a sender for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::InvalidRecipient`] if the sender address does not parse.
    pub fn new(config: SmtpConfig) -> Result<Self, SendError> {
        let from = format!("{} <{}>", config.from_name, config.from_email)
            .parse::<Mailbox>()
            .map_err(|e| SendError::InvalidRecipient(format!("Invalid from address: {e}")))?;
        let credentials = Credentials::new(config.username.clone(), config.password.clone());

        Ok(Self {
            config,
            from,
            credentials,
        })
    }

    /// Build the message for `notification` without sending it.
    fn build_message(&self, notification: &NotificationMessage) -> Result<Message, SendError> {
        let to = notification
            .recipient
            .parse::<Mailbox>()
            .map_err(|e| SendError::InvalidRecipient(format!("{}: {e}", notification.recipient)))?;
        let email = render(notification);

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject)
            .multipart(MultiPart::alternative_plain_html(email.text, email.html))
            .map_err(|e| SendError::Transport(format!("Failed to build email: {e}")))
    }

    /// Build SMTP transport for sending emails.
    fn build_transport(&self) -> Result<SmtpTransport, SendError> {
        Ok(SmtpTransport::starttls_relay(&self.config.host)
            .map_err(|e| SendError::Transport(format!("SMTP relay error: {e}")))?
            .port(self.config.port)
            .credentials(self.credentials.clone())
            .build())
    }
}

#[async_trait]
impl NotificationSender for SmtpNotificationSender {
    async fn send(&self, message: &NotificationMessage) -> Result<(), SendError> {
        let email = self.build_message(message)?;
        let mailer = self.build_transport()?;

        tokio::task::spawn_blocking(move || {
            mailer
                .send(&email)
                .map_err(|e| SendError::Transport(format!("Failed to send email: {e}")))
        })
        .await
        .map_err(|e| SendError::Transport(format!("Email task failed: {e}")))?
        .map(|_| ())?;

        tracing::debug!(
            to = %message.recipient,
            template = message.template.as_str(),
            "Notification sent via SMTP"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use enrollment_core::types::NotificationTemplate;

    fn config() -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: "user".to_string(),
            password: "secret".to_string(),
            from_email: "events@example.com".to_string(),
            from_name: "Events".to_string(),
        }
    }

    fn notification(recipient: &str) -> NotificationMessage {
        NotificationMessage {
            recipient: recipient.to_string(),
            template: NotificationTemplate::EnrollmentConfirmed,
            model: serde_json::json!({ "eventTitle": "Rust Workshop", "firstName": "Ada" }),
        }
    }

    #[test]
    fn builds_multipart_message() {
        let sender = SmtpNotificationSender::new(config()).unwrap();
        let message = sender.build_message(&notification("ada@example.com")).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("To: ada@example.com"));
        assert!(raw.contains("Subject: You're enrolled: Rust Workshop"));
        assert!(raw.contains("multipart/alternative"));
    }

    #[test]
    fn invalid_recipient_is_reported() {
        let sender = SmtpNotificationSender::new(config()).unwrap();
        assert!(matches!(
            sender.build_message(&notification("not an address")),
            Err(SendError::InvalidRecipient(_))
        ));
    }

    #[test]
    fn invalid_sender_is_rejected() {
        let mut config = config();
        config.from_email = "nope".to_string();
        assert!(SmtpNotificationSender::new(config).is_err());
    }
}
