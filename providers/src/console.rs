//! Console notification sender for development.

use crate::template::render;
use async_trait::async_trait;
use enrollment_core::SendError;
use enrollment_core::notification::NotificationSender;
use enrollment_core::types::NotificationMessage;

/// Logs rendered messages instead of sending them.
///
/// Used when no SMTP relay is configured.
#[derive(Clone, Debug, Default)]
pub struct ConsoleNotificationSender;

impl ConsoleNotificationSender {
    /// Create a new console sender.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationSender for ConsoleNotificationSender {
    async fn send(&self, message: &NotificationMessage) -> Result<(), SendError> {
        let email = render(message);
        tracing::info!(
            to = %message.recipient,
            template = message.template.as_str(),
            subject = %email.subject,
            body = %email.text,
            "Notification (console delivery)"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use enrollment_core::types::NotificationTemplate;

    #[tokio::test]
    async fn console_delivery_always_succeeds() {
        let sender = ConsoleNotificationSender::new();
        let message = NotificationMessage {
            recipient: "a@example.com".to_string(),
            template: NotificationTemplate::EnrollmentConfirmed,
            model: serde_json::json!({ "eventTitle": "Meetup" }),
        };
        sender.send(&message).await.unwrap();
    }
}
