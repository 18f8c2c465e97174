//! Notification delivery port.

use crate::error::SendError;
use crate::types::NotificationMessage;
use async_trait::async_trait;

/// Delivers a rendered transactional message (email in production)
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Send one message.
    ///
    /// # Errors
    ///
    /// Returns a [`SendError`] if delivery fails; the caller decides whether
    /// to queue the message for retry.
    async fn send(&self, message: &NotificationMessage) -> Result<(), SendError>;
}
