//! Mock notification sender.

use async_trait::async_trait;
use enrollment_core::SendError;
use enrollment_core::notification::NotificationSender;
use enrollment_core::types::{NotificationMessage, NotificationTemplate};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Records delivered messages; failures can be scripted.
#[derive(Default)]
pub struct MockNotificationSender {
    sent: Mutex<Vec<NotificationMessage>>,
    attempts: AtomicU32,
    failures: AtomicU32,
    always_fail: AtomicBool,
    panic_on_send: AtomicBool,
}

impl MockNotificationSender {
    /// Sender that always succeeds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` sends
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Fail every send until turned off
    pub fn fail_always(&self, fail: bool) {
        self.always_fail.store(fail, Ordering::SeqCst);
    }

    /// Panic inside `send` until turned off
    pub fn panic_on_send(&self, panic: bool) {
        self.panic_on_send.store(panic, Ordering::SeqCst);
    }

    /// Successfully delivered messages
    #[must_use]
    pub fn sent(&self) -> Vec<NotificationMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Delivered messages using `template`
    #[must_use]
    pub fn sent_with(&self, template: NotificationTemplate) -> Vec<NotificationMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.template == template)
            .collect()
    }

    /// Send calls made so far, successful or not
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationSender for MockNotificationSender {
    #[allow(clippy::panic)]
    async fn send(&self, message: &NotificationMessage) -> Result<(), SendError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.panic_on_send.load(Ordering::SeqCst) {
            panic!("mock sender panicked");
        }

        let scripted = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted || self.always_fail.load(Ordering::SeqCst) {
            return Err(SendError::Transport("mock transport failure".to_string()));
        }

        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.clone());
        }
        Ok(())
    }
}
