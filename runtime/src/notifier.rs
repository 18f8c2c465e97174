//! After-commit notification dispatch.
//!
//! [`Notifier::notify`] is only called once the owning state change has been
//! persisted. Delivery failures never reach the business operation: a failed,
//! timed-out or panicking send is converted into an outbox entry at the send
//! site.
//!
//! Two modes:
//!
//! - **inline**: deliver on the caller's task
//! - **queued**: hand the message to a bounded channel drained by a fixed
//!   pool of workers; when the queue is full or closed the caller delivers
//!   inline instead

use crate::metrics::NOTIFICATIONS_TOTAL;
use crate::outbox::{OutboxProcessor, panic_message};
use enrollment_core::notification::NotificationSender;
use enrollment_core::types::{NotificationMessage, OutboxPayload};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;

/// Notifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Bound on a single send
    pub send_timeout: Duration,
    /// Worker pool size; `0` selects inline mode
    pub workers: usize,
    /// Queue capacity in queued mode
    pub queue_capacity: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(10),
            workers: 4,
            queue_capacity: 1024,
        }
    }
}

/// The deliver-or-outbox step shared by inline callers and workers.
struct Delivery {
    sender: Arc<dyn NotificationSender>,
    outbox: Arc<OutboxProcessor>,
    send_timeout: Duration,
}

impl Delivery {
    async fn deliver(&self, message: NotificationMessage) {
        let send = tokio::time::timeout(self.send_timeout, self.sender.send(&message));
        let error = match AssertUnwindSafe(send).catch_unwind().await {
            Ok(Ok(Ok(()))) => {
                metrics::counter!(NOTIFICATIONS_TOTAL, "result" => "sent").increment(1);
                tracing::debug!(
                    recipient = %message.recipient,
                    template = message.template.as_str(),
                    "Notification sent"
                );
                return;
            }
            Ok(Ok(Err(e))) => e.to_string(),
            Ok(Err(_)) => format!("send timed out after {:?}", self.send_timeout),
            Err(panic) => format!("send panicked: {}", panic_message(&*panic)),
        };

        metrics::counter!(NOTIFICATIONS_TOTAL, "result" => "deferred").increment(1);
        let template = message.template.as_str();
        let recipient = message.recipient.clone();

        if let Err(e) = self
            .outbox
            .save_to_outbox(OutboxPayload::Notification(message), &error)
            .await
        {
            metrics::counter!(NOTIFICATIONS_TOTAL, "result" => "lost").increment(1);
            tracing::error!(
                recipient = %recipient,
                template,
                send_error = %error,
                error = %e,
                "Notification failed and could not be queued for retry"
            );
        }
    }
}

/// Dispatches transactional notifications.
pub struct Notifier {
    delivery: Arc<Delivery>,
    queue: RwLock<Option<mpsc::Sender<NotificationMessage>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Notifier {
    /// Deliver on the caller's task.
    #[must_use]
    pub fn inline(
        sender: Arc<dyn NotificationSender>,
        outbox: Arc<OutboxProcessor>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            delivery: Arc::new(Delivery {
                sender,
                outbox,
                send_timeout,
            }),
            queue: RwLock::new(None),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Build a notifier from configuration, spawning the worker pool when
    /// `config.workers > 0`. Must be called inside a tokio runtime.
    #[must_use]
    pub fn from_config(
        sender: Arc<dyn NotificationSender>,
        outbox: Arc<OutboxProcessor>,
        config: &NotifierConfig,
    ) -> Self {
        let notifier = Self::inline(sender, outbox, config.send_timeout);
        if config.workers == 0 {
            return notifier;
        }

        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let handles = (0..config.workers)
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let delivery = Arc::clone(&notifier.delivery);
                tokio::spawn(async move {
                    loop {
                        let next = rx.lock().await.recv().await;
                        let Some(message) = next else { break };
                        delivery.deliver(message).await;
                    }
                    tracing::debug!(worker, "Notification worker stopped");
                })
            })
            .collect();

        tracing::info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "Notification worker pool started"
        );

        Self {
            delivery: notifier.delivery,
            queue: RwLock::new(Some(tx)),
            workers: Mutex::new(handles),
        }
    }

    /// Notify after a committed state change. Never fails.
    pub async fn notify(&self, message: NotificationMessage) {
        let message = {
            let queue = self.queue.read().await;
            match queue.as_ref() {
                Some(tx) => match tx.try_send(message) {
                    Ok(()) => return,
                    Err(mpsc::error::TrySendError::Full(message)) => {
                        tracing::warn!("Notification queue full, delivering inline");
                        message
                    }
                    Err(mpsc::error::TrySendError::Closed(message)) => message,
                },
                None => message,
            }
        };

        self.delivery.deliver(message).await;
    }

    /// Stop accepting queued work, let workers drain the queue, and wait for
    /// them up to `timeout`. Later `notify` calls deliver inline.
    pub async fn shutdown(&self, timeout: Duration) {
        drop(self.queue.write().await.take());

        let handles: Vec<_> = self.workers.lock().await.drain(..).collect();
        for (idx, handle) in handles.into_iter().enumerate() {
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(worker = idx, error = %e, "Notification worker failed");
                }
                Err(_) => tracing::warn!(worker = idx, "Notification worker shutdown timed out"),
            }
        }
    }
}
