//! Notification outbox: durable, backoff-retried delivery of side effects.
//!
//! Entries are only created when an immediate delivery fails. The processor
//! claims due entries in bounded batches, attempts each one in isolation, and
//! either marks it `SENT`, reschedules it with backoff, or parks it as
//! `PERMANENT_FAILURE` once the retry ceiling is exceeded. A separate
//! cleanup pass deletes terminal entries past the retention window.

use crate::backoff::{BackoffPolicy, add_duration, sub_duration};
use crate::metrics::{
    OUTBOX_ATTEMPTS_TOTAL, OUTBOX_CLEANED_TOTAL, OUTBOX_ENQUEUED_TOTAL, OUTBOX_LAST_BATCH,
};
use enrollment_core::environment::Clock;
use enrollment_core::gateway::PaymentGateway;
use enrollment_core::notification::NotificationSender;
use enrollment_core::store::OutboxStore;
use enrollment_core::types::{OutboxEntry, OutboxId, OutboxPayload, OutboxStatus, RetryUpdate};
use enrollment_core::StoreResult;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/// Outbox processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxConfig {
    /// Maximum entries claimed per drain
    pub batch_size: u32,
    /// Entries whose attempt count exceeds this become `PERMANENT_FAILURE`
    pub max_retry_attempts: u32,
    /// How long terminal entries are kept
    pub retention: Duration,
    /// How long a `PENDING` claim is honored before it may be reclaimed
    pub claim_lease: Duration,
    /// Retry schedule
    pub backoff: BackoffPolicy,
    /// Bound on a single notification send
    pub send_timeout: Duration,
    /// Bound on a single refund call
    pub gateway_timeout: Duration,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_retry_attempts: 5,
            retention: Duration::from_secs(7 * 24 * 3600),
            claim_lease: Duration::from_secs(300),
            backoff: BackoffPolicy::default(),
            send_timeout: Duration::from_secs(10),
            gateway_timeout: Duration::from_secs(10),
        }
    }
}

/// Result of one drain pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Entries claimed
    pub claimed: usize,
    /// Entries delivered
    pub sent: usize,
    /// Entries rescheduled for another attempt
    pub rescheduled: usize,
    /// Entries moved to `PERMANENT_FAILURE`
    pub permanently_failed: usize,
    /// Entries whose outcome could not be recorded (left for lease expiry)
    pub errored: usize,
}

/// Drives the outbox.
pub struct OutboxProcessor {
    store: Arc<dyn OutboxStore>,
    sender: Arc<dyn NotificationSender>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    config: OutboxConfig,
}

impl OutboxProcessor {
    /// Create a processor over the given store and delivery channels.
    #[must_use]
    pub fn new(
        store: Arc<dyn OutboxStore>,
        sender: Arc<dyn NotificationSender>,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
        config: OutboxConfig,
    ) -> Self {
        Self {
            store,
            sender,
            gateway,
            clock,
            config,
        }
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &OutboxConfig {
        &self.config
    }

    /// Persist a delivery that just failed so it is retried later.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](enrollment_core::StoreError) if the entry
    /// cannot be written.
    pub async fn save_to_outbox(
        &self,
        payload: OutboxPayload,
        error: &str,
    ) -> StoreResult<OutboxId> {
        let now = self.clock.now();
        let next = add_duration(now, self.config.backoff.delay_for_attempt(1));
        let kind = payload.kind();
        let entry = OutboxEntry::failed(payload, error, now, next);

        self.store.save(&entry).await?;

        metrics::counter!(OUTBOX_ENQUEUED_TOTAL, "kind" => kind).increment(1);
        tracing::warn!(
            outbox_id = %entry.id,
            kind,
            next_attempt_time = %next,
            error,
            "Delivery failed, queued in outbox"
        );

        Ok(entry.id)
    }

    /// Claim and attempt every due entry (one bounded batch).
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](enrollment_core::StoreError) only if the claim
    /// itself fails. Per-entry failures are contained and counted.
    pub async fn process_due(&self) -> StoreResult<DrainReport> {
        let now = self.clock.now();
        let lease_cutoff = sub_duration(now, self.config.claim_lease);
        let entries = self
            .store
            .claim_due(now, lease_cutoff, self.config.batch_size)
            .await?;

        let mut report = DrainReport {
            claimed: entries.len(),
            ..DrainReport::default()
        };
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(OUTBOX_LAST_BATCH).set(entries.len() as f64);

        for entry in entries {
            self.process_entry(entry, &mut report).await;
        }

        if report.claimed > 0 {
            tracing::info!(
                claimed = report.claimed,
                sent = report.sent,
                rescheduled = report.rescheduled,
                permanently_failed = report.permanently_failed,
                errored = report.errored,
                "Outbox drain complete"
            );
        }

        Ok(report)
    }

    async fn process_entry(&self, entry: OutboxEntry, report: &mut DrainReport) {
        let attempt = AssertUnwindSafe(self.attempt(&entry.payload))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(format!("delivery panicked: {}", panic_message(&*panic))));

        match attempt {
            Ok(()) => match self.store.mark_sent(entry.id, self.clock.now()).await {
                Ok(()) => {
                    report.sent += 1;
                    metrics::counter!(OUTBOX_ATTEMPTS_TOTAL, "result" => "sent").increment(1);
                    tracing::info!(
                        outbox_id = %entry.id,
                        kind = entry.payload.kind(),
                        attempts = entry.retry_attempts,
                        "Outbox entry delivered"
                    );
                }
                Err(e) => {
                    report.errored += 1;
                    tracing::error!(
                        outbox_id = %entry.id,
                        error = %e,
                        "Failed to mark outbox entry sent"
                    );
                }
            },
            Err(error) => {
                let update = self.retry_update(&entry, error);
                match self.store.record_failure(entry.id, &update).await {
                    Ok(()) if update.status == OutboxStatus::PermanentFailure => {
                        report.permanently_failed += 1;
                        metrics::counter!(OUTBOX_ATTEMPTS_TOTAL, "result" => "permanent_failure")
                            .increment(1);
                        tracing::error!(
                            outbox_id = %entry.id,
                            kind = entry.payload.kind(),
                            attempts = update.retry_attempts,
                            error = %update.last_error,
                            "Outbox entry exceeded retry ceiling, giving up"
                        );
                    }
                    Ok(()) => {
                        report.rescheduled += 1;
                        metrics::counter!(OUTBOX_ATTEMPTS_TOTAL, "result" => "retry").increment(1);
                        tracing::warn!(
                            outbox_id = %entry.id,
                            kind = entry.payload.kind(),
                            attempts = update.retry_attempts,
                            next_attempt_time = %update.next_attempt_time,
                            error = %update.last_error,
                            "Outbox delivery failed, rescheduled"
                        );
                    }
                    Err(e) => {
                        report.errored += 1;
                        tracing::error!(
                            outbox_id = %entry.id,
                            error = %e,
                            "Failed to record outbox failure"
                        );
                    }
                }
            }
        }
    }

    /// Compute the state after one more failed attempt.
    fn retry_update(&self, entry: &OutboxEntry, error: String) -> RetryUpdate {
        let retry_attempts = entry.retry_attempts.saturating_add(1);

        if retry_attempts > self.config.max_retry_attempts {
            return RetryUpdate {
                retry_attempts,
                status: OutboxStatus::PermanentFailure,
                next_attempt_time: entry.next_attempt_time,
                last_error: error,
            };
        }

        RetryUpdate {
            retry_attempts,
            status: OutboxStatus::Failed,
            next_attempt_time: self.config.backoff.next_attempt_time(
                entry.next_attempt_time,
                self.clock.now(),
                retry_attempts,
            ),
            last_error: error,
        }
    }

    /// Deliver one payload, bounded by the relevant timeout.
    async fn attempt(&self, payload: &OutboxPayload) -> Result<(), String> {
        match payload {
            OutboxPayload::Notification(message) => {
                match tokio::time::timeout(self.config.send_timeout, self.sender.send(message))
                    .await
                {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(_) => Err(format!("send timed out after {:?}", self.config.send_timeout)),
                }
            }
            OutboxPayload::Refund {
                reservation_number,
                payment_reference,
            } => {
                match tokio::time::timeout(
                    self.config.gateway_timeout,
                    self.gateway.refund(payment_reference),
                )
                .await
                {
                    Ok(Ok(())) => {
                        tracing::info!(
                            reservation_number = %reservation_number,
                            "Deferred refund issued"
                        );
                        Ok(())
                    }
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!(
                        "refund timed out after {:?}",
                        self.config.gateway_timeout
                    )),
                }
            }
        }
    }

    /// Delete terminal entries older than the retention window.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](enrollment_core::StoreError) if the delete fails.
    pub async fn cleanup(&self) -> StoreResult<u64> {
        let cutoff = sub_duration(self.clock.now(), self.config.retention);
        let deleted = self.store.delete_terminal_before(cutoff).await?;

        if deleted > 0 {
            metrics::counter!(OUTBOX_CLEANED_TOTAL).increment(deleted);
            tracing::info!(deleted, cutoff = %cutoff, "Outbox retention cleanup");
        }

        Ok(deleted)
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
