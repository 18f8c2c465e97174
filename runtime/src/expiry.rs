//! Stale reservation sweep.
//!
//! A customer who opens checkout and never pays must not hold a slot
//! forever. Each sweep expires one bounded batch of `PENDING_PAYMENT`
//! reservations older than the grace period and restores their slots.

use crate::backoff::sub_duration;
use crate::metrics::{EXPIRED_TOTAL, SWEEP_DURATION};
use enrollment_core::StoreResult;
use enrollment_core::environment::Clock;
use enrollment_core::store::ReservationRepository;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Expiry sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiryConfig {
    /// Grace period measured from reservation creation
    pub pending_expiry: Duration,
    /// Maximum reservations expired per sweep
    pub batch_size: u32,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            pending_expiry: Duration::from_secs(30 * 60),
            batch_size: 100,
        }
    }
}

/// Reclaims slots from abandoned checkouts.
pub struct ExpirySweeper {
    reservations: Arc<dyn ReservationRepository>,
    clock: Arc<dyn Clock>,
    config: ExpiryConfig,
}

impl ExpirySweeper {
    /// Create a sweeper.
    #[must_use]
    pub fn new(
        reservations: Arc<dyn ReservationRepository>,
        clock: Arc<dyn Clock>,
        config: ExpiryConfig,
    ) -> Self {
        Self {
            reservations,
            clock,
            config,
        }
    }

    /// Run one sweep and return how many reservations were expired.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](enrollment_core::StoreError) if the batch
    /// fails; the batch is atomic, so nothing changed in that case.
    pub async fn sweep(&self) -> StoreResult<usize> {
        let started = Instant::now();
        let now = self.clock.now();
        let cutoff = sub_duration(now, self.config.pending_expiry);

        let expired = self
            .reservations
            .expire_stale(cutoff, self.config.batch_size, now)
            .await?;

        metrics::histogram!(SWEEP_DURATION).record(started.elapsed().as_secs_f64());

        if !expired.is_empty() {
            metrics::counter!(EXPIRED_TOTAL).increment(expired.len() as u64);
            for reservation in &expired {
                tracing::info!(
                    reservation_number = %reservation.reservation_number,
                    event_id = %reservation.event_id,
                    "Reservation expired, slot restored"
                );
            }
            tracing::info!(count = expired.len(), cutoff = %cutoff, "Expiry sweep complete");
        }

        Ok(expired.len())
    }
}
