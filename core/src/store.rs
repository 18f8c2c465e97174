//! Storage ports.
//!
//! The engine never locks in application code: every invariant on the slot
//! counter and on reservation status is enforced by a single conditional
//! write behind one of these traits.

use crate::error::StoreResult;
use crate::types::{
    Event, EventId, ExpiredReservation, OutboxEntry, OutboxId, PaymentStatus, Reservation,
    ReservationNumber, RetryUpdate,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Read-only access to event details owned by the catalog
#[async_trait]
pub trait EventCatalog: Send + Sync {
    /// Look up an event by id
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::error::StoreError) if the lookup fails.
    async fn find_event(&self, event_id: EventId) -> StoreResult<Option<Event>>;
}

/// The per-event slot counter
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Take one slot if any remain.
    ///
    /// Returns the number of rows changed: `1` when a slot was taken, `0`
    /// when the event is sold out (or unknown). Concurrent callers racing for
    /// the last slot see exactly one `1`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::error::StoreError) if the update fails.
    async fn decrement_if_available(&self, event_id: EventId) -> StoreResult<u64>;

    /// Give back `count` slots, never exceeding the event's total capacity.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::error::StoreError) if the update fails.
    async fn restore(&self, event_id: EventId, count: u32) -> StoreResult<()>;

    /// Current remaining slots, `None` for an unknown event.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::error::StoreError) if the read fails.
    async fn available_slots(&self, event_id: EventId) -> StoreResult<Option<u32>>;
}

/// Reservation records
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Persist a new reservation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`](crate::error::StoreError::Conflict) on a
    /// duplicate reservation number or a second confirmed enrollment for the
    /// same (event, email).
    async fn insert(&self, reservation: &Reservation) -> StoreResult<()>;

    /// Look up a reservation by its public number.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::error::StoreError) if the read fails.
    async fn find_by_number(&self, number: &ReservationNumber) -> StoreResult<Option<Reservation>>;

    /// Whether a confirmed reservation exists for (event, email).
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::error::StoreError) if the read fails.
    async fn has_confirmed(&self, event_id: EventId, email: &str) -> StoreResult<bool>;

    /// Conditionally move a reservation from `from` to `to`.
    ///
    /// Sets `payment_reference` when one is given and bumps `updated_at`.
    /// Returns `false` when the reservation was not in `from` (another actor
    /// won the race, or the record does not exist).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`](crate::error::StoreError::Conflict) when
    /// confirming would create a second confirmed enrollment for the same
    /// (event, email).
    async fn transition(
        &self,
        number: &ReservationNumber,
        from: PaymentStatus,
        to: PaymentStatus,
        payment_reference: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Expire up to `batch_size` pending reservations created before `cutoff`.
    ///
    /// One atomic batch: oldest first, rows locked by a concurrent sweeper are
    /// skipped, every expired reservation restores one slot to its event
    /// (clamped at capacity).
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::error::StoreError) if the batch fails;
    /// nothing is expired in that case.
    async fn expire_stale(
        &self,
        cutoff: DateTime<Utc>,
        batch_size: u32,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<ExpiredReservation>>;
}

/// Durable retry queue for outbound side effects
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Persist a new entry.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::error::StoreError) if the write fails.
    async fn save(&self, entry: &OutboxEntry) -> StoreResult<()>;

    /// Claim up to `batch_size` entries for an attempt at `now`.
    ///
    /// Eligible entries are `FAILED` with `next_attempt_time <= now`, plus
    /// `PENDING` entries whose claim started before `lease_cutoff`. Claimed
    /// entries become `PENDING` with `last_attempt_time = now`; concurrent
    /// claimers never receive the same entry.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::error::StoreError) if the claim fails.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease_cutoff: DateTime<Utc>,
        batch_size: u32,
    ) -> StoreResult<Vec<OutboxEntry>>;

    /// Mark a claimed entry delivered.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::error::StoreError) if the write fails.
    async fn mark_sent(&self, id: OutboxId, at: DateTime<Utc>) -> StoreResult<()>;

    /// Record a failed attempt on a claimed entry.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::error::StoreError) if the write fails.
    async fn record_failure(&self, id: OutboxId, update: &RetryUpdate) -> StoreResult<()>;

    /// Delete terminal entries whose last activity is before `cutoff`.
    /// Returns the number of deleted entries.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::error::StoreError) if the delete fails.
    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    /// Look up one entry.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::error::StoreError) if the read fails.
    async fn find(&self, id: OutboxId) -> StoreResult<Option<OutboxEntry>>;
}

/// Liveness probe for the backing store (used by `/ready`)
#[async_trait]
pub trait StoreHealth: Send + Sync {
    /// Round-trip to the store.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::error::StoreError) if the store is unreachable.
    async fn ping(&self) -> StoreResult<()>;
}
