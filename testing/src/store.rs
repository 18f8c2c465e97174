//! In-memory implementation of every storage port.
//!
//! All state sits behind a single mutex, so each trait method is atomic the
//! same way the corresponding SQL statement is.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use enrollment_core::store::{
    EventCatalog, InventoryStore, OutboxStore, ReservationRepository, StoreHealth,
};
use enrollment_core::types::{
    Event, EventId, ExpiredReservation, OutboxEntry, OutboxId, OutboxStatus, PaymentStatus,
    Reservation, ReservationNumber, RetryUpdate,
};
use enrollment_core::{Conflict, StoreError, StoreResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

#[derive(Default)]
struct State {
    events: HashMap<EventId, Event>,
    reservations: HashMap<ReservationNumber, Reservation>,
    outbox: HashMap<OutboxId, OutboxEntry>,
}

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    fail_inserts: AtomicBool,
    fail_transitions: AtomicBool,
    fail_outbox_saves: AtomicBool,
}

impl InMemoryStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an event
    pub async fn add_event(&self, event: Event) {
        self.state.lock().await.events.insert(event.id, event);
    }

    /// Current event row
    pub async fn event(&self, id: EventId) -> Option<Event> {
        self.state.lock().await.events.get(&id).cloned()
    }

    /// Current reservation row
    pub async fn reservation(&self, number: &ReservationNumber) -> Option<Reservation> {
        self.state.lock().await.reservations.get(number).cloned()
    }

    /// All reservations for an event
    pub async fn reservations_for(&self, event_id: EventId) -> Vec<Reservation> {
        self.state
            .lock()
            .await
            .reservations
            .values()
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect()
    }

    /// All outbox entries, oldest first
    pub async fn outbox_entries(&self) -> Vec<OutboxEntry> {
        let mut entries: Vec<_> = self.state.lock().await.outbox.values().cloned().collect();
        entries.sort_by_key(|e| e.created_at);
        entries
    }

    /// Make every reservation insert fail with a database error
    pub fn fail_reservation_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Make every status transition fail with a database error
    pub fn fail_transitions(&self, fail: bool) {
        self.fail_transitions.store(fail, Ordering::SeqCst);
    }

    /// Make every outbox save fail with a database error
    pub fn fail_outbox_saves(&self, fail: bool) {
        self.fail_outbox_saves.store(fail, Ordering::SeqCst);
    }
}

fn confirmed_exists(
    state: &State,
    event_id: EventId,
    email: &str,
    except: &ReservationNumber,
) -> bool {
    state.reservations.values().any(|r| {
        r.event_id == event_id
            && r.email == email
            && r.payment_status == PaymentStatus::Confirmed
            && &r.reservation_number != except
    })
}

fn restore_clamped(event: &mut Event, count: u32) {
    event.available_slots = event
        .available_slots
        .saturating_add(count)
        .min(event.total_capacity);
}

#[async_trait]
impl EventCatalog for InMemoryStore {
    async fn find_event(&self, event_id: EventId) -> StoreResult<Option<Event>> {
        Ok(self.event(event_id).await)
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn decrement_if_available(&self, event_id: EventId) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        match state.events.get_mut(&event_id) {
            Some(event) if event.available_slots > 0 => {
                event.available_slots -= 1;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn restore(&self, event_id: EventId, count: u32) -> StoreResult<()> {
        if let Some(event) = self.state.lock().await.events.get_mut(&event_id) {
            restore_clamped(event, count);
        }
        Ok(())
    }

    async fn available_slots(&self, event_id: EventId) -> StoreResult<Option<u32>> {
        Ok(self.event(event_id).await.map(|e| e.available_slots))
    }
}

#[async_trait]
impl ReservationRepository for InMemoryStore {
    async fn insert(&self, reservation: &Reservation) -> StoreResult<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Database("injected insert failure".to_string()));
        }

        let mut state = self.state.lock().await;
        if state.reservations.contains_key(&reservation.reservation_number) {
            return Err(StoreError::Conflict(Conflict::ReservationNumber));
        }
        if reservation.payment_status == PaymentStatus::Confirmed
            && confirmed_exists(
                &state,
                reservation.event_id,
                &reservation.email,
                &reservation.reservation_number,
            )
        {
            return Err(StoreError::Conflict(Conflict::ConfirmedEnrollment));
        }

        state
            .reservations
            .insert(reservation.reservation_number.clone(), reservation.clone());
        Ok(())
    }

    async fn find_by_number(&self, number: &ReservationNumber) -> StoreResult<Option<Reservation>> {
        Ok(self.reservation(number).await)
    }

    async fn has_confirmed(&self, event_id: EventId, email: &str) -> StoreResult<bool> {
        let state = self.state.lock().await;
        Ok(state.reservations.values().any(|r| {
            r.event_id == event_id && r.email == email && r.payment_status == PaymentStatus::Confirmed
        }))
    }

    async fn transition(
        &self,
        number: &ReservationNumber,
        from: PaymentStatus,
        to: PaymentStatus,
        payment_reference: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        if self.fail_transitions.load(Ordering::SeqCst) {
            return Err(StoreError::Database("injected transition failure".to_string()));
        }
        let mut state = self.state.lock().await;
        let Some(current) = state.reservations.get(number) else {
            return Ok(false);
        };
        if current.payment_status != from {
            return Ok(false);
        }
        if to == PaymentStatus::Confirmed
            && confirmed_exists(&state, current.event_id, &current.email, number)
        {
            return Err(StoreError::Conflict(Conflict::ConfirmedEnrollment));
        }

        if let Some(reservation) = state.reservations.get_mut(number) {
            reservation.payment_status = to;
            reservation.updated_at = at;
            if let Some(reference) = payment_reference {
                reservation.payment_reference = Some(reference.to_string());
            }
        }
        Ok(true)
    }

    async fn expire_stale(
        &self,
        cutoff: DateTime<Utc>,
        batch_size: u32,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<ExpiredReservation>> {
        let mut state = self.state.lock().await;

        let mut stale: Vec<_> = state
            .reservations
            .values()
            .filter(|r| r.payment_status == PaymentStatus::PendingPayment && r.created_at < cutoff)
            .map(|r| (r.created_at, r.reservation_number.clone()))
            .collect();
        stale.sort();
        stale.truncate(batch_size as usize);

        let mut expired = Vec::with_capacity(stale.len());
        for (_, number) in stale {
            let Some(reservation) = state.reservations.get_mut(&number) else {
                continue;
            };
            reservation.payment_status = PaymentStatus::Expired;
            reservation.updated_at = at;
            let event_id = reservation.event_id;

            if let Some(event) = state.events.get_mut(&event_id) {
                restore_clamped(event, 1);
            }
            expired.push(ExpiredReservation {
                reservation_number: number,
                event_id,
            });
        }

        Ok(expired)
    }
}

#[async_trait]
impl OutboxStore for InMemoryStore {
    async fn save(&self, entry: &OutboxEntry) -> StoreResult<()> {
        if self.fail_outbox_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Database("injected outbox failure".to_string()));
        }
        self.state.lock().await.outbox.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease_cutoff: DateTime<Utc>,
        batch_size: u32,
    ) -> StoreResult<Vec<OutboxEntry>> {
        let mut state = self.state.lock().await;

        let mut due: Vec<_> = state
            .outbox
            .values()
            .filter(|e| match e.status {
                OutboxStatus::Failed => e.next_attempt_time <= now,
                OutboxStatus::Pending => e.last_attempt_time.is_none_or(|t| t < lease_cutoff),
                OutboxStatus::Sent | OutboxStatus::PermanentFailure => false,
            })
            .map(|e| (e.next_attempt_time, e.id))
            .collect();
        due.sort_by_key(|(next, _)| *next);
        due.truncate(batch_size as usize);

        let mut claimed = Vec::with_capacity(due.len());
        for (_, id) in due {
            if let Some(entry) = state.outbox.get_mut(&id) {
                entry.status = OutboxStatus::Pending;
                entry.last_attempt_time = Some(now);
                claimed.push(entry.clone());
            }
        }
        Ok(claimed)
    }

    async fn mark_sent(&self, id: OutboxId, at: DateTime<Utc>) -> StoreResult<()> {
        if let Some(entry) = self.state.lock().await.outbox.get_mut(&id) {
            entry.status = OutboxStatus::Sent;
            entry.last_attempt_time = Some(at);
        }
        Ok(())
    }

    async fn record_failure(&self, id: OutboxId, update: &RetryUpdate) -> StoreResult<()> {
        if let Some(entry) = self.state.lock().await.outbox.get_mut(&id) {
            entry.status = update.status;
            entry.retry_attempts = update.retry_attempts;
            entry.next_attempt_time = update.next_attempt_time;
            entry.last_error = Some(update.last_error.clone());
        }
        Ok(())
    }

    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.outbox.len();
        state.outbox.retain(|_, e| {
            !(e.status.is_terminal() && e.last_attempt_time.unwrap_or(e.created_at) < cutoff)
        });
        Ok((before - state.outbox.len()) as u64)
    }

    async fn find(&self, id: OutboxId) -> StoreResult<Option<OutboxEntry>> {
        Ok(self.state.lock().await.outbox.get(&id).cloned())
    }
}

#[async_trait]
impl StoreHealth for InMemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
