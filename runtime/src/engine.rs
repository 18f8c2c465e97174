//! Reservation engine: slot allocation and payment settlement.
//!
//! # Enrollment state machine
//!
//! ```text
//! free:  decrement slot ──▶ CONFIRMED
//! paid:  PENDING_PAYMENT ──webhook──▶ CONFIRMED | FAILED | CANCELED
//!                         ──sweep────▶ EXPIRED
//!                         ──sold out─▶ REFUNDED (charge reversed)
//! ```
//!
//! The paid path does not hold a slot during checkout. The slot is taken
//! when the gateway confirms the charge; if none is left by then the charge
//! is refunded.
//!
//! Every status change is a conditional update on the current status, so
//! duplicate or concurrent webhooks resolve to exactly one winner. Losers
//! undo whatever they took (a decremented slot) and report
//! [`IgnoreReason::ConcurrentSettlement`].

use crate::metrics::{
    GATEWAY_DURATION, REFUNDS_TOTAL, RESERVATIONS_REJECTED_TOTAL, RESERVATIONS_TOTAL,
    SETTLEMENTS_TOTAL,
};
use crate::notifier::Notifier;
use crate::outbox::OutboxProcessor;
use enrollment_core::environment::Clock;
use enrollment_core::gateway::PaymentGateway;
use enrollment_core::store::{EventCatalog, InventoryStore, ReservationRepository};
use enrollment_core::types::{
    Attendee, CheckoutRequest, EnrollmentReceipt, Event, EventId, GatewayStatus,
    NotificationMessage, NotificationTemplate, OutboxPayload, PaymentStatus, Reservation,
    ReservationNumber,
};
use enrollment_core::{
    Conflict, EnrollmentError, EnrollmentResult, GatewayError, GatewayResult, StoreError,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Bound on checkout-session and refund calls
    pub gateway_timeout: Duration,
    /// How many fresh reservation numbers to try on a uniqueness conflict
    pub max_number_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gateway_timeout: Duration::from_secs(10),
            max_number_attempts: 3,
        }
    }
}

/// Storage and gateway ports the engine runs against.
#[derive(Clone)]
pub struct EnginePorts {
    /// Event details
    pub catalog: Arc<dyn EventCatalog>,
    /// Slot counter
    pub inventory: Arc<dyn InventoryStore>,
    /// Reservation records
    pub reservations: Arc<dyn ReservationRepository>,
    /// Payment gateway
    pub gateway: Arc<dyn PaymentGateway>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

/// What a webhook delivery did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// Slot taken, reservation confirmed
    Confirmed,
    /// No slot left; reservation refunded
    Refunded {
        /// `false` when the refund call failed and was queued in the outbox
        refund_issued: bool,
    },
    /// Gateway reported a failed payment
    MarkedFailed,
    /// Gateway reported a canceled/expired checkout
    MarkedCanceled,
    /// Nothing to do
    Ignored(IgnoreReason),
}

impl SettlementOutcome {
    /// Metric label
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Refunded { .. } => "refunded",
            Self::MarkedFailed => "failed",
            Self::MarkedCanceled => "canceled",
            Self::Ignored(_) => "ignored",
        }
    }
}

/// Why a webhook delivery was a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No reservation with that number
    UnknownReservation,
    /// Reservation already in a terminal status
    AlreadySettled(PaymentStatus),
    /// Another delivery for the same reservation won the race
    ConcurrentSettlement,
}

/// Slot allocation and settlement.
pub struct ReservationEngine {
    ports: EnginePorts,
    notifier: Arc<Notifier>,
    outbox: Arc<OutboxProcessor>,
    config: EngineConfig,
}

impl ReservationEngine {
    /// Create an engine.
    #[must_use]
    pub fn new(
        ports: EnginePorts,
        notifier: Arc<Notifier>,
        outbox: Arc<OutboxProcessor>,
        config: EngineConfig,
    ) -> Self {
        Self {
            ports,
            notifier,
            outbox,
            config,
        }
    }

    /// The payment gateway, for webhook verification at the HTTP edge
    #[must_use]
    pub fn gateway(&self) -> &Arc<dyn PaymentGateway> {
        &self.ports.gateway
    }

    /// Enroll an attendee.
    ///
    /// Free events are confirmed immediately; paid events return a checkout
    /// URL and stay `PENDING_PAYMENT` until the gateway webhook arrives.
    ///
    /// # Errors
    ///
    /// - [`EnrollmentError::Validation`] for malformed input
    /// - [`EnrollmentError::NotFound`] for an unknown event
    /// - [`EnrollmentError::DuplicateResource`] if the attendee is already confirmed
    /// - [`EnrollmentError::EventSoldOut`] if no slot is left
    /// - [`EnrollmentError::ExternalServiceFailure`] if checkout creation fails
    /// - [`EnrollmentError::Store`] on storage failure
    pub async fn create_reservation(
        &self,
        event_id: EventId,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> EnrollmentResult<EnrollmentReceipt> {
        let attendee = Attendee::parse(email, first_name, last_name).map_err(|message| {
            metrics::counter!(RESERVATIONS_REJECTED_TOTAL, "reason" => "validation").increment(1);
            EnrollmentError::Validation(message)
        })?;

        let event = self
            .ports
            .catalog
            .find_event(event_id)
            .await?
            .ok_or_else(|| EnrollmentError::NotFound {
                resource: "Event",
                id: event_id.to_string(),
            })?;

        if self
            .ports
            .reservations
            .has_confirmed(event_id, &attendee.email)
            .await?
        {
            metrics::counter!(RESERVATIONS_REJECTED_TOTAL, "reason" => "duplicate").increment(1);
            return Err(duplicate(&event, &attendee));
        }

        let available = self
            .ports
            .inventory
            .available_slots(event_id)
            .await?
            .unwrap_or(event.available_slots);
        if available == 0 {
            metrics::counter!(RESERVATIONS_REJECTED_TOTAL, "reason" => "sold_out").increment(1);
            return Err(EnrollmentError::EventSoldOut(event_id.to_string()));
        }

        if event.is_free() {
            self.enroll_free(&event, &attendee).await
        } else {
            self.enroll_paid(&event, &attendee).await
        }
    }

    async fn enroll_free(
        &self,
        event: &Event,
        attendee: &Attendee,
    ) -> EnrollmentResult<EnrollmentReceipt> {
        if self.ports.inventory.decrement_if_available(event.id).await? == 0 {
            metrics::counter!(RESERVATIONS_REJECTED_TOTAL, "reason" => "sold_out").increment(1);
            return Err(EnrollmentError::EventSoldOut(event.id.to_string()));
        }

        let reservation = match self
            .insert_reservation(event, attendee, PaymentStatus::Confirmed)
            .await
        {
            Ok(reservation) => reservation,
            Err(e) => {
                self.restore_slot(event.id, "free enrollment insert failed").await;
                return Err(e);
            }
        };

        metrics::counter!(RESERVATIONS_TOTAL, "status" => "CONFIRMED").increment(1);
        tracing::info!(
            reservation_number = %reservation.reservation_number,
            event_id = %event.id,
            "Free enrollment confirmed"
        );

        self.notifier
            .notify(NotificationMessage::for_reservation(
                NotificationTemplate::EnrollmentConfirmed,
                &reservation,
                event,
            ))
            .await;

        Ok(receipt(&reservation, None))
    }

    async fn enroll_paid(
        &self,
        event: &Event,
        attendee: &Attendee,
    ) -> EnrollmentResult<EnrollmentReceipt> {
        let reservation = self
            .insert_reservation(event, attendee, PaymentStatus::PendingPayment)
            .await?;

        let request = CheckoutRequest {
            reservation_number: reservation.reservation_number.clone(),
            email: reservation.email.clone(),
            title: event.title.clone(),
            amount: event.price,
            image_url: event.image_url.clone(),
        };

        let checkout = self
            .gateway_call(
                "checkout",
                self.ports.gateway.create_checkout_session(&request),
            )
            .await;

        match checkout {
            Ok(url) => {
                metrics::counter!(RESERVATIONS_TOTAL, "status" => "PENDING_PAYMENT").increment(1);
                tracing::info!(
                    reservation_number = %reservation.reservation_number,
                    event_id = %event.id,
                    "Checkout session created"
                );
                Ok(receipt(&reservation, Some(url)))
            }
            Err(e) => {
                tracing::error!(
                    reservation_number = %reservation.reservation_number,
                    event_id = %event.id,
                    error = %e,
                    "Checkout session creation failed"
                );
                let now = self.ports.clock.now();
                if let Err(store_err) = self
                    .ports
                    .reservations
                    .transition(
                        &reservation.reservation_number,
                        PaymentStatus::PendingPayment,
                        PaymentStatus::Failed,
                        None,
                        now,
                    )
                    .await
                {
                    tracing::error!(
                        reservation_number = %reservation.reservation_number,
                        error = %store_err,
                        "Failed to mark reservation FAILED after checkout error"
                    );
                }
                metrics::counter!(RESERVATIONS_REJECTED_TOTAL, "reason" => "gateway").increment(1);
                Err(EnrollmentError::ExternalServiceFailure(e))
            }
        }
    }

    /// Insert a reservation, drawing a fresh number on a number collision.
    async fn insert_reservation(
        &self,
        event: &Event,
        attendee: &Attendee,
        status: PaymentStatus,
    ) -> EnrollmentResult<Reservation> {
        let mut attempt = 1;
        loop {
            let now = self.ports.clock.now();
            let reservation = Reservation::new(
                ReservationNumber::generate(now),
                event.id,
                attendee,
                status,
                now,
            );

            match self.ports.reservations.insert(&reservation).await {
                Ok(()) => return Ok(reservation),
                Err(StoreError::Conflict(Conflict::ReservationNumber))
                    if attempt < self.config.max_number_attempts =>
                {
                    tracing::warn!(
                        reservation_number = %reservation.reservation_number,
                        attempt,
                        "Reservation number collision, regenerating"
                    );
                    attempt += 1;
                }
                Err(StoreError::Conflict(Conflict::ConfirmedEnrollment)) => {
                    metrics::counter!(RESERVATIONS_REJECTED_TOTAL, "reason" => "duplicate")
                        .increment(1);
                    return Err(duplicate(event, attendee));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Apply a verified gateway outcome to a reservation.
    ///
    /// Idempotent: unknown reservations, already-settled reservations and
    /// losing concurrent deliveries are reported as
    /// [`SettlementOutcome::Ignored`], not as errors.
    ///
    /// # Errors
    ///
    /// Returns [`EnrollmentError::Store`] when storage fails mid-settlement
    /// (any slot taken by this call has been given back by then).
    pub async fn settle_payment(
        &self,
        reservation_number: &ReservationNumber,
        status: GatewayStatus,
        payment_reference: &str,
    ) -> EnrollmentResult<SettlementOutcome> {
        let outcome = self
            .settle(reservation_number, status, payment_reference)
            .await;

        if let Ok(outcome) = &outcome {
            metrics::counter!(SETTLEMENTS_TOTAL, "outcome" => outcome.label()).increment(1);
        }
        outcome
    }

    async fn settle(
        &self,
        number: &ReservationNumber,
        status: GatewayStatus,
        payment_reference: &str,
    ) -> EnrollmentResult<SettlementOutcome> {
        let Some(reservation) = self.ports.reservations.find_by_number(number).await? else {
            tracing::warn!(
                reservation_number = %number,
                gateway_status = %status,
                "Webhook for unknown reservation, ignoring"
            );
            return Ok(SettlementOutcome::Ignored(IgnoreReason::UnknownReservation));
        };

        if reservation.payment_status.is_terminal() {
            tracing::info!(
                reservation_number = %number,
                current_status = %reservation.payment_status,
                gateway_status = %status,
                "Reservation already settled, ignoring webhook"
            );
            return Ok(SettlementOutcome::Ignored(IgnoreReason::AlreadySettled(
                reservation.payment_status,
            )));
        }

        match status {
            GatewayStatus::Confirmed => self.confirm(&reservation, payment_reference).await,
            GatewayStatus::Failed => {
                self.close(&reservation, PaymentStatus::Failed, payment_reference)
                    .await
            }
            GatewayStatus::Canceled => {
                self.close(&reservation, PaymentStatus::Canceled, payment_reference)
                    .await
            }
        }
    }

    async fn confirm(
        &self,
        reservation: &Reservation,
        payment_reference: &str,
    ) -> EnrollmentResult<SettlementOutcome> {
        let number = &reservation.reservation_number;
        let event_id = reservation.event_id;

        if self.ports.inventory.decrement_if_available(event_id).await? == 0 {
            tracing::warn!(
                reservation_number = %number,
                event_id = %event_id,
                "Payment confirmed but event is sold out, refunding"
            );
            return self.compensate(reservation, payment_reference).await;
        }

        let transition = self
            .ports
            .reservations
            .transition(
                number,
                PaymentStatus::PendingPayment,
                PaymentStatus::Confirmed,
                Some(payment_reference),
                self.ports.clock.now(),
            )
            .await;

        match transition {
            Ok(true) => {
                tracing::info!(
                    reservation_number = %number,
                    event_id = %event_id,
                    "Payment confirmed, enrollment secured"
                );
                self.notify_reservation(NotificationTemplate::EnrollmentConfirmed, reservation)
                    .await;
                Ok(SettlementOutcome::Confirmed)
            }
            Ok(false) => {
                self.restore_slot(event_id, "concurrent settlement won").await;
                tracing::info!(
                    reservation_number = %number,
                    "Concurrent settlement already applied, slot returned"
                );
                Ok(SettlementOutcome::Ignored(IgnoreReason::ConcurrentSettlement))
            }
            Err(StoreError::Conflict(Conflict::ConfirmedEnrollment)) => {
                // The attendee paid twice for the same event.
                self.restore_slot(event_id, "attendee already confirmed").await;
                tracing::warn!(
                    reservation_number = %number,
                    event_id = %event_id,
                    "Attendee already holds a confirmed enrollment, refunding duplicate charge"
                );
                self.compensate(reservation, payment_reference).await
            }
            Err(e) => {
                self.restore_slot(event_id, "confirmation failed").await;
                Err(e.into())
            }
        }
    }

    /// Overbook compensation: mark the reservation refunded and reverse the
    /// charge, falling back to a refund outbox entry.
    async fn compensate(
        &self,
        reservation: &Reservation,
        payment_reference: &str,
    ) -> EnrollmentResult<SettlementOutcome> {
        let number = &reservation.reservation_number;
        let won = self
            .ports
            .reservations
            .transition(
                number,
                PaymentStatus::PendingPayment,
                PaymentStatus::Refunded,
                Some(payment_reference),
                self.ports.clock.now(),
            )
            .await?;

        if !won {
            return Ok(SettlementOutcome::Ignored(IgnoreReason::ConcurrentSettlement));
        }

        let refund_issued = match self
            .gateway_call("refund", self.ports.gateway.refund(payment_reference))
            .await
        {
            Ok(()) => {
                metrics::counter!(REFUNDS_TOTAL, "result" => "issued").increment(1);
                tracing::info!(reservation_number = %number, "Overbook refund issued");
                true
            }
            Err(e) => {
                metrics::counter!(REFUNDS_TOTAL, "result" => "deferred").increment(1);
                tracing::error!(
                    reservation_number = %number,
                    error = %e,
                    "Overbook refund failed, queueing for retry"
                );
                let payload = OutboxPayload::Refund {
                    reservation_number: number.clone(),
                    payment_reference: payment_reference.to_string(),
                };
                if let Err(store_err) = self.outbox.save_to_outbox(payload, &e.to_string()).await {
                    metrics::counter!(REFUNDS_TOTAL, "result" => "lost").increment(1);
                    tracing::error!(
                        reservation_number = %number,
                        payment_reference,
                        error = %store_err,
                        "Refund could not be queued; manual refund required"
                    );
                    return Err(store_err.into());
                }
                false
            }
        };

        self.notify_reservation(NotificationTemplate::EnrollmentRefunded, reservation)
            .await;

        Ok(SettlementOutcome::Refunded { refund_issued })
    }

    async fn close(
        &self,
        reservation: &Reservation,
        to: PaymentStatus,
        payment_reference: &str,
    ) -> EnrollmentResult<SettlementOutcome> {
        let won = self
            .ports
            .reservations
            .transition(
                &reservation.reservation_number,
                PaymentStatus::PendingPayment,
                to,
                Some(payment_reference),
                self.ports.clock.now(),
            )
            .await?;

        if !won {
            return Ok(SettlementOutcome::Ignored(IgnoreReason::ConcurrentSettlement));
        }

        tracing::info!(
            reservation_number = %reservation.reservation_number,
            status = %to,
            "Reservation closed by gateway"
        );

        Ok(if to == PaymentStatus::Failed {
            SettlementOutcome::MarkedFailed
        } else {
            SettlementOutcome::MarkedCanceled
        })
    }

    /// Look up a reservation for support.
    ///
    /// # Errors
    ///
    /// Returns [`EnrollmentError::NotFound`] when no reservation has that
    /// number, or [`EnrollmentError::Store`] on storage failure.
    pub async fn find_reservation(
        &self,
        number: &ReservationNumber,
    ) -> EnrollmentResult<Reservation> {
        self.ports
            .reservations
            .find_by_number(number)
            .await?
            .ok_or_else(|| EnrollmentError::NotFound {
                resource: "Reservation",
                id: number.to_string(),
            })
    }

    async fn notify_reservation(&self, template: NotificationTemplate, reservation: &Reservation) {
        match self.ports.catalog.find_event(reservation.event_id).await {
            Ok(Some(event)) => {
                self.notifier
                    .notify(NotificationMessage::for_reservation(
                        template,
                        reservation,
                        &event,
                    ))
                    .await;
            }
            Ok(None) => tracing::error!(
                reservation_number = %reservation.reservation_number,
                event_id = %reservation.event_id,
                template = template.as_str(),
                "Event vanished, notification skipped"
            ),
            Err(e) => tracing::error!(
                reservation_number = %reservation.reservation_number,
                template = template.as_str(),
                error = %e,
                "Event lookup failed, notification skipped"
            ),
        }
    }

    async fn restore_slot(&self, event_id: EventId, reason: &'static str) {
        if let Err(e) = self.ports.inventory.restore(event_id, 1).await {
            tracing::error!(
                event_id = %event_id,
                reason,
                error = %e,
                "Failed to restore slot"
            );
        }
    }

    /// Run a gateway call under the configured timeout.
    async fn gateway_call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = GatewayResult<T>>,
    ) -> GatewayResult<T> {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.config.gateway_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.config.gateway_timeout)),
        };
        metrics::histogram!(GATEWAY_DURATION, "operation" => operation)
            .record(started.elapsed().as_secs_f64());
        result
    }
}

fn receipt(reservation: &Reservation, checkout_url: Option<String>) -> EnrollmentReceipt {
    EnrollmentReceipt {
        reservation_number: reservation.reservation_number.clone(),
        email: reservation.email.clone(),
        status: reservation.payment_status,
        checkout_url,
    }
}

fn duplicate(event: &Event, attendee: &Attendee) -> EnrollmentError {
    EnrollmentError::DuplicateResource(format!(
        "{} is already enrolled in event {}",
        attendee.email, event.id
    ))
}
