//! Domain types for the enrollment engine.
//!
//! Value objects and records shared by every layer: identifiers, money,
//! the event slot counter, reservations and their payment status, and the
//! notification outbox entry.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an event (owned by the event catalog)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random `EventId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `EventId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Internal identifier of a reservation row
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(Uuid);

impl ReservationId {
    /// Creates a new random `ReservationId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `ReservationId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Public, support-facing reservation number.
///
/// Format: `YYYYMMDDHHMMSS-XXXXXXXX`. The timestamp prefix keeps numbers
/// roughly sortable by creation time; the suffix is drawn from Crockford's
/// base32 alphabet, which leaves out the look-alikes `I`, `L`, `O` and `U`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationNumber(String);

impl ReservationNumber {
    /// Alphabet used for the random suffix
    pub const SUFFIX_ALPHABET: &'static [u8] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

    /// Length of the random suffix
    pub const SUFFIX_LEN: usize = 8;

    /// Generate a fresh reservation number for the given creation time
    #[must_use]
    pub fn generate(at: DateTime<Utc>) -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..Self::SUFFIX_LEN)
            .map(|_| {
                let idx = rng.gen_range(0..Self::SUFFIX_ALPHABET.len());
                char::from(Self::SUFFIX_ALPHABET[idx])
            })
            .collect();
        Self(format!("{}-{suffix}", at.format("%Y%m%d%H%M%S")))
    }

    /// Wrap an existing reservation number (e.g. from a webhook or the database)
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the reservation number as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReservationNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an outbox entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutboxId(Uuid);

impl OutboxId {
    /// Creates a new random `OutboxId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `OutboxId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OutboxId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OutboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Money
// ============================================================================

/// Represents money in minor units (cents) to avoid floating-point arithmetic errors
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero amount (free events)
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Event
// ============================================================================

/// An enrollable event as seen by the engine.
///
/// Everything except `available_slots` is owned by the event catalog and is
/// only read here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event identifier
    pub id: EventId,
    /// Display title (used for checkout and notifications)
    pub title: String,
    /// Price per enrollment; zero means free
    pub price: Money,
    /// Optional image shown on the checkout page
    pub image_url: Option<String>,
    /// Original capacity; `available_slots` never exceeds it
    pub total_capacity: u32,
    /// Remaining slots
    pub available_slots: u32,
}

impl Event {
    /// Whether enrollment requires payment
    #[must_use]
    pub const fn is_free(&self) -> bool {
        self.price.is_zero()
    }
}

// ============================================================================
// Reservations
// ============================================================================

/// Payment status of a reservation.
///
/// ```text
/// PENDING_PAYMENT ──▶ CONFIRMED ──▶ REFUNDED (overbook compensation)
///        │
///        ├──▶ FAILED
///        ├──▶ CANCELED
///        ├──▶ EXPIRED
///        └──▶ REFUNDED (charge arrived after the last slot was taken)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Waiting for the gateway webhook
    PendingPayment,
    /// Slot secured
    Confirmed,
    /// Gateway reported a failed payment
    Failed,
    /// Checkout was canceled or abandoned at the gateway
    Canceled,
    /// Reclaimed by the expiry sweep
    Expired,
    /// Charge reversed because no slot was left
    Refunded,
}

impl PaymentStatus {
    /// Database / wire representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PendingPayment => "PENDING_PAYMENT",
            Self::Confirmed => "CONFIRMED",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
            Self::Expired => "EXPIRED",
            Self::Refunded => "REFUNDED",
        }
    }

    /// Terminal states never change again for the same record.
    ///
    /// `CONFIRMED` is listed as terminal for settlement purposes; the only
    /// way out of it is overbook compensation, which never starts from a
    /// record the engine has already confirmed.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::PendingPayment)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING_PAYMENT" => Ok(Self::PendingPayment),
            "CONFIRMED" => Ok(Self::Confirmed),
            "FAILED" => Ok(Self::Failed),
            "CANCELED" => Ok(Self::Canceled),
            "EXPIRED" => Ok(Self::Expired),
            "REFUNDED" => Ok(Self::Refunded),
            other => Err(format!("Invalid payment status: {other}")),
        }
    }
}

/// Outcome reported by the payment gateway for a checkout
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayStatus {
    /// Payment captured
    Confirmed,
    /// Payment failed
    Failed,
    /// Checkout canceled or expired at the gateway
    Canceled,
}

impl fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Confirmed => "CONFIRMED",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
        })
    }
}

/// One attendee's claim on an event slot
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Row identifier
    pub id: ReservationId,
    /// Public reservation number
    pub reservation_number: ReservationNumber,
    /// Event the reservation is for
    pub event_id: EventId,
    /// Normalized (trimmed, lower-cased) attendee email
    pub email: String,
    /// Attendee first name
    pub first_name: String,
    /// Attendee last name
    pub last_name: String,
    /// Current payment status
    pub payment_status: PaymentStatus,
    /// Opaque gateway reference, set on webhook receipt
    pub payment_reference: Option<String>,
    /// Creation time (expiry age is measured from here)
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Build a new reservation record in the given initial status
    #[must_use]
    pub fn new(
        reservation_number: ReservationNumber,
        event_id: EventId,
        attendee: &Attendee,
        payment_status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ReservationId::new(),
            reservation_number,
            event_id,
            email: attendee.email.clone(),
            first_name: attendee.first_name.clone(),
            last_name: attendee.last_name.clone(),
            payment_status,
            payment_reference: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Validated attendee details
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attendee {
    /// Normalized email
    pub email: String,
    /// First name
    pub first_name: String,
    /// Last name
    pub last_name: String,
}

impl Attendee {
    /// Normalize and validate attendee details.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message when a field is empty or the email
    /// is obviously malformed.
    pub fn parse(email: &str, first_name: &str, last_name: &str) -> Result<Self, String> {
        let email = email.trim().to_lowercase();
        let first_name = first_name.trim();
        let last_name = last_name.trim();

        if first_name.is_empty() {
            return Err("First name is required".to_string());
        }
        if last_name.is_empty() {
            return Err("Last name is required".to_string());
        }
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
            _ => return Err(format!("Invalid email address: {email}")),
        }

        Ok(Self {
            email,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        })
    }
}

/// Result of `create_reservation`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentReceipt {
    /// Public reservation number
    pub reservation_number: ReservationNumber,
    /// Normalized attendee email
    pub email: String,
    /// `CONFIRMED` (free) or `PENDING_PAYMENT` (paid)
    pub status: PaymentStatus,
    /// Gateway checkout URL for paid events
    pub checkout_url: Option<String>,
}

/// A reservation reclaimed by the expiry sweep
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpiredReservation {
    /// Public reservation number
    pub reservation_number: ReservationNumber,
    /// Event whose slot was restored
    pub event_id: EventId,
}

// ============================================================================
// Notifications & outbox
// ============================================================================

/// Which transactional message to render
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationTemplate {
    /// Enrollment secured
    EnrollmentConfirmed,
    /// Payment refunded because the event filled up
    EnrollmentRefunded,
}

impl NotificationTemplate {
    /// Stable identifier handed to the rendering collaborator
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EnrollmentConfirmed => "ENROLLMENT_CONFIRMED",
            Self::EnrollmentRefunded => "ENROLLMENT_REFUNDED",
        }
    }
}

/// A message ready for delivery; rendering happens in the sender
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    /// Recipient email
    pub recipient: String,
    /// Template identity
    pub template: NotificationTemplate,
    /// Render model (flat JSON object)
    pub model: serde_json::Value,
}

impl NotificationMessage {
    /// Build a message for a reservation and its event
    #[must_use]
    pub fn for_reservation(
        template: NotificationTemplate,
        reservation: &Reservation,
        event: &Event,
    ) -> Self {
        Self {
            recipient: reservation.email.clone(),
            template,
            model: serde_json::json!({
                "reservationNumber": reservation.reservation_number.as_str(),
                "firstName": reservation.first_name,
                "lastName": reservation.last_name,
                "eventId": event.id.to_string(),
                "eventTitle": event.title,
                "amount": event.price.to_string(),
            }),
        }
    }
}

/// What an outbox entry carries.
///
/// Failed refunds share the outbox with notifications: both are outbound
/// side effects that must eventually happen after a committed state change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboxPayload {
    /// Transactional email
    Notification(NotificationMessage),
    /// Refund that could not be issued at settlement time
    Refund {
        /// Reservation the charge belongs to
        reservation_number: ReservationNumber,
        /// Gateway reference to refund
        payment_reference: String,
    },
}

impl OutboxPayload {
    /// Short label for logs and metrics
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Notification(_) => "notification",
            Self::Refund { .. } => "refund",
        }
    }
}

/// Outbox entry status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    /// Claimed by a processor, attempt in flight
    Pending,
    /// Delivered
    Sent,
    /// Waiting for the next retry
    Failed,
    /// Retry ceiling exceeded; never retried again
    PermanentFailure,
}

impl OutboxStatus {
    /// Database representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
            Self::PermanentFailure => "PERMANENT_FAILURE",
        }
    }

    /// `SENT` and `PERMANENT_FAILURE` are eligible for retention cleanup
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::PermanentFailure)
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "SENT" => Ok(Self::Sent),
            "FAILED" => Ok(Self::Failed),
            "PERMANENT_FAILURE" => Ok(Self::PermanentFailure),
            other => Err(format!("Invalid outbox status: {other}")),
        }
    }
}

/// A persisted outbound side effect awaiting (re)delivery
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Entry identifier
    pub id: OutboxId,
    /// What to deliver
    pub payload: OutboxPayload,
    /// Current status
    pub status: OutboxStatus,
    /// Attempts made so far (the failed immediate send counts as the first)
    pub retry_attempts: u32,
    /// When the last attempt started
    pub last_attempt_time: Option<DateTime<Utc>>,
    /// Error from the last failed attempt
    pub last_error: Option<String>,
    /// Earliest time of the next attempt
    pub next_attempt_time: DateTime<Utc>,
    /// When the entry was created
    pub created_at: DateTime<Utc>,
}

impl OutboxEntry {
    /// New entry for a delivery that just failed
    #[must_use]
    pub fn failed(
        payload: OutboxPayload,
        error: impl Into<String>,
        now: DateTime<Utc>,
        next_attempt_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OutboxId::new(),
            payload,
            status: OutboxStatus::Failed,
            retry_attempts: 1,
            last_attempt_time: Some(now),
            last_error: Some(error.into()),
            next_attempt_time,
            created_at: now,
        }
    }
}

/// Result of recording one failed retry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryUpdate {
    /// New attempt count
    pub retry_attempts: u32,
    /// New status (`FAILED` or `PERMANENT_FAILURE`)
    pub status: OutboxStatus,
    /// Next attempt time (unchanged semantics for permanent failures)
    pub next_attempt_time: DateTime<Utc>,
    /// Error message of this attempt
    pub last_error: String,
}

// ============================================================================
// Gateway exchange types
// ============================================================================

/// Parameters for a checkout session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutRequest {
    /// Reservation being paid for; echoed back by the webhook
    pub reservation_number: ReservationNumber,
    /// Payer email (prefilled at checkout)
    pub email: String,
    /// Line item title
    pub title: String,
    /// Amount to charge
    pub amount: Money,
    /// Optional line item image
    pub image_url: Option<String>,
}

/// A verified, parsed webhook delivery
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayEvent {
    /// Payment outcome for a reservation
    Settlement {
        /// Reservation number carried through checkout
        reservation_number: ReservationNumber,
        /// Outcome
        status: GatewayStatus,
        /// Opaque payment reference
        payment_reference: String,
    },
    /// Authentic delivery of an event type the engine does not act on
    Ignored {
        /// Gateway event type
        event_type: String,
    },
}
