//! Error taxonomy for the enrollment engine.
//!
//! Storage, gateway and notification failures each get their own enum so the
//! adapters stay independent; the engine folds them into [`EnrollmentError`]
//! at its boundary.

use thiserror::Error;

/// Errors surfaced by engine operations to callers
#[derive(Error, Debug)]
pub enum EnrollmentError {
    /// Unknown event or reservation
    #[error("{resource} not found: {id}")]
    NotFound {
        /// Kind of resource ("Event", "Reservation")
        resource: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// Attendee already holds a confirmed enrollment for the event
    #[error("Duplicate resource: {0}")]
    DuplicateResource(String),

    /// No slot left
    #[error("Event is sold out: {0}")]
    EventSoldOut(String),

    /// Payment gateway call failed or timed out
    #[error("External service failure: {0}")]
    ExternalServiceFailure(#[from] GatewayError),

    /// Webhook delivery could not be authenticated
    #[error("Invalid webhook signature")]
    InvalidWebhookSignature,

    /// Request input rejected before any state change
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Storage failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result alias for engine operations
pub type EnrollmentResult<T> = Result<T, EnrollmentError>;

/// Errors from the storage ports
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Uniqueness constraint violated
    #[error("Conflict: {0}")]
    Conflict(Conflict),

    /// Payload (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Which uniqueness rule a write violated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    /// Reservation number already taken
    ReservationNumber,
    /// A confirmed reservation already exists for (event, email)
    ConfirmedEnrollment,
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReservationNumber => f.write_str("reservation number already exists"),
            Self::ConfirmedEnrollment => f.write_str("confirmed enrollment already exists"),
        }
    }
}

/// Result alias for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from the payment gateway adapter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Webhook signature missing, stale or wrong
    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    /// Webhook payload could not be parsed
    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),

    /// Call exceeded the gateway timeout
    #[error("Gateway call timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Transport-level failure
    #[error("Gateway HTTP error: {0}")]
    Http(String),

    /// Gateway answered with an error
    #[error("Gateway rejected request ({status}): {message}")]
    Rejected {
        /// HTTP status returned by the gateway
        status: u16,
        /// Gateway error message
        message: String,
    },
}

/// Result alias for gateway calls
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors from a notification sender
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// Transport failed (SMTP, HTTP relay, ...)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Recipient address rejected
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    /// Send exceeded the configured timeout
    #[error("Send timed out after {0:?}")]
    Timeout(std::time::Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_the_resource() {
        let err = EnrollmentError::NotFound {
            resource: "Event",
            id: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "Event not found: abc");
    }

    #[test]
    fn store_errors_convert() {
        let err: EnrollmentError = StoreError::Database("boom".to_string()).into();
        assert!(matches!(err, EnrollmentError::Store(StoreError::Database(_))));
    }
}
