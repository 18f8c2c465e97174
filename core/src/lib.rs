//! # Enrollment Core
//!
//! Domain types, error taxonomy and ports for the enrollment engine.
//!
//! This crate is deliberately free of I/O. Everything that touches the
//! outside world (the database, the payment gateway, the mail relay) is a
//! trait here and an implementation elsewhere:
//!
//! - [`store`]: event catalog, slot counter, reservations, outbox
//! - [`gateway`]: checkout sessions, refunds, webhook verification
//! - [`notification`]: transactional message delivery
//! - [`environment`]: the clock
//!
//! ## Example
//!
//! ```
//! use enrollment_core::types::{Attendee, PaymentStatus};
//!
//! let attendee = Attendee::parse(" Grace@Example.com", "Grace", "Hopper").unwrap();
//! assert_eq!(attendee.email, "grace@example.com");
//! assert!(PaymentStatus::Confirmed.is_terminal());
//! ```

pub mod environment;
pub mod error;
pub mod gateway;
pub mod notification;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use error::{
    Conflict, EnrollmentError, EnrollmentResult, GatewayError, GatewayResult, SendError,
    StoreError, StoreResult,
};
