//! HTTP request handlers.

pub mod enrollments;
pub mod health;
pub mod webhook;

pub use enrollments::{enroll, get_enrollment};
pub use health::{health_check, metrics, readiness};
pub use webhook::payment_webhook;
