//! Axum HTTP surface for the enrollment engine.
//!
//! Handlers are thin: extract and validate the request, call the
//! [`ReservationEngine`](enrollment_runtime::ReservationEngine), map the result
//! (or [`EnrollmentError`](enrollment_core::EnrollmentError) via [`AppError`])
//! to a response.
//!
//! # Example
//!
//! ```ignore
//! use enrollment_web::{AppState, router};
//!
//! let app = router(AppState::new(engine, health).with_metrics(exporter));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use error::AppError;
pub use extractors::{SIGNATURE_HEADER, WebhookSignature};
pub use middleware::REQUEST_ID_HEADER;
pub use router::router;
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
