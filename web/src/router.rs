//! Route table.

use crate::handlers;
use crate::middleware::with_request_tracing;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};

/// Build the application router.
///
/// ```text
/// POST /enrollments/enroll
/// GET  /enrollments/:reservation_number
/// POST /payment/webhook
/// GET  /health
/// GET  /ready
/// GET  /metrics
/// ```
pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/enrollments/enroll", post(handlers::enroll))
        .route(
            "/enrollments/:reservation_number",
            get(handlers::get_enrollment),
        )
        .route("/payment/webhook", post(handlers::payment_webhook))
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness))
        .route("/metrics", get(handlers::metrics))
        .with_state(state);

    with_request_tracing(routes)
}
